//! Parameter encoding for request signatures.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Everything but RFC 3986 unreserved characters is escaped.
const RESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode `value` with upper-case hex digits; space becomes `%20`.
pub fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, RESERVED).to_string()
}

/// Serialize a parameter set in a form independent of insertion order.
///
/// Pairs are sorted by name then value in byte order, then every name and
/// value is percent-encoded and the pairs are joined with `&`. A name may
/// appear several times.
pub fn canonicalize<I, K, V>(parameters: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut sorted: Vec<(String, String)> = parameters
        .into_iter()
        .map(|(name, value)| {
            (name.as_ref().to_owned(), value.as_ref().to_owned())
        })
        .collect();
    sorted.sort();

    sorted
        .iter()
        .map(|(name, value)| {
            format!("{}={}", percent_encode(name), percent_encode(value))
        })
        .collect::<Vec<_>>()
        .join("&")
}
