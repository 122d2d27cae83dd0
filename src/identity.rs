//! User identities resolved from token audiences.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Role a user holds on the assessment platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Learner,
    Instructor,
    Administrator,
}

impl Role {
    /// Role name understood by tool providers.
    pub fn lti_name(&self) -> &'static str {
        match self {
            Role::Learner => "Learner",
            Role::Instructor => "Instructor",
            Role::Administrator => "Administrator",
        }
    }
}

/// A resolved user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    #[serde(default)]
    pub roles: Vec<Role>,
    pub full_name: Option<String>,
    pub email: Option<String>,
}

impl Identity {
    /// Create an identity holding only a username.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            roles: Vec::new(),
            full_name: None,
            email: None,
        }
    }

    /// Grant `role`.
    pub fn with_role(mut self, role: Role) -> Self {
        if !self.roles.contains(&role) {
            self.roles.push(role);
        }
        self
    }

    /// Set display name.
    pub fn with_full_name(mut self, name: impl Into<String>) -> Self {
        self.full_name = Some(name.into());
        self
    }

    /// Set contact email.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Port resolving a username to the user it names.
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    /// Find a user; `Ok(None)` when no such user exists.
    async fn find_by_username(&self, username: &str)
    -> Result<Option<Identity>>;
}

#[cfg(test)]
pub struct MemoryDirectory {
    users: dashmap::DashMap<String, Identity>,
}

#[cfg(test)]
impl MemoryDirectory {
    pub fn new(users: impl IntoIterator<Item = Identity>) -> Self {
        Self {
            users: users
                .into_iter()
                .map(|user| (user.username.clone(), user))
                .collect(),
        }
    }

    pub fn remove(&self, username: &str) {
        self.users.remove(username);
    }
}

#[cfg(test)]
#[async_trait]
impl IdentityLookup for MemoryDirectory {
    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Identity>> {
        Ok(self.users.get(username).map(|user| user.clone()))
    }
}

/// Directory whose backend is unreachable.
#[cfg(test)]
pub struct UnavailableDirectory;

#[cfg(test)]
#[async_trait]
impl IdentityLookup for UnavailableDirectory {
    async fn find_by_username(&self, _: &str) -> Result<Option<Identity>> {
        Err(crate::error::Error::identity(std::io::Error::other(
            "directory timed out",
        )))
    }
}
