//! User store collaborator.
//!
//! The gate only needs to know whether a verified local user ID still
//! belongs to a user. Persistence lives elsewhere; implement [`UserStore`]
//! over it.

use crate::auth::principal::UserId;
use crate::errors::AuthError;
use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::RwLock;

/// Lookup of local user identities.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Whether a user with `user_id` exists.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserStoreUnavailable` if the lookup itself failed.
    /// A missing user is `Ok(false)`, never an error.
    async fn user_exists(&self, user_id: UserId) -> Result<bool, AuthError>;
}

/// In-memory user store for embedding and tests.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashSet<UserId>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(ids: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            users: RwLock::new(ids.into_iter().collect()),
        }
    }

    pub async fn insert(&self, user_id: UserId) {
        self.users.write().await.insert(user_id);
    }

    pub async fn remove(&self, user_id: UserId) -> bool {
        self.users.write().await.remove(&user_id)
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn user_exists(&self, user_id: UserId) -> Result<bool, AuthError> {
        Ok(self.users.read().await.contains(&user_id))
    }
}
