use async_trait::async_trait;
use thiserror::Error;

use charade_core::types::UserId;

/// A resolved platform identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: UserId,
    pub display_name: String,
}

/// External identity lookup, used only for mention rewriting.
///
/// Lookups are fallible; a failed lookup leaves the mention token in place.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn resolve(&self, user_id: &UserId) -> Result<Identity, IdentityError>;
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("unknown user: {0}")]
    NotFound(String),

    #[error("directory lookup failed: {0}")]
    Backend(String),
}
