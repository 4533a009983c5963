//! The authenticated identity handed to resource handlers.

use std::fmt;

/// Integer identifier of a local user.
pub type UserId = i64;

/// Result of a successful authentication.
///
/// Carries no mutable state; built fresh for every request.
#[derive(Clone, PartialEq, Eq)]
pub enum Principal {
    /// A first-party user holding a locally issued session token.
    LocalUser { id: UserId },

    /// A machine client holding a remotely issued client-credential token.
    MachineClient { client_id: String },
}

impl Principal {
    /// Whether this principal may read a resource owned by `owner_id`.
    ///
    /// Machine clients read everything; users read what they own.
    pub fn can_read(&self, owner_id: UserId) -> bool {
        match self {
            Principal::MachineClient { .. } => true,
            Principal::LocalUser { id } => *id == owner_id,
        }
    }

    /// Whether this principal may modify or delete a resource owned by `owner_id`.
    ///
    /// Only the owning user. Machine clients are read-only.
    pub fn can_modify(&self, owner_id: UserId) -> bool {
        match self {
            Principal::MachineClient { .. } => false,
            Principal::LocalUser { id } => *id == owner_id,
        }
    }

    /// Short label for logs and metric labels.
    pub fn class(&self) -> &'static str {
        match self {
            Principal::LocalUser { .. } => "local_user",
            Principal::MachineClient { .. } => "machine_client",
        }
    }
}

/// Machine client IDs are redacted; user IDs are not sensitive on their own.
impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::LocalUser { id } => f.debug_struct("LocalUser").field("id", id).finish(),
            Principal::MachineClient { .. } => f
                .debug_struct("MachineClient")
                .field("client_id", &"[REDACTED]")
                .finish(),
        }
    }
}
