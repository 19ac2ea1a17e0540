use crate::domain::UserId;

/// Supplies the id of the user the service acts on behalf of.
pub trait IdentityProvider: Send + Sync {
    fn current_user_id(&self) -> Option<UserId>;
}

/// A fixed identity, resolved once by the caller (e.g. from `--as <name>`).
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticIdentity(Option<UserId>);

impl StaticIdentity {
    pub fn new(user: UserId) -> Self {
        Self(Some(user))
    }

    /// No one is signed in; read-only global views still work.
    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user_id(&self) -> Option<UserId> {
        self.0
    }
}
