//! Identity provider seam.
//!
//! The session protocol lives elsewhere; the core only asks "who is the
//! current user?" and treats `None` as an authentication failure.

use std::future::Future;

use tasklist_proto::UserId;

/// Supplies the currently authenticated user.
pub trait IdentityProvider: Send + Sync {
    /// The current user, or `None` if nobody is signed in.
    fn current_user(&self) -> impl Future<Output = Option<UserId>> + Send;
}

/// An identity fixed at construction time.
///
/// Request handlers build one per request from credentials an upstream
/// authenticator has already verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StaticIdentity(Option<UserId>);

impl StaticIdentity {
    #[must_use]
    pub const fn signed_in(user: UserId) -> Self {
        Self(Some(user))
    }

    #[must_use]
    pub const fn anonymous() -> Self {
        Self(None)
    }
}

impl From<Option<UserId>> for StaticIdentity {
    fn from(user: Option<UserId>) -> Self {
        Self(user)
    }
}

impl IdentityProvider for StaticIdentity {
    async fn current_user(&self) -> Option<UserId> {
        self.0
    }
}
