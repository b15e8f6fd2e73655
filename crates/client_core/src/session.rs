use shared::domain::Reviewer;
use tracing::{info, warn};

use crate::{error::SessionError, IdentityProvider};

/// The signed-in reviewer plus the token that proves it.
///
/// Acquired once per session and passed explicitly into every workflow that
/// needs the current user. `sign_out` consumes it.
#[derive(Debug, Clone)]
pub struct Session {
    access_token: String,
    reviewer: Reviewer,
}

impl Session {
    pub fn new(access_token: impl Into<String>, reviewer: Reviewer) -> Self {
        Self {
            access_token: access_token.into(),
            reviewer,
        }
    }

    pub async fn acquire(
        identity: &dyn IdentityProvider,
        access_token: &str,
    ) -> Result<Self, SessionError> {
        if access_token.trim().is_empty() {
            return Err(SessionError::Unauthenticated);
        }

        match identity.current_user(access_token).await {
            Ok(Some(reviewer)) => {
                info!(reviewer = %reviewer.id, "session: acquired");
                Ok(Self::new(access_token, reviewer))
            }
            Ok(None) => {
                warn!("session: token rejected by identity provider");
                Err(SessionError::Unauthenticated)
            }
            Err(error) => {
                warn!(%error, "session: identity provider lookup failed");
                Err(SessionError::Provider(error))
            }
        }
    }

    pub fn reviewer(&self) -> &Reviewer {
        &self.reviewer
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub async fn sign_out(self, identity: &dyn IdentityProvider) -> anyhow::Result<()> {
        identity.sign_out(&self.access_token).await?;
        info!(reviewer = %self.reviewer.id, "session: signed out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{reviewer, TestIdentityProvider};

    #[tokio::test]
    async fn acquire_resolves_the_reviewer_behind_the_token() {
        let who = reviewer();
        let identity = TestIdentityProvider::accepting("good", who.clone());

        let session = Session::acquire(&identity, "good").await.expect("session");
        assert_eq!(session.reviewer(), &who);
        assert_eq!(session.access_token(), "good");

        session.sign_out(&identity).await.expect("sign out");
        assert_eq!(
            identity.signed_out.lock().expect("lock").as_slice(),
            ["good".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_or_rejected_tokens_are_unauthenticated() {
        let identity = TestIdentityProvider::accepting("good", reviewer());

        for token in ["", "  ", "stale"] {
            let err = Session::acquire(&identity, token).await.expect_err("rejected");
            assert!(matches!(err, SessionError::Unauthenticated));
        }
    }

    #[tokio::test]
    async fn provider_outage_is_not_reported_as_signed_out() {
        let identity = TestIdentityProvider {
            fail_with: Some("auth service down".to_string()),
            ..TestIdentityProvider::accepting("good", reviewer())
        };

        let err = Session::acquire(&identity, "good").await.expect_err("outage");
        assert!(matches!(err, SessionError::Provider(_)));
    }
}
