use rand::{distributions::Alphanumeric, Rng};
use time::{Duration, OffsetDateTime};

use crate::config::TokenConfig;

pub const TOKEN_LEN: usize = 32;

pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub value: String,
    pub expires_at: OffsetDateTime,
}

impl IssuedToken {
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

/// Lifetimes for email verification codes and password reset tokens.
#[derive(Debug, Clone, Copy)]
pub struct TokenPolicy {
    pub verification_ttl: Duration,
    pub reset_ttl: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            verification_ttl: Duration::hours(24),
            reset_ttl: Duration::minutes(60),
        }
    }
}

impl From<&TokenConfig> for TokenPolicy {
    fn from(cfg: &TokenConfig) -> Self {
        Self {
            verification_ttl: Duration::hours(cfg.verification_ttl_hours),
            reset_ttl: Duration::minutes(cfg.reset_ttl_minutes),
        }
    }
}

impl TokenPolicy {
    pub fn issue_verification(&self) -> IssuedToken {
        self.issue(self.verification_ttl)
    }

    pub fn issue_reset(&self) -> IssuedToken {
        self.issue(self.reset_ttl)
    }

    fn issue(&self, ttl: Duration) -> IssuedToken {
        IssuedToken {
            value: generate_token(),
            expires_at: OffsetDateTime::now_utc() + ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_alphanumeric_and_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn default_policy_matches_configured_defaults() {
        let policy = TokenPolicy::from(&TokenConfig {
            verification_ttl_hours: 24,
            reset_ttl_minutes: 60,
        });
        let default = TokenPolicy::default();
        assert_eq!(policy.verification_ttl, default.verification_ttl);
        assert_eq!(policy.reset_ttl, default.reset_ttl);
    }

    #[test]
    fn issued_tokens_expire_after_their_ttl() {
        let policy = TokenPolicy {
            verification_ttl: Duration::hours(24),
            reset_ttl: Duration::minutes(15),
        };
        let now = OffsetDateTime::now_utc();

        let verification = policy.issue_verification();
        assert!(!verification.is_expired_at(now));
        assert!(verification.is_expired_at(now + Duration::hours(25)));

        let reset = policy.issue_reset();
        assert!(!reset.is_expired_at(now));
        assert!(reset.is_expired_at(now + Duration::minutes(16)));
    }
}
