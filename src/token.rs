use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Deserialize, Serialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Caller identity recovered from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub subject_id: Uuid,
    pub subject_username: String,
    pub role: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenMaker {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenMaker {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, user_id: Uuid, username: &str, role: &str) -> AppResult<String> {
        self.issue_at(user_id, username, role, Utc::now())
    }

    fn issue_at(
        &self,
        user_id: Uuid,
        username: &str,
        role: &str,
        now: DateTime<Utc>,
    ) -> AppResult<String> {
        let expiration = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            role: role.to_string(),
            iat: now.timestamp(),
            exp: expiration.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
    }

    pub fn verify(&self, token: &str) -> AppResult<Session> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        let decoded = decode::<Claims>(token, &self.decoding, &validation).map_err(|err| {
            tracing::debug!(error = %err, "token rejected");
            AppError::Unauthorized
        })?;
        let claims = decoded.claims;

        let subject_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized)?;
        let issued_at =
            DateTime::from_timestamp(claims.iat, 0).ok_or(AppError::Unauthorized)?;
        let expires_at =
            DateTime::from_timestamp(claims.exp, 0).ok_or(AppError::Unauthorized)?;

        Ok(Session {
            subject_id,
            subject_username: claims.username,
            role: claims.role,
            issued_at,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn maker() -> TokenMaker {
        TokenMaker::new("test-secret", Duration::hours(1))
    }

    #[test]
    fn issued_token_verifies_to_the_same_subject() {
        let maker = maker();
        let id = Uuid::new_v4();
        let token = maker.issue(id, "harry", "user").unwrap();

        let session = maker.verify(&token).unwrap();
        assert_eq!(session.subject_id, id);
        assert_eq!(session.subject_username, "harry");
        assert_eq!(session.role, "user");
        assert_eq!(session.expires_at - session.issued_at, Duration::hours(1));
    }

    #[test]
    fn expired_token_is_unauthorized() {
        let maker = maker();
        let token = maker
            .issue_at(Uuid::new_v4(), "harry", "user", Utc::now() - Duration::hours(3))
            .unwrap();
        assert!(matches!(maker.verify(&token), Err(AppError::Unauthorized)));
    }

    #[test]
    fn token_signed_with_another_secret_is_unauthorized() {
        let other = TokenMaker::new("other-secret", Duration::hours(1));
        let token = other.issue(Uuid::new_v4(), "harry", "user").unwrap();
        assert!(matches!(maker().verify(&token), Err(AppError::Unauthorized)));
    }

    #[test]
    fn garbage_is_unauthorized() {
        assert!(matches!(maker().verify("not.a.jwt"), Err(AppError::Unauthorized)));
    }
}
