//! Credential handling: argon2 password hashes, HS256 session tokens in
//! two lifetimes, opaque API keys, and revocable refresh tokens.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use scriberr_domain::{Error, Result};
use scriberr_storage::api_keys::ApiKeyRepo;
use scriberr_storage::refresh_tokens::RefreshTokenRepo;
use scriberr_storage::users::UserRepo;
use scriberr_storage::User;

/// Accepted clock skew on issuance/expiry.
const CLOCK_SKEW_SECS: u64 = 60;

/// Interactive session lifetime.
fn short_lived() -> Duration {
    Duration::hours(24)
}

/// Device/CLI pairing lifetime.
fn long_lived() -> Duration {
    Duration::days(365)
}

/// Server-side refresh session lifetime.
fn refresh_lived() -> Duration {
    Duration::days(30)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: i64,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

pub struct AuthService {
    jwt_secret: String,
    users: UserRepo,
    api_keys: ApiKeyRepo,
    refresh_tokens: RefreshTokenRepo,
}

impl AuthService {
    pub fn new(
        jwt_secret: String,
        users: UserRepo,
        api_keys: ApiKeyRepo,
        refresh_tokens: RefreshTokenRepo,
    ) -> Self {
        Self {
            jwt_secret,
            users,
            api_keys,
            refresh_tokens,
        }
    }

    // ── Passwords ──────────────────────────────────────────────────

    pub fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| Error::Internal(format!("password hashing: {e}")))
    }

    /// Constant-time-by-construction: an unparseable stored hash still
    /// runs a full argon2 verification against a burn-in hash so the
    /// reject path's timing does not reveal which case was hit.
    pub fn verify_password(&self, stored_hash: &str, password: &str) -> bool {
        match PasswordHash::new(stored_hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => {
                if let Ok(parsed) = PasswordHash::new(burn_in_hash()) {
                    let _ = Argon2::default().verify_password(password.as_bytes(), &parsed);
                }
                false
            }
        }
    }

    // ── Session tokens ─────────────────────────────────────────────

    pub fn issue_token(&self, user: &User, long_lived: bool) -> Result<String> {
        let ttl = if long_lived {
            self::long_lived()
        } else {
            short_lived()
        };
        self.issue_token_with_ttl(user, ttl)
    }

    pub(crate) fn issue_token_with_ttl(&self, user: &User, ttl: Duration) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            username: user.username.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| Error::Internal(format!("token signing: {e}")))
    }

    /// Expired, wrong-signature, and structurally malformed tokens are
    /// rejected with distinct messages under the one `unauthenticated`
    /// kind.
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = CLOCK_SKEW_SECS;

        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        ) {
            Ok(data) => Ok(data.claims),
            Err(e) => match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    Err(Error::Unauthenticated("token expired".into()))
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    Err(Error::Unauthenticated("invalid token signature".into()))
                }
                _ => Err(Error::Unauthenticated("malformed token".into())),
            },
        }
    }

    // ── API keys ───────────────────────────────────────────────────

    /// Direct repository lookup with `is_active = true`; `last_used` is
    /// refreshed asynchronously and its failure never fails the request.
    pub async fn verify_api_key(&self, key: &str) -> Result<User> {
        let record = self
            .api_keys
            .find_active_by_key(key)
            .await
            .map_err(Error::from)?
            .ok_or_else(|| Error::Unauthenticated("invalid API key".into()))?;

        let repo = self.api_keys.clone();
        let key_id = record.id;
        tokio::spawn(async move {
            if let Err(e) = repo.touch_last_used(key_id).await {
                tracing::debug!(key_id, error = %e, "last_used update failed");
            }
        });

        self.users
            .find_by_id(record.user_id)
            .await
            .map_err(Error::from)?
            .ok_or_else(|| Error::Unauthenticated("API key owner no longer exists".into()))
    }

    // ── Refresh tokens ─────────────────────────────────────────────

    pub async fn issue_refresh_token(&self, user_id: i64) -> Result<String> {
        self.refresh_tokens
            .issue(user_id, Utc::now() + refresh_lived())
            .await
            .map_err(Error::from)
    }

    /// Redeem a refresh token for a fresh short-lived session token.
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<(User, String)> {
        let session = self
            .refresh_tokens
            .find_live(refresh_token)
            .await
            .map_err(Error::from)?
            .ok_or_else(|| Error::Unauthenticated("invalid or revoked refresh token".into()))?;

        let user = self
            .users
            .find_by_id(session.user_id)
            .await
            .map_err(Error::from)?
            .ok_or_else(|| Error::Unauthenticated("session owner no longer exists".into()))?;

        let token = self.issue_token(&user, false)?;
        Ok((user, token))
    }

    pub async fn revoke_refresh_token(&self, refresh_token: &str) -> Result<()> {
        self.refresh_tokens
            .revoke(refresh_token)
            .await
            .map_err(Error::from)?;
        Ok(())
    }
}

/// Fixed argon2 hash used only to equalize timing on the unparseable
/// branch of `verify_password`; computed once per process.
fn burn_in_hash() -> &'static str {
    use std::sync::OnceLock;
    static BURN_IN: OnceLock<String> = OnceLock::new();
    BURN_IN.get_or_init(|| {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(b"scriberr-burn-in", &salt)
            .map(|h| h.to_string())
            .unwrap_or_default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriberr_storage::Database;

    async fn service() -> (AuthService, User) {
        let pool = Database::in_memory().await.unwrap().pool();
        let users = UserRepo::new(pool.clone());
        let auth = AuthService::new(
            "test-secret".into(),
            users.clone(),
            ApiKeyRepo::new(pool.clone()),
            RefreshTokenRepo::new(pool),
        );
        let hash = auth.hash_password("CorrectHorse1!").unwrap();
        let user = users.create("alice", &hash).await.unwrap();
        (auth, user)
    }

    #[tokio::test]
    async fn password_verify_roundtrip() {
        let (auth, user) = service().await;
        assert!(auth.verify_password(&user.password_hash, "CorrectHorse1!"));
        assert!(!auth.verify_password(&user.password_hash, "WrongHorse1!"));
    }

    #[tokio::test]
    async fn invalid_stored_hash_rejects_without_panicking() {
        let (auth, _) = service().await;
        assert!(!auth.verify_password("not-a-phc-string", "anything"));
        assert!(!auth.verify_password("", "anything"));
    }

    #[tokio::test]
    async fn hashes_are_salted_per_record() {
        let (auth, _) = service().await;
        let a = auth.hash_password("same-password").unwrap();
        let b = auth.hash_password("same-password").unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn token_roundtrip_carries_identity() {
        let (auth, user) = service().await;
        let token = auth.issue_token(&user, false).unwrap();
        let claims = auth.validate_token(&token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.username, "alice");
        // 24h expiry, within a minute of slack.
        let lifetime = claims.exp - claims.iat;
        assert_eq!(lifetime, 24 * 3600);
    }

    #[tokio::test]
    async fn long_lived_token_spans_a_year() {
        let (auth, user) = service().await;
        let token = auth.issue_token(&user, true).unwrap();
        let claims = auth.validate_token(&token).unwrap();
        assert_eq!(claims.exp - claims.iat, 365 * 24 * 3600);
    }

    #[tokio::test]
    async fn expired_token_is_rejected_distinctly() {
        let (auth, user) = service().await;
        // Expired beyond the 60s leeway.
        let token = auth
            .issue_token_with_ttl(&user, Duration::seconds(-120))
            .unwrap();
        let err = auth.validate_token(&token).unwrap_err();
        assert_eq!(err.kind(), "unauthenticated");
        assert!(err.to_string().contains("expired"));
    }

    #[tokio::test]
    async fn just_expired_token_survives_on_leeway() {
        let (auth, user) = service().await;
        let token = auth
            .issue_token_with_ttl(&user, Duration::seconds(-30))
            .unwrap();
        assert!(auth.validate_token(&token).is_ok());
    }

    #[tokio::test]
    async fn wrong_signature_and_garbage_are_rejected() {
        let (auth, user) = service().await;
        let pool = Database::in_memory().await.unwrap().pool();
        let other = AuthService::new(
            "different-secret".into(),
            UserRepo::new(pool.clone()),
            ApiKeyRepo::new(pool.clone()),
            RefreshTokenRepo::new(pool),
        );
        let token = other.issue_token(&user, false).unwrap();

        let err = auth.validate_token(&token).unwrap_err();
        assert!(err.to_string().contains("signature"));

        let err = auth.validate_token("not.a.jwt").unwrap_err();
        assert!(err.to_string().contains("malformed"));
    }

    #[tokio::test]
    async fn refresh_token_lifecycle() {
        let (auth, user) = service().await;
        let refresh = auth.issue_refresh_token(user.id).await.unwrap();

        let (refreshed_user, token) = auth.refresh_session(&refresh).await.unwrap();
        assert_eq!(refreshed_user.id, user.id);
        assert!(auth.validate_token(&token).is_ok());

        auth.revoke_refresh_token(&refresh).await.unwrap();
        let err = auth.refresh_session(&refresh).await.unwrap_err();
        assert_eq!(err.kind(), "unauthenticated");
    }

    #[tokio::test]
    async fn api_key_verification_requires_active_key() {
        let (auth, user) = service().await;
        let key = auth
            .api_keys
            .create(user.id, "cli", None)
            .await
            .unwrap();

        let verified = auth.verify_api_key(&key.key).await.unwrap();
        assert_eq!(verified.id, user.id);

        auth.api_keys
            .set_active(key.id, user.id, false)
            .await
            .unwrap();
        let err = auth.verify_api_key(&key.key).await.unwrap_err();
        assert_eq!(err.kind(), "unauthenticated");
    }
}
