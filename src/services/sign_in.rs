// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Magic-link sign-in restricted to the institution's email domain.
//!
//! A link token is `base64url(email|expires_hex|nonce_hex|signature_hex)`
//! where the signature is HMAC-SHA256 over `email|expires_hex|nonce_hex`.
//! Nonces are recorded on first use, so each link signs in at most once.

use crate::db::Database;
use crate::error::AppError;
use crate::middleware::auth::create_jwt;
use crate::models::User;
use crate::services::mailer::Mailer;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use validator::ValidateEmail;

type HmacSha256 = Hmac<Sha256>;

/// Why a sign-in link was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("malformed sign-in token")]
    Malformed,
    #[error("sign-in token signature mismatch")]
    BadSignature,
    #[error("sign-in link expired")]
    Expired,
    #[error("sign-in link already used")]
    AlreadyUsed,
}

impl From<LinkError> for AppError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::Malformed | LinkError::BadSignature => AppError::InvalidToken,
            LinkError::Expired | LinkError::AlreadyUsed => AppError::LinkExpired,
        }
    }
}

/// Contents of a verified link token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkClaims {
    pub email: String,
    pub expires_at: DateTime<Utc>,
    pub nonce: String,
}

/// A freshly issued sign-in link.
#[derive(Debug, Clone)]
pub struct SignInLink {
    pub email: String,
    pub token: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of a completed sign-in.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub user: User,
    /// True when this sign-in created the account
    pub created: bool,
    /// Session JWT
    pub session_token: String,
}

/// Trim and lower-case an email address.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Accept only well-formed addresses whose domain is exactly `domain`.
pub fn check_institution_email(raw: &str, domain: &str) -> Result<String, AppError> {
    let email = normalize_email(raw);
    let in_domain = email
        .rsplit_once('@')
        .is_some_and(|(local, d)| !local.is_empty() && d == domain);

    if !in_domain || !email.validate_email() {
        tracing::info!(email = %email, "Rejected sign-in for non-institution email");
        return Err(AppError::InvalidDomain(domain.to_string()));
    }
    Ok(email)
}

/// Build a signed link token.
pub fn sign_link_token(claims: &LinkClaims, secret: &[u8]) -> Result<String, AppError> {
    let payload = format!(
        "{}|{:x}|{}",
        claims.email,
        claims.expires_at.timestamp(),
        claims.nonce
    );
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    let signed = format!("{}|{}", payload, hex::encode(mac.finalize().into_bytes()));
    Ok(URL_SAFE_NO_PAD.encode(signed.as_bytes()))
}

/// Check signature and expiry of a link token. Does not consume the nonce.
pub fn verify_link_token(
    token: &str,
    secret: &[u8],
    now: DateTime<Utc>,
) -> Result<LinkClaims, LinkError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.trim())
        .map_err(|_| LinkError::Malformed)?;
    let decoded = String::from_utf8(bytes).map_err(|_| LinkError::Malformed)?;

    // The email cannot contain '|', so split from the right.
    let mut parts = decoded.rsplitn(4, '|');
    let (Some(signature_hex), Some(nonce), Some(expires_hex), Some(email)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(LinkError::Malformed);
    };

    let signature = hex::decode(signature_hex).map_err(|_| LinkError::Malformed)?;
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| LinkError::Malformed)?;
    mac.update(format!("{}|{}|{}", email, expires_hex, nonce).as_bytes());
    let expected = mac.finalize().into_bytes();

    if !bool::from(expected.as_slice().ct_eq(signature.as_slice())) {
        tracing::warn!("Sign-in token signature mismatch");
        return Err(LinkError::BadSignature);
    }

    let expires_secs = i64::from_str_radix(expires_hex, 16).map_err(|_| LinkError::Malformed)?;
    let expires_at = DateTime::from_timestamp(expires_secs, 0).ok_or(LinkError::Malformed)?;
    if now >= expires_at {
        return Err(LinkError::Expired);
    }

    Ok(LinkClaims {
        email: email.to_string(),
        expires_at,
        nonce: nonce.to_string(),
    })
}

/// Issues, delivers and redeems sign-in links.
#[derive(Clone)]
pub struct SignInService {
    db: Database,
    mailer: Mailer,
    domain: String,
    link_key: Vec<u8>,
    session_key: Vec<u8>,
    link_ttl: Duration,
    api_url: String,
}

impl SignInService {
    pub fn new(config: &crate::config::Config, db: Database, mailer: Mailer) -> Self {
        Self {
            db,
            mailer,
            domain: config.institution_domain.clone(),
            link_key: config.sign_in_link_key.clone(),
            session_key: config.jwt_signing_key.clone(),
            link_ttl: Duration::hours(config.sign_in_link_ttl_hours),
            api_url: config.api_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create a signed link for an institution email without sending it.
    pub fn issue_link(&self, email: &str, now: DateTime<Utc>) -> Result<SignInLink, AppError> {
        let email = check_institution_email(email, &self.domain)?;
        let claims = LinkClaims {
            email: email.clone(),
            expires_at: now + self.link_ttl,
            nonce: hex::encode(rand::random::<[u8; 16]>()),
        };
        let token = sign_link_token(&claims, &self.link_key)?;
        let url = format!(
            "{}/auth/verify?token={}",
            self.api_url,
            urlencoding::encode(&token)
        );

        Ok(SignInLink {
            email,
            token,
            url,
            expires_at: claims.expires_at,
        })
    }

    /// Issue a link and email it. Delivery failures are logged, not returned.
    pub async fn request_link(&self, email: &str) -> Result<SignInLink, AppError> {
        let link = self.issue_link(email, Utc::now())?;

        if let Err(e) = self
            .mailer
            .send_sign_in_link(&link.email, &link.url, link.expires_at)
            .await
        {
            tracing::warn!(error = %e, email = %link.email, "Failed to send sign-in email");
        }
        Ok(link)
    }

    /// Redeem a link: verify it, burn its nonce, and open a session.
    pub async fn complete_sign_in(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<SignedIn, AppError> {
        let claims = verify_link_token(token, &self.link_key, now)?;
        let email = check_institution_email(&claims.email, &self.domain)?;

        if !self
            .db
            .consume_nonce(&claims.nonce, claims.expires_at, now)
            .await?
        {
            tracing::info!(email = %email, "Sign-in link reused");
            return Err(LinkError::AlreadyUsed.into());
        }

        let (user, created) = self.db.get_or_create_user(&email, now).await?;
        let session_token = create_jwt(&user.id, &self.session_key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

        tracing::info!(user_id = %user.id, created, "Sign-in completed");
        Ok(SignedIn {
            user,
            created,
            session_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn service() -> SignInService {
        SignInService::new(&Config::test_default(), Database::memory(), Mailer::log_only())
    }

    fn claims(expires_at: DateTime<Utc>) -> LinkClaims {
        LinkClaims {
            email: "a@uci.edu".to_string(),
            expires_at,
            nonce: "00ff".to_string(),
        }
    }

    #[test]
    fn test_check_institution_email() {
        assert_eq!(
            check_institution_email("  Peter@UCI.edu ", "uci.edu").unwrap(),
            "peter@uci.edu"
        );
        for bad in [
            "b@gmail.com",
            "a@uci.edu.evil.com",
            "a@notuci.edu",
            "@uci.edu",
            "uci.edu",
            "a@sub.uci.edu",
        ] {
            let err = check_institution_email(bad, "uci.edu").unwrap_err();
            assert!(matches!(err, AppError::InvalidDomain(_)), "{}", bad);
        }
    }

    #[test]
    fn test_link_token_verifies() {
        let secret = b"secret_key";
        let now = Utc::now();
        let token = sign_link_token(&claims(now + Duration::hours(1)), secret).unwrap();

        let verified = verify_link_token(&token, secret, now).unwrap();
        assert_eq!(verified.email, "a@uci.edu");
        assert_eq!(verified.nonce, "00ff");
    }

    #[test]
    fn test_link_token_wrong_secret() {
        let now = Utc::now();
        let token = sign_link_token(&claims(now + Duration::hours(1)), b"secret_key").unwrap();
        assert_eq!(
            verify_link_token(&token, b"wrong_key", now),
            Err(LinkError::BadSignature)
        );
    }

    #[test]
    fn test_link_token_tampered_email() {
        let secret = b"secret_key";
        let now = Utc::now();
        let token = sign_link_token(&claims(now + Duration::hours(1)), secret).unwrap();
        let decoded = String::from_utf8(URL_SAFE_NO_PAD.decode(&token).unwrap()).unwrap();
        let forged = URL_SAFE_NO_PAD.encode(decoded.replacen("a@uci.edu", "z@uci.edu", 1));
        assert_eq!(
            verify_link_token(&forged, secret, now),
            Err(LinkError::BadSignature)
        );
    }

    #[test]
    fn test_link_token_expired() {
        let secret = b"secret_key";
        let now = Utc::now();
        let token = sign_link_token(&claims(now - Duration::seconds(1)), secret).unwrap();
        assert_eq!(
            verify_link_token(&token, secret, now),
            Err(LinkError::Expired)
        );
    }

    #[test]
    fn test_link_token_malformed() {
        let encoded = URL_SAFE_NO_PAD.encode("invalid|format");
        assert_eq!(
            verify_link_token(&encoded, b"secret_key", Utc::now()),
            Err(LinkError::Malformed)
        );
        assert_eq!(
            verify_link_token("not base64!!", b"secret_key", Utc::now()),
            Err(LinkError::Malformed)
        );
    }

    #[tokio::test]
    async fn test_sign_in_creates_one_user_and_link_is_single_use() {
        let service = service();
        let now = Utc::now();
        let link = service.issue_link("A@uci.edu", now).unwrap();
        assert!(link.url.starts_with("http://localhost:8080/auth/verify?token="));

        let signed_in = service.complete_sign_in(&link.token, now).await.unwrap();
        assert!(signed_in.created);
        assert!(signed_in.user.email_verified);
        assert!(!signed_in.user.onboarded);
        assert_eq!(signed_in.user.email, "a@uci.edu");

        let reused = service.complete_sign_in(&link.token, now).await.unwrap_err();
        assert!(matches!(reused, AppError::LinkExpired));

        let second = service.issue_link("a@uci.edu", now).unwrap();
        let again = service.complete_sign_in(&second.token, now).await.unwrap();
        assert!(!again.created);
        assert_eq!(again.user.id, signed_in.user.id);
    }

    #[tokio::test]
    async fn test_foreign_domain_creates_nothing() {
        let service = service();
        let err = service.request_link("b@gmail.com").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidDomain(_)));
        assert!(service
            .db
            .get_user_by_email("b@gmail.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_expired_link_is_rejected() {
        let service = service();
        let issued_at = Utc::now() - Duration::hours(25);
        let link = service.issue_link("a@uci.edu", issued_at).unwrap();
        let err = service
            .complete_sign_in(&link.token, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::LinkExpired));
    }
}
