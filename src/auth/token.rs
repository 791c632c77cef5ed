//! Signed session tokens: `base64url(header).base64url(claims).base64url(hmac)`.
//!
//! The signature is HMAC-SHA256 over `"header.claims"` and is verified in
//! constant time before any claim is decoded. Timestamps are epoch millis.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const ALG: &str = "HS256";
const TYP: &str = "JWT";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Signing secret must not be empty")]
    EmptySecret,

    #[error("Malformed token")]
    Malformed,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token expired")]
    Expired,
}

/// Claims carried inside a token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Claims {
    #[serde(rename = "sub")]
    pub user_id: String,
    pub username: String,
    #[serde(rename = "iat")]
    pub issued_at: i64,
    #[serde(rename = "exp")]
    pub expires_at: i64,
    #[serde(rename = "jti")]
    pub token_id: String,
}

#[derive(Debug, Deserialize)]
struct Header {
    alg: String,
}

/// A freshly minted token and the claims inside it.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

/// Creates and validates tokens with a server-held secret.
#[derive(Clone)]
pub struct TokenAuthenticator {
    mac: HmacSha256,
}

impl std::fmt::Debug for TokenAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenAuthenticator { .. }")
    }
}

impl TokenAuthenticator {
    pub fn new(secret: &[u8]) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| TokenError::EmptySecret)?;
        Ok(Self { mac })
    }

    /// Mint a token with a fresh random token id.
    pub fn create(
        &self,
        user_id: &str,
        username: &str,
        issued_at_ms: i64,
        expires_at_ms: i64,
    ) -> IssuedToken {
        let token_id = Uuid::new_v4().to_string();
        let header = json!({ "alg": ALG, "typ": TYP }).to_string();
        let claims_json = json!({
            "sub": user_id,
            "username": username,
            "iat": issued_at_ms,
            "exp": expires_at_ms,
            "jti": token_id,
        })
        .to_string();

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(claims_json)
        );
        let signature = URL_SAFE_NO_PAD.encode(self.sign(&signing_input));

        IssuedToken {
            token: format!("{}.{}", signing_input, signature),
            claims: Claims {
                user_id: user_id.to_string(),
                username: username.to_string(),
                issued_at: issued_at_ms,
                expires_at: expires_at_ms,
                token_id,
            },
        }
    }

    /// Validate against the current wall clock.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        self.validate_at(token, Utc::now().timestamp_millis())
    }

    /// Validate against an explicit clock.
    pub fn validate_at(&self, token: &str, now_ms: i64) -> Result<Claims, TokenError> {
        let (header, claims, signature) = split(token)?;

        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::InvalidSignature)?;
        let mut mac = self.mac.clone();
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(claims.as_bytes());
        mac.verify_slice(&provided)
            .map_err(|_| TokenError::InvalidSignature)?;

        let header: Header = decode_segment(header)?;
        if header.alg != ALG {
            return Err(TokenError::Malformed);
        }
        let claims: Claims = decode_segment(claims)?;
        if now_ms >= claims.expires_at {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// Read the token id without checking the signature.
    ///
    /// The result is untrusted; never use it to authorize anything.
    pub fn extract_token_id(token: &str) -> Result<String, TokenError> {
        let (_, claims, _) = split(token)?;
        let claims: Claims = decode_segment(claims)?;
        Ok(claims.token_id)
    }

    fn sign(&self, input: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(input.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

fn split(token: &str) -> Result<(&str, &str, &str), TokenError> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(c), Some(s), None) => Ok((h, c, s)),
        _ => Err(TokenError::Malformed),
    }
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}
