//! Token service for keepr.
//!
//! Issues and verifies RS256-signed bearer tokens. The server holds an RSA
//! key pair loaded once at startup; clients never see the private key, only
//! the tokens it signs.

use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bearer tokens are valid for 72 hours from issue. Stateless: there is no
/// server-side revocation list, so a leaked token is valid until it expires.
const TOKEN_LIFETIME_SECS: i64 = 72 * 60 * 60;

/// The `(id, username, email)` triple produced by verifying a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Username")]
    username: String,
    #[serde(rename = "Email")]
    email: String,
    exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("failed to sign token")]
    SignFailed,

    #[error("token invalid")]
    TokenInvalid,

    #[error("token expired")]
    TokenExpired,
}

/// A user record the token service needs to mint a token for. Mirrors what
/// the store hands back after register/login: the caller already knows
/// these three fields, so `issue` takes them directly rather than a larger
/// `User` type with the password hash attached.
pub struct TokenSubject {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

/// Issues and verifies bearer tokens against a single RSA key pair.
///
/// Constructed once at startup and shared (via `Arc`) across every call; it
/// holds no mutable state.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenService {
    /// Builds a token service from a PEM-encoded PKCS#1 RSA private key. The
    /// public key used for verification is derived from the same key pair.
    pub fn from_pkcs1_pem(pem: &str) -> std::result::Result<Self, AuthError> {
        let encoding_key =
            EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|_| AuthError::SignFailed)?;
        let decoding_key = rsa_public_from_private_pkcs1(pem).map_err(|_| AuthError::SignFailed)?;
        Ok(Self { encoding_key, decoding_key })
    }

    /// Builds claims `{Id, Username, Email, exp: now+72h}` and signs with
    /// RS256. Fails with [`AuthError::SignFailed`] if signing itself fails
    /// (e.g. a malformed key) — this should not happen once the service is
    /// constructed, but the signing call is fallible so it's surfaced.
    pub fn issue(&self, subject: &TokenSubject, now_unix: i64) -> std::result::Result<String, AuthError> {
        let claims = Claims {
            id: subject.id.to_string(),
            username: subject.username.clone(),
            email: subject.email.clone(),
            exp: now_unix + TOKEN_LIFETIME_SECS,
        };
        let header = Header::new(Algorithm::RS256);
        encode(&header, &claims, &self.encoding_key).map_err(|_| AuthError::SignFailed)
    }

    /// Parses and verifies a bearer token.
    ///
    /// Requires the algorithm header to be RS256; any other algorithm is
    /// rejected before the signature is even checked against the key. This
    /// blocks `alg=none` and HMAC-confusion attacks where an attacker
    /// supplies a token signed with the (public) RSA key material
    /// reinterpreted as an HMAC secret.
    pub fn verify(&self, token: &str, now_unix: i64) -> std::result::Result<UserIdentity, AuthError> {
        let header = jsonwebtoken::decode_header(token).map_err(|_| AuthError::TokenInvalid)?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::TokenInvalid);
        }

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false; // checked explicitly below against an injectable clock
        validation.required_spec_claims.clear();

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| AuthError::TokenInvalid)?;

        if data.claims.exp <= now_unix {
            return Err(AuthError::TokenExpired);
        }

        let id = Uuid::parse_str(&data.claims.id).map_err(|_| AuthError::TokenInvalid)?;

        Ok(UserIdentity { id, username: data.claims.username, email: data.claims.email })
    }
}

/// There is no separate public-key file: the public key used for
/// verification is the `(n, e)` pair embedded in the private key.
fn rsa_public_from_private_pkcs1(pem: &str) -> std::result::Result<DecodingKey, ()> {
    use rsa::pkcs1::DecodeRsaPrivateKey;
    use rsa::traits::PublicKeyParts;

    let private = rsa::RsaPrivateKey::from_pkcs1_pem(pem).map_err(|_| ())?;
    let n = private.n().to_bytes_be();
    let e = private.e().to_bytes_be();
    DecodingKey::from_rsa_components(&base64_url(&n), &base64_url(&e)).map_err(|_| ())
}

fn base64_url(bytes: &[u8]) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    URL_SAFE_NO_PAD.encode(bytes)
}
