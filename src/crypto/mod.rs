//! Cryptography primitives for keepr.
//!
//! Two independent concerns live here:
//! - AEAD — AES-256-GCM envelope encryption of record payloads, keyed by a
//!   key the server never sees (see [`derive_key`]).
//! - [`password`] — bcrypt-based hashing/verification of the account
//!   password the server *does* store, as a write-only verifier.
//!
//! - AES-256-GCM provides authenticated encryption (confidentiality + integrity).
//! - The nonce is 96 bits, freshly drawn from a CSPRNG for every encryption.
//! - The symmetric key is a pure function of credentials the client already
//!   holds; see [`derive_key`] for the exact formula and its caveats.

use ring::aead::{self, BoundKey, Nonce, OpeningKey, SealingKey, UnboundKey, AES_256_GCM};
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};

/// Size of the derived encryption key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Size of the nonce/IV in bytes (96 bits for GCM).
pub const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag in bytes.
const TAG_SIZE: usize = 16;

/// Cryptography module error type.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Decryption failed: wrong key, corrupted data, or tampering. GCM gives
    /// no way to distinguish these, and this type doesn't either.
    #[error("decryption failed")]
    DecryptFailed,

    /// Ciphertext blob is shorter than a nonce + tag, or otherwise malformed.
    #[error("invalid ciphertext format: {0}")]
    InvalidFormat(&'static str),

    /// The CSPRNG failed to produce a nonce.
    #[error("failed to generate nonce")]
    RandomError,
}

pub type Result<T> = std::result::Result<T, CryptoError>;

/// Derives the per-user symmetric key as `SHA-256(email || password)`.
///
/// This is a pure function of data the client already has: no salt, no
/// server round-trip, no persisted state. That's what makes "the server
/// never learns K" true — K is recomputed locally on every register/login
/// instead of being issued or stored anywhere.
///
/// The concatenation has no separator between `email` and `password`, which
/// means `("a", "bc")` and `("ab", "c")` derive the same key. This is a
/// known quirk of the formula, carried forward as-is for wire
/// compatibility — see DESIGN.md.
pub fn derive_key(email: &str, password: &str) -> [u8; KEY_SIZE] {
    let mut buf = Vec::with_capacity(email.len() + password.len());
    buf.extend_from_slice(email.as_bytes());
    buf.extend_from_slice(password.as_bytes());
    let digest = digest::digest(&digest::SHA256, &buf);
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(digest.as_ref());
    key
}

/// Encrypts `plaintext` under `key`, returning `nonce || ciphertext || tag`.
///
/// Each call draws a fresh random nonce, so encrypting the same plaintext
/// twice yields different output.
pub fn encrypt(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
    let nonce_bytes = generate_nonce()?;

    let unbound_key = UnboundKey::new(&AES_256_GCM, key).expect("key is valid size");
    let sealing_key = SealingKey::new(unbound_key);

    let mut out = Vec::with_capacity(NONCE_SIZE + plaintext.len() + TAG_SIZE);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(plaintext);

    let nonce = Nonce::assume_unique_for_key(nonce_bytes);
    sealing_key
        .seal_in_place_append_tag(nonce, aead::Aad::empty(), &mut out[NONCE_SIZE..])
        .map_err(|_| CryptoError::DecryptFailed)?;

    Ok(out)
}

/// Decrypts a blob produced by [`encrypt`]. Fails with
/// [`CryptoError::DecryptFailed`] on any authentication failure — wrong key
/// or tampered bytes look identical.
pub fn decrypt(key: &[u8; KEY_SIZE], blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::InvalidFormat("ciphertext shorter than nonce + tag"));
    }

    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_SIZE);
    let mut nonce_arr = [0u8; NONCE_SIZE];
    nonce_arr.copy_from_slice(nonce_bytes);
    let nonce = Nonce::assume_unique_for_key(nonce_arr);

    let unbound_key = UnboundKey::new(&AES_256_GCM, key).expect("key is valid size");
    let opening_key = OpeningKey::new(unbound_key);

    let mut buf = ciphertext.to_vec();
    let plaintext_len = opening_key
        .open_in_place(nonce, aead::Aad::empty(), &mut buf)
        .map_err(|_| CryptoError::DecryptFailed)?
        .len();
    buf.truncate(plaintext_len);
    Ok(buf)
}

fn generate_nonce() -> Result<[u8; NONCE_SIZE]> {
    let rng = SystemRandom::new();
    let mut nonce = [0u8; NONCE_SIZE];
    rng.fill(&mut nonce).map_err(|_| CryptoError::RandomError)?;
    Ok(nonce)
}

/// Password verifier hashing (bcrypt). Distinct from [`derive_key`]: this is
/// what the server stores to authenticate the user, never an input to the
/// record encryption key.
pub mod password {
    use bcrypt::{hash, verify, DEFAULT_COST};

    #[derive(Debug, thiserror::Error)]
    pub enum PasswordError {
        #[error("failed to hash password: {0}")]
        HashFailed(#[from] bcrypt::BcryptError),
    }

    /// Hashes a plaintext password with bcrypt at the library's default cost.
    pub fn hash_password(plaintext: &str) -> std::result::Result<String, PasswordError> {
        Ok(hash(plaintext, DEFAULT_COST)?)
    }

    /// Verifies `plaintext` against a stored bcrypt verifier. Returns `false`
    /// (never an error) on a malformed verifier, so callers have a single
    /// boolean branch regardless of why the check failed — this is what
    /// lets login present one generic error for both "no such user" and
    /// "wrong password".
    pub fn verify_password(plaintext: &str, verifier: &str) -> bool {
        verify(plaintext, verifier).unwrap_or(false)
    }

    /// A syntactically valid bcrypt verifier that no real password will ever
    /// match. Used so login can run the same (slow) comparison work for an
    /// unknown email as for a known one, masking account existence on a
    /// timing channel.
    pub fn dummy_verifier() -> &'static str {
        "$2b$12$CwTycUXWue0Thq9StjUM0uJ8i8gGkWYzkR8e/pYqFWXV6FJxT6t0e"
    }
}
