//! keepr: a client/server secrets manager with client-side envelope encryption.

// Cryptography: AEAD + key derivation + password hashing.
pub mod crypto;

// Token service: RS256 JWT issuance/verification.
pub mod auth;

// Persistent store: users and their encrypted records.
pub mod db;

// Auth middleware: attaches a verified identity to each call.
pub mod interceptor;

// The authenticated RPC surface.
pub mod controller;

// Plaintext, structured record shapes (client-side, pre-encryption).
pub mod typed_record;

// Client-side session state machine.
pub mod session;

// Config file + CLI flag merging for both binaries.
pub mod config;

// Generated from proto/keepr.proto by build.rs.
pub mod proto {
    tonic::include_proto!("keepr");
}
