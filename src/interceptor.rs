//! Auth middleware: extracts the bearer token, verifies it, and attaches the
//! resulting identity to the call's extensions before the handler runs.
//!
//! tonic's unary `Interceptor` runs per-service, not per-method, and cannot
//! see the fully-qualified method name the way the original's Go middleware
//! string-matches against `FullMethod`. Register and Login are therefore
//! served from an entirely separate tonic service (`UserServicesServer`)
//! that never has this interceptor attached, while every `NoteServicesServer`
//! call goes through it — same exemption, expressed as a type-level split
//! instead of a runtime string comparison.

use tonic::{service::Interceptor, Request, Status};

use crate::auth::{AuthError, TokenService, UserIdentity};

/// Wraps a [`TokenService`] as a tonic interceptor. Cheap to clone (the
/// token service itself is an `Arc` internally held by the caller).
#[derive(Clone)]
pub struct AuthInterceptor {
    tokens: std::sync::Arc<TokenService>,
}

impl AuthInterceptor {
    pub fn new(tokens: std::sync::Arc<TokenService>) -> Self {
        Self { tokens }
    }
}

impl Interceptor for AuthInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let token = request
            .metadata()
            .get("token")
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| Status::unauthenticated("missing token"))?
            .to_string();

        let now = chrono::Utc::now().timestamp();
        let identity = self.tokens.verify(&token, now).map_err(|err| match err {
            AuthError::TokenExpired => Status::unauthenticated("invalid token"),
            AuthError::TokenInvalid | AuthError::SignFailed => {
                Status::unauthenticated("invalid token")
            }
        })?;

        request.extensions_mut().insert(CallerIdentity(identity));
        Ok(request)
    }
}

/// The verified caller identity, attached to a request's extensions by
/// [`AuthInterceptor`]. A dedicated wrapper type rather than a bare
/// `UserIdentity` or stringly-typed key, so pulling it out of extensions is
/// a compile-time-checked operation.
#[derive(Clone)]
pub struct CallerIdentity(pub UserIdentity);
