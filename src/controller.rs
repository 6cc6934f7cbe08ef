//! The authenticated service surface: Register, Login, AddNote, UpdateNote,
//! DeleteNote, GetNotes.
//!
//! `KeeprService` implements both generated tonic traits. Register and Login
//! are served unauthenticated (see `interceptor.rs` for how that exemption
//! is wired at the transport level); the Note methods all resolve the
//! caller's identity from the request extensions the interceptor attached,
//! never from anything in the request body.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::auth::{AuthError, TokenService, TokenSubject};
use crate::crypto::password;
use crate::db::{Database, DbError, Record, RecordPatch, User};
use crate::interceptor::CallerIdentity;
use crate::proto::note_services_server::NoteServices;
use crate::proto::user_services_server::UserServices;
use crate::proto::{Empty, JwtToken, Note, NoteList, NoteRequest, User as WireUser};

pub struct KeeprService {
    db: Database,
    tokens: Arc<TokenService>,
}

impl KeeprService {
    pub fn new(db: Database, tokens: Arc<TokenService>) -> Self {
        Self { db, tokens }
    }

    fn now(&self) -> i64 {
        SystemTime::now().duration_since(UNIX_EPOCH).expect("clock before epoch").as_secs() as i64
    }

    fn issue_token(&self, subject: &TokenSubject) -> Result<String, Status> {
        self.tokens.issue(subject, self.now()).map_err(|err| match err {
            AuthError::SignFailed => Status::internal("failed to sign token"),
            AuthError::TokenInvalid | AuthError::TokenExpired => {
                Status::internal("failed to sign token")
            }
        })
    }

    /// Pulls the identity the auth interceptor attached to this request.
    /// Missing means the interceptor didn't run, which shouldn't happen on
    /// `NoteServices` since the interceptor is mandatory there — treated as
    /// `UNAUTHENTICATED` rather than panicking.
    fn caller_id<T>(request: &Request<T>) -> Result<Uuid, Status> {
        request
            .extensions()
            .get::<CallerIdentity>()
            .map(|identity| identity.0.id)
            .ok_or_else(|| Status::unauthenticated("missing token"))
    }
}

impl UserServices for KeeprService {
    /// Hashes the password, inserts the user, issues a token. Duplicate
    /// email maps to `ALREADY_EXISTS`; any other store failure to
    /// `INTERNAL`.
    async fn register(&self, request: Request<WireUser>) -> Result<Response<JwtToken>, Status> {
        let wire_user = request.into_inner();
        let password = wire_user.password.clone();

        let verifier = tokio::task::spawn_blocking(move || password::hash_password(&password))
            .await
            .map_err(|_| Status::internal("password hashing task panicked"))?
            .map_err(|_| Status::internal("failed to hash password"))?;

        let inserted = {
            let db = self.db.clone();
            let username = wire_user.username.clone();
            let email = wire_user.email.clone();
            tokio::task::spawn_blocking(move || {
                db.add_user(User {
                    id: Uuid::nil(),
                    username,
                    email,
                    password_verifier: verifier,
                })
            })
            .await
            .map_err(|_| Status::internal("store task panicked"))?
        };

        let user = inserted.map_err(|err| match err {
            DbError::Duplicate => Status::already_exists("email already registered"),
            DbError::NotFound => Status::internal("unexpected not-found on insert"),
            DbError::Sqlite(_) => Status::internal("store error"),
        })?;

        let token = self.issue_token(&TokenSubject {
            id: user.id,
            username: user.username,
            email: user.email,
        })?;

        Ok(Response::new(JwtToken { token }))
    }

    /// Loads the user by email, verifies the password, issues a token.
    /// Always runs the (slow) password comparison, even for an unknown
    /// email, against a dummy verifier — this keeps "no such user" and
    /// "wrong password" indistinguishable on a timing channel, and both map
    /// to the same generic `UNAUTHENTICATED`.
    async fn login(&self, request: Request<WireUser>) -> Result<Response<JwtToken>, Status> {
        let wire_user = request.into_inner();

        let lookup = {
            let db = self.db.clone();
            let email = wire_user.email.clone();
            tokio::task::spawn_blocking(move || db.get_user_by_email(&email))
                .await
                .map_err(|_| Status::internal("store task panicked"))?
        };

        let (user, verifier) = match lookup {
            Ok(user) => {
                let verifier = user.password_verifier.clone();
                (Some(user), verifier)
            }
            Err(DbError::NotFound) => (None, password::dummy_verifier().to_string()),
            Err(_) => return Err(Status::internal("store error")),
        };

        let password = wire_user.password.clone();
        let ok = tokio::task::spawn_blocking(move || password::verify_password(&password, &verifier))
            .await
            .map_err(|_| Status::internal("password verification task panicked"))?;

        let user = match (ok, user) {
            (true, Some(user)) => user,
            _ => return Err(Status::unauthenticated("invalid email or password")),
        };

        let token = self.issue_token(&TokenSubject {
            id: user.id,
            username: user.username,
            email: user.email,
        })?;

        Ok(Response::new(JwtToken { token }))
    }
}

impl NoteServices for KeeprService {
    async fn add_note(&self, request: Request<Note>) -> Result<Response<Empty>, Status> {
        let owner = Self::caller_id(&request)?;
        let note = request.into_inner();
        let id = Uuid::parse_str(&note.id).map_err(|_| Status::invalid_argument("malformed id"))?;
        if !is_known_record_type(&note.r#type) {
            return Err(Status::invalid_argument("unknown type tag"));
        }

        let db = self.db.clone();
        let record = Record { id, owner, name: note.name, record_type: note.r#type, ciphertext: note.secret_data };
        tokio::task::spawn_blocking(move || db.add_record(owner, record))
            .await
            .map_err(|_| Status::internal("store task panicked"))?
            .map_err(map_db_error)?;

        Ok(Response::new(Empty {}))
    }

    /// Patches only `name` and `ciphertext`; `type` and `owner` are never
    /// touched by an update, so a record can't change shape after creation.
    async fn update_note(&self, request: Request<Note>) -> Result<Response<Empty>, Status> {
        let owner = Self::caller_id(&request)?;
        let note = request.into_inner();
        let id = Uuid::parse_str(&note.id).map_err(|_| Status::invalid_argument("malformed id"))?;

        let patch = RecordPatch {
            name: if note.name.is_empty() { None } else { Some(note.name) },
            ciphertext: if note.secret_data.is_empty() { None } else { Some(note.secret_data) },
        };

        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.update_record(owner, id, patch))
            .await
            .map_err(|_| Status::internal("store task panicked"))?
            .map_err(map_db_error)?;

        Ok(Response::new(Empty {}))
    }

    async fn delete_note(&self, request: Request<NoteRequest>) -> Result<Response<Empty>, Status> {
        let owner = Self::caller_id(&request)?;
        let id_note = request.into_inner().id_note;
        let id = Uuid::parse_str(&id_note).map_err(|_| Status::invalid_argument("malformed id"))?;

        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.delete_record(owner, id))
            .await
            .map_err(|_| Status::internal("store task panicked"))?
            .map_err(map_db_error)?;

        Ok(Response::new(Empty {}))
    }

    async fn get_notes(&self, request: Request<NoteRequest>) -> Result<Response<NoteList>, Status> {
        let owner = Self::caller_id(&request)?;

        let db = self.db.clone();
        let records = tokio::task::spawn_blocking(move || db.list_records(owner))
            .await
            .map_err(|_| Status::internal("store task panicked"))?
            .map_err(map_db_error)?;

        let notes = records
            .into_iter()
            .map(|r| Note { id: r.id.to_string(), name: r.name, r#type: r.record_type, secret_data: r.ciphertext })
            .collect();

        Ok(Response::new(NoteList { notes }))
    }
}

/// The four wire type tags a `Note.type` may carry. Checked on `AddNote`
/// only: `UpdateNote` never touches `type` at all (see above), so there is
/// no second place an unknown tag could slip in.
fn is_known_record_type(tag: &str) -> bool {
    matches!(tag, "CARD" | "CREDENTIAL" | "TEXT" | "BINARY")
}

fn map_db_error(err: DbError) -> Status {
    match err {
        DbError::NotFound => Status::not_found("no such record"),
        DbError::Duplicate => Status::already_exists("record already exists"),
        DbError::Sqlite(_) => Status::internal("store error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenService;

    const TEST_KEY_PEM: &str = include_str!("../tests/fixtures/test_rsa_key.pem");

    fn service() -> KeeprService {
        let db = Database::open_in_memory().unwrap();
        let tokens = Arc::new(TokenService::from_pkcs1_pem(TEST_KEY_PEM).unwrap());
        KeeprService::new(db, tokens)
    }

    fn authenticated_request<T>(body: T, id: Uuid) -> Request<T> {
        let mut request = Request::new(body);
        request.extensions_mut().insert(CallerIdentity(crate::auth::UserIdentity {
            id,
            username: "alice".into(),
            email: "alice@example.com".into(),
        }));
        request
    }

    #[tokio::test]
    async fn register_then_login_yields_tokens_for_same_identity() {
        let service = service();

        let register_response = service
            .register(Request::new(WireUser {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password: "hunter222".into(),
            }))
            .await
            .unwrap();

        let login_response = service
            .login(Request::new(WireUser {
                username: String::new(),
                email: "alice@example.com".into(),
                password: "hunter222".into(),
            }))
            .await
            .unwrap();

        assert!(!register_response.into_inner().token.is_empty());
        assert!(!login_response.into_inner().token.is_empty());
    }

    #[tokio::test]
    async fn register_duplicate_email_returns_already_exists() {
        let service = service();
        let user = WireUser { username: "alice".into(), email: "alice@example.com".into(), password: "hunter222".into() };
        service.register(Request::new(user.clone())).await.unwrap();
        let err = service.register(Request::new(user)).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::AlreadyExists);
    }

    #[tokio::test]
    async fn login_wrong_password_returns_unauthenticated() {
        let service = service();
        service
            .register(Request::new(WireUser { username: "bob".into(), email: "bob@example.com".into(), password: "right-pass".into() }))
            .await
            .unwrap();

        let err = service
            .login(Request::new(WireUser { username: String::new(), email: "bob@example.com".into(), password: "wrong".into() }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unauthenticated);
    }

    #[tokio::test]
    async fn login_unknown_email_returns_same_error_as_wrong_password() {
        let service = service();
        let err = service
            .login(Request::new(WireUser { username: String::new(), email: "nobody@example.com".into(), password: "anything".into() }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unauthenticated);
    }

    #[tokio::test]
    async fn add_note_with_malformed_id_returns_invalid_argument() {
        let service = service();
        let request = authenticated_request(
            Note { id: "not-a-uuid".into(), name: "x".into(), r#type: "TEXT".into(), secret_data: vec![] },
            Uuid::new_v4(),
        );
        let err = service.add_note(request).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn add_note_with_unknown_type_tag_returns_invalid_argument() {
        let service = service();
        let request = authenticated_request(
            Note { id: Uuid::new_v4().to_string(), name: "x".into(), r#type: "SPREADSHEET".into(), secret_data: vec![] },
            Uuid::new_v4(),
        );
        let err = service.add_note(request).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn add_then_get_notes_round_trips() {
        let service = service();
        let owner = Uuid::new_v4();
        let id = Uuid::new_v4();

        service
            .add_note(authenticated_request(
                Note { id: id.to_string(), name: "r1".into(), r#type: "TEXT".into(), secret_data: vec![1, 2, 3] },
                owner,
            ))
            .await
            .unwrap();

        let notes = service
            .get_notes(authenticated_request(NoteRequest { id_note: String::new() }, owner))
            .await
            .unwrap()
            .into_inner()
            .notes;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].name, "r1");
    }

    #[tokio::test]
    async fn cross_user_delete_returns_not_found() {
        let service = service();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let id = Uuid::new_v4();

        service
            .add_note(authenticated_request(
                Note { id: id.to_string(), name: "r1".into(), r#type: "TEXT".into(), secret_data: vec![1] },
                alice,
            ))
            .await
            .unwrap();

        let err = service
            .delete_note(authenticated_request(NoteRequest { id_note: id.to_string() }, bob))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::NotFound);

        let notes = service
            .get_notes(authenticated_request(NoteRequest { id_note: String::new() }, alice))
            .await
            .unwrap()
            .into_inner()
            .notes;
        assert_eq!(notes.len(), 1);
    }

    #[tokio::test]
    async fn update_note_never_changes_type() {
        let service = service();
        let owner = Uuid::new_v4();
        let id = Uuid::new_v4();

        service
            .add_note(authenticated_request(
                Note { id: id.to_string(), name: "r1".into(), r#type: "TEXT".into(), secret_data: vec![9] },
                owner,
            ))
            .await
            .unwrap();

        service
            .update_note(authenticated_request(
                Note { id: id.to_string(), name: "renamed".into(), r#type: "CARD".into(), secret_data: vec![] },
                owner,
            ))
            .await
            .unwrap();

        let notes = service
            .get_notes(authenticated_request(NoteRequest { id_note: String::new() }, owner))
            .await
            .unwrap()
            .into_inner()
            .notes;
        assert_eq!(notes[0].name, "renamed");
        assert_eq!(notes[0].r#type, "TEXT");
        assert_eq!(notes[0].secret_data, vec![9]);
    }
}
