//! Client session: holds the bearer token and derived key, and mediates
//! every record operation through the generated gRPC client.
//!
//! Mirrors the original's `ui_service.go`: a local cache of records keyed by
//! id, register/login computing the symmetric key from credentials, and
//! add-or-update dispatching to `AddNote` or `UpdateNote` depending on
//! whether the id is already cached.

use std::collections::HashMap;

use tonic::metadata::MetadataValue;
use tonic::transport::Channel;
use tonic::Request;
use uuid::Uuid;

use crate::crypto;
use crate::proto::note_services_client::NoteServicesClient;
use crate::proto::user_services_client::UserServicesClient;
use crate::proto::{Note, NoteRequest, User};
use crate::typed_record::TypedRecord;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("server error: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to encrypt record: {0}")]
    Crypto(#[from] crypto::CryptoError),

    #[error("malformed id returned by server: {0}")]
    MalformedId(#[from] uuid::Error),

    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// The session's authentication state. `Expired` is entered lazily: the
/// session only learns a token expired when the server rejects a call with
/// `UNAUTHENTICATED`.
enum State {
    Anonymous,
    Authenticated { key: [u8; crypto::KEY_SIZE], token: String },
    Expired,
}

pub struct ClientSession {
    state: State,
    cache: HashMap<Uuid, TypedRecord>,
    user_client: UserServicesClient<Channel>,
    note_client: NoteServicesClient<Channel>,
}

impl ClientSession {
    pub async fn connect(server_addr: &str) -> Result<Self, SessionError> {
        let channel = Channel::from_shared(server_addr.to_string())
            .map_err(|e| SessionError::Transport(tonic::transport::Error::from(e)))?
            .connect()
            .await?;
        Ok(Self {
            state: State::Anonymous,
            cache: HashMap::new(),
            user_client: UserServicesClient::new(channel.clone()),
            note_client: NoteServicesClient::new(channel),
        })
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, State::Authenticated { .. })
    }

    /// Registers a new account, deriving `K` locally and storing the
    /// returned token. `K` itself is never sent to or received from the
    /// server.
    pub async fn register(
        &mut self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<(), SessionError> {
        let response = self
            .user_client
            .register(Request::new(User {
                username: username.to_string(),
                email: email.to_string(),
                password: password.to_string(),
            }))
            .await?;
        self.enter_authenticated(email, password, response.into_inner().token);
        Ok(())
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<(), SessionError> {
        let response = self
            .user_client
            .login(Request::new(User {
                username: String::new(),
                email: email.to_string(),
                password: password.to_string(),
            }))
            .await?;
        self.enter_authenticated(email, password, response.into_inner().token);
        Ok(())
    }

    fn enter_authenticated(&mut self, email: &str, password: &str, token: String) {
        let key = crypto::derive_key(email, password);
        self.state = State::Authenticated { key, token };
        self.cache.clear();
    }

    /// Serializes, encrypts, and sends `record`. Dispatches to `AddNote` if
    /// the record's id is not yet cached, `UpdateNote` otherwise. On
    /// success, updates the local cache.
    pub async fn add_or_update(&mut self, record: TypedRecord) -> Result<(), SessionError> {
        let (key, token) = self.require_authenticated()?;
        let plaintext = record.to_bytes()?;
        let ciphertext = crypto::encrypt(&key, &plaintext)?;

        let header = record.header();
        let note = Note {
            id: header.id.to_string(),
            name: header.name.clone(),
            r#type: record.type_tag().to_string(),
            secret_data: ciphertext,
        };

        let is_update = self.cache.contains_key(&header.id);
        let mut request = Request::new(note);
        attach_token(&mut request, &token);

        let result = if is_update {
            self.note_client.update_note(request).await
        } else {
            self.note_client.add_note(request).await
        };
        result.map_err(|status| self.mark_expired_on_unauthenticated(status))?;

        self.cache.insert(header.id, record);
        Ok(())
    }

    /// Fetches every record from the server, decrypting and parsing each.
    /// Entries that fail to decrypt or parse are skipped rather than
    /// failing the whole call.
    pub async fn load_all(&mut self) -> Result<Vec<TypedRecord>, SessionError> {
        let (key, token) = self.require_authenticated()?;
        let mut request = Request::new(NoteRequest { id_note: String::new() });
        attach_token(&mut request, &token);

        let response = self
            .note_client
            .get_notes(request)
            .await
            .map_err(|status| self.mark_expired_on_unauthenticated(status))?;
        let mut records = Vec::new();
        self.cache.clear();

        for note in response.into_inner().notes {
            let plaintext = match crypto::decrypt(&key, &note.secret_data) {
                Ok(p) => p,
                Err(_) => continue,
            };
            let record = match TypedRecord::from_bytes(&plaintext) {
                Ok(r) => r,
                Err(_) => continue,
            };
            self.cache.insert(record.header().id, record.clone());
            records.push(record);
        }

        Ok(records)
    }

    pub async fn delete(&mut self, id: Uuid) -> Result<(), SessionError> {
        let (_, token) = self.require_authenticated()?;
        let mut request = Request::new(NoteRequest { id_note: id.to_string() });
        attach_token(&mut request, &token);
        self.note_client
            .delete_note(request)
            .await
            .map_err(|status| self.mark_expired_on_unauthenticated(status))?;
        self.cache.remove(&id);
        Ok(())
    }

    /// Marks the session expired after the server rejects a call with
    /// `UNAUTHENTICATED`, forcing a subsequent operation to re-authenticate.
    pub fn mark_expired(&mut self) {
        self.state = State::Expired;
    }

    /// Transitions to `Expired` when `status` is `UNAUTHENTICATED` — the
    /// server-observable signal that the held token no longer verifies —
    /// and passes the status through unchanged either way.
    fn mark_expired_on_unauthenticated(&mut self, status: tonic::Status) -> SessionError {
        if status.code() == tonic::Code::Unauthenticated {
            self.mark_expired();
        }
        SessionError::Rpc(status)
    }

    fn require_authenticated(&self) -> Result<([u8; crypto::KEY_SIZE], String), SessionError> {
        match &self.state {
            State::Authenticated { key, token } => Ok((*key, token.clone())),
            State::Anonymous | State::Expired => Err(SessionError::NotAuthenticated),
        }
    }
}

fn attach_token<T>(request: &mut Request<T>, token: &str) {
    if let Ok(value) = MetadataValue::try_from(token) {
        request.metadata_mut().insert("token", value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_authenticated_fails_when_anonymous() {
        let session = ClientSession {
            state: State::Anonymous,
            cache: HashMap::new(),
            user_client: unreachable_user_client(),
            note_client: unreachable_note_client(),
        };
        assert!(matches!(session.require_authenticated(), Err(SessionError::NotAuthenticated)));
    }

    #[test]
    fn require_authenticated_fails_when_expired() {
        let session = ClientSession {
            state: State::Expired,
            cache: HashMap::new(),
            user_client: unreachable_user_client(),
            note_client: unreachable_note_client(),
        };
        assert!(matches!(session.require_authenticated(), Err(SessionError::NotAuthenticated)));
    }

    #[test]
    fn require_authenticated_succeeds_when_authenticated() {
        let session = ClientSession {
            state: State::Authenticated { key: [0u8; crypto::KEY_SIZE], token: "tok".into() },
            cache: HashMap::new(),
            user_client: unreachable_user_client(),
            note_client: unreachable_note_client(),
        };
        assert!(session.require_authenticated().is_ok());
    }

    #[test]
    fn unauthenticated_status_transitions_session_to_expired() {
        let mut session = ClientSession {
            state: State::Authenticated { key: [0u8; crypto::KEY_SIZE], token: "tok".into() },
            cache: HashMap::new(),
            user_client: unreachable_user_client(),
            note_client: unreachable_note_client(),
        };
        session.mark_expired_on_unauthenticated(tonic::Status::unauthenticated("invalid token"));
        assert!(matches!(session.require_authenticated(), Err(SessionError::NotAuthenticated)));
    }

    #[test]
    fn other_status_codes_do_not_expire_the_session() {
        let mut session = ClientSession {
            state: State::Authenticated { key: [0u8; crypto::KEY_SIZE], token: "tok".into() },
            cache: HashMap::new(),
            user_client: unreachable_user_client(),
            note_client: unreachable_note_client(),
        };
        session.mark_expired_on_unauthenticated(tonic::Status::not_found("no such record"));
        assert!(session.require_authenticated().is_ok());
    }

    // Construction only, never invoked: these clients exist solely so the
    // state-machine tests above can build a `ClientSession` without a live
    // connection.
    fn unreachable_user_client() -> UserServicesClient<Channel> {
        UserServicesClient::new(Channel::from_static("http://localhost:1").connect_lazy())
    }

    fn unreachable_note_client() -> NoteServicesClient<Channel> {
        NoteServicesClient::new(Channel::from_static("http://localhost:1").connect_lazy())
    }
}
