//! Persistent store for keepr: users and their encrypted records.
//!
//! Backed by SQLite via `rusqlite`: a single `Connection` behind a `Mutex`,
//! shared via `Arc` across the async runtime and dispatched through
//! `spawn_blocking` at the call sites that use it (see `controller.rs`).
//!
//! Every record operation is ownership-scoped: callers pass an explicit
//! identity, and every query includes `owner = ?` in its `WHERE` clause.
//! There is no operation that reads or writes a record without one.

use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("duplicate entry")]
    Duplicate,

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// A stored user row. `password_verifier` is the bcrypt hash, never the
/// plaintext password.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_verifier: String,
}

/// Fields a caller may patch on their own user row. `None` leaves the field
/// unchanged. Email is deliberately absent: the unique constraint and the
/// lack of any caller-facing path to request an email change make this a
/// closed question, not an oversight (see DESIGN.md).
#[derive(Debug, Default)]
pub struct UserPatch {
    pub username: Option<String>,
    pub password_verifier: Option<String>,
}

/// A stored, still-encrypted record row.
#[derive(Debug, Clone)]
pub struct Record {
    pub id: Uuid,
    pub owner: Uuid,
    pub name: String,
    pub record_type: String,
    pub ciphertext: Vec<u8>,
}

/// Fields a caller may patch on one of their own records. `record_type` is
/// absent: type is immutable after creation (see DESIGN.md's resolution of
/// the corresponding open question).
#[derive(Debug, Default)]
pub struct RecordPatch {
    pub name: Option<String>,
    pub ciphertext: Option<Vec<u8>>,
}

/// Owns the SQLite connection. Cheap to clone (wraps an `Arc`); every clone
/// shares the same underlying connection and mutex.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database file at `path` and applies the
    /// schema migration.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn: Arc::new(Mutex::new(conn)) };
        db.create_schema()?;
        Ok(db)
    }

    /// Opens an in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn: Arc::new(Mutex::new(conn)) };
        db.create_schema()?;
        Ok(db)
    }

    fn get_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    fn create_schema(&self) -> Result<()> {
        let conn = self.get_conn();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id               TEXT PRIMARY KEY,
                username         TEXT NOT NULL,
                email            TEXT NOT NULL UNIQUE,
                password_verifier TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS secret_data (
                id          TEXT PRIMARY KEY,
                owner       TEXT NOT NULL,
                name        TEXT NOT NULL,
                type        TEXT NOT NULL,
                ciphertext  BLOB NOT NULL,
                FOREIGN KEY (owner) REFERENCES users (id)
            );

            CREATE INDEX IF NOT EXISTS idx_secret_data_owner ON secret_data (owner);
            ",
        )?;
        Ok(())
    }

    /// Inserts a new user. Assigns `user.id` if it is nil.
    pub fn add_user(&self, mut user: User) -> Result<User> {
        if user.id.is_nil() {
            user.id = Uuid::new_v4();
        }
        let conn = self.get_conn();
        let result = conn.execute(
            "INSERT INTO users (id, username, email, password_verifier) VALUES (?1, ?2, ?3, ?4)",
            params![user.id.to_string(), user.username, user.email, user.password_verifier],
        );
        match result {
            Ok(_) => Ok(user),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(DbError::Duplicate)
            }
            Err(e) => Err(DbError::Sqlite(e)),
        }
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<User> {
        let conn = self.get_conn();
        conn.query_row(
            "SELECT id, username, email, password_verifier FROM users WHERE email = ?1",
            params![email],
            row_to_user,
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    /// Updates only the non-empty fields of `patch` on the user matching
    /// `identity_id`.
    pub fn update_user(&self, identity_id: Uuid, patch: UserPatch) -> Result<()> {
        let conn = self.get_conn();
        if let Some(username) = patch.username {
            let n = conn.execute(
                "UPDATE users SET username = ?1 WHERE id = ?2",
                params![username, identity_id.to_string()],
            )?;
            if n == 0 {
                return Err(DbError::NotFound);
            }
        }
        if let Some(verifier) = patch.password_verifier {
            let n = conn.execute(
                "UPDATE users SET password_verifier = ?1 WHERE id = ?2",
                params![verifier, identity_id.to_string()],
            )?;
            if n == 0 {
                return Err(DbError::NotFound);
            }
        }
        Ok(())
    }

    pub fn delete_user(&self, email: &str) -> Result<()> {
        let conn = self.get_conn();
        let n = conn.execute("DELETE FROM users WHERE email = ?1", params![email])?;
        if n == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Inserts `record`, forcing `record.owner = owner` regardless of what
    /// the caller set — the owner always comes from the authenticated
    /// identity, never from the record itself.
    pub fn add_record(&self, owner: Uuid, mut record: Record) -> Result<Record> {
        record.owner = owner;
        let conn = self.get_conn();
        let result = conn.execute(
            "INSERT INTO secret_data (id, owner, name, type, ciphertext) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id.to_string(),
                record.owner.to_string(),
                record.name,
                record.record_type,
                record.ciphertext,
            ],
        );
        match result {
            Ok(_) => Ok(record),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(DbError::Duplicate)
            }
            Err(e) => Err(DbError::Sqlite(e)),
        }
    }

    /// Returns every record owned by `owner`. May return an empty vector.
    pub fn list_records(&self, owner: Uuid) -> Result<Vec<Record>> {
        let conn = self.get_conn();
        let mut stmt = conn.prepare(
            "SELECT id, owner, name, type, ciphertext FROM secret_data WHERE owner = ?1",
        )?;
        let rows = stmt
            .query_map(params![owner.to_string()], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Updates only the non-empty fields of `patch` on the record matching
    /// `id` AND `owner`. A record owned by someone else is indistinguishable
    /// from a nonexistent one: both return `NotFound`. This holds even when
    /// `patch` is entirely empty — existence is checked regardless of which
    /// fields are actually patched.
    pub fn update_record(&self, owner: Uuid, id: Uuid, patch: RecordPatch) -> Result<()> {
        let conn = self.get_conn();

        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM secret_data WHERE id = ?1 AND owner = ?2",
                params![id.to_string(), owner.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(DbError::NotFound);
        }

        if let Some(name) = patch.name {
            conn.execute(
                "UPDATE secret_data SET name = ?1 WHERE id = ?2 AND owner = ?3",
                params![name, id.to_string(), owner.to_string()],
            )?;
        }
        if let Some(ciphertext) = patch.ciphertext {
            conn.execute(
                "UPDATE secret_data SET ciphertext = ?1 WHERE id = ?2 AND owner = ?3",
                params![ciphertext, id.to_string(), owner.to_string()],
            )?;
        }
        Ok(())
    }

    pub fn delete_record(&self, owner: Uuid, id: Uuid) -> Result<()> {
        let conn = self.get_conn();
        let n = conn.execute(
            "DELETE FROM secret_data WHERE id = ?1 AND owner = ?2",
            params![id.to_string(), owner.to_string()],
        )?;
        if n == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    Ok(User {
        id: Uuid::parse_str(&id_str).unwrap_or_default(),
        username: row.get(1)?,
        email: row.get(2)?,
        password_verifier: row.get(3)?,
    })
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<Record> {
    let id_str: String = row.get(0)?;
    let owner_str: String = row.get(1)?;
    Ok(Record {
        id: Uuid::parse_str(&id_str).unwrap_or_default(),
        owner: Uuid::parse_str(&owner_str).unwrap_or_default(),
        name: row.get(2)?,
        record_type: row.get(3)?,
        ciphertext: row.get(4)?,
    })
}
