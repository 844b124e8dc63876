//! SQLite-backed user directory.
//!
//! Realizes the document model (`users`, `secrets`, per-user `files`) over
//! SQLite with merge-style upserts. Refresh credentials are encrypted at
//! rest with AES-256-GCM.

use super::{
    encryption, DriveRoot, EncryptedSecret, SecretRecord, UploadedFile, UserRecord,
    DEFAULT_ROOT_FOLDER_ID,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// User directory backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE users (
///     sub TEXT PRIMARY KEY,
///     email TEXT,
///     name TEXT,
///     root_folder_id TEXT NOT NULL,     -- "root" until provisioned
///     root_path TEXT NOT NULL,
///     created_at TEXT NOT NULL,         -- ISO 8601, set once
///     updated_at TEXT NOT NULL          -- ISO 8601, refreshed on upsert
/// );
/// CREATE TABLE secrets (
///     sub TEXT PRIMARY KEY,
///     ciphertext TEXT NOT NULL,         -- Hex, AES-256-GCM
///     iv TEXT NOT NULL,                 -- Hex nonce
///     tag TEXT NOT NULL,                -- Hex authentication tag
///     updated_at TEXT NOT NULL
/// );
/// CREATE TABLE files (
///     user_sub TEXT NOT NULL,
///     file_id TEXT NOT NULL,            -- Provider-assigned id
///     web_view_link TEXT,
///     file_path TEXT NOT NULL,
///     file_name TEXT NOT NULL,
///     created_at TEXT NOT NULL,
///     PRIMARY KEY (user_sub, file_id)
/// );
/// ```
///
/// # Thread Safety
/// - Connection is wrapped in Mutex for safe concurrent access
/// - SQLite itself is thread-safe with serialized mode
pub struct DirectoryStore {
    conn: Mutex<Connection>,
    encryption_key: Vec<u8>,
}

impl DirectoryStore {
    /// Creates or opens a directory store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (`:memory:` in tests)
    /// * `encryption_key` - Base64-encoded 32-byte master key
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let key_bytes =
            encryption::validate_key(encryption_key).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open database")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                sub TEXT PRIMARY KEY,
                email TEXT,
                name TEXT,
                root_folder_id TEXT NOT NULL,
                root_path TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS secrets (
                sub TEXT PRIMARY KEY,
                ciphertext TEXT NOT NULL,
                iv TEXT NOT NULL,
                tag TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS files (
                user_sub TEXT NOT NULL,
                file_id TEXT NOT NULL,
                web_view_link TEXT,
                file_path TEXT NOT NULL,
                file_name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (user_sub, file_id)
            );
            CREATE INDEX IF NOT EXISTS idx_files_user ON files(user_sub);
            "#,
        )
        .context("Failed to create directory schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
            encryption_key: key_bytes,
        })
    }

    /// Upserts a user's profile fields.
    ///
    /// Email and name are overwritten on every call. The storage root and
    /// `created_at` are untouched for an existing record; a new record starts
    /// with the `"root"` sentinel.
    pub fn upsert_user(&self, sub: &str, email: Option<&str>, name: Option<&str>) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        self.conn
            .lock()
            .unwrap()
            .execute(
                r#"
                INSERT INTO users (sub, email, name, root_folder_id, root_path, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                ON CONFLICT(sub) DO UPDATE SET
                    email = excluded.email,
                    name = excluded.name,
                    updated_at = excluded.updated_at
                "#,
                params![
                    sub,
                    email,
                    name,
                    DEFAULT_ROOT_FOLDER_ID,
                    super::DEFAULT_ROOT_PATH,
                    now,
                ],
            )
            .context("Failed to upsert user")?;

        Ok(())
    }

    /// Records a freshly provisioned storage root, only while the user's
    /// root is still the sentinel.
    ///
    /// The conditional write bounds the two-device sign-in race: the losing
    /// claim returns `Ok(false)` and its folder is simply orphaned, an
    /// already-assigned root is never overwritten.
    pub fn claim_drive_root(&self, sub: &str, folder_id: &str, path: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();

        let rows_affected = self
            .conn
            .lock()
            .unwrap()
            .execute(
                r#"
                UPDATE users
                SET root_folder_id = ?2, root_path = ?3, updated_at = ?4
                WHERE sub = ?1 AND root_folder_id = ?5
                "#,
                params![sub, folder_id, path, now, DEFAULT_ROOT_FOLDER_ID],
            )
            .context("Failed to claim storage root")?;

        Ok(rows_affected > 0)
    }

    /// Retrieves a user record.
    pub fn get_user(&self, sub: &str) -> Result<Option<UserRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                r#"
                SELECT sub, email, name, root_folder_id, root_path, created_at, updated_at
                FROM users WHERE sub = ?1
                "#,
                params![sub],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query user")?;

        let Some((sub, email, name, folder_id, path, created_at, updated_at)) = record else {
            return Ok(None);
        };

        Ok(Some(UserRecord {
            sub,
            email,
            name,
            drive: DriveRoot { folder_id, path },
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        }))
    }

    /// Stores a refresh credential, encrypting it first.
    ///
    /// If a secret already exists for the user, it is replaced (upsert).
    pub fn upsert_secret(&self, sub: &str, refresh_token: &str) -> Result<()> {
        let secret = encryption::encrypt(refresh_token, &self.encryption_key)
            .context("Failed to encrypt refresh credential")?;

        let now = Utc::now().to_rfc3339();

        self.conn
            .lock()
            .unwrap()
            .execute(
                r#"
                INSERT INTO secrets (sub, ciphertext, iv, tag, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(sub) DO UPDATE SET
                    ciphertext = excluded.ciphertext,
                    iv = excluded.iv,
                    tag = excluded.tag,
                    updated_at = excluded.updated_at
                "#,
                params![sub, secret.ciphertext, secret.iv, secret.tag, now],
            )
            .context("Failed to store secret")?;

        Ok(())
    }

    /// Retrieves and decrypts a user's refresh credential.
    ///
    /// # Returns
    /// * `Ok(Some(String))` - Credential found and decrypted
    /// * `Ok(None)` - No credential has ever been issued for this user
    /// * `Err` - If decryption fails (tamper or wrong key; fatal)
    pub fn get_secret(&self, sub: &str) -> Result<Option<String>> {
        let Some(record) = self.get_secret_record(sub)? else {
            return Ok(None);
        };

        let plaintext = encryption::decrypt_secret(&record.secret, &self.encryption_key)
            .context("Failed to decrypt refresh credential")?;

        Ok(Some(plaintext))
    }

    /// Retrieves a secret record in its stored (encrypted) form.
    pub fn get_secret_record(&self, sub: &str) -> Result<Option<SecretRecord>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT ciphertext, iv, tag, updated_at FROM secrets WHERE sub = ?1",
                params![sub],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query secret")?;

        let Some((ciphertext, iv, tag, updated_at)) = row else {
            return Ok(None);
        };

        Ok(Some(SecretRecord {
            secret: EncryptedSecret {
                ciphertext,
                iv,
                tag,
            },
            updated_at: parse_timestamp(&updated_at)?,
        }))
    }

    /// Records an uploaded file under the owning user.
    ///
    /// Called exactly once per upload, after the provider confirmed the file;
    /// records are never mutated or deleted by this core.
    pub fn record_file(&self, sub: &str, file: &UploadedFile) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        self.conn
            .lock()
            .unwrap()
            .execute(
                r#"
                INSERT INTO files (user_sub, file_id, web_view_link, file_path, file_name, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![sub, file.id, file.web_view_link, file.path, file.file_name, now],
            )
            .context("Failed to record uploaded file")?;

        Ok(())
    }

    /// Lists a user's uploaded-file records, oldest first.
    pub fn list_files(&self, sub: &str) -> Result<Vec<UploadedFile>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                r#"
                SELECT file_id, web_view_link, file_path, file_name
                FROM files WHERE user_sub = ?1
                ORDER BY created_at, file_id
                "#,
            )
            .context("Failed to prepare query")?;

        let files = stmt
            .query_map(params![sub], |row| {
                Ok(UploadedFile {
                    id: row.get(0)?,
                    web_view_link: row.get(1)?,
                    path: row.get(2)?,
                    file_name: row.get(3)?,
                })
            })
            .context("Failed to execute query")?
            .collect::<Result<Vec<UploadedFile>, _>>()
            .context("Failed to read results")?;

        Ok(files)
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .context("Failed to parse stored timestamp")?
        .with_timezone(&Utc))
}
