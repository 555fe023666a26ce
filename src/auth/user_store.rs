//! User Storage
//! Mission: Store accounts with bcrypt password hashes in SQLite

use crate::auth::models::User;
use crate::models::Role;
use anyhow::{Context, Result};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_ADMIN_EMAIL: &str = "admin@stakebook.local";
const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

/// Registration outcome that is the caller's fault rather than ours.
#[derive(Debug, PartialEq, Eq)]
pub enum Registration {
    Created(Uuid),
    EmailTaken,
}

/// User storage with SQLite backend
pub struct UserStore {
    db_path: String,
    bcrypt_cost: u32,
}

impl UserStore {
    /// Create a new user store and initialize database
    pub fn new(db_path: &str) -> Result<Self> {
        Self::with_cost(db_path, DEFAULT_COST)
    }

    /// Same as `new` with an explicit bcrypt work factor.
    pub fn with_cost(db_path: &str, bcrypt_cost: u32) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
            bcrypt_cost,
        };
        store.init_db()?;
        Ok(store)
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .with_context(|| format!("Failed to open user database at {}", self.db_path))
    }

    fn init_db(&self) -> Result<()> {
        let conn = self.open()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        self.create_default_admin(&conn)?;
        Ok(())
    }

    fn create_default_admin(&self, conn: &Connection) -> Result<()> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE role = ?1",
                params![Role::Admin],
                |row| row.get(0),
            )
            .context("Failed to check for admin users")?;

        if count == 0 {
            let admin = self.new_user(DEFAULT_ADMIN_EMAIL, DEFAULT_ADMIN_PASSWORD, Role::Admin)?;
            insert_user(conn, &admin).context("Failed to insert admin user")?;

            info!(email = DEFAULT_ADMIN_EMAIL, "Default admin user created");
            warn!("Default admin password in use, change it before exposing the service");
        }

        Ok(())
    }

    fn new_user(&self, email: &str, password: &str, role: Role) -> Result<User> {
        let password_hash = hash(password, self.bcrypt_cost).context("Failed to hash password")?;
        Ok(User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash,
            role,
            created_at: Utc::now(),
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.open()?;
        let user = conn
            .query_row(
                "SELECT id, email, password_hash, role, created_at FROM users WHERE email = ?1",
                params![email.to_lowercase()],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Returns the user only if the password matches.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>> {
        match self.get_user_by_email(email)? {
            Some(user) => {
                let valid =
                    verify(password, &user.password_hash).context("Failed to verify password")?;
                Ok(valid.then_some(user))
            }
            None => Ok(None),
        }
    }

    /// Self-service registration always yields the `user` role.
    pub fn register(&self, email: &str, password: &str) -> Result<Registration> {
        let user = self.new_user(&email.to_lowercase(), password, Role::User)?;
        let conn = self.open()?;

        match insert_user(&conn, &user) {
            Ok(()) => {
                info!(user_id = %user.id, "User registered");
                Ok(Registration::Created(user.id))
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Ok(Registration::EmailTaken)
            }
            Err(e) => Err(e).context("Failed to insert user"),
        }
    }
}

fn insert_user(conn: &Connection, user: &User) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO users (id, email, password_hash, role, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user.id.to_string(),
            user.email,
            user.password_hash,
            user.role,
            user.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let id: String = row.get(0)?;
    let created_at: String = row.get(4)?;
    Ok(User {
        id: Uuid::parse_str(&id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        role: row.get(3)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
            })?,
    })
}
