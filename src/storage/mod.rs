//! Entity store for IdeaHub data.
//!
//! All persistent state (users, ideas, workspaces, collaborators, stars,
//! follows, notifications) lives in a single SQLite database. The schema
//! carries the structural invariants directly:
//!
//! - `workspaces.idea_id` is UNIQUE (one workspace per idea)
//! - `(idea_id, user_id)` is unique on collaborators
//! - stars and follows use composite primary keys, so double-inserts fail
//! - deleting an idea cascades to its workspace, collaborators, and stars
//!
//! Multi-row mutations go through [`Storage::with_transaction`], which runs
//! the closure inside an IMMEDIATE transaction: the write lock is taken at
//! BEGIN, so a check-then-insert sequence (such as the collaborator-limit
//! re-count) cannot interleave with a concurrent writer. The transaction
//! commits only when the closure returns `Ok`; any error or panic rolls the
//! whole thing back.
//!
//! The row-level helpers are free functions over `&Connection` so the
//! lifecycle operations can compose several of them inside one transaction
//! (`rusqlite::Transaction` derefs to `Connection`).

use crate::models::{
    Collaborator, CollaboratorRole, Follow, Idea, IdeaSnapshot, IdeaStatus, Notification,
    NotificationKind, Star, User, Visibility, Workspace,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Database filename within the data directory.
const DB_FILE: &str = "ideahub.db";

/// How long a writer waits for the database lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Storage manager for one IdeaHub database.
pub struct Storage {
    /// SQLite connection
    conn: Connection,
}

impl Storage {
    /// Open existing storage in the given data directory.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join(DB_FILE);
        if !db_path.exists() {
            return Err(Error::NotFound(format!(
                "no database at {}",
                db_path.display()
            )));
        }

        let conn = Connection::open(&db_path)?;
        Self::configure(&conn)?;
        Self::init_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Initialize storage in the given data directory, creating it if needed.
    pub fn init(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)?;

        let conn = Connection::open(data_dir.join(DB_FILE))?;
        Self::configure(&conn)?;
        Self::init_schema(&conn)?;

        Ok(Self { conn })
    }

    /// In-memory storage for unit tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn)?;
        Self::init_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Check if storage exists in the given data directory.
    pub fn exists(data_dir: &Path) -> bool {
        data_dir.join(DB_FILE).exists()
    }

    /// Per-connection pragmas. Foreign keys drive the delete cascades; WAL
    /// plus a busy timeout lets concurrent writers queue instead of failing
    /// immediately.
    fn configure(conn: &Connection) -> Result<()> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    /// Initialize the SQLite schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                follower_count INTEGER NOT NULL DEFAULT 0,
                following_count INTEGER NOT NULL DEFAULT 0,
                idea_count INTEGER NOT NULL DEFAULT 0,
                verified INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ideas (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                category TEXT NOT NULL,
                content TEXT,
                owner_id TEXT NOT NULL REFERENCES users(id),
                visibility TEXT NOT NULL DEFAULT 'public',
                status TEXT NOT NULL DEFAULT 'draft',
                star_count INTEGER NOT NULL DEFAULT 0,
                fork_count INTEGER NOT NULL DEFAULT 0,
                is_fork INTEGER NOT NULL DEFAULT 0,
                forked_from_id TEXT REFERENCES ideas(id) ON DELETE SET NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS workspaces (
                id TEXT PRIMARY KEY,
                idea_id TEXT NOT NULL UNIQUE REFERENCES ideas(id) ON DELETE CASCADE,
                owner_id TEXT NOT NULL REFERENCES users(id),
                content TEXT NOT NULL DEFAULT '',
                is_public INTEGER NOT NULL DEFAULT 1,
                archived INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS collaborators (
                id TEXT PRIMARY KEY,
                idea_id TEXT NOT NULL REFERENCES ideas(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id),
                role TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (idea_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS stars (
                user_id TEXT NOT NULL REFERENCES users(id),
                idea_id TEXT NOT NULL REFERENCES ideas(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                PRIMARY KEY (user_id, idea_id)
            );

            CREATE TABLE IF NOT EXISTS follows (
                follower_id TEXT NOT NULL REFERENCES users(id),
                following_id TEXT NOT NULL REFERENCES users(id),
                created_at TEXT NOT NULL,
                PRIMARY KEY (follower_id, following_id),
                CHECK (follower_id <> following_id)
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                recipient_id TEXT NOT NULL REFERENCES users(id),
                kind TEXT NOT NULL,
                message TEXT NOT NULL,
                related_user_id TEXT,
                related_idea_id TEXT,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_ideas_owner ON ideas(owner_id);
            CREATE INDEX IF NOT EXISTS idx_ideas_forked_from ON ideas(forked_from_id);
            CREATE INDEX IF NOT EXISTS idx_collaborators_idea ON collaborators(idea_id);
            CREATE INDEX IF NOT EXISTS idx_stars_idea ON stars(idea_id);
            CREATE INDEX IF NOT EXISTS idx_follows_following ON follows(following_id);
            CREATE INDEX IF NOT EXISTS idx_notifications_recipient ON notifications(recipient_id);
            "#,
        )?;
        Ok(())
    }

    /// Read-only access to the underlying connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a single IMMEDIATE transaction.
    ///
    /// Commits when `f` returns `Ok`; rolls back on `Err` or panic (the
    /// transaction rolls back on drop). IMMEDIATE takes the write lock at
    /// BEGIN, so reads done inside `f` see a state no concurrent writer can
    /// change before this transaction commits.
    pub fn with_transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    // === Read wrappers (single-statement reads need no transaction) ===

    pub fn get_user(&self, id: &str) -> Result<User> {
        get_user(&self.conn, id)
    }

    pub fn get_idea(&self, id: &str) -> Result<Idea> {
        get_idea(&self.conn, id)
    }

    pub fn get_workspace_for_idea(&self, idea_id: &str) -> Result<Workspace> {
        get_workspace_for_idea(&self.conn, idea_id)
    }

    pub fn idea_snapshot(&self, idea_id: &str) -> Result<IdeaSnapshot> {
        idea_snapshot(&self.conn, idea_id)
    }

    pub fn collaborators_for_idea(&self, idea_id: &str) -> Result<Vec<Collaborator>> {
        collaborators_for_idea(&self.conn, idea_id)
    }

    pub fn star_exists(&self, user_id: &str, idea_id: &str) -> Result<bool> {
        star_exists(&self.conn, user_id, idea_id)
    }

    pub fn follow_exists(&self, follower_id: &str, following_id: &str) -> Result<bool> {
        follow_exists(&self.conn, follower_id, following_id)
    }

    pub fn notifications_for(&self, recipient_id: &str) -> Result<Vec<Notification>> {
        notifications_for(&self.conn, recipient_id)
    }
}

// === ID generation ===

/// Generate a unique entity ID.
///
/// Format: `<prefix>-<8 hex chars>`, prefixes: `usr`, `idea`, `ws`, `col`,
/// `ntf`. The hash mixes the seed with a nanosecond timestamp.
pub fn generate_id(prefix: &str, seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(
        Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or(0)
            .to_le_bytes(),
    );
    let hash = hasher.finalize();
    let hash_hex = format!("{:x}", hash);
    format!("{}-{}", prefix, &hash_hex[..8])
}

/// Validate that an ID matches the expected format.
pub fn validate_id(id: &str, prefix: &str) -> Result<()> {
    let Some(suffix) = id.strip_prefix(&format!("{}-", prefix)) else {
        return Err(Error::InvalidId(format!(
            "ID must start with '{}-', got: {}",
            prefix, id
        )));
    };

    if suffix.len() != 8 || !suffix.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidId(format!(
            "ID suffix must be 8 hex characters, got: {}",
            suffix
        )));
    }

    Ok(())
}

// === Row mapping ===

/// Parse a stored RFC 3339 timestamp, falling back to now on corruption.
fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

const USER_COLS: &str = "id, username, email, display_name, follower_count, \
                         following_count, idea_count, verified, created_at, updated_at";

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let verified: i32 = row.get(7)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        display_name: row.get(3)?,
        follower_count: row.get(4)?,
        following_count: row.get(5)?,
        idea_count: row.get(6)?,
        verified: verified != 0,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

const IDEA_COLS: &str = "id, title, description, category, content, owner_id, visibility, \
                         status, star_count, fork_count, is_fork, forked_from_id, \
                         created_at, updated_at";

fn idea_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Idea> {
    let visibility: String = row.get(6)?;
    let status: String = row.get(7)?;
    let is_fork: i32 = row.get(10)?;
    let created_at: String = row.get(12)?;
    let updated_at: String = row.get(13)?;
    Ok(Idea {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        content: row.get(4)?,
        owner_id: row.get(5)?,
        visibility: Visibility::parse(&visibility).unwrap_or_default(),
        status: IdeaStatus::parse(&status).unwrap_or_default(),
        star_count: row.get(8)?,
        fork_count: row.get(9)?,
        is_fork: is_fork != 0,
        forked_from_id: row.get(11)?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

const WORKSPACE_COLS: &str =
    "id, idea_id, owner_id, content, is_public, archived, created_at, updated_at";

fn workspace_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Workspace> {
    let is_public: i32 = row.get(4)?;
    let archived: i32 = row.get(5)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;
    Ok(Workspace {
        id: row.get(0)?,
        idea_id: row.get(1)?,
        owner_id: row.get(2)?,
        content: row.get(3)?,
        is_public: is_public != 0,
        archived: archived != 0,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

fn collaborator_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Collaborator> {
    let role: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    Ok(Collaborator {
        id: row.get(0)?,
        idea_id: row.get(1)?,
        user_id: row.get(2)?,
        role: CollaboratorRole::parse(&role).unwrap_or(CollaboratorRole::Viewer),
        created_at: parse_ts(&created_at),
    })
}

// === Users ===

pub fn insert_user(conn: &Connection, user: &User) -> Result<()> {
    let result = conn.execute(
        r#"
        INSERT INTO users
        (id, username, email, display_name, follower_count, following_count,
         idea_count, verified, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        params![
            user.id,
            user.username,
            user.email,
            user.display_name,
            user.follower_count,
            user.following_count,
            user.idea_count,
            user.verified as i32,
            user.created_at.to_rfc3339(),
            user.updated_at.to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyExists(format!(
            "username or email already taken: {}",
            user.username
        ))),
        Err(e) => Err(e.into()),
    }
}

pub fn get_user(conn: &Connection, id: &str) -> Result<User> {
    conn.query_row(
        &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
        [id],
        user_from_row,
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("user {id}")))
}

pub fn user_exists(conn: &Connection, id: &str) -> Result<bool> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM users WHERE id = ?1", [id], |row| {
        row.get(0)
    })?;
    Ok(count > 0)
}

/// Shift a user's denormalized counters. Call only from the transaction
/// that mutates the corresponding rows.
pub fn adjust_user_counters(
    conn: &Connection,
    user_id: &str,
    follower_delta: i64,
    following_delta: i64,
    idea_delta: i64,
) -> Result<()> {
    let changed = conn.execute(
        r#"
        UPDATE users
        SET follower_count = MAX(follower_count + ?2, 0),
            following_count = MAX(following_count + ?3, 0),
            idea_count = MAX(idea_count + ?4, 0),
            updated_at = ?5
        WHERE id = ?1
        "#,
        params![
            user_id,
            follower_delta,
            following_delta,
            idea_delta,
            Utc::now().to_rfc3339(),
        ],
    )?;
    if changed == 0 {
        return Err(Error::NotFound(format!("user {user_id}")));
    }
    Ok(())
}

// === Ideas ===

pub fn insert_idea(conn: &Connection, idea: &Idea) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO ideas
        (id, title, description, category, content, owner_id, visibility, status,
         star_count, fork_count, is_fork, forked_from_id, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
        params![
            idea.id,
            idea.title,
            idea.description,
            idea.category,
            idea.content,
            idea.owner_id,
            idea.visibility.to_string(),
            idea.status.to_string(),
            idea.star_count,
            idea.fork_count,
            idea.is_fork as i32,
            idea.forked_from_id,
            idea.created_at.to_rfc3339(),
            idea.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_idea(conn: &Connection, id: &str) -> Result<Idea> {
    conn.query_row(
        &format!("SELECT {IDEA_COLS} FROM ideas WHERE id = ?1"),
        [id],
        idea_from_row,
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("idea {id}")))
}

pub fn update_idea(conn: &Connection, idea: &Idea) -> Result<()> {
    let changed = conn.execute(
        r#"
        UPDATE ideas
        SET title = ?2, description = ?3, category = ?4, content = ?5,
            visibility = ?6, status = ?7, updated_at = ?8
        WHERE id = ?1
        "#,
        params![
            idea.id,
            idea.title,
            idea.description,
            idea.category,
            idea.content,
            idea.visibility.to_string(),
            idea.status.to_string(),
            idea.updated_at.to_rfc3339(),
        ],
    )?;
    if changed == 0 {
        return Err(Error::NotFound(format!("idea {}", idea.id)));
    }
    Ok(())
}

/// Delete an idea row. Workspace, collaborator, and star rows go with it
/// via the ON DELETE CASCADE foreign keys; forks survive with their
/// forked_from_id set to NULL.
pub fn delete_idea(conn: &Connection, id: &str) -> Result<()> {
    let changed = conn.execute("DELETE FROM ideas WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(Error::NotFound(format!("idea {id}")));
    }
    Ok(())
}

pub fn adjust_star_count(conn: &Connection, idea_id: &str, delta: i64) -> Result<()> {
    conn.execute(
        "UPDATE ideas SET star_count = MAX(star_count + ?2, 0) WHERE id = ?1",
        params![idea_id, delta],
    )?;
    Ok(())
}

pub fn adjust_fork_count(conn: &Connection, idea_id: &str, delta: i64) -> Result<()> {
    conn.execute(
        "UPDATE ideas SET fork_count = MAX(fork_count + ?2, 0) WHERE id = ?1",
        params![idea_id, delta],
    )?;
    Ok(())
}

/// Load an idea with its collaborator rows for permission decisions.
pub fn idea_snapshot(conn: &Connection, idea_id: &str) -> Result<IdeaSnapshot> {
    let idea = get_idea(conn, idea_id)?;
    let collaborators = collaborators_for_idea(conn, idea_id)?;
    Ok(IdeaSnapshot { idea, collaborators })
}

// === Workspaces ===

pub fn insert_workspace(conn: &Connection, workspace: &Workspace) -> Result<()> {
    let result = conn.execute(
        r#"
        INSERT INTO workspaces
        (id, idea_id, owner_id, content, is_public, archived, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            workspace.id,
            workspace.idea_id,
            workspace.owner_id,
            workspace.content,
            workspace.is_public as i32,
            workspace.archived as i32,
            workspace.created_at.to_rfc3339(),
            workspace.updated_at.to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_constraint_violation(&e) => Err(Error::Conflict(format!(
            "idea {} already has a workspace",
            workspace.idea_id
        ))),
        Err(e) => Err(e.into()),
    }
}

pub fn get_workspace_for_idea(conn: &Connection, idea_id: &str) -> Result<Workspace> {
    conn.query_row(
        &format!("SELECT {WORKSPACE_COLS} FROM workspaces WHERE idea_id = ?1"),
        [idea_id],
        workspace_from_row,
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("workspace for idea {idea_id}")))
}

pub fn update_workspace(conn: &Connection, workspace: &Workspace) -> Result<()> {
    let changed = conn.execute(
        r#"
        UPDATE workspaces
        SET content = ?2, is_public = ?3, archived = ?4, updated_at = ?5
        WHERE id = ?1
        "#,
        params![
            workspace.id,
            workspace.content,
            workspace.is_public as i32,
            workspace.archived as i32,
            workspace.updated_at.to_rfc3339(),
        ],
    )?;
    if changed == 0 {
        return Err(Error::NotFound(format!("workspace {}", workspace.id)));
    }
    Ok(())
}

// === Collaborators ===

pub fn collaborators_for_idea(conn: &Connection, idea_id: &str) -> Result<Vec<Collaborator>> {
    let mut stmt = conn.prepare(
        "SELECT id, idea_id, user_id, role, created_at FROM collaborators \
         WHERE idea_id = ?1 ORDER BY created_at",
    )?;
    let rows = stmt.query_map([idea_id], collaborator_from_row)?;

    let mut collaborators = Vec::new();
    for row in rows {
        collaborators.push(row?);
    }
    Ok(collaborators)
}

pub fn collaborator_count(conn: &Connection, idea_id: &str) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM collaborators WHERE idea_id = ?1",
        [idea_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

pub fn insert_collaborator(conn: &Connection, collaborator: &Collaborator) -> Result<()> {
    let result = conn.execute(
        r#"
        INSERT INTO collaborators (id, idea_id, user_id, role, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            collaborator.id,
            collaborator.idea_id,
            collaborator.user_id,
            collaborator.role.to_string(),
            collaborator.created_at.to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyExists(format!(
            "user {} already collaborates on idea {}",
            collaborator.user_id, collaborator.idea_id
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Returns the number of rows removed (0 when the pair was absent).
pub fn delete_collaborator(conn: &Connection, idea_id: &str, user_id: &str) -> Result<usize> {
    let changed = conn.execute(
        "DELETE FROM collaborators WHERE idea_id = ?1 AND user_id = ?2",
        params![idea_id, user_id],
    )?;
    Ok(changed)
}

// === Stars ===

pub fn star_exists(conn: &Connection, user_id: &str, idea_id: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM stars WHERE user_id = ?1 AND idea_id = ?2",
        params![user_id, idea_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn insert_star(conn: &Connection, star: &Star) -> Result<()> {
    let result = conn.execute(
        "INSERT INTO stars (user_id, idea_id, created_at) VALUES (?1, ?2, ?3)",
        params![star.user_id, star.idea_id, star.created_at.to_rfc3339()],
    );

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyExists(format!(
            "user {} already starred idea {}",
            star.user_id, star.idea_id
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Returns the number of rows removed (0 when no star existed).
pub fn delete_star(conn: &Connection, user_id: &str, idea_id: &str) -> Result<usize> {
    let changed = conn.execute(
        "DELETE FROM stars WHERE user_id = ?1 AND idea_id = ?2",
        params![user_id, idea_id],
    )?;
    Ok(changed)
}

pub fn count_stars(conn: &Connection, idea_id: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM stars WHERE idea_id = ?1",
        [idea_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// === Follows ===

pub fn follow_exists(conn: &Connection, follower_id: &str, following_id: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM follows WHERE follower_id = ?1 AND following_id = ?2",
        params![follower_id, following_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn insert_follow(conn: &Connection, follow: &Follow) -> Result<()> {
    let result = conn.execute(
        "INSERT INTO follows (follower_id, following_id, created_at) VALUES (?1, ?2, ?3)",
        params![
            follow.follower_id,
            follow.following_id,
            follow.created_at.to_rfc3339()
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyExists(format!(
            "user {} already follows {}",
            follow.follower_id, follow.following_id
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Returns the number of rows removed (0 when the pair was absent).
pub fn delete_follow(conn: &Connection, follower_id: &str, following_id: &str) -> Result<usize> {
    let changed = conn.execute(
        "DELETE FROM follows WHERE follower_id = ?1 AND following_id = ?2",
        params![follower_id, following_id],
    )?;
    Ok(changed)
}

// === Notifications ===

pub fn insert_notification(conn: &Connection, notification: &Notification) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO notifications
        (id, recipient_id, kind, message, related_user_id, related_idea_id, is_read, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            notification.id,
            notification.recipient_id,
            notification.kind.to_string(),
            notification.message,
            notification.related_user_id,
            notification.related_idea_id,
            notification.is_read as i32,
            notification.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn notifications_for(conn: &Connection, recipient_id: &str) -> Result<Vec<Notification>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, recipient_id, kind, message, related_user_id, related_idea_id,
               is_read, created_at
        FROM notifications
        WHERE recipient_id = ?1
        ORDER BY created_at DESC
        "#,
    )?;

    let rows = stmt.query_map([recipient_id], |row| {
        let kind: String = row.get(2)?;
        let is_read: i32 = row.get(6)?;
        let created_at: String = row.get(7)?;
        Ok(Notification {
            id: row.get(0)?,
            recipient_id: row.get(1)?,
            kind: NotificationKind::parse(&kind).unwrap_or(NotificationKind::Followed),
            message: row.get(3)?,
            related_user_id: row.get(4)?,
            related_idea_id: row.get(5)?,
            is_read: is_read != 0,
            created_at: parse_ts(&created_at),
        })
    })?;

    let mut notifications = Vec::new();
    for row in rows {
        notifications.push(row?);
    }
    Ok(notifications)
}

/// Check whether a rusqlite error is a constraint hit (UNIQUE or CHECK), so
/// the caller can surface it as a domain error instead of a database error.
fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;
    use tempfile::TempDir;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().unwrap()
    }

    fn test_idea(id: &str, owner_id: &str) -> Idea {
        let now = Utc::now();
        Idea {
            id: id.to_string(),
            title: "Solar kettle".to_string(),
            description: "Boil water with mirrors".to_string(),
            category: "hardware".to_string(),
            content: None,
            owner_id: owner_id.to_string(),
            visibility: Visibility::Public,
            status: IdeaStatus::Draft,
            star_count: 0,
            fork_count: 0,
            is_fork: false,
            forked_from_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn test_user(id: &str, username: &str) -> User {
        User::new(
            id.to_string(),
            NewUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                display_name: username.to_string(),
            },
        )
    }

    #[test]
    fn test_generate_id_format() {
        let id = generate_id("idea", "test seed");
        assert!(id.starts_with("idea-"));
        assert_eq!(id.len(), 13); // "idea-" + 8 hex chars
        assert!(validate_id(&id, "idea").is_ok());
    }

    #[test]
    fn test_validate_id_rejects_bad_formats() {
        assert!(validate_id("usr-a1b2c3d4", "usr").is_ok());
        assert!(validate_id("idea-a1b2c3d4", "usr").is_err()); // wrong prefix
        assert!(validate_id("usr-a1b2", "usr").is_err()); // too short
        assert!(validate_id("usr-a1b2c3dg", "usr").is_err()); // non-hex
    }

    #[test]
    fn test_init_and_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let storage = Storage::init(temp_dir.path()).unwrap();
            insert_user(storage.conn(), &test_user("usr-00000001", "ada")).unwrap();
        }
        assert!(Storage::exists(temp_dir.path()));

        let storage = Storage::open(temp_dir.path()).unwrap();
        let user = storage.get_user("usr-00000001").unwrap();
        assert_eq!(user.username, "ada");
    }

    #[test]
    fn test_open_missing_fails() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            Storage::open(temp_dir.path()),
            Err(crate::Error::NotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_username_is_already_exists() {
        let storage = create_test_storage();
        insert_user(storage.conn(), &test_user("usr-00000001", "ada")).unwrap();

        let result = insert_user(storage.conn(), &test_user("usr-00000002", "ada"));
        assert!(matches!(result, Err(crate::Error::AlreadyExists(_))));
    }

    #[test]
    fn test_get_missing_idea_is_not_found() {
        let storage = create_test_storage();
        assert!(matches!(
            storage.get_idea("idea-ffffffff"),
            Err(crate::Error::NotFound(_))
        ));
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let mut storage = create_test_storage();

        let result: crate::Result<()> = storage.with_transaction(|tx| {
            insert_user(tx, &test_user("usr-00000001", "ada"))?;
            Err(crate::Error::Validation("forced".to_string()))
        });
        assert!(result.is_err());

        // The insert inside the failed transaction must not be visible.
        assert!(matches!(
            storage.get_user("usr-00000001"),
            Err(crate::Error::NotFound(_))
        ));
    }

    #[test]
    fn test_failed_transaction_leaves_no_idea_or_workspace() {
        let mut storage = create_test_storage();
        insert_user(storage.conn(), &test_user("usr-00000001", "ada")).unwrap();

        // Fail between the idea insert and the workspace insert: neither
        // row may survive, or an orphan idea would be observable.
        let result: crate::Result<()> = storage.with_transaction(|tx| {
            insert_idea(tx, &test_idea("idea-00000001", "usr-00000001"))?;
            Err(crate::Error::Validation("forced".to_string()))
        });
        assert!(result.is_err());

        assert!(matches!(
            storage.get_idea("idea-00000001"),
            Err(crate::Error::NotFound(_))
        ));
        assert!(matches!(
            storage.get_workspace_for_idea("idea-00000001"),
            Err(crate::Error::NotFound(_))
        ));
    }

    #[test]
    fn test_counter_floor_at_zero() {
        let storage = create_test_storage();
        insert_user(storage.conn(), &test_user("usr-00000001", "ada")).unwrap();

        adjust_user_counters(storage.conn(), "usr-00000001", -5, -5, -5).unwrap();
        let user = storage.get_user("usr-00000001").unwrap();
        assert_eq!(user.follower_count, 0);
        assert_eq!(user.following_count, 0);
        assert_eq!(user.idea_count, 0);
    }

    #[test]
    fn test_self_follow_rejected_by_check_constraint() {
        let storage = create_test_storage();
        insert_user(storage.conn(), &test_user("usr-00000001", "ada")).unwrap();

        let follow = Follow {
            follower_id: "usr-00000001".to_string(),
            following_id: "usr-00000001".to_string(),
            created_at: Utc::now(),
        };
        // Lifecycle rejects self-follows before reaching the store; the CHECK
        // constraint is the backstop.
        assert!(insert_follow(storage.conn(), &follow).is_err());
    }
}
