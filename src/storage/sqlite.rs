// Copyright PingCAP Inc. 2025.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; version 2 of the License.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! SQLite storage engine
//!
//! Owns a single `rusqlite::Connection`. The connection is `Send` but not
//! `Sync`, which is exactly the contract the dispatcher provides: one owner
//! thread, one statement at a time. Multi-statement writes run inside a
//! transaction so a failed call leaves no partial rows behind.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use uuid::Uuid;

use crate::storage::common::{
    escape_like, slugify, validate_body, validate_password, validate_username,
};
use crate::storage::model::{Channel, Page, Post, User};
use crate::storage::password::hash_password;
use crate::storage::{StorageEngine, StorageError};

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS channel (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        slug TEXT NOT NULL,
        label TEXT NOT NULL,
        UNIQUE (user_id, slug)
    );
    CREATE TABLE IF NOT EXISTS post (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        uuid TEXT NOT NULL UNIQUE,
        body TEXT NOT NULL,
        posted INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS postchannel (
        post_id INTEGER NOT NULL REFERENCES post(id),
        channel_id INTEGER NOT NULL REFERENCES channel(id),
        PRIMARY KEY (post_id, channel_id)
    );
    CREATE INDEX IF NOT EXISTS post_posted_idx ON post (posted);
    CREATE INDEX IF NOT EXISTS postchannel_channel_idx ON postchannel (channel_id);
";

const POST_COLUMNS: &str = "p.id, p.uuid, p.user_id, p.body, p.posted";

/// A post row before its user and channels are attached
struct PostRow {
    id: i64,
    uuid: String,
    user_id: i64,
    body: String,
    posted: i64,
}

impl PostRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            uuid: row.get(1)?,
            user_id: row.get(2)?,
            body: row.get(3)?,
            posted: row.get(4)?,
        })
    }
}

pub struct SqliteEngine {
    conn: Option<Connection>,
}

impl SqliteEngine {
    /// Open (creating if needed) the database file at `path` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened or the schema cannot be applied.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path.as_ref())?;
        Self::with_connection(conn)
    }

    /// A private database that lives as long as the engine
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Some(conn) })
    }

    fn conn(&mut self) -> Result<&mut Connection, StorageError> {
        self.conn
            .as_mut()
            .ok_or_else(|| StorageError::Internal("database is closed".into()))
    }
}

fn to_sql_int(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

fn user_by_id(conn: &Connection, id: i64) -> Result<User, StorageError> {
    conn.query_row(
        "SELECT id, username, password FROM users WHERE id = ?1",
        params![id],
        |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
                password_hash: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or(StorageError::UserIdNotFound(id))
}

fn user_by_name(conn: &Connection, username: &str) -> Result<User, StorageError> {
    conn.query_row(
        "SELECT id, username, password FROM users WHERE username = ?1",
        params![username],
        |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
                password_hash: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| StorageError::UserNotFound(username.to_string()))
}

/// Resolves user ids, remembering the ones already loaded during one call.
struct UserCache<'c> {
    conn: &'c Connection,
    users: HashMap<i64, User>,
}

impl<'c> UserCache<'c> {
    fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            users: HashMap::new(),
        }
    }

    fn get(&mut self, id: i64) -> Result<User, StorageError> {
        if let Some(user) = self.users.get(&id) {
            return Ok(user.clone());
        }
        let user = user_by_id(self.conn, id)?;
        self.users.insert(id, user.clone());
        Ok(user)
    }
}

fn channel_by_id(conn: &Connection, id: i64) -> Result<Channel, StorageError> {
    let row = conn
        .query_row(
            "SELECT user_id, slug, label FROM channel WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;
    let (user_id, slug, label) = row.ok_or_else(|| StorageError::ChannelNotFound(id.to_string()))?;
    Ok(Channel {
        id,
        user: user_by_id(conn, user_id)?,
        slug,
        label,
    })
}

fn channels_of_post(users: &mut UserCache<'_>, post_id: i64) -> Result<Vec<Channel>, StorageError> {
    let conn = users.conn;
    let rows = {
        let mut stmt = conn.prepare_cached(
            "SELECT c.id, c.user_id, c.slug, c.label
             FROM channel c, postchannel pc
             WHERE pc.channel_id = c.id AND pc.post_id = ?1
             ORDER BY c.label ASC, c.id ASC",
        )?;
        let rows = stmt
            .query_map(params![post_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };

    rows.into_iter()
        .map(|(id, user_id, slug, label)| {
            Ok(Channel {
                id,
                user: users.get(user_id)?,
                slug,
                label,
            })
        })
        .collect()
}

fn hydrate(users: &mut UserCache<'_>, row: PostRow) -> Result<Post, StorageError> {
    let uuid = Uuid::parse_str(&row.uuid)
        .map_err(|e| StorageError::Internal(format!("stored uuid {}: {e}", row.uuid)))?;
    Ok(Post {
        id: row.id,
        uuid,
        user: users.get(row.user_id)?,
        body: row.body,
        posted: row.posted,
        channels: channels_of_post(users, row.id)?,
    })
}

/// Run a post query and attach users and channels to every row.
fn query_posts(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<Post>, StorageError> {
    let rows = {
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(params, PostRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };

    let mut users = UserCache::new(conn);
    rows.into_iter().map(|row| hydrate(&mut users, row)).collect()
}

fn post_by_id(conn: &Connection, id: i64) -> Result<Post, StorageError> {
    let row = conn
        .query_row(
            &format!("SELECT {POST_COLUMNS} FROM post p WHERE p.id = ?1"),
            params![id],
            PostRow::from_row,
        )
        .optional()?
        .ok_or_else(|| StorageError::PostNotFound(id.to_string()))?;
    hydrate(&mut UserCache::new(conn), row)
}

impl StorageEngine for SqliteEngine {
    fn create_user(&mut self, username: &str, password: &str) -> Result<User, StorageError> {
        validate_username(username)?;
        validate_password(password)?;
        let encoded = hash_password(password);

        let conn = self.conn()?;
        let tx = conn.transaction()?;
        match tx.execute(
            "INSERT INTO users (username, password) VALUES (?1, ?2)",
            params![username, encoded],
        ) {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(StorageError::UsernameTaken(username.to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        let user = user_by_id(&tx, tx.last_insert_rowid())?;
        tx.commit()?;
        Ok(user)
    }

    fn delete_channel(&mut self, channel: &Channel) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM postchannel WHERE channel_id = ?1",
            params![channel.id],
        )?;
        let removed = tx.execute("DELETE FROM channel WHERE id = ?1", params![channel.id])?;
        if removed == 0 {
            return Err(StorageError::ChannelNotFound(channel.id.to_string()));
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_post(&mut self, post: &Post) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM postchannel WHERE post_id = ?1", params![post.id])?;
        let removed = tx.execute("DELETE FROM post WHERE id = ?1", params![post.id])?;
        if removed == 0 {
            return Err(StorageError::PostNotFound(post.uuid.to_string()));
        }
        tx.commit()?;
        Ok(())
    }

    fn add_channels(&mut self, user: &User, labels: &[String]) -> Result<Vec<Channel>, StorageError> {
        let conn = self.conn()?;
        let tx = conn.transaction()?;
        let owner = user_by_id(&tx, user.id)?;

        let mut created = Vec::new();
        for label in labels {
            let label = label.trim();
            if label.is_empty() {
                continue;
            }
            let slug = slugify(label);
            tx.execute(
                "INSERT OR IGNORE INTO channel (user_id, slug, label) VALUES (?1, ?2, ?3)",
                params![owner.id, slug, label],
            )?;
            let (id, label) = tx.query_row(
                "SELECT id, label FROM channel WHERE user_id = ?1 AND slug = ?2",
                params![owner.id, slug],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )?;
            created.push(Channel {
                id,
                user: owner.clone(),
                slug,
                label,
            });
        }
        tx.commit()?;
        Ok(created)
    }

    fn add_post(
        &mut self,
        user: &User,
        body: &str,
        channels: &[Channel],
    ) -> Result<Post, StorageError> {
        validate_body(body)?;
        let conn = self.conn()?;
        let tx = conn.transaction()?;
        let owner = user_by_id(&tx, user.id)?;

        tx.execute(
            "INSERT INTO post (user_id, uuid, body, posted) VALUES (?1, ?2, ?3, ?4)",
            params![
                owner.id,
                Uuid::new_v4().to_string(),
                body,
                Utc::now().timestamp()
            ],
        )?;
        let id = tx.last_insert_rowid();

        for channel in channels {
            let exists = tx
                .query_row(
                    "SELECT 1 FROM channel WHERE id = ?1",
                    params![channel.id],
                    |_| Ok(()),
                )
                .optional()?;
            if exists.is_none() {
                // dropping the transaction rolls back the post row
                return Err(StorageError::ChannelNotFound(channel.id.to_string()));
            }
            tx.execute(
                "INSERT OR IGNORE INTO postchannel (post_id, channel_id) VALUES (?1, ?2)",
                params![id, channel.id],
            )?;
        }

        let post = post_by_id(&tx, id)?;
        tx.commit()?;
        Ok(post)
    }

    fn get_user(&mut self, username: &str) -> Result<User, StorageError> {
        user_by_name(self.conn()?, username)
    }

    fn get_user_by_id(&mut self, id: i64) -> Result<User, StorageError> {
        user_by_id(self.conn()?, id)
    }

    fn get_all_users(&mut self) -> Result<Vec<User>, StorageError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare_cached("SELECT id, username, password FROM users ORDER BY username ASC")?;
        let users = stmt
            .query_map([], |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    password_hash: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    fn get_post_by_uuid(&mut self, uuid: &str) -> Result<Post, StorageError> {
        let parsed = Uuid::parse_str(uuid)
            .map_err(|_| StorageError::InvalidInput(format!("malformed post uuid: {uuid}")))?;
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {POST_COLUMNS} FROM post p WHERE p.uuid = ?1"),
                params![parsed.to_string()],
                PostRow::from_row,
            )
            .optional()?
            .ok_or_else(|| StorageError::PostNotFound(uuid.to_string()))?;
        hydrate(&mut UserCache::new(conn), row)
    }

    fn get_user_channels(&mut self, user: &User) -> Result<Vec<Channel>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, slug, label FROM channel WHERE user_id = ?1 ORDER BY label ASC, id ASC",
        )?;
        let channels = stmt
            .query_map(params![user.id], |row| {
                Ok(Channel {
                    id: row.get(0)?,
                    user: user.clone(),
                    slug: row.get(1)?,
                    label: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(channels)
    }

    fn get_all_posts(&mut self, page: Page) -> Result<Vec<Post>, StorageError> {
        query_posts(
            self.conn()?,
            &format!(
                "SELECT {POST_COLUMNS} FROM post p
                 ORDER BY p.posted DESC, p.id DESC LIMIT ?1 OFFSET ?2"
            ),
            params![to_sql_int(page.limit), to_sql_int(page.offset)],
        )
    }

    fn get_all_posts_in_channel(
        &mut self,
        channel: &Channel,
        page: Page,
    ) -> Result<Vec<Post>, StorageError> {
        query_posts(
            self.conn()?,
            &format!(
                "SELECT {POST_COLUMNS} FROM post p, postchannel pc
                 WHERE p.id = pc.post_id AND pc.channel_id = ?1
                 ORDER BY p.posted DESC, p.id DESC LIMIT ?2 OFFSET ?3"
            ),
            params![
                channel.id,
                to_sql_int(page.limit),
                to_sql_int(page.offset)
            ],
        )
    }

    fn get_all_user_posts(&mut self, user: &User, page: Page) -> Result<Vec<Post>, StorageError> {
        query_posts(
            self.conn()?,
            &format!(
                "SELECT {POST_COLUMNS} FROM post p WHERE p.user_id = ?1
                 ORDER BY p.posted DESC, p.id DESC LIMIT ?2 OFFSET ?3"
            ),
            params![user.id, to_sql_int(page.limit), to_sql_int(page.offset)],
        )
    }

    fn get_channel(&mut self, user: &User, slug: &str) -> Result<Channel, StorageError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, label FROM channel WHERE user_id = ?1 AND slug = ?2",
                params![user.id, slug],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        let (id, label) =
            row.ok_or_else(|| StorageError::ChannelNotFound(format!("{}/{}", user.username, slug)))?;
        Ok(Channel {
            id,
            user: user.clone(),
            slug: slug.to_string(),
            label,
        })
    }

    fn get_channel_by_id(&mut self, id: i64) -> Result<Channel, StorageError> {
        channel_by_id(self.conn()?, id)
    }

    fn get_post_channels(&mut self, post: &Post) -> Result<Vec<Channel>, StorageError> {
        let conn = self.conn()?;
        channels_of_post(&mut UserCache::new(conn), post.id)
    }

    fn search_posts(&mut self, query: &str, page: Page) -> Result<Vec<Post>, StorageError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        query_posts(
            self.conn()?,
            &format!(
                "SELECT {POST_COLUMNS} FROM post p
                 WHERE p.body LIKE '%' || ?1 || '%' ESCAPE '\\'
                 ORDER BY p.posted DESC, p.id DESC LIMIT ?2 OFFSET ?3"
            ),
            params![
                escape_like(query),
                to_sql_int(page.limit),
                to_sql_int(page.offset)
            ],
        )
    }

    fn close(&mut self) -> Result<(), StorageError> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| StorageError::Database(e))?;
        }
        Ok(())
    }
}
