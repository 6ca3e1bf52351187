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

//! Domain records exchanged with the site
//!
//! Records cross the dispatcher boundary by value; nothing here holds a
//! reference into an engine.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::storage::password;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Encoded PBKDF2 hash, see [`crate::storage::password`]
    pub password_hash: String,
}

impl User {
    pub fn check_password(&self, password: &str) -> bool {
        password::verify_password(password, &self.password_hash)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: i64,
    pub user: User,
    pub slug: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: i64,
    pub uuid: Uuid,
    pub user: User,
    pub body: String,
    /// Unix seconds
    pub posted: i64,
    pub channels: Vec<Channel>,
}

impl Post {
    pub fn time(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.posted, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn url(&self) -> String {
        format!("/u/{}/p/{}/", self.user.username, self.uuid)
    }
}

/// Limit/offset window over a post listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 7,
            username: "anders".to_string(),
            password_hash: String::new(),
        }
    }

    #[test]
    fn post_url_uses_username_and_uuid() {
        let uuid = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        let post = Post {
            id: 1,
            uuid,
            user: user(),
            body: "hi".to_string(),
            posted: 1_700_000_000,
            channels: Vec::new(),
        };
        assert_eq!(post.url(), "/u/anders/p/67e55044-10b1-426f-9247-bb680e5fe0c8/");
        assert_eq!(post.time().timestamp(), 1_700_000_000);
    }
}
