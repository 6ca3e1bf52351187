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

//! Storage engines
//!
//! A [`StorageEngine`] performs the durable reads and writes behind the site.
//! Engines are `Send` so they can be moved into the dispatcher thread, but
//! they are never required to be `Sync`: the dispatcher is their only caller.

use thiserror::Error;

pub mod common;
pub mod in_memory;
pub mod model;
pub mod password;
pub mod sqlite;

pub use in_memory::InMemoryEngine;
pub use model::{Channel, Page, Post, User};
pub use sqlite::SqliteEngine;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("user id not found: {0}")]
    UserIdNotFound(i64),
    #[error("username already taken: {0}")]
    UsernameTaken(String),
    #[error("channel not found: {0}")]
    ChannelNotFound(String),
    #[error("post not found: {0}")]
    PostNotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("internal storage error: {0}")]
    Internal(String),
}

/// Operations the site forwards to its backing store.
///
/// Every method takes `&mut self`; an engine has exactly one owner at a time
/// and no method is ever invoked concurrently with another.
pub trait StorageEngine: Send + 'static {
    fn create_user(&mut self, username: &str, password: &str) -> Result<User, StorageError>;

    fn delete_channel(&mut self, channel: &Channel) -> Result<(), StorageError>;

    fn delete_post(&mut self, post: &Post) -> Result<(), StorageError>;

    /// Create channels for `user` from display labels. Empty labels are
    /// skipped; a label whose slug already exists yields the existing channel.
    fn add_channels(&mut self, user: &User, labels: &[String]) -> Result<Vec<Channel>, StorageError>;

    fn add_post(
        &mut self,
        user: &User,
        body: &str,
        channels: &[Channel],
    ) -> Result<Post, StorageError>;

    fn get_user(&mut self, username: &str) -> Result<User, StorageError>;

    fn get_user_by_id(&mut self, id: i64) -> Result<User, StorageError>;

    fn get_all_users(&mut self) -> Result<Vec<User>, StorageError>;

    fn get_post_by_uuid(&mut self, uuid: &str) -> Result<Post, StorageError>;

    fn get_user_channels(&mut self, user: &User) -> Result<Vec<Channel>, StorageError>;

    fn get_all_posts(&mut self, page: Page) -> Result<Vec<Post>, StorageError>;

    fn get_all_posts_in_channel(
        &mut self,
        channel: &Channel,
        page: Page,
    ) -> Result<Vec<Post>, StorageError>;

    fn get_all_user_posts(&mut self, user: &User, page: Page) -> Result<Vec<Post>, StorageError>;

    fn get_channel(&mut self, user: &User, slug: &str) -> Result<Channel, StorageError>;

    fn get_channel_by_id(&mut self, id: i64) -> Result<Channel, StorageError>;

    fn get_post_channels(&mut self, post: &Post) -> Result<Vec<Channel>, StorageError>;

    fn search_posts(&mut self, query: &str, page: Page) -> Result<Vec<Post>, StorageError>;

    /// Release the underlying handle. Called once by the dispatcher after it
    /// stops taking requests.
    fn close(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}
