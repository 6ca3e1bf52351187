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

//! Message types for actor communication
//!
//! Every storage operation is a [`Command`] variant carrying owned inputs and
//! a oneshot reply slot. The slot is consumed by the single send that answers
//! it, so a command can be answered at most once.

use tokio::sync::oneshot;

use crate::storage::{Channel, Page, Post, StorageError, User};

/// Reply slot for a command producing `T`
pub type Reply<T> = oneshot::Sender<Result<T, StorageError>>;

/// Which dispatcher queue a command travels on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Read,
    Write,
}

/// Commands sent to the dispatcher
#[derive(Debug)]
pub enum Command {
    CreateUser {
        username: String,
        password: String,
        reply: Reply<User>,
    },

    DeleteChannel {
        channel: Channel,
        reply: Reply<()>,
    },

    DeletePost {
        post: Post,
        reply: Reply<()>,
    },

    AddChannels {
        user: User,
        labels: Vec<String>,
        reply: Reply<Vec<Channel>>,
    },

    AddPost {
        user: User,
        body: String,
        channels: Vec<Channel>,
        reply: Reply<Post>,
    },

    GetUser {
        username: String,
        reply: Reply<User>,
    },

    GetUserById {
        id: i64,
        reply: Reply<User>,
    },

    GetAllUsers {
        reply: Reply<Vec<User>>,
    },

    GetPostByUuid {
        uuid: String,
        reply: Reply<Post>,
    },

    GetUserChannels {
        user: User,
        reply: Reply<Vec<Channel>>,
    },

    GetAllPosts {
        page: Page,
        reply: Reply<Vec<Post>>,
    },

    GetAllPostsInChannel {
        channel: Channel,
        page: Page,
        reply: Reply<Vec<Post>>,
    },

    GetAllUserPosts {
        user: User,
        page: Page,
        reply: Reply<Vec<Post>>,
    },

    /// Lookup by natural key: owner plus slug
    GetChannel {
        user: User,
        slug: String,
        reply: Reply<Channel>,
    },

    GetChannelById {
        id: i64,
        reply: Reply<Channel>,
    },

    GetPostChannels {
        post: Post,
        reply: Reply<Vec<Channel>>,
    },

    SearchPosts {
        query: String,
        page: Page,
        reply: Reply<Vec<Post>>,
    },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::CreateUser { .. }
            | Command::DeleteChannel { .. }
            | Command::DeletePost { .. }
            | Command::AddChannels { .. }
            | Command::AddPost { .. } => CommandKind::Write,
            _ => CommandKind::Read,
        }
    }

    /// Stable operation name used in logs and metric labels
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateUser { .. } => "create_user",
            Command::DeleteChannel { .. } => "delete_channel",
            Command::DeletePost { .. } => "delete_post",
            Command::AddChannels { .. } => "add_channels",
            Command::AddPost { .. } => "add_post",
            Command::GetUser { .. } => "get_user",
            Command::GetUserById { .. } => "get_user_by_id",
            Command::GetAllUsers { .. } => "get_all_users",
            Command::GetPostByUuid { .. } => "get_post_by_uuid",
            Command::GetUserChannels { .. } => "get_user_channels",
            Command::GetAllPosts { .. } => "get_all_posts",
            Command::GetAllPostsInChannel { .. } => "get_all_posts_in_channel",
            Command::GetAllUserPosts { .. } => "get_all_user_posts",
            Command::GetChannel { .. } => "get_channel",
            Command::GetChannelById { .. } => "get_channel_by_id",
            Command::GetPostChannels { .. } => "get_post_channels",
            Command::SearchPosts { .. } => "search_posts",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_are_classified() {
        let (reply, _rx) = oneshot::channel();
        let cmd = Command::AddChannels {
            user: User {
                id: 1,
                username: "anders".into(),
                password_hash: String::new(),
            },
            labels: vec!["Rust".into()],
            reply,
        };
        assert_eq!(cmd.kind(), CommandKind::Write);
        assert_eq!(cmd.name(), "add_channels");

        let (reply, _rx) = oneshot::channel();
        let cmd = Command::SearchPosts {
            query: "rust".into(),
            page: Page::new(10, 0),
            reply,
        };
        assert_eq!(cmd.kind(), CommandKind::Read);
        assert_eq!(cmd.name(), "search_posts");
    }
}
