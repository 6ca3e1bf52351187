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

//! Site - the client side of the storage dispatcher
//!
//! `Site` is what request handlers hold. Each method builds a [`Command`]
//! with a fresh oneshot reply slot, queues it, and waits for the answer.
//! Clones share the queues and nothing else.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

use crate::actor::dispatcher::{Dispatcher, DispatcherHandle};
use crate::actor::messages::{Command, CommandKind, Reply};
use crate::actor::metrics::Metrics;
use crate::config::{Config, DispatcherConfig};
use crate::observability::metrics as prom_metrics;
use crate::storage::{
    Channel, InMemoryEngine, Page, Post, SqliteEngine, StorageEngine, StorageError, User,
};

#[derive(Debug, Error)]
pub enum SiteError {
    /// The engine's own error, passed through untouched
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("storage dispatcher is not running")]
    Closed,
    #[error("no reply from storage dispatcher within {0:?}")]
    Timeout(Duration),
    #[error("failed to start storage dispatcher: {0}")]
    Startup(std::io::Error),
}

impl SiteError {
    fn label(&self) -> &'static str {
        match self {
            SiteError::Storage(_) => "storage_error",
            SiteError::Closed => "closed",
            SiteError::Timeout(_) => "timeout",
            SiteError::Startup(_) => "startup",
        }
    }
}

/// Handle to the storage dispatcher
#[derive(Clone)]
pub struct Site {
    reads: mpsc::Sender<Command>,
    writes: mpsc::Sender<Command>,
    metrics: Arc<Metrics>,
    request_timeout: Option<Duration>,
}

impl Site {
    /// Start a dispatcher that owns `engine` and return a handle to it plus
    /// the handle that shuts it down.
    pub fn spawn<E: StorageEngine>(
        engine: E,
        config: &DispatcherConfig,
    ) -> Result<(Self, DispatcherHandle), SiteError> {
        let depth = config.queue_depth.max(1);
        let (read_tx, read_rx) = mpsc::channel(depth);
        let (write_tx, write_rx) = mpsc::channel(depth);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let metrics = Arc::new(Metrics::new());

        let dispatcher = Dispatcher::new(engine, read_rx, write_rx, shutdown_rx, metrics.clone());
        let handle = dispatcher.spawn(shutdown_tx)?;

        tracing::info!(
            queue_depth = depth,
            request_timeout = ?config.request_timeout(),
            "storage dispatcher spawned"
        );

        let site = Self {
            reads: read_tx,
            writes: write_tx,
            metrics,
            request_timeout: config.request_timeout(),
        };
        Ok((site, handle))
    }

    /// Open the engine named by `config.storage` and spawn a dispatcher for it.
    pub fn from_config(config: &Config) -> Result<(Self, DispatcherHandle), SiteError> {
        match config.storage.backend.as_str() {
            "sqlite" => {
                let engine = SqliteEngine::open(&config.storage.path)?;
                tracing::info!(path = %config.storage.path, "opened sqlite storage");
                Self::spawn(engine, &config.dispatcher)
            }
            "in-memory" => Self::spawn(InMemoryEngine::new(), &config.dispatcher),
            other => Err(StorageError::InvalidInput(format!("unknown storage backend: {other}")).into()),
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Send a command to the dispatcher and wait for its reply
    async fn send_command<T>(
        &self,
        make_command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, SiteError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let cmd = make_command(reply_tx);
        let op = cmd.name();
        let queue = match cmd.kind() {
            CommandKind::Read => &self.reads,
            CommandKind::Write => &self.writes,
        };

        let call = async {
            queue.send(cmd).await.map_err(|_| SiteError::Closed)?;
            self.metrics.inc_message_sent();
            reply_rx.await.map_err(|_| SiteError::Closed)
        };

        let reply = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(reply) => reply,
                Err(_) => {
                    self.metrics.inc_message_timeout();
                    tracing::warn!(op, ?limit, "storage call timed out");
                    Err(SiteError::Timeout(limit))
                }
            },
            None => call.await,
        };

        let res = reply.and_then(|res| res.map_err(SiteError::from));
        prom_metrics::increment_site_call(op, res.as_ref().map_or_else(SiteError::label, |_| "ok"));
        res
    }

    pub async fn create_user(&self, username: &str, password: &str) -> Result<User, SiteError> {
        let username = username.to_string();
        let password = password.to_string();
        self.send_command(|reply| Command::CreateUser {
            username,
            password,
            reply,
        })
        .await
    }

    pub async fn delete_channel(&self, channel: &Channel) -> Result<(), SiteError> {
        let channel = channel.clone();
        self.send_command(|reply| Command::DeleteChannel { channel, reply })
            .await
    }

    pub async fn delete_post(&self, post: &Post) -> Result<(), SiteError> {
        let post = post.clone();
        self.send_command(|reply| Command::DeletePost { post, reply })
            .await
    }

    pub async fn add_channels(&self, user: &User, labels: &[String]) -> Result<Vec<Channel>, SiteError> {
        let user = user.clone();
        let labels = labels.to_vec();
        self.send_command(|reply| Command::AddChannels {
            user,
            labels,
            reply,
        })
        .await
    }

    pub async fn add_post(
        &self,
        user: &User,
        body: &str,
        channels: &[Channel],
    ) -> Result<Post, SiteError> {
        let user = user.clone();
        let body = body.to_string();
        let channels = channels.to_vec();
        self.send_command(|reply| Command::AddPost {
            user,
            body,
            channels,
            reply,
        })
        .await
    }

    pub async fn get_user(&self, username: &str) -> Result<User, SiteError> {
        let username = username.to_string();
        self.send_command(|reply| Command::GetUser { username, reply })
            .await
    }

    pub async fn get_user_by_id(&self, id: i64) -> Result<User, SiteError> {
        self.send_command(|reply| Command::GetUserById { id, reply })
            .await
    }

    pub async fn get_all_users(&self) -> Result<Vec<User>, SiteError> {
        self.send_command(|reply| Command::GetAllUsers { reply })
            .await
    }

    pub async fn get_post_by_uuid(&self, uuid: &str) -> Result<Post, SiteError> {
        let uuid = uuid.to_string();
        self.send_command(|reply| Command::GetPostByUuid { uuid, reply })
            .await
    }

    pub async fn get_user_channels(&self, user: &User) -> Result<Vec<Channel>, SiteError> {
        let user = user.clone();
        self.send_command(|reply| Command::GetUserChannels { user, reply })
            .await
    }

    pub async fn get_all_posts(&self, page: Page) -> Result<Vec<Post>, SiteError> {
        self.send_command(|reply| Command::GetAllPosts { page, reply })
            .await
    }

    pub async fn get_all_posts_in_channel(
        &self,
        channel: &Channel,
        page: Page,
    ) -> Result<Vec<Post>, SiteError> {
        let channel = channel.clone();
        self.send_command(|reply| Command::GetAllPostsInChannel {
            channel,
            page,
            reply,
        })
        .await
    }

    pub async fn get_all_user_posts(&self, user: &User, page: Page) -> Result<Vec<Post>, SiteError> {
        let user = user.clone();
        self.send_command(|reply| Command::GetAllUserPosts { user, page, reply })
            .await
    }

    pub async fn get_channel(&self, user: &User, slug: &str) -> Result<Channel, SiteError> {
        let user = user.clone();
        let slug = slug.to_string();
        self.send_command(|reply| Command::GetChannel { user, slug, reply })
            .await
    }

    pub async fn get_channel_by_id(&self, id: i64) -> Result<Channel, SiteError> {
        self.send_command(|reply| Command::GetChannelById { id, reply })
            .await
    }

    pub async fn get_post_channels(&self, post: &Post) -> Result<Vec<Channel>, SiteError> {
        let post = post.clone();
        self.send_command(|reply| Command::GetPostChannels { post, reply })
            .await
    }

    pub async fn search_posts(&self, query: &str, page: Page) -> Result<Vec<Post>, SiteError> {
        let query = query.to_string();
        self.send_command(|reply| Command::SearchPosts { query, page, reply })
            .await
    }
}
