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

//! Storage dispatcher
//!
//! The dispatcher owns the storage engine. It runs on its own OS thread and
//! processes commands one at a time, so the engine never sees two calls at
//! once and needs no locking of its own.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use tokio::sync::{mpsc, watch};

use crate::actor::messages::{Command, CommandKind, Reply};
use crate::actor::metrics::Metrics;
use crate::actor::site::SiteError;
use crate::observability::metrics as prom_metrics;
use crate::storage::{StorageEngine, StorageError};

const THREAD_NAME: &str = "finch-dispatcher";

/// What the selection step produced
enum Next {
    Run(Command),
    Shutdown,
    /// The dispatcher handle was dropped without requesting shutdown
    HandleDropped,
    /// Every sender of one queue is gone
    QueueClosed(CommandKind),
}

pub struct Dispatcher<E> {
    engine: E,

    /// Read commands, preferred when both queues are ready
    reads: mpsc::Receiver<Command>,
    writes: mpsc::Receiver<Command>,

    shutdown: watch::Receiver<bool>,

    metrics: Arc<Metrics>,
}

impl<E: StorageEngine> Dispatcher<E> {
    pub(crate) fn new(
        engine: E,
        reads: mpsc::Receiver<Command>,
        writes: mpsc::Receiver<Command>,
        shutdown: watch::Receiver<bool>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            engine,
            reads,
            writes,
            shutdown,
            metrics,
        }
    }

    /// Move the dispatcher onto a dedicated thread with its own
    /// current-thread runtime.
    pub(crate) fn spawn(self, shutdown: watch::Sender<bool>) -> Result<DispatcherHandle, SiteError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(SiteError::Startup)?;

        let thread = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(self.run()))
            .map_err(SiteError::Startup)?;

        Ok(DispatcherHandle { shutdown, thread })
    }

    /// Run the dispatcher loop
    ///
    /// Stops when shutdown is requested or once every site handle is gone.
    /// Either way the engine is closed last and the result of closing it is
    /// returned.
    pub async fn run(mut self) -> Result<(), StorageError> {
        tracing::info!("dispatcher started");
        let mut watching_shutdown = true;
        let mut reads_open = true;
        let mut writes_open = true;

        while reads_open || writes_open {
            let next = tokio::select! {
                biased;

                changed = self.shutdown.changed(), if watching_shutdown => match changed {
                    Ok(()) => Next::Shutdown,
                    Err(_) => Next::HandleDropped,
                },
                cmd = self.reads.recv(), if reads_open => match cmd {
                    Some(cmd) => Next::Run(cmd),
                    None => Next::QueueClosed(CommandKind::Read),
                },
                cmd = self.writes.recv(), if writes_open => match cmd {
                    Some(cmd) => Next::Run(cmd),
                    None => Next::QueueClosed(CommandKind::Write),
                },
            };

            match next {
                Next::Run(cmd) => self.execute(cmd),
                Next::Shutdown if *self.shutdown.borrow() => {
                    tracing::info!("shutdown requested, no further commands accepted");
                    break;
                }
                Next::Shutdown => {}
                Next::HandleDropped => watching_shutdown = false,
                Next::QueueClosed(CommandKind::Read) => reads_open = false,
                Next::QueueClosed(CommandKind::Write) => writes_open = false,
            }
        }

        if !reads_open && !writes_open {
            tracing::info!("all site handles dropped");
        }

        // Queued commands are dropped with their reply slots; callers see Closed.
        self.reads.close();
        self.writes.close();

        let closed = self.engine.close();
        match &closed {
            Ok(()) => tracing::info!("dispatcher stopped"),
            Err(e) => tracing::error!(error = %e, "dispatcher stopped, engine close failed"),
        }
        closed
    }

    fn execute(&mut self, cmd: Command) {
        self.metrics.inc_message_received();
        match cmd.kind() {
            CommandKind::Read => self.metrics.inc_read(),
            CommandKind::Write => self.metrics.inc_write(),
        }

        let op = cmd.name();
        let op_start = Instant::now();
        tracing::trace!(op, "executing");

        let outcome = match cmd {
            Command::CreateUser { username, password, reply } => {
                let res = self.engine.create_user(&username, &password);
                self.respond(op, reply, res)
            }

            Command::DeleteChannel { channel, reply } => {
                let res = self.engine.delete_channel(&channel);
                self.respond(op, reply, res)
            }

            Command::DeletePost { post, reply } => {
                let res = self.engine.delete_post(&post);
                self.respond(op, reply, res)
            }

            Command::AddChannels { user, labels, reply } => {
                let res = self.engine.add_channels(&user, &labels);
                self.respond(op, reply, res)
            }

            Command::AddPost { user, body, channels, reply } => {
                let res = self.engine.add_post(&user, &body, &channels);
                self.respond(op, reply, res)
            }

            Command::GetUser { username, reply } => {
                let res = self.engine.get_user(&username);
                self.respond(op, reply, res)
            }

            Command::GetUserById { id, reply } => {
                let res = self.engine.get_user_by_id(id);
                self.respond(op, reply, res)
            }

            Command::GetAllUsers { reply } => {
                let res = self.engine.get_all_users();
                self.respond(op, reply, res)
            }

            Command::GetPostByUuid { uuid, reply } => {
                let res = self.engine.get_post_by_uuid(&uuid);
                self.respond(op, reply, res)
            }

            Command::GetUserChannels { user, reply } => {
                let res = self.engine.get_user_channels(&user);
                self.respond(op, reply, res)
            }

            Command::GetAllPosts { page, reply } => {
                let res = self.engine.get_all_posts(page);
                self.respond(op, reply, res)
            }

            Command::GetAllPostsInChannel { channel, page, reply } => {
                let res = self.engine.get_all_posts_in_channel(&channel, page);
                self.respond(op, reply, res)
            }

            Command::GetAllUserPosts { user, page, reply } => {
                let res = self.engine.get_all_user_posts(&user, page);
                self.respond(op, reply, res)
            }

            Command::GetChannel { user, slug, reply } => {
                let res = self.engine.get_channel(&user, &slug);
                self.respond(op, reply, res)
            }

            Command::GetChannelById { id, reply } => {
                let res = self.engine.get_channel_by_id(id);
                self.respond(op, reply, res)
            }

            Command::GetPostChannels { post, reply } => {
                let res = self.engine.get_post_channels(&post);
                self.respond(op, reply, res)
            }

            Command::SearchPosts { query, page, reply } => {
                let res = self.engine.search_posts(&query, page);
                self.respond(op, reply, res)
            }
        };

        prom_metrics::record_dispatcher_op(op, outcome, op_start.elapsed().as_secs_f64());
    }

    /// Hand the engine's result to the caller unchanged. Never blocks: the
    /// reply slot is a oneshot, and a caller that went away just loses it.
    fn respond<T>(
        &self,
        op: &'static str,
        reply: Reply<T>,
        res: Result<T, StorageError>,
    ) -> &'static str {
        let outcome = match &res {
            Ok(_) => "ok",
            Err(e) => {
                self.metrics.inc_error();
                tracing::debug!(op, error = %e, "storage operation failed");
                "error"
            }
        };
        if reply.send(res).is_err() {
            self.metrics.inc_reply_abandoned();
            tracing::debug!(op, "caller stopped waiting, reply dropped");
        }
        outcome
    }
}

/// Owner-side handle for the dispatcher thread
pub struct DispatcherHandle {
    shutdown: watch::Sender<bool>,
    thread: JoinHandle<Result<(), StorageError>>,
}

impl DispatcherHandle {
    /// Ask the dispatcher to stop, wait for it to close the engine, and
    /// return the result of closing it.
    pub async fn shutdown(self) -> Result<(), SiteError> {
        self.shutdown.send_replace(true);
        let thread = self.thread;
        let joined = tokio::task::spawn_blocking(move || thread.join())
            .await
            .map_err(|_| SiteError::Closed)?;
        match joined {
            Ok(closed) => closed.map_err(SiteError::from),
            Err(_) => {
                tracing::error!("dispatcher thread panicked");
                Err(SiteError::Closed)
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}
