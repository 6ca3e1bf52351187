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

//! Engine wrapper that records what the dispatcher does to it

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use finch::storage::{Channel, InMemoryEngine, Page, Post, StorageEngine, StorageError, User};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: &'static str,
    pub detail: String,
}

/// Shared view of a [`RecordingEngine`], kept by the test after the engine
/// has moved into the dispatcher
#[derive(Clone, Default)]
pub struct Recorder {
    in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
    pub calls: Arc<Mutex<Vec<Call>>>,
    pub closes: Arc<AtomicUsize>,
    /// Delay applied inside every call, in milliseconds
    pub delay_ms: Arc<AtomicU64>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| c.op == op).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

pub struct RecordingEngine {
    inner: InMemoryEngine,
    recorder: Recorder,
}

impl RecordingEngine {
    pub fn new() -> (Self, Recorder) {
        let recorder = Recorder::default();
        let engine = Self {
            inner: InMemoryEngine::new(),
            recorder: recorder.clone(),
        };
        (engine, recorder)
    }

    fn track<T>(
        &mut self,
        op: &'static str,
        detail: String,
        f: impl FnOnce(&mut InMemoryEngine) -> T,
    ) -> T {
        let now = self.recorder.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.recorder.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.recorder.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        } else {
            // Give an overlapping call a chance to show up
            std::thread::yield_now();
        }

        let out = f(&mut self.inner);
        self.recorder.calls.lock().unwrap().push(Call { op, detail });
        self.recorder.in_flight.fetch_sub(1, Ordering::SeqCst);
        out
    }
}

impl StorageEngine for RecordingEngine {
    fn create_user(&mut self, username: &str, password: &str) -> Result<User, StorageError> {
        self.track("create_user", username.to_string(), |e| {
            e.create_user(username, password)
        })
    }

    fn delete_channel(&mut self, channel: &Channel) -> Result<(), StorageError> {
        self.track("delete_channel", channel.id.to_string(), |e| {
            e.delete_channel(channel)
        })
    }

    fn delete_post(&mut self, post: &Post) -> Result<(), StorageError> {
        self.track("delete_post", post.uuid.to_string(), |e| e.delete_post(post))
    }

    fn add_channels(&mut self, user: &User, labels: &[String]) -> Result<Vec<Channel>, StorageError> {
        self.track("add_channels", labels.join(","), |e| {
            e.add_channels(user, labels)
        })
    }

    fn add_post(
        &mut self,
        user: &User,
        body: &str,
        channels: &[Channel],
    ) -> Result<Post, StorageError> {
        let ids: Vec<String> = channels.iter().map(|c| c.id.to_string()).collect();
        let detail = format!("{}|{}", body, ids.join(","));
        self.track("add_post", detail, |e| e.add_post(user, body, channels))
    }

    fn get_user(&mut self, username: &str) -> Result<User, StorageError> {
        self.track("get_user", username.to_string(), |e| e.get_user(username))
    }

    fn get_user_by_id(&mut self, id: i64) -> Result<User, StorageError> {
        self.track("get_user_by_id", id.to_string(), |e| e.get_user_by_id(id))
    }

    fn get_all_users(&mut self) -> Result<Vec<User>, StorageError> {
        self.track("get_all_users", String::new(), |e| e.get_all_users())
    }

    fn get_post_by_uuid(&mut self, uuid: &str) -> Result<Post, StorageError> {
        self.track("get_post_by_uuid", uuid.to_string(), |e| {
            e.get_post_by_uuid(uuid)
        })
    }

    fn get_user_channels(&mut self, user: &User) -> Result<Vec<Channel>, StorageError> {
        self.track("get_user_channels", user.username.clone(), |e| {
            e.get_user_channels(user)
        })
    }

    fn get_all_posts(&mut self, page: Page) -> Result<Vec<Post>, StorageError> {
        self.track("get_all_posts", String::new(), |e| e.get_all_posts(page))
    }

    fn get_all_posts_in_channel(
        &mut self,
        channel: &Channel,
        page: Page,
    ) -> Result<Vec<Post>, StorageError> {
        self.track("get_all_posts_in_channel", channel.id.to_string(), |e| {
            e.get_all_posts_in_channel(channel, page)
        })
    }

    fn get_all_user_posts(&mut self, user: &User, page: Page) -> Result<Vec<Post>, StorageError> {
        self.track("get_all_user_posts", user.username.clone(), |e| {
            e.get_all_user_posts(user, page)
        })
    }

    fn get_channel(&mut self, user: &User, slug: &str) -> Result<Channel, StorageError> {
        self.track("get_channel", slug.to_string(), |e| e.get_channel(user, slug))
    }

    fn get_channel_by_id(&mut self, id: i64) -> Result<Channel, StorageError> {
        self.track("get_channel_by_id", id.to_string(), |e| {
            e.get_channel_by_id(id)
        })
    }

    fn get_post_channels(&mut self, post: &Post) -> Result<Vec<Channel>, StorageError> {
        self.track("get_post_channels", post.uuid.to_string(), |e| {
            e.get_post_channels(post)
        })
    }

    fn search_posts(&mut self, query: &str, page: Page) -> Result<Vec<Post>, StorageError> {
        self.track("search_posts", query.to_string(), |e| {
            e.search_posts(query, page)
        })
    }

    fn close(&mut self) -> Result<(), StorageError> {
        self.recorder.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
