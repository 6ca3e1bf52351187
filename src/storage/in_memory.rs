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

use crate::storage::common::{slugify, validate_body, validate_password, validate_username};
use crate::storage::model::{Channel, Page, Post, User};
use crate::storage::password::hash_password;
use crate::storage::{StorageEngine, StorageError};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredChannel {
    user_id: i64,
    slug: String,
    label: String,
}

#[derive(Debug, Clone)]
struct StoredPost {
    user_id: i64,
    uuid: Uuid,
    body: String,
    posted: i64,
}

/// In-memory storage engine.
///
/// Data structures:
/// - `users`, `channels`, `posts`: BTreeMaps keyed by surrogate id
/// - `post_channels`: the (post id, channel id) association set
///
/// BTreeMap gives deterministic iteration order (useful for tests and predictable listing).
/// No locking: the engine is owned by the dispatcher.
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    users: BTreeMap<i64, User>,
    channels: BTreeMap<i64, StoredChannel>,
    posts: BTreeMap<i64, StoredPost>,
    post_channels: BTreeSet<(i64, i64)>,
    next_id: i64,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user_by_id(&self, id: i64) -> Result<User, StorageError> {
        self.users
            .get(&id)
            .cloned()
            .ok_or(StorageError::UserIdNotFound(id))
    }

    fn channel_by_id(&self, id: i64) -> Result<Channel, StorageError> {
        let stored = self
            .channels
            .get(&id)
            .ok_or_else(|| StorageError::ChannelNotFound(id.to_string()))?;
        Ok(Channel {
            id,
            user: self.user_by_id(stored.user_id)?,
            slug: stored.slug.clone(),
            label: stored.label.clone(),
        })
    }

    fn channels_of_post(&self, post_id: i64) -> Result<Vec<Channel>, StorageError> {
        let mut channels = self
            .post_channels
            .range((post_id, i64::MIN)..=(post_id, i64::MAX))
            .map(|(_, channel_id)| self.channel_by_id(*channel_id))
            .collect::<Result<Vec<_>, _>>()?;
        channels.sort_by(|a, b| a.label.cmp(&b.label).then(a.id.cmp(&b.id)));
        Ok(channels)
    }

    fn load_post(&self, id: i64) -> Result<Post, StorageError> {
        let stored = self
            .posts
            .get(&id)
            .ok_or_else(|| StorageError::PostNotFound(id.to_string()))?;
        Ok(Post {
            id,
            uuid: stored.uuid,
            user: self.user_by_id(stored.user_id)?,
            body: stored.body.clone(),
            posted: stored.posted,
            channels: self.channels_of_post(id)?,
        })
    }

    /// Posts matching `filter`, newest first, windowed by `page`.
    fn list_posts(
        &self,
        page: Page,
        filter: impl Fn(i64, &StoredPost) -> bool,
    ) -> Result<Vec<Post>, StorageError> {
        let mut ids: Vec<(i64, i64)> = self
            .posts
            .iter()
            .filter(|(id, p)| filter(**id, p))
            .map(|(id, p)| (p.posted, *id))
            .collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));

        ids.into_iter()
            .skip(page.offset)
            .take(page.limit)
            .map(|(_, id)| self.load_post(id))
            .collect()
    }
}

impl StorageEngine for InMemoryEngine {
    fn create_user(&mut self, username: &str, password: &str) -> Result<User, StorageError> {
        validate_username(username)?;
        validate_password(password)?;
        if self.users.values().any(|u| u.username == username) {
            return Err(StorageError::UsernameTaken(username.to_string()));
        }

        let user = User {
            id: self.allocate_id(),
            username: username.to_string(),
            password_hash: hash_password(password),
        };
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn delete_channel(&mut self, channel: &Channel) -> Result<(), StorageError> {
        if self.channels.remove(&channel.id).is_none() {
            return Err(StorageError::ChannelNotFound(channel.id.to_string()));
        }
        self.post_channels.retain(|(_, c)| *c != channel.id);
        Ok(())
    }

    fn delete_post(&mut self, post: &Post) -> Result<(), StorageError> {
        if self.posts.remove(&post.id).is_none() {
            return Err(StorageError::PostNotFound(post.uuid.to_string()));
        }
        self.post_channels.retain(|(p, _)| *p != post.id);
        Ok(())
    }

    fn add_channels(&mut self, user: &User, labels: &[String]) -> Result<Vec<Channel>, StorageError> {
        let owner = self.user_by_id(user.id)?;
        let mut created = Vec::new();
        for label in labels {
            let label = label.trim();
            if label.is_empty() {
                continue;
            }
            let slug = slugify(label);
            let existing = self
                .channels
                .iter()
                .find(|(_, c)| c.user_id == owner.id && c.slug == slug)
                .map(|(id, _)| *id);

            let id = match existing {
                Some(id) => id,
                None => {
                    let id = self.allocate_id();
                    self.channels.insert(
                        id,
                        StoredChannel {
                            user_id: owner.id,
                            slug,
                            label: label.to_string(),
                        },
                    );
                    id
                }
            };
            created.push(self.channel_by_id(id)?);
        }
        Ok(created)
    }

    fn add_post(
        &mut self,
        user: &User,
        body: &str,
        channels: &[Channel],
    ) -> Result<Post, StorageError> {
        validate_body(body)?;
        let owner = self.user_by_id(user.id)?;
        // All channels are checked before anything is written
        for channel in channels {
            if !self.channels.contains_key(&channel.id) {
                return Err(StorageError::ChannelNotFound(channel.id.to_string()));
            }
        }

        let id = self.allocate_id();
        self.posts.insert(
            id,
            StoredPost {
                user_id: owner.id,
                uuid: Uuid::new_v4(),
                body: body.to_string(),
                posted: Utc::now().timestamp(),
            },
        );
        for channel in channels {
            self.post_channels.insert((id, channel.id));
        }
        self.load_post(id)
    }

    fn get_user(&mut self, username: &str) -> Result<User, StorageError> {
        self.users
            .values()
            .find(|u| u.username == username)
            .cloned()
            .ok_or_else(|| StorageError::UserNotFound(username.to_string()))
    }

    fn get_user_by_id(&mut self, id: i64) -> Result<User, StorageError> {
        self.user_by_id(id)
    }

    fn get_all_users(&mut self) -> Result<Vec<User>, StorageError> {
        let mut users: Vec<User> = self.users.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    fn get_post_by_uuid(&mut self, uuid: &str) -> Result<Post, StorageError> {
        let parsed = Uuid::parse_str(uuid)
            .map_err(|_| StorageError::InvalidInput(format!("malformed post uuid: {uuid}")))?;
        let id = self
            .posts
            .iter()
            .find(|(_, p)| p.uuid == parsed)
            .map(|(id, _)| *id)
            .ok_or_else(|| StorageError::PostNotFound(uuid.to_string()))?;
        self.load_post(id)
    }

    fn get_user_channels(&mut self, user: &User) -> Result<Vec<Channel>, StorageError> {
        let mut channels: Vec<Channel> = self
            .channels
            .iter()
            .filter(|(_, c)| c.user_id == user.id)
            .map(|(id, c)| Channel {
                id: *id,
                user: user.clone(),
                slug: c.slug.clone(),
                label: c.label.clone(),
            })
            .collect();
        channels.sort_by(|a, b| a.label.cmp(&b.label).then(a.id.cmp(&b.id)));
        Ok(channels)
    }

    fn get_all_posts(&mut self, page: Page) -> Result<Vec<Post>, StorageError> {
        self.list_posts(page, |_, _| true)
    }

    fn get_all_posts_in_channel(
        &mut self,
        channel: &Channel,
        page: Page,
    ) -> Result<Vec<Post>, StorageError> {
        let links = &self.post_channels;
        self.list_posts(page, |id, _| links.contains(&(id, channel.id)))
    }

    fn get_all_user_posts(&mut self, user: &User, page: Page) -> Result<Vec<Post>, StorageError> {
        self.list_posts(page, |_, p| p.user_id == user.id)
    }

    fn get_channel(&mut self, user: &User, slug: &str) -> Result<Channel, StorageError> {
        self.channels
            .iter()
            .find(|(_, c)| c.user_id == user.id && c.slug == slug)
            .map(|(id, c)| Channel {
                id: *id,
                user: user.clone(),
                slug: c.slug.clone(),
                label: c.label.clone(),
            })
            .ok_or_else(|| StorageError::ChannelNotFound(format!("{}/{}", user.username, slug)))
    }

    fn get_channel_by_id(&mut self, id: i64) -> Result<Channel, StorageError> {
        self.channel_by_id(id)
    }

    fn get_post_channels(&mut self, post: &Post) -> Result<Vec<Channel>, StorageError> {
        self.channels_of_post(post.id)
    }

    fn search_posts(&mut self, query: &str, page: Page) -> Result<Vec<Post>, StorageError> {
        // ASCII case folding only, the same rule as SQLite's LIKE
        let needle = query.trim().to_ascii_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        self.list_posts(page, |_, p| p.body.to_ascii_lowercase().contains(&needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_across_tables() {
        let mut engine = InMemoryEngine::new();
        let user = engine.create_user("anders", "pw").unwrap();
        let channels = engine
            .add_channels(&user, &["Rust".to_string()])
            .unwrap();
        let post = engine.add_post(&user, "hello", &channels).unwrap();
        assert_ne!(user.id, channels[0].id);
        assert_ne!(channels[0].id, post.id);
    }

    #[test]
    fn test_add_post_rejects_unknown_channel_without_writing() {
        let mut engine = InMemoryEngine::new();
        let user = engine.create_user("anders", "pw").unwrap();
        let ghost = Channel {
            id: 999,
            user: user.clone(),
            slug: "ghost".to_string(),
            label: "Ghost".to_string(),
        };
        let err = engine.add_post(&user, "hello", &[ghost]).unwrap_err();
        assert!(matches!(err, StorageError::ChannelNotFound(ref id) if id == "999"));
        assert!(engine.get_all_posts(Page::new(10, 0)).unwrap().is_empty());
    }
}
