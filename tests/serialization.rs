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

/// Tests for the single-writer guarantees of the site
///
/// These tests verify:
/// - Concurrent writes are applied one at a time, none lost
/// - Every call gets exactly one answer, and it is its own
/// - Inputs and engine errors cross the dispatcher unchanged
mod common;

use common::RecordingEngine;
use finch::config::DispatcherConfig;
use finch::storage::{InMemoryEngine, Page, SqliteEngine, StorageError};
use finch::{Site, SiteError};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_add_post_loses_nothing() {
    const N: usize = 50;

    let dir = tempfile::tempdir().unwrap();
    let engine = SqliteEngine::open(dir.path().join("finch.db")).unwrap();
    let (site, dispatcher) = Site::spawn(engine, &DispatcherConfig::default()).unwrap();
    let user = site.create_user("anders", "secret").await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..N {
        let site = site.clone();
        let user = user.clone();
        tasks.push(tokio::spawn(async move {
            site.add_post(&user, &format!("post number {i}"), &[]).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let posts = site.get_all_posts(Page::new(N * 2, 0)).await.unwrap();
    assert_eq!(posts.len(), N);

    dispatcher.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn engine_never_sees_overlapping_calls() {
    const READERS: usize = 40;
    const WRITERS: usize = 40;

    let (engine, recorder) = RecordingEngine::new();
    let (site, dispatcher) = Site::spawn(engine, &DispatcherConfig::default()).unwrap();
    let user = site.create_user("anders", "secret").await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..WRITERS {
        let site = site.clone();
        let user = user.clone();
        tasks.push(tokio::spawn(async move {
            site.add_post(&user, &format!("write {i}"), &[])
                .await
                .map(|_| ())
        }));
    }
    for _ in 0..READERS {
        let site = site.clone();
        tasks.push(tokio::spawn(async move {
            site.get_all_posts(Page::new(5, 0)).await.map(|_| ())
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(recorder.max_in_flight(), 1);
    assert_eq!(recorder.count("add_post"), WRITERS);
    assert_eq!(recorder.count("get_all_posts"), READERS);

    // One executed command per answered call
    let snapshot = site.metrics().snapshot();
    let total = (1 + READERS + WRITERS) as u64;
    assert_eq!(snapshot.messages_sent, total);
    assert_eq!(snapshot.messages_received, total);
    assert_eq!(snapshot.reads, READERS as u64);
    assert_eq!(snapshot.writes, (WRITERS + 1) as u64);
    assert_eq!(snapshot.queue_depth, 0);

    dispatcher.shutdown().await.unwrap();
}

#[tokio::test]
async fn add_post_inputs_arrive_unchanged() {
    let (engine, recorder) = RecordingEngine::new();
    let (site, dispatcher) = Site::spawn(engine, &DispatcherConfig::default()).unwrap();

    let user = site.create_user("anders", "secret").await.unwrap();
    let channels = site
        .add_channels(&user, &["Rust".to_string()])
        .await
        .unwrap();
    let body = "https://doc.rust-lang.org/book/  read chapter 16";
    let post = site.add_post(&user, body, &channels).await.unwrap();

    let add = recorder
        .calls()
        .into_iter()
        .find(|c| c.op == "add_post")
        .unwrap();
    assert_eq!(add.detail, format!("{}|{}", body, channels[0].id));
    assert_eq!(post.body, body);
    assert_eq!(post.channels, channels);

    dispatcher.shutdown().await.unwrap();
}

#[tokio::test]
async fn engine_errors_pass_through() {
    let (site, dispatcher) =
        Site::spawn(InMemoryEngine::new(), &DispatcherConfig::default()).unwrap();

    let err = site.get_user("nobody").await.unwrap_err();
    assert!(matches!(
        err,
        SiteError::Storage(StorageError::UserNotFound(ref name)) if name == "nobody"
    ));
    // Display is the engine's own message
    assert_eq!(
        err.to_string(),
        StorageError::UserNotFound("nobody".to_string()).to_string()
    );

    let err = site.create_user("", "pw").await.unwrap_err();
    assert!(matches!(err, SiteError::Storage(StorageError::InvalidInput(_))));

    // A failed call does not disturb the next one
    site.create_user("nobody", "pw").await.unwrap();
    assert_eq!(site.get_user("nobody").await.unwrap().username, "nobody");
    assert_eq!(site.metrics().snapshot().errors_total, 2);

    dispatcher.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn replies_reach_their_own_callers() {
    const N: usize = 64;

    let (site, dispatcher) =
        Site::spawn(InMemoryEngine::new(), &DispatcherConfig::default()).unwrap();

    let mut tasks = Vec::new();
    for i in 0..N {
        let site = site.clone();
        tasks.push(tokio::spawn(async move {
            let name = format!("user-{i}");
            let created = site.create_user(&name, "pw").await.unwrap();
            assert_eq!(created.username, name);
            let fetched = site.get_user(&name).await.unwrap();
            assert_eq!(fetched, created);
            let by_id = site.get_user_by_id(created.id).await.unwrap();
            assert_eq!(by_id.username, name);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(site.get_all_users().await.unwrap().len(), N);
    dispatcher.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn small_queues_apply_backpressure_without_loss() {
    let config = DispatcherConfig {
        queue_depth: 1,
        ..DispatcherConfig::default()
    };
    let (site, dispatcher) = Site::spawn(InMemoryEngine::new(), &config).unwrap();
    let user = site.create_user("anders", "secret").await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..20 {
        let site = site.clone();
        let user = user.clone();
        tasks.push(tokio::spawn(async move {
            site.add_post(&user, &format!("queued {i}"), &[]).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let posts = site
        .get_all_user_posts(&user, Page::new(100, 0))
        .await
        .unwrap();
    assert_eq!(posts.len(), 20);

    dispatcher.shutdown().await.unwrap();
}
