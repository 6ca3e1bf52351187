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

//! Lock-free dispatcher counters
//!
//! Shared between the site handles and the dispatcher thread; every update is
//! a relaxed atomic add.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    // Actor health
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,

    // Executed commands by queue
    pub reads: AtomicU64,
    pub writes: AtomicU64,

    // Outcomes
    pub errors_total: AtomicU64,
    pub replies_abandoned: AtomicU64,
    pub messages_timeout: AtomicU64,
}

/// Point-in-time copy of [`Metrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub reads: u64,
    pub writes: u64,
    pub errors_total: u64,
    pub replies_abandoned: u64,
    pub messages_timeout: u64,
    pub queue_depth: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reply_abandoned(&self) {
        self.replies_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_message_timeout(&self) {
        self.messages_timeout.fetch_add(1, Ordering::Relaxed);
    }

    /// Commands submitted but not yet picked up by the dispatcher
    pub fn get_message_queue_depth(&self) -> u64 {
        let sent = self.messages_sent.load(Ordering::Relaxed);
        let received = self.messages_received.load(Ordering::Relaxed);
        sent.saturating_sub(received)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            errors_total: self.errors_total.load(Ordering::Relaxed),
            replies_abandoned: self.replies_abandoned.load(Ordering::Relaxed),
            messages_timeout: self.messages_timeout.load(Ordering::Relaxed),
            queue_depth: self.get_message_queue_depth(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_depth_never_negative() {
        let m = Metrics::new();
        m.inc_message_received();
        assert_eq!(m.get_message_queue_depth(), 0);
        m.inc_message_sent();
        m.inc_message_sent();
        assert_eq!(m.get_message_queue_depth(), 1);
    }
}
