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

//! Single-writer access to storage
//!
//! The storage engine is owned by one dispatcher running on its own thread.
//! Everything else talks to it through [`Site`], which turns each call into a
//! message and waits for the reply. The engine is never shared and never
//! locked.

pub mod dispatcher;
pub mod messages;
pub mod metrics;
pub mod site;

pub use dispatcher::{Dispatcher, DispatcherHandle};
pub use messages::{Command, CommandKind, Reply};
pub use metrics::{Metrics, MetricsSnapshot};
pub use site::{Site, SiteError};
