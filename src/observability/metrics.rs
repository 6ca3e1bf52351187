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

/// Prometheus metrics definitions for finch
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

lazy_static! {
    // ============================================================================
    // Dispatcher Metrics
    // ============================================================================

    /// Time the engine spent on one command, measured on the dispatcher thread
    pub static ref DISPATCHER_OP_DURATION: HistogramVec = register_histogram_vec!(
        "dispatcher_op_duration_seconds",
        "Storage engine time per dispatched command in seconds",
        &["op"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]
    ).unwrap();

    /// Commands executed by the dispatcher
    pub static ref DISPATCHER_OPS_TOTAL: CounterVec = register_counter_vec!(
        "dispatcher_ops_total",
        "Total commands executed by the storage dispatcher",
        &["op", "outcome"]
    ).unwrap();

    // ============================================================================
    // Site Metrics
    // ============================================================================

    /// Calls made through the site facade, by how they ended
    pub static ref SITE_CALLS_TOTAL: CounterVec = register_counter_vec!(
        "site_calls_total",
        "Total storage calls made through the site",
        &["op", "result"]
    ).unwrap();
}

/// Record one executed command
pub fn record_dispatcher_op(op: &str, outcome: &str, duration: f64) {
    DISPATCHER_OP_DURATION
        .with_label_values(&[op])
        .observe(duration);
    DISPATCHER_OPS_TOTAL
        .with_label_values(&[op, outcome])
        .inc();
}

/// Increment the site call counter. `result` is "ok", "storage_error",
/// "closed" or "timeout".
pub fn increment_site_call(op: &str, result: &str) {
    SITE_CALLS_TOTAL.with_label_values(&[op, result]).inc();
}

/// Gather all metrics for Prometheus exposition
pub fn gather_metrics() -> Vec<u8> {
    use prometheus::Encoder;
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "failed to encode prometheus metrics");
    }
    buffer
}
