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

/// Integration tests for observability features
///
/// These tests verify:
/// - Health checks go through the dispatcher
/// - Dispatcher and site metrics are recorded in Prometheus format
use finch::config::DispatcherConfig;
use finch::observability::{health, metrics};
use finch::storage::InMemoryEngine;
use finch::Site;

#[tokio::test]
async fn test_health_reports_running_dispatcher() {
    let (site, dispatcher) =
        Site::spawn(InMemoryEngine::new(), &DispatcherConfig::default()).unwrap();

    let status = health::get_health_status(&site).await;
    assert_eq!(status.status, "healthy");
    assert_eq!(status.checks.len(), 1);
    assert_eq!(status.checks[0].name, "storage");
    assert!(status.checks[0].message.is_none());

    dispatcher.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_health_reports_stopped_dispatcher() {
    let (site, dispatcher) =
        Site::spawn(InMemoryEngine::new(), &DispatcherConfig::default()).unwrap();
    dispatcher.shutdown().await.unwrap();

    let check = health::check_site_health(&site).await;
    assert_eq!(check.status, "unhealthy");
    assert!(check.message.unwrap().contains("not running"));
}

#[tokio::test]
async fn test_metrics_record_dispatched_operations() {
    let (site, dispatcher) =
        Site::spawn(InMemoryEngine::new(), &DispatcherConfig::default()).unwrap();

    site.create_user("anders", "secret").await.unwrap();
    let _ = site.get_user("nobody").await;

    let output = String::from_utf8(metrics::gather_metrics()).unwrap();
    assert!(output.contains("# TYPE dispatcher_ops_total counter"));
    assert!(output.contains("dispatcher_op_duration_seconds"));
    assert!(output.contains("op=\"create_user\""));
    assert!(output.contains("result=\"storage_error\""));

    let snapshot = site.metrics().snapshot();
    assert_eq!(snapshot.writes, 1);
    assert_eq!(snapshot.reads, 1);
    assert_eq!(snapshot.errors_total, 1);

    dispatcher.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_site_report_carries_health_and_counters() {
    let (site, dispatcher) =
        Site::spawn(InMemoryEngine::new(), &DispatcherConfig::default()).unwrap();
    site.create_user("anders", "secret").await.unwrap();

    let report = health::get_site_report(&site).await;
    assert_eq!(report.health.status, "healthy");
    assert_eq!(report.dispatcher.writes, 1);
    assert_eq!(report.dispatcher.reads, 1);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["health"]["status"], "healthy");
    assert_eq!(json["health"]["checks"][0]["name"], "storage");
    assert_eq!(json["dispatcher"]["reads"], 1);

    dispatcher.shutdown().await.unwrap();

    // a stopped dispatcher still yields a report
    let report = health::get_site_report(&site).await;
    assert_eq!(report.health.status, "unhealthy");
    assert_eq!(report.dispatcher.reads, 1);
}
