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

/// Health checks run through the site
use serde::{Deserialize, Serialize};

use crate::actor::{MetricsSnapshot, Site};
use crate::storage::Page;

/// Overall health status
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
    pub checks: Vec<HealthCheck>,
}

/// Individual health check result
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: String,
    pub message: Option<String>,
    pub duration_ms: f64,
}

/// Check that the dispatcher answers a one-row read
pub async fn check_site_health(site: &Site) -> HealthCheck {
    let start = std::time::Instant::now();

    match site.get_all_posts(Page::new(1, 0)).await {
        Ok(_) => HealthCheck {
            name: "storage".to_string(),
            status: "healthy".to_string(),
            message: None,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
        },
        Err(e) => HealthCheck {
            name: "storage".to_string(),
            status: "unhealthy".to_string(),
            message: Some(format!("Storage check failed: {}", e)),
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
        },
    }
}

/// Healthy only if every check is
pub fn health_status(checks: Vec<HealthCheck>) -> HealthStatus {
    let all_healthy = checks.iter().all(|c| c.status == "healthy");

    HealthStatus {
        status: if all_healthy {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        timestamp: chrono::Utc::now().to_rfc3339(),
        checks,
    }
}

/// Run every check against `site`
pub async fn get_health_status(site: &Site) -> HealthStatus {
    health_status(vec![check_site_health(site).await])
}

/// Health plus the dispatcher counters, as printed by `finch metrics`
#[derive(Debug, Serialize)]
pub struct SiteReport {
    pub health: HealthStatus,
    pub dispatcher: MetricsSnapshot,
}

/// The counters are read after the health round trip, so they include it
pub async fn get_site_report(site: &Site) -> SiteReport {
    let health = get_health_status(site).await;
    SiteReport {
        health,
        dispatcher: site.metrics().snapshot(),
    }
}
