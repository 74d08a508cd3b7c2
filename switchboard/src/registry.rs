//! Named table of tool-server endpoints with health and per-service
//! metrics.
//!
//! Mutated by health checks and by each call outcome; readers take
//! snapshots and may observe slightly stale values.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Smoothing factor for the response-time EMA.
const EMA_ALPHA: f64 = 0.3;

/// Transport kind a service speaks: bidirectional framed RPC or one-shot
/// HTTP request/response. Mandatory at registration time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Rpc,
    Http,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Connecting,
    Healthy,
    Unhealthy,
    Disconnected,
    Error,
}

impl Default for HealthStatus {
    fn default() -> Self {
        HealthStatus::Unknown
    }
}

/// One registered service endpoint. Created at registration, mutated by
/// health checks and call outcomes, dropped on shutdown.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub kind: ServiceKind,
    #[serde(default)]
    pub health: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_seen: Option<DateTime<Utc>>,
    /// Exponentially smoothed seconds per call.
    #[serde(default)]
    pub response_time: f64,
    #[serde(default)]
    pub error_count: u64,
    #[serde(default)]
    pub request_count: u64,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ServiceInfo {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        capabilities: Vec<String>,
        kind: ServiceKind,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            capabilities,
            kind,
            health: HealthStatus::Unknown,
            last_seen: None,
            response_time: 0.0,
            error_count: 0,
            request_count: 0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn error_rate(&self) -> f64 {
        self.error_count as f64 / (self.request_count.max(1)) as f64
    }
}

/// Per-service analytics snapshot served by the orchestrator.
#[derive(Clone, Debug, Serialize)]
pub struct ServiceAnalytics {
    pub response_time: f64,
    pub error_count: u64,
    pub error_rate: f64,
    pub health_status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl From<&ServiceInfo> for ServiceAnalytics {
    fn from(service: &ServiceInfo) -> Self {
        Self {
            response_time: service.response_time,
            error_count: service.error_count,
            error_rate: service.error_rate(),
            health_status: service.health,
            last_seen: service.last_seen,
        }
    }
}

/// Registry of services keyed by name.
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, ServiceInfo>>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, service: ServiceInfo) {
        self.services
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(service.name.clone(), service);
    }

    pub fn get(&self, name: &str) -> Option<ServiceInfo> {
        self.services
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.services
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Full snapshot, sorted by name for stable output.
    pub fn snapshot(&self) -> Vec<ServiceInfo> {
        let mut services: Vec<_> = self
            .services
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }

    /// Records a successful call: EMA the response time, mark healthy.
    pub fn record_success(&self, name: &str, elapsed: Duration) {
        self.with_service(name, |s| {
            s.request_count += 1;
            s.response_time = ema(s.response_time, elapsed.as_secs_f64());
            s.health = HealthStatus::Healthy;
            s.last_seen = Some(Utc::now());
        });
    }

    /// Records a failed call: bump the error counter, mark errored.
    pub fn record_failure(&self, name: &str, elapsed: Option<Duration>) {
        self.with_service(name, |s| {
            s.request_count += 1;
            s.error_count += 1;
            if let Some(elapsed) = elapsed {
                s.response_time = ema(s.response_time, elapsed.as_secs_f64());
            }
            s.health = HealthStatus::Error;
            s.last_seen = Some(Utc::now());
        });
    }

    /// Records a health-probe outcome without touching the call counters.
    pub fn record_probe(&self, name: &str, health: HealthStatus, elapsed: Duration) {
        self.with_service(name, |s| {
            if health == HealthStatus::Error {
                s.error_count += 1;
            }
            s.health = health;
            s.response_time = ema(s.response_time, elapsed.as_secs_f64());
            s.last_seen = Some(Utc::now());
        });
    }

    pub fn set_health(&self, name: &str, health: HealthStatus) {
        self.with_service(name, |s| {
            s.health = health;
            s.last_seen = Some(Utc::now());
        });
    }

    /// Analytics for one service, or for all when `name` is None.
    pub fn analytics(&self, name: Option<&str>) -> BTreeMap<String, ServiceAnalytics> {
        let services = self.services.read().unwrap_or_else(|e| e.into_inner());
        services
            .values()
            .filter(|s| name.map_or(true, |n| s.name == n))
            .map(|s| (s.name.clone(), ServiceAnalytics::from(s)))
            .collect()
    }

    fn with_service(&self, name: &str, apply: impl FnOnce(&mut ServiceInfo)) {
        let mut services = self.services.write().unwrap_or_else(|e| e.into_inner());
        if let Some(service) = services.get_mut(name) {
            apply(service);
        }
    }
}

fn ema(previous: f64, sample: f64) -> f64 {
    if previous == 0.0 {
        sample
    } else {
        EMA_ALPHA * sample + (1.0 - EMA_ALPHA) * previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_one() -> ServiceRegistry {
        let registry = ServiceRegistry::new();
        registry.register(ServiceInfo::new(
            "audio",
            "localhost",
            8082,
            vec!["music".into()],
            ServiceKind::Http,
        ));
        registry
    }

    #[test]
    fn success_updates_metrics_and_health() {
        let registry = registry_with_one();
        registry.record_success("audio", Duration::from_millis(200));
        let s = registry.get("audio").unwrap();
        assert_eq!(s.health, HealthStatus::Healthy);
        assert_eq!(s.request_count, 1);
        assert!(s.last_seen.is_some());
        assert!((s.response_time - 0.2).abs() < 1e-9);

        // Second sample is smoothed, not overwritten.
        registry.record_success("audio", Duration::from_millis(400));
        let s = registry.get("audio").unwrap();
        assert!(s.response_time > 0.2 && s.response_time < 0.4);
    }

    #[test]
    fn failure_increments_errors_and_error_rate() {
        let registry = registry_with_one();
        registry.record_success("audio", Duration::from_millis(100));
        registry.record_failure("audio", None);
        let s = registry.get("audio").unwrap();
        assert_eq!(s.error_count, 1);
        assert_eq!(s.request_count, 2);
        assert_eq!(s.health, HealthStatus::Error);
        assert!((s.error_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn analytics_filters_by_name() {
        let registry = registry_with_one();
        registry.register(ServiceInfo::new(
            "hardware",
            "localhost",
            8084,
            vec![],
            ServiceKind::Rpc,
        ));
        assert_eq!(registry.analytics(None).len(), 2);
        let one = registry.analytics(Some("audio"));
        assert_eq!(one.len(), 1);
        assert!(one.contains_key("audio"));
    }

    #[test]
    fn unknown_service_is_ignored_by_recorders() {
        let registry = registry_with_one();
        registry.record_success("nope", Duration::from_millis(1));
        assert!(registry.get("nope").is_none());
    }
}
