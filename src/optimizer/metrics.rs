//! Request metrics and threshold reporting.
//!
//! Breaches are reported, never acted on.

use crate::cache::CacheStats;
use crate::config::ThresholdConfig;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default)]
struct EndpointCounters {
    requests: u64,
    errors: u64,
    total: Duration,
    slowest: Duration,
}

/// Per-endpoint request counters
#[derive(Debug, Default)]
pub struct RequestMetrics {
    endpoints: Mutex<HashMap<String, EndpointCounters>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointReport {
    pub endpoint: String,
    pub requests: u64,
    pub errors: u64,
    pub error_rate: f64,
    pub average_response_time_seconds: f64,
    pub max_response_time_seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMetric {
    ResponseTime,
    CacheHitRate,
    ErrorRate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBreach {
    pub metric: ThresholdMetric,
    /// Endpoint the breach was observed on, `None` for process-wide metrics
    pub endpoint: Option<String>,
    pub observed: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub generated_at: DateTime<Utc>,
    pub total_requests: u64,
    pub error_rate: f64,
    pub average_response_time_seconds: f64,
    pub cache_hit_rate: Option<f64>,
    pub endpoints: Vec<EndpointReport>,
    pub breaches: Vec<ThresholdBreach>,
}

impl PerformanceReport {
    pub fn is_within_thresholds(&self) -> bool {
        self.breaches.is_empty()
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, endpoint: &str, duration: Duration, success: bool) {
        let mut endpoints = self.endpoints.lock();
        let counters = endpoints.entry(endpoint.to_string()).or_default();
        counters.requests += 1;
        if !success {
            counters.errors += 1;
        }
        counters.total += duration;
        counters.slowest = counters.slowest.max(duration);
    }

    pub fn total_requests(&self) -> u64 {
        self.endpoints.lock().values().map(|c| c.requests).sum()
    }

    pub fn reset(&self) {
        self.endpoints.lock().clear();
    }

    /// Summarize recorded requests and compare them against `thresholds`
    pub fn performance_report(
        &self,
        thresholds: &ThresholdConfig,
        cache_stats: Option<&CacheStats>,
        now: DateTime<Utc>,
    ) -> PerformanceReport {
        let snapshot: Vec<(String, EndpointCounters)> = {
            let endpoints = self.endpoints.lock();
            endpoints.iter().map(|(k, v)| (k.clone(), *v)).collect()
        };

        let mut breaches = Vec::new();
        let mut endpoints: Vec<EndpointReport> = snapshot
            .into_iter()
            .map(|(endpoint, counters)| {
                let average = if counters.requests == 0 {
                    0.0
                } else {
                    counters.total.as_secs_f64() / counters.requests as f64
                };
                EndpointReport {
                    endpoint,
                    requests: counters.requests,
                    errors: counters.errors,
                    error_rate: ratio(counters.errors, counters.requests),
                    average_response_time_seconds: average,
                    max_response_time_seconds: counters.slowest.as_secs_f64(),
                }
            })
            .collect();
        endpoints.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));

        for report in &endpoints {
            if report.average_response_time_seconds > thresholds.max_response_time_seconds {
                breaches.push(ThresholdBreach {
                    metric: ThresholdMetric::ResponseTime,
                    endpoint: Some(report.endpoint.clone()),
                    observed: report.average_response_time_seconds,
                    threshold: thresholds.max_response_time_seconds,
                });
            }
        }

        let total_requests: u64 = endpoints.iter().map(|e| e.requests).sum();
        let total_errors: u64 = endpoints.iter().map(|e| e.errors).sum();
        let total_seconds: f64 = endpoints
            .iter()
            .map(|e| e.average_response_time_seconds * e.requests as f64)
            .sum();
        let error_rate = ratio(total_errors, total_requests);

        if total_requests > 0 && error_rate > thresholds.max_error_rate {
            breaches.push(ThresholdBreach {
                metric: ThresholdMetric::ErrorRate,
                endpoint: None,
                observed: error_rate,
                threshold: thresholds.max_error_rate,
            });
        }

        let cache_hit_rate = cache_stats.and_then(CacheStats::hit_rate);
        if let Some(hit_rate) = cache_hit_rate {
            if hit_rate < thresholds.min_cache_hit_rate {
                breaches.push(ThresholdBreach {
                    metric: ThresholdMetric::CacheHitRate,
                    endpoint: None,
                    observed: hit_rate,
                    threshold: thresholds.min_cache_hit_rate,
                });
            }
        }

        PerformanceReport {
            generated_at: now,
            total_requests,
            error_rate,
            average_response_time_seconds: if total_requests == 0 {
                0.0
            } else {
                total_seconds / total_requests as f64
            },
            cache_hit_rate,
            endpoints,
            breaches,
        }
    }
}
