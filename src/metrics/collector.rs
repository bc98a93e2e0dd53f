//! # Collector de Métricas
//! src/metrics/collector.rs
//!
//! Contadores por status y percentiles de latencia. Lo usan el servidor
//! (`/api/stats`) y el cliente `loadtest` para su resumen.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Latencias que se guardan para calcular percentiles
const MAX_LATENCIES: usize = 10_000;

/// Collector de métricas thread-safe
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsData>>,
    start_time: Instant,
}

/// Datos internos de métricas
struct MetricsData {
    /// Respuestas con status
    total_requests: u64,

    /// Conexiones sin status (timeout, error de transporte)
    failures: u64,

    /// Requests por código de estado
    status_codes: HashMap<u16, u64>,

    /// Bytes de body enviados/recibidos
    bytes: u64,

    /// Últimas latencias en microsegundos
    latencies: VecDeque<u64>,
}

/// Resumen de latencias (microsegundos)
#[derive(Debug, Clone, Default, Serialize)]
pub struct LatencySummary {
    pub min: u64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub max: u64,
    pub avg: u64,
    pub stddev: f64,
    pub samples: usize,
}

/// Snapshot de métricas (para uso externo)
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub total_requests: u64,
    pub failures: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub bytes: u64,
    pub latency_us: LatencySummary,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsData {
                total_requests: 0,
                failures: 0,
                status_codes: HashMap::new(),
                bytes: 0,
                latencies: VecDeque::with_capacity(MAX_LATENCIES),
            })),
            start_time: Instant::now(),
        }
    }

    /// Registra una respuesta completa
    pub fn record_request(&self, status_code: u16, latency: Duration, bytes: u64) {
        let mut data = self.lock();
        data.total_requests += 1;
        *data.status_codes.entry(status_code).or_insert(0) += 1;
        data.bytes += bytes;
        Self::push_latency(&mut data, latency);
    }

    /// Registra una conexión que terminó sin status
    pub fn record_failure(&self, latency: Duration) {
        let mut data = self.lock();
        data.failures += 1;
        Self::push_latency(&mut data, latency);
    }

    fn push_latency(data: &mut MetricsData, latency: Duration) {
        if data.latencies.len() >= MAX_LATENCIES {
            data.latencies.pop_front();
        }
        data.latencies.push_back(latency.as_micros() as u64);
    }

    /// Obtiene un snapshot de las métricas
    pub fn snapshot(&self) -> MetricsSnapshot {
        let data = self.lock();
        let latencies: Vec<u64> = data.latencies.iter().copied().collect();

        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            total_requests: data.total_requests,
            failures: data.failures,
            status_codes: data.status_codes.iter().map(|(k, v)| (*k, *v)).collect(),
            bytes: data.bytes,
            latency_us: summarize(&latencies),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MetricsData> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Percentiles, promedio y desviación estándar
pub fn summarize(latencies: &[u64]) -> LatencySummary {
    if latencies.is_empty() {
        return LatencySummary::default();
    }

    let mut sorted = latencies.to_vec();
    sorted.sort_unstable();

    let len = sorted.len();
    let percentile = |p: usize| sorted[(len * p / 100).min(len - 1)];

    let sum: u64 = sorted.iter().sum();
    let avg = sum / len as u64;

    let variance = sorted
        .iter()
        .map(|&x| {
            let diff = x as f64 - avg as f64;
            diff * diff
        })
        .sum::<f64>()
        / len as f64;

    LatencySummary {
        min: sorted[0],
        p50: percentile(50),
        p95: percentile(95),
        p99: percentile(99),
        max: sorted[len - 1],
        avg,
        stddev: variance.sqrt(),
        samples: len,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector() {
        let collector = MetricsCollector::new();

        collector.record_request(200, Duration::from_millis(10), 12);
        collector.record_request(200, Duration::from_millis(20), 4);
        collector.record_request(404, Duration::from_millis(5), 0);
        collector.record_failure(Duration::from_millis(30));

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.status_codes.get(&200), Some(&2));
        assert_eq!(snapshot.status_codes.get(&404), Some(&1));
        assert_eq!(snapshot.bytes, 16);
        assert_eq!(snapshot.latency_us.samples, 4);
    }

    #[test]
    fn test_percentiles() {
        let latencies: Vec<u64> = (1..=100).collect();
        let summary = summarize(&latencies);

        assert_eq!(summary.min, 1);
        assert_eq!(summary.max, 100);
        assert!(summary.p95 > summary.p50);
        assert!(summary.p99 > summary.p95);
        assert_eq!(summary.avg, 50);
    }

    #[test]
    fn test_single_sample() {
        let summary = summarize(&[42]);
        assert_eq!(summary.p50, 42);
        assert_eq!(summary.p99, 42);
        assert_eq!(summary.stddev, 0.0);
    }

    #[test]
    fn test_empty() {
        let summary = summarize(&[]);
        assert_eq!(summary.samples, 0);
        assert_eq!(summary.max, 0);
    }

    #[test]
    fn test_latency_window_management() {
        let collector = MetricsCollector::new();
        for i in 0..15_000 {
            collector.record_request(200, Duration::from_micros(i), 0);
        }

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.total_requests, 15_000);
        assert_eq!(snapshot.latency_us.samples, MAX_LATENCIES);
        assert_eq!(snapshot.latency_us.min, 5_000);
    }

    #[test]
    fn test_snapshot_serializes() {
        let collector = MetricsCollector::new();
        collector.record_request(200, Duration::from_millis(1), 1);

        let json = serde_json::to_value(collector.snapshot()).unwrap();
        assert_eq!(json["total_requests"], 1);
        assert_eq!(json["status_codes"]["200"], 1);
    }
}
