//! # Sistema de Métricas
//! src/metrics/mod.rs
//!
//! - Contadores de requests por status
//! - Latencias (min, p50, p95, p99, max)
//! - Bytes transferidos

pub mod collector;

pub use collector::{summarize, LatencySummary, MetricsCollector, MetricsSnapshot};
