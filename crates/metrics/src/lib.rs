//! Metrics collection and export for the gateway.
//!
//! This crate provides a unified metrics interface using the `metrics` crate facade.
//! When the `prometheus` feature is enabled, metrics are exported in Prometheus format.
//! When the `tracing` feature is enabled, span context is propagated to metrics labels.
//!
//! # Usage
//!
//! ```rust,ignore
//! use mudvault_metrics::{counter, gauge};
//!
//! counter!(mudvault_metrics::routing::MESSAGES_ROUTED_TOTAL).increment(1);
//! gauge!(mudvault_metrics::connections::ACTIVE).set(42.0);
//! ```
//!
//! # Features
//!
//! - `prometheus`: Enable Prometheus metrics export via `/metrics` endpoint
//! - `tracing`: Enable tracing span context propagation to metrics labels

mod definitions;
mod recorder;
mod snapshot;
pub mod tracing_integration;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
    snapshot::{MetricSnapshot, MetricType, MetricsSnapshot},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
