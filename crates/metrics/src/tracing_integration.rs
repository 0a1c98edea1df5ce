//! Tracing integration for metrics.
//!
//! This module provides integration between the `tracing` and `metrics` crates,
//! allowing metrics to be automatically labeled with span context.

#[cfg(feature = "tracing")]
use metrics_tracing_context::MetricsLayer;

/// A `tracing_subscriber` layer that propagates span labels (mud, channel,
/// message type, ...) onto the metrics recorded while that span is active.
///
/// Returned rather than installed directly: the caller already owns its
/// subscriber registry (see `mudvault` CLI's `init_telemetry`) and composes
/// this layer alongside its own filter and formatter with `.with(...)`.
#[cfg(feature = "tracing")]
#[must_use]
pub fn metrics_layer<S>() -> MetricsLayer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    MetricsLayer::new()
}

/// Labels that are propagated from tracing spans to metrics.
///
/// When using the tracing integration, these span fields will
/// automatically be added as metric labels.
pub mod span_labels {
    /// The span name/target
    pub const SPAN_NAME: &str = "span.name";
    /// The operation being performed
    pub const OPERATION: &str = "operation";
    /// The component/module
    pub const COMPONENT: &str = "component";
}
