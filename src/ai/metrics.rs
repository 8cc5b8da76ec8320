//! Flow Metrics Collection
//!
//! Thread-safe counters for flow executions: invocations, model successes,
//! fallbacks by reason, tool traffic, input rejections, tokens and latency.
//! One collector is shared via `Arc` by every flow of a [`crate::PetPal`].
//!
//! ```ignore
//! let metrics = create_shared_metrics();
//! metrics.record_invocation("nameGenerator");
//! metrics.record_fallback("nameGenerator", FallbackReason::EmptyResult);
//! println!("{}", metrics.summary().display());
//! ```

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::time::Instant;

use crate::ai::provider::TokenUsage;
use crate::types::FallbackReason;

// =============================================================================
// Collector
// =============================================================================

/// Thread-safe flow metrics
///
/// Totals use atomics; per-flow breakdowns sit behind a `RwLock`.
#[derive(Debug)]
pub struct FlowMetrics {
    start_time: Instant,
    model_calls: AtomicU32,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    total_latency_ms: AtomicU64,
    flows: RwLock<BTreeMap<String, FlowStats>>,
}

/// Counters for one flow
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowStats {
    pub invocations: u32,
    pub model_successes: u32,
    pub input_rejections: u32,
    pub fallback_invalid_media: u32,
    pub fallback_no_output: u32,
    pub fallback_schema_violation: u32,
    pub fallback_backend_error: u32,
    pub fallback_empty_result: u32,
    pub retries: u32,
    pub tool_calls: u32,
    pub tool_errors: u32,
}

impl FlowStats {
    pub fn fallbacks(&self) -> u32 {
        self.fallback_invalid_media
            + self.fallback_no_output
            + self.fallback_schema_violation
            + self.fallback_backend_error
            + self.fallback_empty_result
    }
}

/// Point-in-time view of all counters
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub total_duration_ms: u64,
    pub model_calls: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub avg_latency_ms: f64,
    pub flows: BTreeMap<String, FlowStats>,
}

impl Default for FlowMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            model_calls: AtomicU32::new(0),
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
            flows: RwLock::new(BTreeMap::new()),
        }
    }

    fn flows_mut(&self) -> RwLockWriteGuard<'_, BTreeMap<String, FlowStats>> {
        self.flows.write().unwrap_or_else(|poisoned| {
            tracing::error!("Metrics flows RwLock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn update(&self, flow: &str, f: impl FnOnce(&mut FlowStats)) {
        let mut flows = self.flows_mut();
        f(flows.entry(flow.to_string()).or_default());
    }

    pub fn record_invocation(&self, flow: &str) {
        self.update(flow, |s| s.invocations += 1);
    }

    pub fn record_input_rejected(&self, flow: &str) {
        self.update(flow, |s| s.input_rejections += 1);
    }

    pub fn record_retry(&self, flow: &str) {
        self.update(flow, |s| s.retries += 1);
    }

    /// Schema-valid output produced by the model
    pub fn record_model_success(&self, flow: &str) {
        self.update(flow, |s| s.model_successes += 1);
    }

    pub fn record_fallback(&self, flow: &str, reason: FallbackReason) {
        self.update(flow, |s| match reason {
            FallbackReason::InvalidMedia => s.fallback_invalid_media += 1,
            FallbackReason::NoOutput => s.fallback_no_output += 1,
            FallbackReason::SchemaViolation => s.fallback_schema_violation += 1,
            FallbackReason::BackendError => s.fallback_backend_error += 1,
            FallbackReason::EmptyResult => s.fallback_empty_result += 1,
        });
    }

    pub fn record_tool_calls(&self, flow: &str, calls: u32, errors: u32) {
        self.update(flow, |s| {
            s.tool_calls += calls;
            s.tool_errors += errors;
        });
    }

    /// Usage and latency of backend turns
    pub fn record_usage(&self, turns: u32, usage: &TokenUsage, latency_ms: u64) {
        self.model_calls.fetch_add(turns, Ordering::Relaxed);
        self.input_tokens
            .fetch_add(usage.input_tokens as u64, Ordering::Relaxed);
        self.output_tokens
            .fetch_add(usage.output_tokens as u64, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(latency_ms, Ordering::Relaxed);
    }

    /// Counters for one flow (zeroed if the flow never ran)
    pub fn flow(&self, flow: &str) -> FlowStats {
        self.flows
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(flow)
            .cloned()
            .unwrap_or_default()
    }

    pub fn summary(&self) -> MetricsSummary {
        let model_calls = self.model_calls.load(Ordering::Relaxed);
        let input_tokens = self.input_tokens.load(Ordering::Relaxed);
        let output_tokens = self.output_tokens.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);

        let avg_latency_ms = if model_calls > 0 {
            total_latency as f64 / model_calls as f64
        } else {
            0.0
        };

        let flows = self
            .flows
            .read()
            .unwrap_or_else(|poisoned| {
                tracing::error!("Metrics flows RwLock poisoned on read, recovering");
                poisoned.into_inner()
            })
            .clone();

        MetricsSummary {
            total_duration_ms: self.start_time.elapsed().as_millis() as u64,
            model_calls,
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            avg_latency_ms,
            flows,
        }
    }
}

impl MetricsSummary {
    /// Format summary for display
    pub fn display(&self) -> String {
        let mut out = format!(
            "Model Calls: {}\n\
             Tokens: {} (input: {}, output: {})\n\
             Avg Latency: {:.0}ms",
            self.model_calls,
            self.total_tokens,
            self.input_tokens,
            self.output_tokens,
            self.avg_latency_ms,
        );
        for (name, stats) in &self.flows {
            out.push_str(&format!(
                "\n{}: {} invocation(s), {} fallback(s), {} tool call(s)",
                name,
                stats.invocations,
                stats.fallbacks(),
                stats.tool_calls
            ));
        }
        out
    }
}

/// Shared metrics handle
pub type SharedMetrics = Arc<FlowMetrics>;

pub fn create_shared_metrics() -> SharedMetrics {
    Arc::new(FlowMetrics::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_flow_counters() {
        let metrics = FlowMetrics::new();
        metrics.record_invocation("symptomChecker");
        metrics.record_invocation("symptomChecker");
        metrics.record_model_success("symptomChecker");
        metrics.record_fallback("symptomChecker", FallbackReason::NoOutput);
        metrics.record_tool_calls("symptomChecker", 2, 1);
        metrics.record_input_rejected("queryAssistant");

        let stats = metrics.flow("symptomChecker");
        assert_eq!(stats.invocations, 2);
        assert_eq!(stats.model_successes, 1);
        assert_eq!(stats.fallbacks(), 1);
        assert_eq!(stats.fallback_no_output, 1);
        assert_eq!(stats.tool_calls, 2);
        assert_eq!(stats.tool_errors, 1);
        assert_eq!(metrics.flow("queryAssistant").input_rejections, 1);
        assert_eq!(metrics.flow("unknown"), FlowStats::default());
    }

    #[test]
    fn test_concurrent_recording() {
        use std::thread;

        let metrics = create_shared_metrics();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let m = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..100 {
                        m.record_invocation("nameGenerator");
                        m.record_usage(1, &TokenUsage::new(10, 5), 50);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let summary = metrics.summary();
        assert_eq!(summary.model_calls, 1000);
        assert_eq!(summary.total_tokens, 15000);
        assert!((summary.avg_latency_ms - 50.0).abs() < f64::EPSILON);
        assert_eq!(summary.flows["nameGenerator"].invocations, 1000);
    }

    #[test]
    fn test_summary_display() {
        let metrics = FlowMetrics::new();
        metrics.record_usage(1, &TokenUsage::new(1000, 500), 1000);
        metrics.record_invocation("breedIdentifier");

        let display = metrics.summary().display();
        assert!(display.contains("1500"));
        assert!(display.contains("breedIdentifier: 1 invocation(s)"));
    }
}
