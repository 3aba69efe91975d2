//! Prometheus metrics for the ticket pipeline

use axum::http::StatusCode;
use axum::response::IntoResponse;
use lazy_static::lazy_static;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Registry, TextEncoder};
use std::sync::OnceLock;
use tracing::warn;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}

static PIPELINE_RUNS: OnceLock<IntCounterVec> = OnceLock::new();
static STEP_DURATION: OnceLock<HistogramVec> = OnceLock::new();
static EMBEDDINGS_GENERATED: OnceLock<IntCounter> = OnceLock::new();
static EXTRACTION_FAILURES: OnceLock<IntCounter> = OnceLock::new();

/// Register all collectors. Idempotent; recording before this call is a no-op.
pub fn init_metrics() {
    let runs = PIPELINE_RUNS.get_or_init(|| {
        IntCounterVec::new(
            prometheus::opts!("pipeline_runs_total", "Ticket pipeline runs by workflow and outcome"),
            &["workflow", "outcome"],
        )
        .expect("static metric definition")
    });

    let step_duration = STEP_DURATION.get_or_init(|| {
        HistogramVec::new(
            HistogramOpts::new("llm_step_duration_seconds", "Latency of structured LLM steps"),
            &["step"],
        )
        .expect("static metric definition")
    });

    let embeddings = EMBEDDINGS_GENERATED.get_or_init(|| {
        IntCounter::new("embeddings_generated_total", "Vectors fetched from the embedding provider")
            .expect("static metric definition")
    });

    let extraction_failures = EXTRACTION_FAILURES.get_or_init(|| {
        IntCounter::new(
            "attachment_extraction_failures_total",
            "Attachments whose text could not be extracted",
        )
        .expect("static metric definition")
    });

    REGISTRY.register(Box::new(runs.clone())).ok();
    REGISTRY.register(Box::new(step_duration.clone())).ok();
    REGISTRY.register(Box::new(embeddings.clone())).ok();
    REGISTRY.register(Box::new(extraction_failures.clone())).ok();
}

pub fn inc_pipeline_run(workflow: &str, outcome: &str) {
    if let Some(counter) = PIPELINE_RUNS.get() {
        counter.with_label_values(&[workflow, outcome]).inc();
    }
}

pub fn observe_step(step: &str, seconds: f64) {
    if let Some(histogram) = STEP_DURATION.get() {
        histogram.with_label_values(&[step]).observe(seconds);
    }
}

pub fn add_embeddings(count: usize) {
    if let Some(counter) = EMBEDDINGS_GENERATED.get() {
        counter.inc_by(count as u64);
    }
}

pub fn inc_extraction_failure() {
    if let Some(counter) = EXTRACTION_FAILURES.get() {
        counter.inc();
    }
}

pub async fn get_metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; version=0.0.4")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    )
}
