//! Rebuilds every learner's ranking signals from durable state (hourly and at startup).

use crate::engine::PracticeEngine;

pub async fn run(engine: &std::sync::Arc<PracticeEngine>) {
    tracing::debug!("Signal warm-up worker tick");
    if let Err(e) = engine.warm_all_signals().await {
        tracing::error!(error = %e, "Signal warm-up failed");
    }
}
