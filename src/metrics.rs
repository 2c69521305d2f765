use tracing::trace;

// Counters and timers are emitted as trace events; no recorder is installed.

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "deep_discount.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn engine_call(call: &'static str, ok: bool) {
    trace!(
        target = "deep_discount.metrics",
        call = call,
        ok,
        "engine_calls_total_inc"
    );
}

pub fn sku_processed(outcome: &'static str) {
    trace!(
        target = "deep_discount.metrics",
        outcome = outcome,
        "skus_processed_total_inc"
    );
}
