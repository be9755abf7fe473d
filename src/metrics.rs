//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Session state and reconnect counts
//! - Changes sent/received/imported
//! - Sequencer buffering behavior
//! - Translation batch sizes and latency
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `collab_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record the current sync state as a labeled gauge.
pub fn set_sync_state(state: &str) {
    gauge!("collab_sync_state", "state" => state.to_string()).set(1.0);
}

/// Record a reconnect attempt.
pub fn record_reconnect(document_id: &str) {
    counter!("collab_reconnects_total", "document_id" => document_id.to_string()).increment(1);
}

/// Record a locally committed delta sent to the server.
pub fn record_change_sent(document_id: &str, bytes: usize) {
    counter!("collab_changes_sent_total", "document_id" => document_id.to_string()).increment(1);
    counter!("collab_change_bytes_sent_total", "document_id" => document_id.to_string())
        .increment(bytes as u64);
}

/// Record inbound changes received from the server.
pub fn record_changes_received(document_id: &str, count: usize) {
    counter!("collab_changes_received_total", "document_id" => document_id.to_string())
        .increment(count as u64);
}

/// Record changes imported into the replicated tree (post-sequencing).
pub fn record_changes_imported(document_id: &str, count: usize) {
    counter!("collab_changes_imported_total", "document_id" => document_id.to_string())
        .increment(count as u64);
}

/// Record changes the importer skipped as duplicates.
pub fn record_changes_deduped(document_id: &str, count: usize) {
    counter!("collab_changes_deduped_total", "document_id" => document_id.to_string())
        .increment(count as u64);
}

/// Record the number of changes parked in the sequencer waiting for a gap.
pub fn record_sequencer_buffered(document_id: &str, buffered: usize) {
    gauge!("collab_sequencer_buffered", "document_id" => document_id.to_string())
        .set(buffered as f64);
}

/// Record a full-document snapshot import.
pub fn record_snapshot_import(document_id: &str, changes: usize) {
    counter!("collab_snapshot_imports_total", "document_id" => document_id.to_string())
        .increment(1);
    counter!("collab_snapshot_changes_total", "document_id" => document_id.to_string())
        .increment(changes as u64);
}

/// Record a local edit batch translated into the tree.
pub fn record_local_batch(document_id: &str, ops: usize, duration: Duration) {
    counter!("collab_local_batches_total", "document_id" => document_id.to_string()).increment(1);
    histogram!("collab_local_batch_ops", "document_id" => document_id.to_string())
        .record(ops as f64);
    histogram!("collab_local_batch_duration_seconds", "document_id" => document_id.to_string())
        .record(duration.as_secs_f64());
}

/// Record a remote event batch replayed onto the editable document.
pub fn record_remote_batch(document_id: &str, events: usize, duration: Duration) {
    counter!("collab_remote_batches_total", "document_id" => document_id.to_string()).increment(1);
    histogram!("collab_remote_batch_events", "document_id" => document_id.to_string())
        .record(events as f64);
    histogram!("collab_remote_batch_duration_seconds", "document_id" => document_id.to_string())
        .record(duration.as_secs_f64());
}

/// Record a framing error (garbled stream, drops the connection).
pub fn record_framing_error(document_id: &str) {
    counter!("collab_framing_errors_total", "document_id" => document_id.to_string()).increment(1);
}

/// Record a fatal consistency failure (session abort).
pub fn record_consistency_failure(document_id: &str) {
    counter!("collab_consistency_failures_total", "document_id" => document_id.to_string())
        .increment(1);
}
