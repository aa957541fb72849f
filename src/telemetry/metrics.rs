//! Metrics recorded through the `metrics` facade.
//!
//! Nothing is exported unless the embedding application installs a recorder.

use metrics::{counter, gauge, histogram};

use crate::error::LoadResourceStatus;

/// A resource was downloaded and verified.
pub fn record_update_success(compressed_bytes: u64) {
    counter!("resvault_update_success_total").increment(1);
    counter!("resvault_update_bytes_total").increment(compressed_bytes);
}

/// A download attempt failed (transport or verification).
pub fn record_update_failure(will_retry: bool) {
    let outcome = if will_retry { "retry" } else { "dropped" };
    counter!("resvault_update_failure_total", "outcome" => outcome).increment(1);
}

/// A pack extraction finished.
pub fn record_apply(success: bool, bytes: u64) {
    let outcome = if success { "success" } else { "failure" };
    counter!("resvault_apply_total", "outcome" => outcome).increment(1);
    if success {
        counter!("resvault_apply_bytes_total").increment(bytes);
    }
}

/// A resource was verified in the read-write tier.
pub fn record_verify(success: bool, bytes: u64) {
    let outcome = if success { "success" } else { "failure" };
    counter!("resvault_verify_total", "outcome" => outcome).increment(1);
    histogram!("resvault_verify_resource_bytes").record(bytes as f64);
}

/// A check pass completed.
pub fn record_check(update_count: usize, moved: usize, removed: usize) {
    gauge!("resvault_check_update_count").set(update_count as f64);
    counter!("resvault_check_moved_total").increment(moved as u64);
    counter!("resvault_check_removed_total").increment(removed as u64);
}

/// A load request finished.
pub fn record_load(status: LoadResourceStatus) {
    let status = status.to_string();
    counter!("resvault_load_total", "status" => status).increment(1);
}

/// Loader queue depth.
pub fn record_waiting_tasks(waiting: usize) {
    gauge!("resvault_load_waiting_tasks").set(waiting as f64);
}
