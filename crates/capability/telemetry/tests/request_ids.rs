use ams_telemetry::{metrics, new_request_ids, record_sync_batch};

#[test]
fn request_ids_are_distinct() {
    let first = new_request_ids();
    let second = new_request_ids();
    assert_ne!(first.request_id, second.request_id);
    assert_ne!(first.trace_id, second.trace_id);
}

#[test]
fn metrics_accumulate() {
    let before = metrics().snapshot().sync_batches;
    record_sync_batch();
    record_sync_batch();
    let after = metrics().snapshot().sync_batches;
    assert_eq!(after - before, 2);
}
