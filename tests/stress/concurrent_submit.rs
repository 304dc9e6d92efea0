//! Stress test: many concurrent submissions against one data directory.
//! Readers must never observe a record mixing fields from two payloads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use bridge_gateway::{
    AllowlistEntry, DispatchOutcome, Dispatcher, Fingerprint, IdentityVerifier,
    JsonPackageRegistry, MeasurementStore, ResultStore, SubjectStore,
};
use serde_json::{json, Value};

const HOST_UID: u32 = 1000;
const CALLER_UID: u32 = 10_200;
const PACKAGE: &str = "com.example.caller";

const WRITERS: usize = 8;
const SUBMITS_PER_WRITER: usize = 25;

/// Every numeric field carries the same marker, so a torn record shows up
/// as a mismatch between fields.
fn payload(marker: i32) -> String {
    json!({
        "userId": marker,
        "dateTime": format!("2024-01-01T00:00:{marker}"),
        "mode": format!("mode-{marker}"),
        "amplitude": marker,
        "frequency": marker,
        "period": f64::from(marker) + 0.5,
        "cycle": marker,
        "phase": marker,
        "onTime": marker,
        "offTime": marker,
        "rampTime": f64::from(marker) + 0.25,
        "duty": marker,
        "totalTime": marker,
        "progressTime": marker,
        "isBillable": marker % 2 == 0,
        "measurementCode": format!("M-{marker}")
    })
    .to_string()
}

/// A separate dispatcher per "process", all on the same directory.
fn dispatcher(dir: &std::path::Path) -> Dispatcher {
    let registry =
        JsonPackageRegistry::new().with_package(PACKAGE, &[CALLER_UID], vec![b"good".to_vec()], vec![]);
    let allow = AllowlistEntry::new(PACKAGE, &Fingerprint::of_certificate(b"good").to_colon_hex());
    Dispatcher::new(
        IdentityVerifier::new(HOST_UID, allow, Arc::new(registry)),
        SubjectStore::open(dir).unwrap(),
        MeasurementStore::open(dir).unwrap(),
        ResultStore::open(dir).unwrap(),
    )
}

fn accepted(outcome: DispatchOutcome) -> bool {
    matches!(outcome, DispatchOutcome::Handled(ref r) if r.ok)
}

#[test]
fn stress_concurrent_submits_never_tear_records() {
    let dir = tempfile::tempdir().unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let writers: Vec<_> = (0..WRITERS)
        .map(|w| {
            let d = dispatcher(dir.path());
            thread::spawn(move || {
                for i in 0..SUBMITS_PER_WRITER {
                    let marker = (w * SUBMITS_PER_WRITER + i) as i32;
                    let args = json!({
                        "requestId": format!("req-{marker}"),
                        "payload": payload(marker)
                    });
                    assert!(
                        accepted(d.handle(CALLER_UID, "METHOD_SUBMIT_RESULT", &args)),
                        "submission {marker} should be accepted"
                    );
                }
            })
        })
        .collect();

    let reader = {
        let measurements = MeasurementStore::open(dir.path()).unwrap();
        let results = ResultStore::open(dir.path()).unwrap();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut observed = 0usize;
            while !done.load(Ordering::SeqCst) {
                if let Some(r) = measurements.load().unwrap() {
                    let m = r.user_id;
                    assert_eq!(r.amplitude, m, "torn record: {r:?}");
                    assert_eq!(r.progress_time, m, "torn record: {r:?}");
                    assert_eq!(r.mode, format!("mode-{m}"), "torn record: {r:?}");
                    assert_eq!(r.period, f64::from(m) + 0.5, "torn record: {r:?}");
                    assert_eq!(r.measurement_code, Some(format!("M-{m}")));
                    assert_eq!(r.is_billable, m % 2 == 0);
                    observed += 1;
                }
                if let Some(last) = results.last().unwrap() {
                    let doc: Value = serde_json::from_str(&last.payload).unwrap();
                    let m = doc["userId"].as_i64().unwrap();
                    assert_eq!(last.request_id, format!("req-{m}"), "torn result: {last:?}");
                }
            }
            observed
        })
    };

    for w in writers {
        w.join().expect("writer panicked");
    }
    done.store(true, Ordering::SeqCst);
    reader.join().expect("reader saw a torn record");

    // The final state is one complete submission.
    let d = dispatcher(dir.path());
    let last = d.results().last().unwrap().unwrap();
    let record = d.measurements().load().unwrap().unwrap();
    let doc: Value = serde_json::from_str(&last.payload).unwrap();
    assert!(doc["userId"].as_i64().unwrap() < (WRITERS * SUBMITS_PER_WRITER) as i64);
    assert_eq!(record.amplitude, record.user_id);
}

#[test]
fn stress_concurrent_submits_enqueue_every_job() {
    let dir = tempfile::tempdir().unwrap();
    let queue =
        bridge_gateway::JobQueue::open(dir.path().join("jobs"), Default::default()).unwrap();
    let d = Arc::new(dispatcher(&dir.path().join("prefs")).with_job_queue(queue.clone()));

    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let d = Arc::clone(&d);
            thread::spawn(move || {
                for i in 0..10 {
                    let marker = (w * 10 + i) as i32;
                    let args = json!({"requestId": format!("req-{marker}"), "payload": payload(marker)});
                    assert!(accepted(d.handle(CALLER_UID, "SUBMIT_RESULT", &args)));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let jobs = queue.list().unwrap();
    assert_eq!(jobs.len(), WRITERS * 10);
    let unique: std::collections::HashSet<_> = jobs.iter().map(|j| j.request_id.clone()).collect();
    assert_eq!(unique.len(), WRITERS * 10);
}
