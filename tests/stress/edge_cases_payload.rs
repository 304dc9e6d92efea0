//! Edge case tests: odd payload shapes, coercion, argument aliases, large
//! and non-ASCII payloads, and failed submissions leaving state untouched.

use std::sync::Arc;

use bridge_gateway::{
    AllowlistEntry, DispatchOutcome, Dispatcher, Fingerprint, IdentityVerifier,
    JsonPackageRegistry, MeasurementStore, ResponseEnvelope, ResultStore, SubjectStore,
};
use serde_json::{json, Value};

const HOST_UID: u32 = 1000;

fn dispatcher(dir: &tempfile::TempDir) -> Dispatcher {
    let allow = AllowlistEntry::new(
        "com.example.caller",
        &Fingerprint::of_certificate(b"good").to_colon_hex(),
    );
    Dispatcher::new(
        IdentityVerifier::new(HOST_UID, allow, Arc::new(JsonPackageRegistry::new())),
        SubjectStore::open(dir.path()).unwrap(),
        MeasurementStore::open(dir.path()).unwrap(),
        ResultStore::open(dir.path()).unwrap(),
    )
}

fn submit(d: &Dispatcher, args: Value) -> ResponseEnvelope {
    match d.handle(HOST_UID, "METHOD_SUBMIT_RESULT", &args) {
        DispatchOutcome::Handled(r) => r,
        DispatchOutcome::Denied(reason) => panic!("host denied: {reason}"),
    }
}

fn last_payload(d: &Dispatcher) -> Option<String> {
    d.results().last().unwrap().map(|r| r.payload)
}

// === Coercion ===

#[test]
fn edge_stringly_typed_fields_are_coerced() {
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(&dir);
    let payload = json!({
        "userId": "12",
        "amplitude": 9.9,
        "period": "2.5",
        "rampTime": 1,
        "mode": 3,
        "isBillable": "TRUE",
        "progressTime": null
    })
    .to_string();

    assert!(submit(&d, json!({"payload": payload})).ok);
    let r = d.measurements().load().unwrap().unwrap();
    assert_eq!(r.user_id, 12);
    assert_eq!(r.amplitude, 9);
    assert_eq!(r.period, 2.5);
    assert_eq!(r.ramp_time, 1.0);
    assert_eq!(r.mode, "3");
    assert!(r.is_billable);
    assert_eq!(r.progress_time, 0);
    assert_eq!(r.measurement_code, None);
}

#[test]
fn edge_legacy_only_payload_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(&dir);

    assert!(submit(&d, json!({"payload": r#"{"id":3,"modeId":4}"#})).ok);
    let r = d.measurements().load().unwrap().unwrap();
    assert_eq!(r.user_id, 0);
    assert_eq!(r.date_time, "");
    assert!(!r.is_billable);
    assert_eq!(last_payload(&d).as_deref(), Some(r#"{"id":3,"modeId":4}"#));
}

// === Rejected shapes ===

#[test]
fn edge_non_object_payloads_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(&dir);

    for payload in ["[1,2]", "null", "42", "\"text\"", "{\"userId\":", "not json"] {
        let r = submit(&d, json!({"payload": payload}));
        assert!(!r.ok, "{payload} should be rejected");
        assert!(
            r.error
                .as_deref()
                .unwrap()
                .starts_with("Failed to process electric result: "),
            "unexpected error for {payload}: {r:?}"
        );
    }
    assert_eq!(last_payload(&d), None);
    assert_eq!(d.measurements().load().unwrap(), None);
}

#[test]
fn edge_failed_submission_keeps_previous_result() {
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(&dir);

    assert!(submit(&d, json!({"requestId": "good", "payload": r#"{"userId":1}"#})).ok);
    assert!(!submit(&d, json!({"requestId": "bad", "payload": "[]"})).ok);
    assert_eq!(
        submit(&d, json!({"requestId": "empty", "payload": ""})),
        ResponseEnvelope::error("payload is required")
    );

    let last = d.results().last().unwrap().unwrap();
    assert_eq!(last.request_id, "good");
    assert_eq!(last.payload, r#"{"userId":1}"#);
    assert_eq!(d.measurements().load().unwrap().unwrap().user_id, 1);
}

#[test]
fn edge_non_string_payload_argument_counts_as_missing() {
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(&dir);

    for payload in [json!({"userId": 1}), json!(null), json!(7), json!(["x"])] {
        assert_eq!(
            submit(&d, json!({"payload": payload})),
            ResponseEnvelope::error("payload is required")
        );
    }
}

// === Argument aliases ===

#[test]
fn edge_extra_argument_names_are_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(&dir);

    let r = submit(
        &d,
        json!({"EXTRA_REQUEST_ID": "x1", "EXTRA_PAYLOAD": r#"{"userId":5}"#}),
    );
    assert_eq!(r, ResponseEnvelope::accepted());

    let last = d.results().last().unwrap().unwrap();
    assert_eq!(last.request_id, "x1");
    assert_eq!(last.payload, r#"{"userId":5}"#);
}

#[test]
fn edge_plain_argument_names_win_over_extras() {
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(&dir);

    submit(
        &d,
        json!({
            "requestId": "plain",
            "EXTRA_REQUEST_ID": "extra",
            "payload": "{}",
            "EXTRA_PAYLOAD": "[]"
        }),
    );
    let last = d.results().last().unwrap().unwrap();
    assert_eq!(last.request_id, "plain");
    assert_eq!(last.payload, "{}");
}

// === Payload content ===

#[test]
fn edge_payload_is_stored_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(&dir);
    let payload = "{ \"userId\" : 8 ,\n  \"mode\": \"Ünïcødé ✓ 模式\" }";

    assert!(submit(&d, json!({"payload": payload})).ok);
    assert_eq!(last_payload(&d).as_deref(), Some(payload));
    assert_eq!(d.measurements().load().unwrap().unwrap().mode, "Ünïcødé ✓ 模式");
}

#[test]
fn edge_large_payload_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(&dir);
    let notes = "x".repeat(512 * 1024);
    let payload = json!({"userId": 1, "notes": notes}).to_string();

    assert!(submit(&d, json!({"payload": payload.clone()})).ok);

    let doc = match d.handle(HOST_UID, "REQUEST_DATA", &json!({})) {
        DispatchOutcome::Handled(r) => r.data.unwrap(),
        DispatchOutcome::Denied(reason) => panic!("host denied: {reason}"),
    };
    let doc: Value = serde_json::from_str(&doc).unwrap();
    assert_eq!(doc["lastPayload"].as_str().unwrap(), payload);
}

#[test]
fn edge_many_sequential_submissions_keep_only_the_last() {
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(&dir);

    for i in 0..200 {
        let payload = json!({"userId": i, "measurementCode": format!("M-{i}")}).to_string();
        assert!(submit(&d, json!({"requestId": format!("r{i}"), "payload": payload})).ok);
    }

    let last = d.results().last().unwrap().unwrap();
    assert_eq!(last.request_id, "r199");
    let r = d.measurements().load().unwrap().unwrap();
    assert_eq!(r.user_id, 199);
    assert_eq!(r.measurement_code.as_deref(), Some("M-199"));
}

#[test]
fn edge_measurement_code_dropped_by_later_submission() {
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(&dir);

    submit(&d, json!({"payload": r#"{"userId":1,"measurementCode":"M-1"}"#}));
    submit(&d, json!({"payload": r#"{"userId":2}"#}));

    let r = d.measurements().load().unwrap().unwrap();
    assert_eq!(r.user_id, 2);
    assert_eq!(r.measurement_code, None);
}

#[test]
fn edge_same_submission_twice_leaves_one_result() {
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(&dir);
    let payload = r#"{"userId":7,"mode":"A","period":1.5,"measurementCode":"M-7"}"#;
    let args = json!({"requestId": "same", "payload": payload});

    assert!(submit(&d, args.clone()).ok);
    let first_record = d.measurements().load().unwrap();
    let first = d.results().last().unwrap().unwrap();

    assert!(submit(&d, args).ok);
    let second = d.results().last().unwrap().unwrap();

    assert_eq!(d.measurements().load().unwrap(), first_record);
    assert_eq!(second.request_id, first.request_id);
    assert_eq!(second.payload, first.payload);
    assert!(second.updated_at >= first.updated_at);
}
