use super::*;

#[test]
fn displays_code_and_message() {
    let err = ApiError::new(ErrorCode::SyncFailure, "orchestrator returned 502");
    assert_eq!(err.to_string(), "SyncFailure: orchestrator returned 502");
}

#[test]
fn boxes_as_std_error() {
    let boxed: Box<dyn std::error::Error + Send + Sync> =
        Box::new(ApiError::new(ErrorCode::Validation, "unknown cue color 'Teal'"));
    assert_eq!(boxed.to_string(), "Validation: unknown cue color 'Teal'");
    assert!(boxed.source().is_none());
}

#[test]
fn serializes_snake_case_code() {
    let err = ApiError::new(ErrorCode::UpstreamUnavailable, "obs down");
    let value = serde_json::to_value(&err).expect("json");
    assert_eq!(value["code"], "upstream_unavailable");
    assert_eq!(value["message"], "obs down");
}
