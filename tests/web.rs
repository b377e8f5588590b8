//! Browser-side checks for the exported bindings.
#![cfg(target_arch = "wasm32")]

use guandan_solver::wasm_api::{classify_cards, get_build_commit, handle_request, solve_hand};
use serde_json::Value;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn solve_hand_returns_partition() {
    let response: Value = serde_json::from_str(&solve_hand(
        r#"["S7", "H7", "C7", "D7", "S3"]"#,
        "2",
        r#"{"timeLimitMs": 500}"#,
    ))
    .unwrap();
    assert_eq!(response["type"], "solved");
    assert_eq!(response["recommendation"]["combos"].as_array().unwrap().len(), 2);
}

#[wasm_bindgen_test]
fn classify_reports_wildcard_straight() {
    let response: Value =
        serde_json::from_str(&classify_cards(r#"["HJ", "SJ", "SQ", "SK", "SA"]"#, "J")).unwrap();
    assert_eq!(response["type"], "classified");
    assert!(!response["interpretations"].as_array().unwrap().is_empty());
}

#[wasm_bindgen_test]
fn bad_input_is_an_error_response() {
    let response: Value = serde_json::from_str(&solve_hand("not json", "2", "")).unwrap();
    assert_eq!(response["type"], "error");

    let response: Value = serde_json::from_str(&handle_request(r#"{"type": "nope"}"#)).unwrap();
    assert_eq!(response["type"], "error");
}

#[wasm_bindgen_test]
fn build_commit_is_embedded() {
    assert!(!get_build_commit().is_empty());
}
