use wasm_bindgen::prelude::*;

use crate::Rank;
use crate::protocol::{
    self, CardInput, ClassifyParams, ProtocolError, Request, Response, SolveParams,
};
use crate::solver::SolveOptions;
use crate::worker::InlineExecutor;

/// Initialize panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Find the best partition of a hand into melds.
///
/// # Arguments
/// * `hand_cards` - JSON array of card codes (e.g., ["S7", "H10", "jk", "JK"])
/// * `trump` - Trump rank (e.g., "2", "10", "J")
/// * `options` - JSON solver options (e.g., {"timeLimitMs": 3000, "dualMode": true});
///   an empty string uses the defaults
///
/// # Returns
/// JSON string with the solved response, or `{"type": "error", ...}`
#[wasm_bindgen]
pub fn solve_hand(hand_cards: &str, trump: &str, options: &str) -> String {
    respond(solve_internal(hand_cards, trump, options))
}

/// All legal interpretations of a card set, strongest first.
#[wasm_bindgen]
pub fn classify_cards(cards: &str, trump: &str) -> String {
    respond(classify_internal(cards, trump))
}

/// Handle a full tagged protocol request (`solve`, `classify` or `recommend`).
///
/// Worker-dispatched profiles run inline here; the page is expected to call
/// this from a web worker.
#[wasm_bindgen]
pub fn handle_request(request: &str) -> String {
    protocol::handle_request_with(&InlineExecutor, request)
}

/// Get the git commit hash this WASM module was built from
#[wasm_bindgen]
pub fn get_build_commit() -> String {
    env!("BUILD_COMMIT").to_string()
}

fn parse_cards(cards: &str) -> Result<Vec<CardInput>, ProtocolError> {
    Ok(serde_json::from_str(cards)?)
}

fn parse_trump(trump: &str) -> Result<Rank, ProtocolError> {
    Ok(Rank::from_symbol(trump.trim())?)
}

fn solve_internal(hand_cards: &str, trump: &str, options: &str) -> Result<Response, ProtocolError> {
    let options: SolveOptions = if options.trim().is_empty() {
        SolveOptions::default()
    } else {
        serde_json::from_str(options)?
    };
    let request = Request::Solve(SolveParams {
        cards: parse_cards(hand_cards)?,
        trump: parse_trump(trump)?,
        options,
    });
    protocol::dispatch(&InlineExecutor, request)
}

fn classify_internal(cards: &str, trump: &str) -> Result<Response, ProtocolError> {
    let request = Request::Classify(ClassifyParams {
        cards: parse_cards(cards)?,
        trump: parse_trump(trump)?,
    });
    protocol::dispatch(&InlineExecutor, request)
}

fn respond(result: Result<Response, ProtocolError>) -> String {
    let response = result.unwrap_or_else(|e| Response::Error {
        message: e.to_string(),
    });
    serde_json::to_string(&response)
        .unwrap_or_else(|e| format!(r#"{{"type":"error","message":"Serialization error: {}"}}"#, e))
}
