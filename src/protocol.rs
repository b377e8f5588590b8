//! JSON request/response envelope used by the CLI and the WASM bindings.
//!
//! Requests are tagged by `type`:
//!
//! ```json
//! {"type": "solve", "cards": ["S7", "H7", "C7", "D7", "S3"], "trump": "2",
//!  "options": {"timeLimitMs": 1000}}
//! {"type": "classify", "cards": ["HJ", "SJ", "SQ", "SK", "SA"], "trump": "J"}
//! {"type": "recommend", "cards": [...], "trump": "2", "options": {"mode": "fast"}}
//! ```
//!
//! Cards may be given as short codes or as full card objects. Codes are
//! numbered by position starting at 1.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coordinator::{CoordinatorOptions, SearchOutcome, find_recommendation};
use crate::melds::{MeldDefinition, classify, describe};
use crate::solver::SolveOptions;
use crate::worker::{Executor, InlineExecutor, SolveRequest, SolveResponse, WorkerError};
use crate::{Card, CardParseError, Rank};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed request: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Card(#[from] CardParseError),

    #[error("card id {0} appears more than once")]
    DuplicateCardId(u32),

    #[error("trump must be a standard rank, got {0}")]
    InvalidTrump(Rank),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

/// A card given either as a short code or a full object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CardInput {
    Code(String),
    Card(Card),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveParams {
    pub cards: Vec<CardInput>,
    pub trump: Rank,
    #[serde(default)]
    pub options: SolveOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyParams {
    pub cards: Vec<CardInput>,
    pub trump: Rank,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendParams {
    pub cards: Vec<CardInput>,
    pub trump: Rank,
    #[serde(default)]
    pub options: CoordinatorOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Request {
    Solve(SolveParams),
    Classify(ClassifyParams),
    Recommend(RecommendParams),
}

/// One interpretation reported by a classify request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interpretation {
    #[serde(flatten)]
    pub definition: MeldDefinition,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub interpretations: Vec<Interpretation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Response {
    Solved(SolveResponse),
    Classified(Classification),
    Recommended(SearchOutcome),
    Error { message: String },
}

/// Resolve card inputs into cards with unique ids.
pub fn resolve_cards(inputs: &[CardInput]) -> Result<Vec<Card>, ProtocolError> {
    let cards = inputs
        .iter()
        .enumerate()
        .map(|(i, input)| match input {
            CardInput::Code(code) => Card::parse(i as u32 + 1, code),
            CardInput::Card(card) => card.validated(),
        })
        .collect::<Result<Vec<Card>, CardParseError>>()?;

    let mut seen = std::collections::HashSet::with_capacity(cards.len());
    if let Some(dup) = cards.iter().find(|c| !seen.insert(c.id)) {
        return Err(ProtocolError::DuplicateCardId(dup.id));
    }
    Ok(cards)
}

fn check_trump(trump: Rank) -> Result<Rank, ProtocolError> {
    if trump.is_joker() {
        Err(ProtocolError::InvalidTrump(trump))
    } else {
        Ok(trump)
    }
}

pub fn dispatch<E: Executor + ?Sized>(
    executor: &E,
    request: Request,
) -> Result<Response, ProtocolError> {
    match request {
        Request::Solve(params) => {
            let cards = resolve_cards(&params.cards)?;
            let trump = check_trump(params.trump)?;
            let response = executor.execute(SolveRequest::new(0, cards, trump, params.options))?;
            Ok(Response::Solved(response))
        }
        Request::Classify(params) => {
            let cards = resolve_cards(&params.cards)?;
            let trump = check_trump(params.trump)?;
            let interpretations = classify(&cards, trump)
                .into_iter()
                .map(|definition| Interpretation {
                    description: describe(&definition),
                    definition,
                })
                .collect();
            Ok(Response::Classified(Classification { interpretations }))
        }
        Request::Recommend(params) => {
            let cards = resolve_cards(&params.cards)?;
            let trump = check_trump(params.trump)?;
            let outcome = find_recommendation(executor, &cards, trump, &params.options)?;
            Ok(Response::Recommended(outcome))
        }
    }
}

pub fn handle_request_with<E: Executor + ?Sized>(executor: &E, json: &str) -> String {
    let response = serde_json::from_str::<Request>(json)
        .map_err(ProtocolError::from)
        .and_then(|request| dispatch(executor, request))
        .unwrap_or_else(|err| Response::Error {
            message: err.to_string(),
        });

    serde_json::to_string(&response).unwrap_or_else(|err| {
        serde_json::json!({ "type": "error", "message": err.to_string() }).to_string()
    })
}

/// Handle one JSON request on the calling thread and return the JSON response.
pub fn handle_request(json: &str) -> String {
    handle_request_with(&InlineExecutor, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Suit;
    use serde_json::Value;

    fn call(json: Value) -> Value {
        serde_json::from_str(&handle_request(&json.to_string())).unwrap()
    }

    #[test]
    fn test_solve_request() {
        let response = call(serde_json::json!({
            "type": "solve",
            "cards": ["S7", "H7", "C7", "D7", "S3"],
            "trump": "2",
            "options": { "timeLimitMs": 2000 }
        }));
        assert_eq!(response["type"], "solved");
        let rec = &response["recommendation"];
        assert_eq!(rec["combos"].as_array().unwrap().len(), 2);
        assert_eq!(rec["detail"]["handCount"], 2);
        assert_eq!(rec["timedOut"], false);
        assert_eq!(rec["stopReason"], "completed");
        assert!(rec["topResults"].is_array());
    }

    #[test]
    fn test_solve_dual_request() {
        let response = call(serde_json::json!({
            "type": "solve",
            "cards": ["JK", "JK", "jk", "jk", "S3"],
            "trump": "2",
            "options": { "dualMode": true }
        }));
        let rec = &response["recommendation"];
        assert!(rec["ceiling"]["combos"].is_array());
        assert!(rec["control"]["combos"].is_array());
    }

    #[test]
    fn test_classify_request() {
        let response = call(serde_json::json!({
            "type": "classify",
            "cards": ["HJ", "SJ", "SQ", "SK", "SA"],
            "trump": "J"
        }));
        assert_eq!(response["type"], "classified");
        let interpretations = response["interpretations"].as_array().unwrap();
        assert!(
            interpretations
                .iter()
                .any(|i| i["kind"] == "straight-flush" || i["kind"] == "straight")
        );
        assert!(interpretations.iter().all(|i| i["description"].is_string()));
    }

    #[test]
    fn test_recommend_request() {
        let response = call(serde_json::json!({
            "type": "recommend",
            "cards": ["S7", "H7", "C7", "D7", "S3"],
            "trump": "2",
            "options": { "mode": "fast", "targetScore": -50 }
        }));
        assert_eq!(response["type"], "recommended");
        assert_eq!(response["surpassedTarget"], true);
        assert_eq!(response["attempts"], 1);
        assert_eq!(response["mode"], "fast");
    }

    #[test]
    fn test_card_objects_are_accepted() {
        let cards = vec![
            CardInput::Card(Card::parse(40, "SA").unwrap()),
            CardInput::Code("HA".into()),
        ];
        let resolved = resolve_cards(&cards).unwrap();
        assert_eq!(resolved[0].id, 40);
        assert_eq!(resolved[1].id, 2);
    }

    #[test]
    fn test_errors_are_reported() {
        let bad_card = call(serde_json::json!({
            "type": "classify",
            "cards": ["X9"],
            "trump": "2"
        }));
        assert_eq!(bad_card["type"], "error");
        assert!(bad_card["message"].as_str().unwrap().contains("suit"));

        let joker_trump = call(serde_json::json!({
            "type": "classify",
            "cards": ["S9"],
            "trump": "BJ"
        }));
        assert_eq!(joker_trump["type"], "error");

        let duplicate = resolve_cards(&[
            CardInput::Code("H9".into()),
            CardInput::Card(Card::parse(1, "S9").unwrap()),
        ]);
        assert!(matches!(duplicate, Err(ProtocolError::DuplicateCardId(1))));

        let joker_suited_straight = call(serde_json::json!({
            "type": "classify",
            "cards": (["3", "4", "5", "6", "7"]
                .iter()
                .enumerate()
                .map(|(i, rank)| serde_json::json!({ "id": i + 1, "rank": rank, "suit": "JOKER" }))
                .collect::<Vec<_>>()),
            "trump": "2"
        }));
        assert_eq!(joker_suited_straight["type"], "error");
        assert!(joker_suited_straight["message"].as_str().unwrap().contains("Joker"));

        let hearts_joker = resolve_cards(&[CardInput::Card(Card {
            id: 7,
            rank: Rank::BigJoker,
            suit: Suit::Hearts,
        })]);
        assert!(matches!(
            hearts_joker,
            Err(ProtocolError::Card(CardParseError::SuitMismatch {
                suit: Suit::Hearts,
                rank: Rank::BigJoker,
            }))
        ));

        let garbage: Value = serde_json::from_str(&handle_request("not json")).unwrap();
        assert_eq!(garbage["type"], "error");
    }
}
