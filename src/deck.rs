//! Two-deck card generation and dealing.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::{Card, Hand, Rank, Suit, sort_cards};

/// Cards dealt to each seat.
pub const HAND_SIZE: usize = 27;

/// Seats around the table, in dealing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Seat {
    #[serde(rename = "E")]
    East,
    #[serde(rename = "S")]
    South,
    #[serde(rename = "W")]
    West,
    #[serde(rename = "N")]
    North,
}

impl Seat {
    pub const ALL: [Seat; 4] = [Seat::East, Seat::South, Seat::West, Seat::North];
}

/// Build both decks: 52 standard cards and two jokers each, ids 1..=108.
pub fn full_deck() -> Vec<Card> {
    let mut cards = Vec::with_capacity(108);
    let mut id = 1;
    for _deck in 0..2 {
        for suit in Suit::STANDARD {
            for rank in Rank::STANDARD {
                cards.push(Card::new(id, suit, rank));
                id += 1;
            }
        }
        cards.push(Card::joker(id, Rank::SmallJoker));
        id += 1;
        cards.push(Card::joker(id, Rank::BigJoker));
        id += 1;
    }
    cards
}

pub fn random_trump<R: Rng + ?Sized>(rng: &mut R) -> Rank {
    Rank::STANDARD[rng.gen_range(0..Rank::STANDARD.len())]
}

/// Deal a single 27-card hand with a random trump rank.
pub fn deal<R: Rng + ?Sized>(rng: &mut R) -> Hand {
    let trump = random_trump(rng);
    let mut cards = full_deck();
    cards.shuffle(rng);
    cards.truncate(HAND_SIZE);
    Hand::new(trump, sort_cards(&cards, trump))
}

/// Deal all four seats from one shuffled pair of decks.
pub fn deal_table<R: Rng + ?Sized>(rng: &mut R) -> Vec<(Seat, Hand)> {
    let trump = random_trump(rng);
    let mut cards = full_deck();
    cards.shuffle(rng);
    Seat::ALL
        .iter()
        .zip(cards.chunks(HAND_SIZE))
        .map(|(&seat, chunk)| (seat, Hand::new(trump, sort_cards(chunk, trump))))
        .collect()
}
