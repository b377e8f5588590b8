use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod coordinator;
pub mod deck;
pub mod melds;
pub mod protocol;
pub mod scoring;
pub mod solver;
#[cfg(target_arch = "wasm32")]
pub mod wasm_api;
pub mod worker;

/// A card rank. Standard ranks run from Two to Ace; the two jokers sit above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rank {
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "9")]
    Nine,
    #[serde(rename = "10")]
    Ten,
    #[serde(rename = "J")]
    Jack,
    #[serde(rename = "Q")]
    Queen,
    #[serde(rename = "K")]
    King,
    #[serde(rename = "A")]
    Ace,
    #[serde(rename = "SJ")]
    SmallJoker,
    #[serde(rename = "BJ")]
    BigJoker,
}

impl Rank {
    /// Number of distinct ranks, jokers included. Used to size count tables.
    pub const COUNT: usize = 15;

    pub const STANDARD: [Rank; 13] = [
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Ace,
    ];

    pub const ALL: [Rank; 15] = [
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Ace,
        Rank::SmallJoker,
        Rank::BigJoker,
    ];

    /// Dense index (0-14) for fixed-size count tables.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_joker(self) -> bool {
        matches!(self, Rank::SmallJoker | Rank::BigJoker)
    }

    /// Face value: 2-14 for standard ranks, 16 and 17 for the jokers.
    pub fn value(self) -> u8 {
        match self {
            Rank::SmallJoker => 16,
            Rank::BigJoker => 17,
            standard => standard as u8 + 2,
        }
    }

    /// Position on the 13-rank cycle used for rank distance, or None for jokers.
    pub fn cycle_index(self) -> Option<u8> {
        if self.is_joker() { None } else { Some(self as u8) }
    }

    /// Strength used to order meld interpretations: trump first, then the jokers,
    /// then face value.
    pub fn strength(self, trump: Rank) -> u8 {
        if self == trump {
            24
        } else {
            match self {
                Rank::BigJoker => 23,
                Rank::SmallJoker => 22,
                other => other.value(),
            }
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
            Rank::Ace => "A",
            Rank::SmallJoker => "SJ",
            Rank::BigJoker => "BJ",
        }
    }

    /// Parse a standard rank symbol ("2"-"10", "J", "Q", "K", "A").
    pub fn from_symbol(s: &str) -> Result<Self, CardParseError> {
        Rank::STANDARD
            .iter()
            .copied()
            .find(|rank| rank.symbol() == s)
            .ok_or_else(|| CardParseError::InvalidRank(s.to_string()))
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A card suit. Jokers carry the `Joker` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Suit {
    #[serde(rename = "S")]
    Spades,
    #[serde(rename = "H")]
    Hearts,
    #[serde(rename = "C")]
    Clubs,
    #[serde(rename = "D")]
    Diamonds,
    #[serde(rename = "JOKER")]
    Joker,
}

impl Suit {
    pub const STANDARD: [Suit; 4] = [Suit::Spades, Suit::Hearts, Suit::Clubs, Suit::Diamonds];

    /// The suit whose trump-rank card acts as a wildcard.
    pub const WILD: Suit = Suit::Hearts;

    fn sort_value(self) -> u32 {
        match self {
            Suit::Diamonds => 1,
            Suit::Clubs => 2,
            Suit::Hearts => 3,
            Suit::Spades => 4,
            Suit::Joker => 5,
        }
    }

    fn letter(self) -> Option<char> {
        match self {
            Suit::Spades => Some('S'),
            Suit::Hearts => Some('H'),
            Suit::Clubs => Some('C'),
            Suit::Diamonds => Some('D'),
            Suit::Joker => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Suit::Spades => "♠",
            Suit::Hearts => "♥",
            Suit::Clubs => "♣",
            Suit::Diamonds => "♦",
            Suit::Joker => "",
        }
    }
}

/// Errors produced when reading cards from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CardParseError {
    #[error("invalid card string: {0:?}")]
    InvalidCard(String),
    #[error("invalid suit: {0:?}")]
    InvalidSuit(char),
    #[error("invalid rank: {0:?}")]
    InvalidRank(String),
    #[error("suit {suit:?} cannot carry rank {rank}")]
    SuitMismatch { suit: Suit, rank: Rank },
}

/// An immutable card. The id is unique within a deal and survives cloning, so
/// partitions can be checked for exact coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    pub id: u32,
    pub rank: Rank,
    pub suit: Suit,
}

impl Card {
    /// Create a standard card. Jokers should use [`Card::joker`].
    pub fn new(id: u32, suit: Suit, rank: Rank) -> Self {
        debug_assert!(rank.is_joker() == (suit == Suit::Joker));
        Card { id, rank, suit }
    }

    pub fn joker(id: u32, rank: Rank) -> Self {
        debug_assert!(rank.is_joker());
        Card {
            id,
            rank,
            suit: Suit::Joker,
        }
    }

    /// Checks a card built outside [`Card::parse`]: jokers carry the joker
    /// suit and no other rank does.
    pub fn validated(self) -> Result<Self, CardParseError> {
        if self.rank.is_joker() == (self.suit == Suit::Joker) {
            Ok(self)
        } else {
            Err(CardParseError::SuitMismatch {
                suit: self.suit,
                rank: self.rank,
            })
        }
    }

    pub fn is_joker(&self) -> bool {
        self.rank.is_joker()
    }

    pub fn is_trump_rank(&self, trump: Rank) -> bool {
        !self.is_joker() && self.rank == trump
    }

    /// True iff this is the wild-suit card of the trump rank. Jokers never are.
    pub fn is_wildcard(&self, trump: Rank) -> bool {
        !self.is_joker() && self.suit == Suit::WILD && self.rank == trump
    }

    /// Parse a card from its short form and assign it the given id.
    ///
    /// Format: suit letter followed by rank ("S7", "H10", "DA"), or "jk" for the
    /// small joker and "JK" for the big joker.
    pub fn parse(id: u32, s: &str) -> Result<Self, CardParseError> {
        match s {
            "jk" => return Ok(Card::joker(id, Rank::SmallJoker)),
            "JK" => return Ok(Card::joker(id, Rank::BigJoker)),
            _ => {}
        }

        let mut chars = s.chars();
        let suit_char = chars
            .next()
            .ok_or_else(|| CardParseError::InvalidCard(s.to_string()))?;
        let suit = match suit_char {
            'S' => Suit::Spades,
            'H' => Suit::Hearts,
            'C' => Suit::Clubs,
            'D' => Suit::Diamonds,
            other => return Err(CardParseError::InvalidSuit(other)),
        };
        let rank_str = chars.as_str();
        if rank_str.is_empty() {
            return Err(CardParseError::InvalidCard(s.to_string()));
        }
        let rank = Rank::from_symbol(rank_str)?;
        Ok(Card::new(id, suit, rank))
    }

    /// Short form accepted by [`Card::parse`].
    pub fn code(&self) -> String {
        match (self.rank, self.suit.letter()) {
            (Rank::SmallJoker, _) => "jk".to_string(),
            (Rank::BigJoker, _) => "JK".to_string(),
            (rank, Some(letter)) => format!("{}{}", letter, rank.symbol()),
            (rank, None) => rank.symbol().to_string(),
        }
    }

    /// Display ordering key: jokers last, then rank, then suit, with trump-rank
    /// cards nudged above plain cards of the same rank and suit.
    pub fn sort_value(&self, trump: Rank) -> u32 {
        let joker_boost = if self.is_joker() { 1000 } else { 0 };
        let trump_boost = if self.is_trump_rank(trump) { 4 } else { 0 };
        joker_boost + self.rank.value() as u32 * 100 + self.suit.sort_value() * 10 + trump_boost
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_joker() {
            f.write_str(self.rank.symbol())
        } else {
            write!(f, "{}{}", self.suit.symbol(), self.rank.symbol())
        }
    }
}

/// Total order used for display and candidate anchoring.
pub fn compare_cards(a: &Card, b: &Card, trump: Rank) -> Ordering {
    a.sort_value(trump)
        .cmp(&b.sort_value(trump))
        .then_with(|| a.id.cmp(&b.id))
}

/// Return a sorted copy of `cards`.
pub fn sort_cards(cards: &[Card], trump: Rank) -> Vec<Card> {
    let mut sorted = cards.to_vec();
    sorted.sort_by(|a, b| compare_cards(a, b, trump));
    sorted
}

/// Parse a whitespace-separated hand, assigning ids 1, 2, 3, ... in order.
pub fn parse_hand(input: &str) -> Result<Vec<Card>, CardParseError> {
    input
        .split_whitespace()
        .enumerate()
        .map(|(i, token)| Card::parse(i as u32 + 1, token))
        .collect()
}

/// A dealt hand together with its trump rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hand {
    pub trump: Rank,
    pub cards: Vec<Card>,
}

impl Hand {
    pub fn new(trump: Rank, cards: Vec<Card>) -> Self {
        Hand { trump, cards }
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// True when no two cards share an id.
    pub fn has_unique_ids(&self) -> bool {
        let mut ids: Vec<u32> = self.cards.iter().map(|c| c.id).collect();
        ids.sort_unstable();
        ids.windows(2).all(|w| w[0] != w[1])
    }
}
