//! Meld shapes and the wildcard-aware classifier.
//!
//! Contiguous shapes are matched against windows on the linear rank axis
//! `A 2 3 ... K A`, where the ace appears at both ends. Every card rank maps to a
//! bit on that axis (the ace to both of its bits), so a window can be rejected
//! with a single mask test before counting shortfalls against the wildcards.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{Card, Rank, Suit};

/// The meld vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MeldKind {
    Single,
    Pair,
    Triple,
    ThreeWithPair,
    /// Five consecutive ranks.
    Straight,
    /// Three consecutive pairs.
    Plate,
    /// Two consecutive triples.
    Tube,
    StraightFlush,
    Bomb4,
    Bomb5,
    Bomb6,
    Bomb7,
    Bomb8,
    /// Both big jokers and both small jokers.
    JokerBomb,
}

impl MeldKind {
    pub fn priority(self) -> i32 {
        match self {
            MeldKind::JokerBomb => 140,
            MeldKind::Bomb8 => 132,
            MeldKind::Bomb7 => 131,
            MeldKind::Bomb6 => 130,
            MeldKind::StraightFlush => 122,
            MeldKind::Bomb5 => 120,
            MeldKind::Tube => 93,
            MeldKind::Plate => 92,
            MeldKind::Bomb4 => 90,
            MeldKind::ThreeWithPair => 80,
            MeldKind::Straight => 78,
            MeldKind::Triple => 68,
            MeldKind::Pair => 60,
            MeldKind::Single => 50,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MeldKind::Single => "single",
            MeldKind::Pair => "pair",
            MeldKind::Triple => "triple",
            MeldKind::ThreeWithPair => "three-with-pair",
            MeldKind::Straight => "straight",
            MeldKind::Plate => "plate",
            MeldKind::Tube => "tube",
            MeldKind::StraightFlush => "straight flush",
            MeldKind::Bomb4 => "4-card bomb",
            MeldKind::Bomb5 => "5-card bomb",
            MeldKind::Bomb6 => "6-card bomb",
            MeldKind::Bomb7 => "7-card bomb",
            MeldKind::Bomb8 => "8-card bomb",
            MeldKind::JokerBomb => "joker bomb",
        }
    }

    /// Same-rank bomb for a given card count.
    pub fn bomb_of(size: usize) -> Option<Self> {
        match size {
            4 => Some(MeldKind::Bomb4),
            5 => Some(MeldKind::Bomb5),
            6 => Some(MeldKind::Bomb6),
            7 => Some(MeldKind::Bomb7),
            8 => Some(MeldKind::Bomb8),
            _ => None,
        }
    }

    pub fn is_bomb(self) -> bool {
        matches!(
            self,
            MeldKind::Bomb4
                | MeldKind::Bomb5
                | MeldKind::Bomb6
                | MeldKind::Bomb7
                | MeldKind::Bomb8
                | MeldKind::JokerBomb
                | MeldKind::StraightFlush
        )
    }

    /// Fire melds are exempt from the bomb-split penalty.
    pub fn is_fire(self) -> bool {
        self.is_bomb()
    }
}

/// The rank signature of a meld. Each variant carries only what its shape needs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "kebab-case")]
pub enum Shape {
    Simple {
        #[serde(rename = "mainRank")]
        main_rank: Rank,
    },
    Sequence {
        ranks: Vec<Rank>,
    },
    FlushSequence {
        ranks: Vec<Rank>,
        suit: Suit,
    },
    ThreeWithPair {
        #[serde(rename = "tripleRank")]
        triple_rank: Rank,
        #[serde(rename = "pairRank")]
        pair_rank: Rank,
    },
}

impl Shape {
    /// The rank a meld is compared and scored by: the top of a sequence, the
    /// triple of a three-with-pair.
    pub fn main_rank(&self) -> Rank {
        match self {
            Shape::Simple { main_rank } => *main_rank,
            Shape::Sequence { ranks } | Shape::FlushSequence { ranks, .. } => {
                ranks.last().copied().unwrap_or(Rank::Ace)
            }
            Shape::ThreeWithPair { triple_rank, .. } => *triple_rank,
        }
    }
}

/// One legal interpretation of a card set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeldDefinition {
    pub kind: MeldKind,
    #[serde(flatten)]
    pub shape: Shape,
}

impl MeldDefinition {
    fn simple(kind: MeldKind, main_rank: Rank) -> Self {
        MeldDefinition {
            kind,
            shape: Shape::Simple { main_rank },
        }
    }

    pub fn main_rank(&self) -> Rank {
        self.shape.main_rank()
    }
}

/// A typed group of cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meld {
    pub kind: MeldKind,
    pub cards: Vec<Card>,
    #[serde(flatten)]
    pub shape: Shape,
}

/// Canonical identity of a meld: kind, sorted card ids and rank signature.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeldKey {
    pub kind: MeldKind,
    pub card_ids: Vec<u32>,
    pub shape: Shape,
}

impl Meld {
    pub fn new(kind: MeldKind, cards: Vec<Card>, shape: Shape) -> Self {
        Meld { kind, cards, shape }
    }

    pub fn from_definition(cards: &[Card], definition: &MeldDefinition) -> Self {
        Meld {
            kind: definition.kind,
            cards: cards.to_vec(),
            shape: definition.shape.clone(),
        }
    }

    pub fn main_rank(&self) -> Rank {
        self.shape.main_rank()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn definition(&self) -> MeldDefinition {
        MeldDefinition {
            kind: self.kind,
            shape: self.shape.clone(),
        }
    }

    pub fn key(&self) -> MeldKey {
        let mut card_ids: Vec<u32> = self.cards.iter().map(|c| c.id).collect();
        card_ids.sort_unstable();
        MeldKey {
            kind: self.kind,
            card_ids,
            shape: self.shape.clone(),
        }
    }

    pub fn wildcard_count(&self, trump: Rank) -> usize {
        self.cards.iter().filter(|c| c.is_wildcard(trump)).count()
    }

    /// True when the cards still admit this meld's kind and signature.
    pub fn is_legal(&self, trump: Rank) -> bool {
        let definition = self.definition();
        classify(&self.cards, trump).contains(&definition)
    }
}

/// How [`create_meld`] picks among several interpretations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeldSelector {
    First,
    Index(usize),
    Kind(MeldKind),
    Exact(MeldDefinition),
}

/// Largest meld the classifier recognises.
pub const MAX_MELD_SIZE: usize = 8;

const LINEAR_AXIS: [Rank; 14] = [
    Rank::Ace,
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

const ACE_LOW: u16 = 1 << 0;
const ACE_HIGH: u16 = 1 << 13;

fn axis_bits(rank: Rank) -> u16 {
    match rank {
        Rank::Ace => ACE_LOW | ACE_HIGH,
        Rank::SmallJoker | Rank::BigJoker => 0,
        standard => 1 << (standard.index() + 1),
    }
}

fn window_mask(start: usize, len: usize) -> u16 {
    ((1u16 << len) - 1) << start
}

/// Per-rank counts and axis presence of the fixed, non-joker cards.
#[derive(Debug, Clone, Copy, Default)]
struct RankTally {
    counts: [u8; Rank::COUNT],
    mask: u16,
    total: u8,
}

impl RankTally {
    fn of<'a>(cards: impl IntoIterator<Item = &'a Card>) -> Self {
        let mut tally = RankTally::default();
        for card in cards {
            tally.counts[card.rank.index()] += 1;
            tally.mask |= axis_bits(card.rank);
            tally.total += 1;
        }
        tally
    }

    fn count(&self, rank: Rank) -> u8 {
        self.counts[rank.index()]
    }

    fn distinct(&self) -> impl Iterator<Item = (Rank, u8)> + '_ {
        Rank::ALL
            .iter()
            .map(|&rank| (rank, self.counts[rank.index()]))
            .filter(|&(_, count)| count > 0)
    }
}

/// Input cards split into wildcards, jokers and the remaining fixed cards.
struct SplitCards<'a> {
    wildcards: usize,
    jokers: usize,
    /// Non-wildcard cards, jokers included.
    fixed: Vec<&'a Card>,
}

impl<'a> SplitCards<'a> {
    fn new(cards: &'a [Card], trump: Rank) -> Self {
        let mut wildcards = 0;
        let mut jokers = 0;
        let mut fixed = Vec::with_capacity(cards.len());
        for card in cards {
            if card.is_wildcard(trump) {
                wildcards += 1;
            } else {
                if card.is_joker() {
                    jokers += 1;
                }
                fixed.push(card);
            }
        }
        SplitCards {
            wildcards,
            jokers,
            fixed,
        }
    }

    fn fixed_without_jokers(&self) -> impl Iterator<Item = &'a Card> + '_ {
        self.fixed.iter().copied().filter(|c| !c.is_joker())
    }
}

/// Return every legal interpretation of `cards` under `trump`, strongest first.
///
/// An empty result means the cards cannot be grouped; it is not an error.
pub fn classify(cards: &[Card], trump: Rank) -> Vec<MeldDefinition> {
    let size = cards.len();
    if size == 0 || size > MAX_MELD_SIZE {
        return Vec::new();
    }

    let split = SplitCards::new(cards, trump);
    let mut defs = Vec::new();

    match size {
        1 => defs.push(MeldDefinition::simple(MeldKind::Single, cards[0].rank)),
        2 => {
            if let Some(rank) = match_n_of_kind(&split, size, trump) {
                defs.push(MeldDefinition::simple(MeldKind::Pair, rank));
            }
        }
        3 => {
            if let Some(rank) = match_n_of_kind(&split, size, trump) {
                defs.push(MeldDefinition::simple(MeldKind::Triple, rank));
            }
        }
        4 => {
            if is_joker_bomb(cards) {
                defs.push(MeldDefinition::simple(MeldKind::JokerBomb, Rank::BigJoker));
            }
            if let Some(rank) = match_n_of_kind(&split, size, trump) {
                defs.push(MeldDefinition::simple(MeldKind::Bomb4, rank));
            }
        }
        5 => {
            for (ranks, suit) in match_straight_flush(&split) {
                defs.push(MeldDefinition {
                    kind: MeldKind::StraightFlush,
                    shape: Shape::FlushSequence { ranks, suit },
                });
            }
            if let Some(rank) = match_n_of_kind(&split, size, trump) {
                defs.push(MeldDefinition::simple(MeldKind::Bomb5, rank));
            }
            for ranks in match_sequence(&split, 5, 1) {
                defs.push(MeldDefinition {
                    kind: MeldKind::Straight,
                    shape: Shape::Sequence { ranks },
                });
            }
            for (triple_rank, pair_rank) in match_three_with_pair(&split) {
                defs.push(MeldDefinition {
                    kind: MeldKind::ThreeWithPair,
                    shape: Shape::ThreeWithPair {
                        triple_rank,
                        pair_rank,
                    },
                });
            }
        }
        6 => {
            if let Some(rank) = match_n_of_kind(&split, size, trump) {
                defs.push(MeldDefinition::simple(MeldKind::Bomb6, rank));
            }
            for ranks in match_sequence(&split, 3, 2) {
                defs.push(MeldDefinition {
                    kind: MeldKind::Plate,
                    shape: Shape::Sequence { ranks },
                });
            }
            for ranks in match_sequence(&split, 2, 3) {
                defs.push(MeldDefinition {
                    kind: MeldKind::Tube,
                    shape: Shape::Sequence { ranks },
                });
            }
        }
        _ => {
            if let (Some(kind), Some(rank)) =
                (MeldKind::bomb_of(size), match_n_of_kind(&split, size, trump))
            {
                defs.push(MeldDefinition::simple(kind, rank));
            }
        }
    }

    let mut seen = HashSet::with_capacity(defs.len());
    defs.retain(|def| seen.insert(def.clone()));
    defs.sort_by(|a, b| compare_definitions(a, b, trump));
    defs
}

/// Strongest interpretation first: kind priority, then rank strength, then a
/// stable tiebreak on the signature.
fn compare_definitions(a: &MeldDefinition, b: &MeldDefinition, trump: Rank) -> Ordering {
    b.kind
        .priority()
        .cmp(&a.kind.priority())
        .then_with(|| b.main_rank().strength(trump).cmp(&a.main_rank().strength(trump)))
        .then_with(|| b.shape.cmp(&a.shape))
}

fn match_n_of_kind(split: &SplitCards<'_>, size: usize, trump: Rank) -> Option<Rank> {
    let tally = RankTally::of(split.fixed.iter().copied());
    let mut ranks = tally.distinct();
    let first = ranks.next();
    if ranks.next().is_some() {
        return None;
    }

    match first {
        Some((rank, count)) if rank.is_joker() => {
            // Jokers never pair up and never take wildcards.
            if size == 2 || split.wildcards > 0 || count as usize != size {
                None
            } else {
                Some(rank)
            }
        }
        Some((rank, count)) => (count as usize + split.wildcards == size).then_some(rank),
        None => (split.wildcards == size).then_some(trump),
    }
}

/// Windows of `len` consecutive ranks that `copies` of each rank can fill.
fn match_sequence(split: &SplitCards<'_>, len: usize, copies: u8) -> Vec<Vec<Rank>> {
    if split.jokers > 0 {
        return Vec::new();
    }
    let tally = RankTally::of(split.fixed_without_jokers());
    sequence_windows(&tally, split.wildcards, len, copies)
}

fn sequence_windows(tally: &RankTally, wildcards: usize, len: usize, copies: u8) -> Vec<Vec<Rank>> {
    (0..=LINEAR_AXIS.len() - len)
        .filter(|&start| window_fits(tally, wildcards, start, len, copies))
        .map(|start| LINEAR_AXIS[start..start + len].to_vec())
        .collect()
}

fn window_fits(tally: &RankTally, wildcards: usize, start: usize, len: usize, copies: u8) -> bool {
    let window = window_mask(start, len);

    // The ace owns two axis bits; only the one this window can use matters.
    let mut fixed = tally.mask;
    if window & ACE_HIGH != 0 {
        fixed &= !ACE_LOW;
    }
    if window & ACE_LOW != 0 {
        fixed &= !ACE_HIGH;
    }
    if fixed & !window != 0 {
        return false;
    }

    // No window reaches both ends of the axis, so each rank is counted once.
    let mut missing = 0usize;
    for &rank in &LINEAR_AXIS[start..start + len] {
        let have = tally.count(rank);
        if have > copies {
            return false;
        }
        missing += (copies - have) as usize;
    }
    missing <= wildcards
}

fn match_straight_flush(split: &SplitCards<'_>) -> Vec<(Vec<Rank>, Suit)> {
    if split.jokers > 0 {
        return Vec::new();
    }

    let mut suits: Vec<Suit> = split.fixed_without_jokers().map(|c| c.suit).collect();
    suits.sort_unstable();
    suits.dedup();
    let candidates: &[Suit] = match suits.len() {
        0 => &Suit::STANDARD[..],
        1 => &suits[..],
        _ => return Vec::new(),
    };

    let windows = match_sequence(split, 5, 1);
    candidates
        .iter()
        .flat_map(|&suit| windows.iter().map(move |ranks| (ranks.clone(), suit)))
        .collect()
}

fn match_three_with_pair(split: &SplitCards<'_>) -> Vec<(Rank, Rank)> {
    let tally = RankTally::of(split.fixed.iter().copied());
    let mut matches = Vec::new();

    for &triple_rank in &Rank::ALL {
        for &pair_rank in &Rank::ALL {
            if triple_rank == pair_rank {
                continue;
            }

            let triple_fixed = tally.count(triple_rank);
            let pair_fixed = tally.count(pair_rank);
            if triple_fixed + pair_fixed != tally.total || triple_fixed > 3 || pair_fixed > 2 {
                continue;
            }

            let need_triple = 3 - triple_fixed;
            let need_pair = 2 - pair_fixed;
            if (triple_rank.is_joker() && need_triple > 0) || (pair_rank.is_joker() && need_pair > 0)
            {
                continue;
            }

            if (need_triple + need_pair) as usize <= split.wildcards {
                matches.push((triple_rank, pair_rank));
            }
        }
    }

    matches
}

fn is_joker_bomb(cards: &[Card]) -> bool {
    let small = cards.iter().filter(|c| c.rank == Rank::SmallJoker).count();
    let big = cards.iter().filter(|c| c.rank == Rank::BigJoker).count();
    cards.len() == 4 && small == 2 && big == 2
}

/// Build a meld from `cards`, choosing one interpretation. Unmatched selectors
/// fall back to the strongest interpretation; ungroupable cards give `None`.
pub fn create_meld(cards: &[Card], trump: Rank, selector: &MeldSelector) -> Option<Meld> {
    let definitions = classify(cards, trump);
    let first = definitions.first()?;

    let picked = match selector {
        MeldSelector::First => None,
        MeldSelector::Index(i) => definitions.get(*i),
        MeldSelector::Kind(kind) => definitions.iter().find(|d| d.kind == *kind),
        MeldSelector::Exact(wanted) => definitions.iter().find(|d| *d == wanted),
    }
    .unwrap_or(first);

    Some(Meld::from_definition(cards, picked))
}

/// Human-readable label, e.g. `straight (10-J-Q-K-A)` or `three-with-pair (7 over 3)`.
pub fn describe(definition: &MeldDefinition) -> String {
    let label = definition.kind.label();
    match &definition.shape {
        Shape::Sequence { ranks } => format!("{} ({})", label, join_ranks(ranks)),
        Shape::FlushSequence { ranks, suit } => {
            format!("{} ({}{})", label, suit.symbol(), join_ranks(ranks))
        }
        Shape::ThreeWithPair {
            triple_rank,
            pair_rank,
        } => format!("{} ({} over {})", label, triple_rank, pair_rank),
        Shape::Simple { main_rank } => format!("{} ({})", label, main_rank),
    }
}

fn join_ranks(ranks: &[Rank]) -> String {
    ranks
        .iter()
        .map(|r| r.symbol())
        .collect::<Vec<_>>()
        .join("-")
}

/// True when `melds` use every card of `hand` exactly once.
pub fn covers_exactly(hand: &[Card], melds: &[Meld]) -> bool {
    let mut expected: Vec<u32> = hand.iter().map(|c| c.id).collect();
    let mut used: Vec<u32> = melds
        .iter()
        .flat_map(|m| m.cards.iter().map(|c| c.id))
        .collect();
    expected.sort_unstable();
    used.sort_unstable();
    expected == used
}
