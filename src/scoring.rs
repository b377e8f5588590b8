//! Table-driven meld and scheme scoring.

use serde::{Deserialize, Serialize};

use crate::Rank;
use crate::melds::{Meld, MeldKind};

/// Per-meld score components. Round correction is applied per scheme, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeldScore {
    pub shape_score: i32,
    pub burst_score: i32,
    pub key_score: i32,
    pub total: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemeDetail {
    pub hand_count: usize,
    pub shape_score: i32,
    pub burst_score: i32,
    pub key_score: i32,
    pub round_score: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeldBreakdown {
    pub kind: MeldKind,
    pub main_rank: Rank,
    #[serde(flatten)]
    pub score: MeldScore,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemeScore {
    pub total: i32,
    pub detail: SchemeDetail,
    pub breakdown: Vec<MeldBreakdown>,
}

enum RankTier {
    High,
    Mid,
    Low,
}

fn rank_tier(rank: Rank, trump: Rank) -> RankTier {
    if rank == trump {
        return RankTier::High;
    }
    match rank {
        Rank::Queen | Rank::King | Rank::Ace | Rank::SmallJoker | Rank::BigJoker => RankTier::High,
        Rank::Eight | Rank::Nine | Rank::Ten | Rank::Jack => RankTier::Mid,
        _ => RankTier::Low,
    }
}

fn shape_score(meld: &Meld, trump: Rank) -> i32 {
    let tier = rank_tier(meld.main_rank(), trump);
    match meld.kind {
        MeldKind::Single
        | MeldKind::Pair
        | MeldKind::Triple
        | MeldKind::Straight
        | MeldKind::ThreeWithPair => match tier {
            RankTier::High => 1,
            RankTier::Mid => 0,
            RankTier::Low => -1,
        },
        MeldKind::Plate | MeldKind::Tube => match tier {
            RankTier::High => 2,
            RankTier::Mid => 1,
            RankTier::Low => 0,
        },
        _ => 0,
    }
}

/// Must exceed 10: four joker singles earn 14 points over three extra melds,
/// which cost at least 4 round points.
const JOKER_BOMB_BURST: i32 = 11;

fn burst_score(meld: &Meld) -> i32 {
    match meld.kind {
        MeldKind::JokerBomb => JOKER_BOMB_BURST,
        MeldKind::Bomb6 | MeldKind::Bomb7 | MeldKind::Bomb8 => 5,
        MeldKind::StraightFlush => 4,
        MeldKind::Bomb5 => 3,
        MeldKind::Bomb4 => {
            if meld.main_rank().value() > 10 {
                2
            } else {
                1
            }
        }
        _ => 0,
    }
}

/// Control value of a lone joker or wildcard.
fn key_score(meld: &Meld, trump: Rank) -> i32 {
    if meld.kind != MeldKind::Single {
        return 0;
    }
    let Some(card) = meld.cards.first() else {
        return 0;
    };
    match card.rank {
        Rank::BigJoker => 3,
        Rank::SmallJoker => 2,
        _ if card.is_wildcard(trump) => 2,
        _ => 0,
    }
}

pub fn score_meld(meld: &Meld, trump: Rank) -> MeldScore {
    let shape_score = shape_score(meld, trump);
    let burst_score = burst_score(meld);
    let key_score = key_score(meld, trump);
    MeldScore {
        shape_score,
        burst_score,
        key_score,
        total: shape_score + burst_score + key_score,
    }
}

/// Reward for finishing in few melds, penalty for many, zero in between.
///
/// An empty scheme has nothing to correct.
pub fn round_correction(hand_count: usize) -> i32 {
    let n = hand_count as i32;
    match hand_count {
        0 => 0,
        1..=8 => 2 * (9 - n),
        9..=10 => 0,
        _ => -2 * (n - 10),
    }
}

pub fn score_scheme(melds: &[Meld], trump: Rank) -> SchemeScore {
    let mut detail = SchemeDetail {
        hand_count: melds.len(),
        ..SchemeDetail::default()
    };

    let breakdown: Vec<MeldBreakdown> = melds
        .iter()
        .map(|meld| {
            let score = score_meld(meld, trump);
            detail.shape_score += score.shape_score;
            detail.burst_score += score.burst_score;
            detail.key_score += score.key_score;
            MeldBreakdown {
                kind: meld.kind,
                main_rank: meld.main_rank(),
                score,
            }
        })
        .collect();

    detail.round_score = round_correction(melds.len());
    SchemeScore {
        total: detail.shape_score + detail.burst_score + detail.key_score + detail.round_score,
        detail,
        breakdown,
    }
}

/// Search-side cost of spending wildcards on a meld that does not earn more
/// than a lone wildcard would. Singles and fire melds are never penalised.
pub fn wildcard_utility_penalty(meld: &Meld, score: &MeldScore, trump: Rank) -> i32 {
    if meld.kind == MeldKind::Single || meld.kind.is_fire() {
        return 0;
    }
    let wildcards = meld.wildcard_count(trump) as i32;
    wildcards * (2 - score.total).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::melds::{MeldSelector, create_meld};
    use crate::parse_hand;

    fn meld(cards: &str, trump: Rank, kind: MeldKind) -> Meld {
        let cards = parse_hand(cards).unwrap();
        let meld = create_meld(&cards, trump, &MeldSelector::Kind(kind)).unwrap();
        assert_eq!(meld.kind, kind);
        meld
    }

    fn total(cards: &str, trump: Rank, kind: MeldKind) -> i32 {
        score_meld(&meld(cards, trump, kind), trump).total
    }

    #[test]
    fn test_single_scores() {
        assert_eq!(total("JK", Rank::Two, MeldKind::Single), 4);
        assert_eq!(total("jk", Rank::Two, MeldKind::Single), 3);
        assert_eq!(total("SA", Rank::Two, MeldKind::Single), 1);
        assert_eq!(total("SJ", Rank::Two, MeldKind::Single), 0);
        assert_eq!(total("S8", Rank::Two, MeldKind::Single), 0);
        assert_eq!(total("S3", Rank::Two, MeldKind::Single), -1);
        // A lone wildcard: trump tier plus its control value.
        assert_eq!(total("H5", Rank::Five, MeldKind::Single), 3);
        // Trump rank outside the wild suit is still high, but not a key card.
        assert_eq!(total("S5", Rank::Five, MeldKind::Single), 1);
    }

    #[test]
    fn test_basic_shapes() {
        assert_eq!(total("SK HK", Rank::Two, MeldKind::Pair), 1);
        assert_eq!(total("S10 H10", Rank::Two, MeldKind::Pair), 0);
        assert_eq!(total("S3 H3", Rank::Two, MeldKind::Pair), -1);
        assert_eq!(total("S10 HJ CQ DK SA", Rank::Two, MeldKind::Straight), 1);
        assert_eq!(total("S5 H6 C7 D8 S9", Rank::Two, MeldKind::Straight), 0);
        assert_eq!(total("SK HK CK S3 H3", Rank::Two, MeldKind::ThreeWithPair), 1);
    }

    #[test]
    fn test_plate_and_tube_scores() {
        assert_eq!(total("S4 H4 S5 H5 S6 H6", Rank::Two, MeldKind::Plate), 0);
        assert_eq!(total("S8 H8 S9 H9 S10 H10", Rank::Two, MeldKind::Plate), 1);
        assert_eq!(total("SQ HQ CQ SK HK CK", Rank::Two, MeldKind::Tube), 2);
    }

    #[test]
    fn test_fire_ladder() {
        assert_eq!(total("JK JK jk jk", Rank::Two, MeldKind::JokerBomb), 11);
        assert_eq!(total("SA HA CA DA SA HA", Rank::Two, MeldKind::Bomb6), 5);
        assert_eq!(total("S10 SJ SQ SK SA", Rank::Two, MeldKind::StraightFlush), 4);
        assert_eq!(total("SK HK CK DK SK", Rank::Two, MeldKind::Bomb5), 3);
        assert_eq!(total("SA HA CA DA", Rank::Two, MeldKind::Bomb4), 2);
        assert_eq!(total("SJ HJ CJ DJ", Rank::Two, MeldKind::Bomb4), 2);
        assert_eq!(total("S7 H7 C7 D7", Rank::Two, MeldKind::Bomb4), 1);
    }

    #[test]
    fn test_joker_bomb_outscores_joker_singles() {
        let bomb = meld("JK JK jk jk", Rank::Two, MeldKind::JokerBomb);
        let singles: i32 = ["JK", "JK", "jk", "jk"]
            .iter()
            .map(|code| total(code, Rank::Two, MeldKind::Single))
            .sum();
        let bomb = score_meld(&bomb, Rank::Two).total;
        // Whatever else the hand holds, the split costs three extra melds.
        for others in 0..=20 {
            let kept = bomb + round_correction(others + 1);
            let split = singles + round_correction(others + 4);
            assert!(kept > split, "{others} other melds: bomb {kept} vs split {split}");
        }
    }

    #[test]
    fn test_round_correction() {
        assert_eq!(round_correction(0), 0);
        assert_eq!(round_correction(3), 12);
        assert_eq!(round_correction(8), 2);
        assert_eq!(round_correction(9), 0);
        assert_eq!(round_correction(10), 0);
        assert_eq!(round_correction(11), -2);
        assert_eq!(round_correction(14), -8);
    }

    #[test]
    fn test_score_scheme_decomposition() {
        let melds = vec![
            meld("SA HA CA DA", Rank::Two, MeldKind::Bomb4),
            meld("SK HK", Rank::Two, MeldKind::Pair),
            meld("JK", Rank::Two, MeldKind::Single),
        ];
        let scored = score_scheme(&melds, Rank::Two);

        // bomb4 A = 2, pair K = 1, single BJ = 1 + 3; three melds add 12.
        assert_eq!(scored.detail.hand_count, 3);
        assert_eq!(scored.detail.burst_score, 2);
        assert_eq!(scored.detail.shape_score, 2);
        assert_eq!(scored.detail.key_score, 3);
        assert_eq!(scored.detail.round_score, 12);
        assert_eq!(scored.total, 19);

        let per_meld: i32 = melds.iter().map(|m| score_meld(m, Rank::Two).total).sum();
        assert_eq!(scored.total, per_meld + round_correction(melds.len()));
        assert_eq!(scored.breakdown.len(), 3);
        assert_eq!(scored.breakdown[0].main_rank, Rank::Ace);
    }

    #[test]
    fn test_empty_scheme() {
        let scored = score_scheme(&[], Rank::Two);
        assert_eq!(scored.total, 0);
        assert!(scored.breakdown.is_empty());
    }

    #[test]
    fn test_wildcard_utility_penalty() {
        let trump = Rank::Two;
        let bomb = meld("S8 H8 C8 D8 H2", trump, MeldKind::Bomb5);
        assert_eq!(wildcard_utility_penalty(&bomb, &score_meld(&bomb, trump), trump), 0);

        let single = meld("H2", trump, MeldKind::Single);
        assert_eq!(wildcard_utility_penalty(&single, &score_meld(&single, trump), trump), 0);

        // Spending a wildcard on a low pair wastes it.
        let low_pair = meld("S3 H2", trump, MeldKind::Pair);
        assert_eq!(
            wildcard_utility_penalty(&low_pair, &score_meld(&low_pair, trump), trump),
            3
        );

        let plain_pair = meld("S3 H3", trump, MeldKind::Pair);
        assert_eq!(
            wildcard_utility_penalty(&plain_pair, &score_meld(&plain_pair, trump), trump),
            0
        );
    }
}
