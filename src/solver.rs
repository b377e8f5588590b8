//! Anytime search for a high-scoring partition of a hand into melds.
//!
//! 1. A greedy baseline repeatedly takes the best-estimated candidate meld for
//!    the lowest remaining card. It always yields a complete partition.
//! 2. A beam search then keeps the most promising partial partitions, layer by
//!    layer, skipping states already reached with a better partial score and
//!    states whose optimistic bound cannot beat the best complete partition.
//! 3. Every complete partition is offered to a bounded, signature-deduplicated
//!    top-K list. On timeout the unfinished beam is completed greedily.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{Level, event};

use crate::melds::{MAX_MELD_SIZE, Meld, MeldKey, MeldKind, Shape, classify};
use crate::scoring::{
    MeldBreakdown, MeldScore, SchemeDetail, round_correction, score_meld, score_scheme,
    wildcard_utility_penalty,
};
use crate::{Card, Rank, sort_cards};

pub const DEFAULT_TIME_LIMIT_MS: u64 = 3000;
pub const DEFAULT_MAX_BRANCH: usize = 24;
pub const DEFAULT_TOP_K: usize = 3;
const MAX_TOP_K: usize = 10;

/// Hard cap on the cards considered around one anchor.
const MAX_POOL_SIZE: usize = 13;
const BOMB_SPLIT_PENALTY_PER_CARD: i32 = 3;
const WILDCARD_PENALTY_WEIGHT: i32 = 4;

/// Best per-card contribution any meld can make (a lone big joker).
const MAX_SCORE_PER_CARD: i32 = 4;

/// Subsets examined per meld size, indexed by size.
const SIZE_LIMIT: [usize; MAX_MELD_SIZE + 1] = [0, 1, 16, 20, 22, 24, 20, 12, 8];

/// Wall-clock budget of one solve, measured from when the search starts.
#[derive(Clone, Copy)]
pub(crate) struct TimeTracker {
    #[cfg(not(target_arch = "wasm32"))]
    started: std::time::Instant,
    #[cfg(target_arch = "wasm32")]
    started_ms: f64,
    budget_ms: u64,
}

impl TimeTracker {
    pub(crate) fn new(budget_ms: u64) -> Self {
        Self {
            #[cfg(not(target_arch = "wasm32"))]
            started: std::time::Instant::now(),
            #[cfg(target_arch = "wasm32")]
            started_ms: now_ms(),
            budget_ms,
        }
    }

    pub(crate) fn elapsed_ms(&self) -> u64 {
        #[cfg(not(target_arch = "wasm32"))]
        {
            self.started.elapsed().as_millis() as u64
        }
        #[cfg(target_arch = "wasm32")]
        {
            (now_ms() - self.started_ms).max(0.0).round() as u64
        }
    }

    pub(crate) fn is_expired(&self) -> bool {
        self.elapsed_ms() >= self.budget_ms
    }
}

/// High-resolution clock when a window is available, wall clock otherwise
/// (web workers have no `window`).
#[cfg(target_arch = "wasm32")]
fn now_ms() -> f64 {
    web_sys::window()
        .and_then(|w| w.performance())
        .map(|p| p.now())
        .unwrap_or_else(js_sys::Date::now)
}

/// Which recommendation the search is ranking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchBias {
    /// Highest score first.
    #[default]
    Ceiling,
    /// Fewest melds first, score second.
    Control,
}

impl SearchBias {
    pub fn compare(self, a: &SchemeResult, b: &SchemeResult) -> Ordering {
        match self {
            SearchBias::Ceiling => compare_scheme_results(a, b),
            SearchBias::Control => a
                .detail
                .hand_count
                .cmp(&b.detail.hand_count)
                .then_with(|| compare_scheme_results(a, b)),
        }
    }

    /// Beam ranking weights in tenths: (remaining quality, round correction,
    /// per-meld cost).
    fn beam_weights(self) -> (i64, i64, i64) {
        match self {
            SearchBias::Ceiling => (5, 3, 0),
            SearchBias::Control => (5, 8, 5),
        }
    }
}

/// Search options. Missing JSON fields take the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SolveOptions {
    pub time_limit_ms: u64,
    pub max_branch: usize,
    pub top_k: usize,
    /// Defaults to `max(8, 0.6 * max_branch)`.
    pub beam_width: Option<usize>,
    pub target_score: Option<i32>,
    pub stop_after_surpass: bool,
    pub dual_mode: bool,
    pub bias: SearchBias,
}

impl Default for SolveOptions {
    fn default() -> Self {
        SolveOptions {
            time_limit_ms: DEFAULT_TIME_LIMIT_MS,
            max_branch: DEFAULT_MAX_BRANCH,
            top_k: DEFAULT_TOP_K,
            beam_width: None,
            target_score: None,
            stop_after_surpass: false,
            dual_mode: false,
            bias: SearchBias::Ceiling,
        }
    }
}

impl SolveOptions {
    fn clamped_top_k(&self) -> usize {
        self.top_k.clamp(1, MAX_TOP_K)
    }

    fn branch(&self) -> usize {
        self.max_branch.max(1)
    }

    fn resolved_beam_width(&self) -> usize {
        self.beam_width
            .unwrap_or_else(|| (self.branch() * 6 / 10).max(8))
            .max(1)
    }
}

/// A complete partition of a hand with its score.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemeResult {
    pub combos: Vec<Meld>,
    pub score: i32,
    pub detail: SchemeDetail,
    pub combo_breakdown: Vec<MeldBreakdown>,
    /// Cards from potential bombs spent in non-fire melds.
    pub split_bomb_cards: usize,
    pub fire_combo_count: usize,
    /// Sorted meld keys; identical partitions share a signature.
    #[serde(skip)]
    pub signature: Vec<MeldKey>,
}

impl SchemeResult {
    pub fn card_count(&self) -> usize {
        self.combos.iter().map(Meld::len).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    #[default]
    Completed,
    Timeout,
    TargetSurpassed,
}

/// The best partition plus search provenance and ranked alternates.
/// Counts of states the search chose not to expand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStats {
    /// Same cards left after as many melds, with no better partial score.
    pub memo_skips: u64,
    /// Even a perfect finish could not reach the best complete result.
    pub bound_prunes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    #[serde(flatten)]
    pub best: SchemeResult,
    pub timed_out: bool,
    pub exact: bool,
    pub elapsed_ms: u64,
    pub search_nodes: u64,
    #[serde(default)]
    pub stats: SearchStats,
    pub stop_reason: StopReason,
    pub surpassed_target: bool,
    pub top_results: Vec<SchemeResult>,
    pub alternatives: Vec<SchemeResult>,
}

impl Solution {
    fn empty() -> Self {
        let best = SchemeResult::default();
        Solution {
            top_results: vec![best.clone()],
            best,
            exact: true,
            ..Solution::default()
        }
    }

    pub fn score(&self) -> i32 {
        self.best.score
    }
}

/// Ceiling and control recommendations for the same hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualRecommendation {
    pub ceiling: Solution,
    pub control: Solution,
}

impl DualRecommendation {
    /// The better of the two under the canonical ordering.
    pub fn preferred(&self) -> &Solution {
        if compare_scheme_results(&self.control.best, &self.ceiling.best) == Ordering::Less {
            &self.control
        } else {
            &self.ceiling
        }
    }

    pub fn surpassed(&self, target: i32) -> bool {
        self.ceiling.score() > target || self.control.score() > target
    }
}

/// Output of [`recommend`]: one solution, or both recommendations in dual mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recommendation {
    Dual(DualRecommendation),
    Single(Solution),
}

impl Recommendation {
    pub fn preferred(&self) -> &Solution {
        match self {
            Recommendation::Single(solution) => solution,
            Recommendation::Dual(dual) => dual.preferred(),
        }
    }
}

/// Canonical ordering of complete partitions; `Less` means `a` is better.
///
/// Score descending, meld count ascending, split bomb cards ascending, fire
/// melds descending, then burst, shape and key components descending, and
/// finally the signature.
pub fn compare_scheme_results(a: &SchemeResult, b: &SchemeResult) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.detail.hand_count.cmp(&b.detail.hand_count))
        .then_with(|| a.split_bomb_cards.cmp(&b.split_bomb_cards))
        .then_with(|| b.fire_combo_count.cmp(&a.fire_combo_count))
        .then_with(|| b.detail.burst_score.cmp(&a.detail.burst_score))
        .then_with(|| b.detail.shape_score.cmp(&a.detail.shape_score))
        .then_with(|| b.detail.key_score.cmp(&a.detail.key_score))
        .then_with(|| a.signature.cmp(&b.signature))
}

/// Cards belonging to a rank group large enough to become a bomb.
#[derive(Debug, Clone, Default)]
pub struct BombProtection {
    protected_ids: HashSet<u32>,
    protected_groups: usize,
}

impl BombProtection {
    pub fn new(cards: &[Card]) -> Self {
        let mut by_rank: [Vec<u32>; Rank::COUNT] = Default::default();
        for card in cards.iter().filter(|c| !c.is_joker()) {
            by_rank[card.rank.index()].push(card.id);
        }

        let mut protection = BombProtection::default();
        for ids in by_rank.iter().filter(|ids| ids.len() >= 4) {
            protection.protected_groups += ids.len() / 4;
            protection.protected_ids.extend(ids.iter().copied());
        }
        protection
    }

    pub fn groups(&self) -> usize {
        self.protected_groups
    }

    pub fn is_protected(&self, card: &Card) -> bool {
        self.protected_ids.contains(&card.id)
    }

    fn cards_diverted(&self, meld: &Meld) -> usize {
        if meld.kind.is_fire() {
            return 0;
        }
        meld.cards.iter().filter(|c| self.is_protected(c)).count()
    }
}

/// Penalty for breaking up a potential bomb with a non-fire meld.
pub fn split_bomb_penalty(meld: &Meld, protection: &BombProtection) -> i32 {
    protection.cards_diverted(meld) as i32 * BOMB_SPLIT_PENALTY_PER_CARD
}

/// Heuristic value of taking `meld` now, used to rank candidates.
pub fn candidate_estimate(
    meld: &Meld,
    score: &MeldScore,
    protection: &BombProtection,
    trump: Rank,
) -> i32 {
    score.total * 8 + meld.len() as i32 * 2 + meld.kind.priority()
        - split_bomb_penalty(meld, protection)
        - wildcard_utility_penalty(meld, score, trump) * WILDCARD_PENALTY_WEIGHT
}

/// A scored meld the search may take next.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub meld: Meld,
    pub score: MeldScore,
    pub estimate: i32,
}

fn cyclic_rank_distance(a: Rank, b: Rank) -> Option<u8> {
    let (a, b) = (a.cycle_index()?, b.cycle_index()?);
    let diff = a.abs_diff(b);
    Some(diff.min(13 - diff))
}

/// Cards worth combining with `anchor`, most relevant first: same rank,
/// wildcards, same suit, nearby ranks, jokers, then anything else.
pub fn build_candidate_pool(remaining: &[Card], anchor: &Card, trump: Rank) -> Vec<Card> {
    let mut pool = Vec::with_capacity(MAX_POOL_SIZE);
    let mut seen = HashSet::with_capacity(MAX_POOL_SIZE);

    let mut add = |pool: &mut Vec<Card>, card: &Card| {
        if pool.len() < MAX_POOL_SIZE && seen.insert(card.id) {
            pool.push(*card);
        }
    };

    add(&mut pool, anchor);
    for card in remaining.iter().filter(|c| c.rank == anchor.rank) {
        add(&mut pool, card);
    }
    for card in remaining.iter().filter(|c| c.is_wildcard(trump)) {
        add(&mut pool, card);
    }
    if !anchor.is_joker() {
        for card in remaining
            .iter()
            .filter(|c| !c.is_joker() && c.suit == anchor.suit)
        {
            add(&mut pool, card);
        }
        for card in remaining.iter().filter(|c| {
            cyclic_rank_distance(c.rank, anchor.rank).is_some_and(|distance| distance <= 4)
        }) {
            add(&mut pool, card);
        }
    }
    for card in remaining.iter().filter(|c| c.is_joker()) {
        add(&mut pool, card);
    }
    for card in remaining {
        add(&mut pool, card);
    }

    pool
}

/// Up to `max_count` subsets of `pool` of the given size that contain `anchor`,
/// in lexicographic order of the other members.
fn subsets_with_anchor(
    anchor: &Card,
    pool: &[Card],
    size: usize,
    max_count: usize,
) -> Vec<Vec<Card>> {
    let others: Vec<Card> = pool.iter().filter(|c| c.id != anchor.id).copied().collect();
    let need = size.saturating_sub(1);
    if size == 0 || others.len() < need {
        return Vec::new();
    }

    let mut result = Vec::new();
    let mut path = Vec::with_capacity(need);
    collect_subsets(anchor, &others, need, 0, &mut path, max_count, &mut result);
    result
}

fn collect_subsets(
    anchor: &Card,
    others: &[Card],
    need: usize,
    start: usize,
    path: &mut Vec<Card>,
    max_count: usize,
    result: &mut Vec<Vec<Card>>,
) {
    if result.len() >= max_count {
        return;
    }
    if path.len() == need {
        let mut subset = Vec::with_capacity(need + 1);
        subset.push(*anchor);
        subset.extend_from_slice(path);
        result.push(subset);
        return;
    }
    for i in start..others.len() {
        path.push(others[i]);
        collect_subsets(anchor, others, need, i + 1, path, max_count, result);
        path.pop();
        if result.len() >= max_count {
            return;
        }
    }
}

/// Immutable inputs shared by candidate generation and scoring.
struct Generator<'a> {
    trump: Rank,
    max_branch: usize,
    protection: &'a BombProtection,
}

impl Generator<'_> {
    fn candidate(&self, meld: Meld) -> Candidate {
        let score = score_meld(&meld, self.trump);
        let estimate = candidate_estimate(&meld, &score, self.protection, self.trump);
        Candidate {
            meld,
            score,
            estimate,
        }
    }

    /// Ranked candidates covering the first remaining card. Never empty for a
    /// non-empty hand: the anchor alone is always a single.
    fn generate(&self, remaining: &[Card]) -> Vec<Candidate> {
        let Some(anchor) = remaining.first() else {
            return Vec::new();
        };

        let pool = build_candidate_pool(remaining, anchor, self.trump);
        let mut candidates = Vec::new();
        let mut seen = HashSet::new();

        for size in 1..=MAX_MELD_SIZE.min(pool.len()) {
            for subset in subsets_with_anchor(anchor, &pool, size, SIZE_LIMIT[size]) {
                for definition in classify(&subset, self.trump) {
                    let meld = Meld::from_definition(&subset, &definition);
                    if seen.insert(meld.key()) {
                        candidates.push(self.candidate(meld));
                    }
                }
            }
        }

        if candidates.is_empty() {
            let single = Meld::new(
                MeldKind::Single,
                vec![*anchor],
                Shape::Simple {
                    main_rank: anchor.rank,
                },
            );
            return vec![self.candidate(single)];
        }

        candidates.sort_by(|a, b| {
            b.estimate
                .cmp(&a.estimate)
                .then_with(|| b.meld.len().cmp(&a.meld.len()))
                .then_with(|| b.score.total.cmp(&a.score.total))
        });
        candidates.truncate(self.max_branch);
        candidates
    }

    /// Complete `remaining` by always taking the top candidate.
    fn greedy(&self, remaining: &[Card]) -> Vec<Meld> {
        let mut remaining = remaining.to_vec();
        let mut melds = Vec::new();
        while !remaining.is_empty() {
            let Some(picked) = self.generate(&remaining).into_iter().next() else {
                break;
            };
            remaining = without_cards(&remaining, &picked.meld.cards);
            melds.push(picked.meld);
        }
        melds
    }

    fn scheme(&self, melds: Vec<Meld>) -> SchemeResult {
        let scored = score_scheme(&melds, self.trump);
        let split_bomb_cards = melds
            .iter()
            .map(|m| self.protection.cards_diverted(m))
            .sum();
        let fire_combo_count = melds.iter().filter(|m| m.kind.is_fire()).count();
        let mut signature: Vec<MeldKey> = melds.iter().map(Meld::key).collect();
        signature.sort();

        SchemeResult {
            combos: melds,
            score: scored.total,
            detail: scored.detail,
            combo_breakdown: scored.breakdown,
            split_bomb_cards,
            fire_combo_count,
            signature,
        }
    }
}

fn without_cards(remaining: &[Card], taken: &[Card]) -> Vec<Card> {
    remaining
        .iter()
        .filter(|c| !taken.iter().any(|t| t.id == c.id))
        .copied()
        .collect()
}

/// Order-independent digest of a card set.
fn card_digest(card: &Card) -> u64 {
    // splitmix64 finaliser
    let mut z = (card.id as u64).wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn set_digest(cards: &[Card]) -> u64 {
    cards
        .iter()
        .fold(0u64, |acc, c| acc.wrapping_add(card_digest(c)))
}

/// Memoization key: which cards remain and how many melds were spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct StateKey {
    remaining: u64,
    melds: usize,
}

/// Quick estimate of how much a set of leftover cards is still worth.
fn remaining_quality(remaining: &[Card], trump: Rank) -> i32 {
    let mut counts = [0usize; Rank::COUNT];
    let mut control = 0;
    for card in remaining {
        counts[card.rank.index()] += 1;
        control += match card.rank {
            Rank::BigJoker => 3,
            Rank::SmallJoker => 2,
            _ if card.is_wildcard(trump) => 2,
            Rank::Ace => 1,
            _ => 0,
        };
    }

    let mut structure = 0;
    let mut isolated_low = 0;
    for rank in Rank::ALL {
        match counts[rank.index()] {
            0 => {}
            1 if !rank.is_joker() && rank.value() < 8 => isolated_low += 1,
            1 => {}
            2 => structure += 1,
            3 => structure += 3,
            _ => structure += 8,
        }
    }

    structure + control - isolated_low
}

struct BeamState {
    melds: Vec<Meld>,
    remaining: Vec<Card>,
    partial: i32,
    digest: u64,
    rank: i64,
}

impl BeamState {
    fn root(cards: &[Card]) -> Self {
        BeamState {
            melds: Vec::new(),
            remaining: cards.to_vec(),
            partial: 0,
            digest: set_digest(cards),
            rank: 0,
        }
    }

    fn child(&self, candidate: &Candidate, trump: Rank, bias: SearchBias) -> Self {
        let remaining = without_cards(&self.remaining, &candidate.meld.cards);
        let digest = self
            .digest
            .wrapping_sub(set_digest(&candidate.meld.cards));
        let mut melds = self.melds.clone();
        melds.push(candidate.meld.clone());
        let partial = self.partial + candidate.score.total;

        let (quality_w, round_w, meld_w) = bias.beam_weights();
        let projected = melds.len() + remaining.len().div_ceil(4);
        let rank = 10 * partial as i64
            + quality_w * remaining_quality(&remaining, trump) as i64
            + round_w * round_correction(projected) as i64
            - meld_w * melds.len() as i64;

        BeamState {
            melds,
            remaining,
            partial,
            digest,
            rank,
        }
    }

    fn key(&self) -> StateKey {
        StateKey {
            remaining: self.digest,
            melds: self.melds.len(),
        }
    }

    /// No completion of this state can score more than this.
    fn upper_bound(&self) -> i32 {
        self.partial + MAX_SCORE_PER_CARD * self.remaining.len() as i32 + round_correction(1)
    }
}

/// Bounded best-K list ordered by the search bias.
struct TopResults {
    items: Vec<SchemeResult>,
    capacity: usize,
    bias: SearchBias,
}

impl TopResults {
    fn new(capacity: usize, bias: SearchBias) -> Self {
        TopResults {
            items: Vec::with_capacity(capacity + 1),
            capacity,
            bias,
        }
    }

    fn offer(&mut self, candidate: SchemeResult) {
        let bias = self.bias;
        if let Some(existing) = self
            .items
            .iter_mut()
            .find(|item| item.signature == candidate.signature)
        {
            if bias.compare(&candidate, existing) == Ordering::Less {
                *existing = candidate;
                self.items.sort_by(|a, b| bias.compare(a, b));
            }
            return;
        }

        self.items.push(candidate);
        self.items.sort_by(|a, b| bias.compare(a, b));
        self.items.truncate(self.capacity);
    }

    fn best_score(&self) -> Option<i32> {
        self.items.iter().map(|r| r.score).max()
    }
}

/// Deadline, node count and stop flags threaded through the search.
struct SearchState {
    timer: TimeTracker,
    nodes: u64,
    stats: SearchStats,
    timed_out: bool,
    target: Option<i32>,
    stop_after_surpass: bool,
    surpassed: bool,
}

impl SearchState {
    fn expired(&mut self) -> bool {
        if !self.timed_out && self.timer.is_expired() {
            self.timed_out = true;
        }
        self.timed_out
    }

    fn record(&mut self, result: &SchemeResult) {
        if self.target.is_some_and(|target| result.score > target) {
            self.surpassed = true;
        }
    }

    fn should_stop(&self) -> bool {
        self.surpassed && self.stop_after_surpass
    }
}

fn beam_search(
    cards: &[Card],
    generator: &Generator<'_>,
    options: &SolveOptions,
    state: &mut SearchState,
    top: &mut TopResults,
) {
    let width = options.resolved_beam_width();
    let expand_limit = width.div_ceil(2).max(3);
    let bias = options.bias;

    let mut visited: HashMap<StateKey, i32> = HashMap::new();
    let mut beam = vec![BeamState::root(cards)];
    let mut depth = 0usize;

    while !beam.is_empty() {
        if state.expired() {
            break;
        }

        let mut next = Vec::new();
        let mut unexpanded = Vec::new();

        for parent in beam.drain(..) {
            if state.should_stop() {
                break;
            }
            if state.expired() {
                unexpanded.push(parent);
                continue;
            }

            state.nodes += 1;
            let candidates = generator.generate(&parent.remaining);
            if state.expired() {
                unexpanded.push(parent);
                continue;
            }

            for candidate in candidates.iter().take(expand_limit) {
                let child = parent.child(candidate, generator.trump, bias);

                if child.remaining.is_empty() {
                    let result = generator.scheme(child.melds);
                    state.record(&result);
                    top.offer(result);
                    continue;
                }

                if bias == SearchBias::Ceiling
                    && top
                        .best_score()
                        .is_some_and(|best| child.upper_bound() < best)
                {
                    state.stats.bound_prunes += 1;
                    continue;
                }

                let key = child.key();
                match visited.get(&key) {
                    Some(&seen) if seen >= child.partial => {
                        state.stats.memo_skips += 1;
                        continue;
                    }
                    _ => {
                        visited.insert(key, child.partial);
                    }
                }
                next.push(child);
            }
        }

        if state.should_stop() {
            return;
        }

        next.sort_by(|a, b| b.rank.cmp(&a.rank));
        next.truncate(width);

        if state.timed_out {
            unexpanded.extend(next);
            beam = unexpanded;
            break;
        }

        depth += 1;
        if tracing::enabled!(Level::TRACE) {
            event!(
                target: "guandan_solver::solver",
                Level::TRACE,
                depth,
                beam = next.len(),
                nodes = state.nodes,
                visited = visited.len()
            );
        }
        beam = next;
    }

    // Whatever is left unfinished is completed greedily.
    for leftover in beam {
        let mut melds = leftover.melds;
        melds.extend(generator.greedy(&leftover.remaining));
        let result = generator.scheme(melds);
        state.record(&result);
        top.offer(result);
        if state.should_stop() {
            return;
        }
    }
}

/// Greedy partition of `cards`: always complete, never optimal by promise.
pub fn greedy_partition(cards: &[Card], trump: Rank, max_branch: usize) -> SchemeResult {
    let sorted = sort_cards(cards, trump);
    let protection = BombProtection::new(&sorted);
    let generator = Generator {
        trump,
        max_branch: max_branch.max(1),
        protection: &protection,
    };
    let melds = generator.greedy(&sorted);
    generator.scheme(melds)
}

/// Search for the best partition of `cards` within the time limit.
///
/// Always returns a complete partition; on timeout `timed_out` is set and the
/// partition may be suboptimal.
pub fn solve(cards: &[Card], trump: Rank, options: &SolveOptions) -> Solution {
    let timer = TimeTracker::new(options.time_limit_ms);
    let sorted = sort_cards(cards, trump);
    if sorted.is_empty() {
        return Solution::empty();
    }

    let protection = BombProtection::new(&sorted);
    let generator = Generator {
        trump,
        max_branch: options.branch(),
        protection: &protection,
    };

    let mut top = TopResults::new(options.clamped_top_k(), options.bias);
    let mut state = SearchState {
        timer,
        nodes: 0,
        stats: SearchStats::default(),
        timed_out: false,
        target: options.target_score,
        stop_after_surpass: options.stop_after_surpass && options.target_score.is_some(),
        surpassed: false,
    };

    let baseline = generator.scheme(generator.greedy(&sorted));
    state.record(&baseline);
    top.offer(baseline.clone());

    if !state.should_stop() {
        beam_search(&sorted, &generator, options, &mut state, &mut top);
    }

    let top_results = if top.items.is_empty() {
        vec![baseline]
    } else {
        top.items
    };
    let best = top_results[0].clone();
    let stop_reason = if state.timed_out {
        StopReason::Timeout
    } else if state.should_stop() {
        StopReason::TargetSurpassed
    } else {
        StopReason::Completed
    };
    let elapsed_ms = timer.elapsed_ms();

    event!(
        target: "guandan_solver::solver",
        Level::DEBUG,
        cards = sorted.len(),
        trump = %trump,
        bias = ?options.bias,
        score = best.score,
        hands = best.detail.hand_count,
        nodes = state.nodes,
        memo_skips = state.stats.memo_skips,
        bound_prunes = state.stats.bound_prunes,
        elapsed_ms,
        stop_reason = ?stop_reason
    );

    Solution {
        alternatives: top_results[1..].to_vec(),
        best,
        timed_out: state.timed_out,
        exact: stop_reason == StopReason::Completed,
        elapsed_ms,
        search_nodes: state.nodes,
        stats: state.stats,
        stop_reason,
        surpassed_target: state.surpassed,
        top_results,
    }
}

/// Run the search twice, once for the ceiling and once for the control
/// recommendation, splitting the time budget between them.
pub fn solve_dual(cards: &[Card], trump: Rank, options: &SolveOptions) -> DualRecommendation {
    let ceiling_share = options.time_limit_ms / 2;
    let ceiling = solve(
        cards,
        trump,
        &SolveOptions {
            time_limit_ms: ceiling_share,
            bias: SearchBias::Ceiling,
            dual_mode: false,
            ..options.clone()
        },
    );
    let control = solve(
        cards,
        trump,
        &SolveOptions {
            time_limit_ms: options.time_limit_ms - ceiling_share,
            bias: SearchBias::Control,
            dual_mode: false,
            ..options.clone()
        },
    );
    DualRecommendation { ceiling, control }
}

/// Solve according to `options.dual_mode`.
pub fn recommend(cards: &[Card], trump: Rank, options: &SolveOptions) -> Recommendation {
    if options.dual_mode {
        Recommendation::Dual(solve_dual(cards, trump, options))
    } else {
        Recommendation::Single(solve(cards, trump, options))
    }
}
