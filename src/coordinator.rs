//! Escalating multi-profile search.
//!
//! A search mode is an ordered list of profiles, each a time and branching
//! budget plus where to run it. Profiles run one after another, keeping the
//! best partition seen, until a target score is beaten or the list runs out.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Level, event};

use crate::solver::{
    DEFAULT_TIME_LIMIT_MS, DEFAULT_TOP_K, DualRecommendation, Recommendation, SolveOptions,
    Solution, compare_scheme_results, recommend, solve,
};
use crate::worker::{Executor, SolveRequest, WorkerError};
use crate::{Card, Rank};

/// Floor for the time budget of a synchronous retry after a worker failure.
const FALLBACK_MIN_TIME_MS: u64 = 2200;
const FALLBACK_TIME_CUT_MS: u64 = 400;

/// Per-position time caps on constrained devices.
const CONSTRAINED_TIME_CAPS: [u64; 5] = [2200, 3200, 4200, 5200, 6200];
const CONSTRAINED_MIN_BRANCH: usize = 16;
const CONSTRAINED_WORKER_BRANCH: usize = 34;
const CONSTRAINED_LOCAL_BRANCH: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMode {
    Fast,
    #[default]
    Balanced,
    Quality,
}

#[derive(Debug, Error)]
#[error("unknown search mode {0:?} (expected fast, balanced or quality)")]
pub struct UnknownSearchMode(String);

impl FromStr for SearchMode {
    type Err = UnknownSearchMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(SearchMode::Fast),
            "balanced" => Ok(SearchMode::Balanced),
            "quality" => Ok(SearchMode::Quality),
            _ => Err(UnknownSearchMode(s.to_string())),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchMode::Fast => "fast",
            SearchMode::Balanced => "balanced",
            SearchMode::Quality => "quality",
        };
        f.write_str(name)
    }
}

/// Where a profile's solve runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dispatch {
    /// On the executor; failures fall back to a synchronous solve.
    Worker,
    /// Synchronously on the calling thread.
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchProfile {
    pub dispatch: Dispatch,
    pub time_limit_ms: u64,
    pub max_branch: usize,
}

const fn profile(dispatch: Dispatch, time_limit_ms: u64, max_branch: usize) -> SearchProfile {
    SearchProfile {
        dispatch,
        time_limit_ms,
        max_branch,
    }
}

const FAST_PROFILES: [SearchProfile; 3] = [
    profile(Dispatch::Worker, 1800, 18),
    profile(Dispatch::Worker, 2600, 22),
    profile(Dispatch::Local, 3200, 24),
];

const BALANCED_PROFILES: [SearchProfile; 5] = [
    profile(Dispatch::Worker, 3000, 24),
    profile(Dispatch::Worker, 4500, 30),
    profile(Dispatch::Worker, 6000, 36),
    profile(Dispatch::Local, 6500, 34),
    profile(Dispatch::Local, 9000, 44),
];

const QUALITY_PROFILES: [SearchProfile; 5] = [
    profile(Dispatch::Worker, 4500, 30),
    profile(Dispatch::Worker, 7000, 38),
    profile(Dispatch::Worker, 9500, 46),
    profile(Dispatch::Local, 10000, 44),
    profile(Dispatch::Local, 13000, 52),
];

impl SearchMode {
    pub fn profiles(self) -> &'static [SearchProfile] {
        match self {
            SearchMode::Fast => &FAST_PROFILES,
            SearchMode::Balanced => &BALANCED_PROFILES,
            SearchMode::Quality => &QUALITY_PROFILES,
        }
    }
}

/// The profiles for `mode`, capped in time and branching on constrained
/// devices.
pub fn resolve_profiles(mode: SearchMode, constrained: bool) -> Vec<SearchProfile> {
    let base = mode.profiles();
    if !constrained {
        return base.to_vec();
    }

    base.iter()
        .enumerate()
        .map(|(i, p)| {
            let time_cap = CONSTRAINED_TIME_CAPS
                .get(i)
                .copied()
                .unwrap_or(CONSTRAINED_TIME_CAPS[CONSTRAINED_TIME_CAPS.len() - 1]);
            let branch_cap = match p.dispatch {
                Dispatch::Worker => CONSTRAINED_WORKER_BRANCH,
                Dispatch::Local => CONSTRAINED_LOCAL_BRANCH,
            };
            SearchProfile {
                dispatch: p.dispatch,
                time_limit_ms: p.time_limit_ms.min(time_cap),
                max_branch: p.max_branch.min(branch_cap).max(CONSTRAINED_MIN_BRANCH),
            }
        })
        .collect()
}

/// How many profiles the first, early-exit phase runs.
pub fn phase_one_size(mode: SearchMode, profile_count: usize) -> usize {
    if profile_count <= 1 {
        return profile_count;
    }
    match mode {
        SearchMode::Fast => 1,
        _ => profile_count.min(2),
    }
}

/// Time budget for the synchronous retry of a failed worker solve.
pub fn fallback_time_limit(time_limit_ms: u64) -> u64 {
    time_limit_ms
        .saturating_sub(FALLBACK_TIME_CUT_MS)
        .max(FALLBACK_MIN_TIME_MS)
}

/// What to search for and how hard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoordinatorOptions {
    pub mode: SearchMode,
    /// Apply the constrained-device caps.
    pub constrained: bool,
    pub target_score: Option<i32>,
    pub dual_mode: bool,
    pub top_k: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        CoordinatorOptions {
            mode: SearchMode::Balanced,
            constrained: false,
            target_score: None,
            dual_mode: true,
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// Best partition over all profiles run, with how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub best: Solution,
    /// The last dual recommendation produced, in dual mode.
    pub dual: Option<DualRecommendation>,
    pub attempts: usize,
    /// A worker failed and at least one profile ran synchronously instead.
    pub used_fallback: bool,
    pub surpassed_target: bool,
    pub mode: SearchMode,
}

impl SearchOutcome {
    fn surpasses(&self, target: Option<i32>) -> bool {
        target.is_some_and(|t| self.best.score() > t)
    }
}

fn recommendation_surpasses(recommendation: &Recommendation, target: i32) -> bool {
    match recommendation {
        Recommendation::Single(solution) => solution.score() > target,
        Recommendation::Dual(dual) => dual.surpassed(target),
    }
}

/// Run one profile. Only cancellation is returned as an error; any other
/// worker failure is absorbed by a synchronous retry.
fn run_single_profile<E: Executor + ?Sized>(
    executor: &E,
    cards: &[Card],
    trump: Rank,
    profile: &SearchProfile,
    options: &SolveOptions,
) -> Result<(Recommendation, bool), WorkerError> {
    let solve_options = SolveOptions {
        time_limit_ms: profile.time_limit_ms,
        max_branch: profile.max_branch,
        ..options.clone()
    };

    match profile.dispatch {
        Dispatch::Local => Ok((recommend(cards, trump, &solve_options), false)),
        Dispatch::Worker => {
            let request = SolveRequest::new(0, cards.to_vec(), trump, solve_options.clone());
            match executor.execute(request) {
                Ok(response) => Ok((response.recommendation, false)),
                Err(err) if err.is_cancellation() => Err(err),
                Err(err) => {
                    let time_limit_ms = fallback_time_limit(profile.time_limit_ms);
                    event!(
                        target: "guandan_solver::coordinator",
                        Level::WARN,
                        error = %err,
                        time_limit_ms,
                        "worker solve failed, retrying synchronously"
                    );
                    let fallback = SolveOptions {
                        time_limit_ms,
                        ..solve_options
                    };
                    Ok((recommend(cards, trump, &fallback), true))
                }
            }
        }
    }
}

/// Run `profiles` in order, keeping the best partition. With
/// `stop_after_surpass`, stops at the first profile that beats the target.
pub fn run_profiles<E: Executor + ?Sized>(
    executor: &E,
    cards: &[Card],
    trump: Rank,
    profiles: &[SearchProfile],
    options: &CoordinatorOptions,
    stop_after_surpass: bool,
    initial: Option<SearchOutcome>,
) -> Result<SearchOutcome, WorkerError> {
    let solve_options = SolveOptions {
        top_k: options.top_k,
        target_score: options.target_score,
        stop_after_surpass,
        dual_mode: options.dual_mode,
        ..SolveOptions::default()
    };

    let mut attempts = initial.as_ref().map_or(0, |o| o.attempts);
    let mut used_fallback = initial.as_ref().is_some_and(|o| o.used_fallback);
    let mut dual = initial.as_ref().and_then(|o| o.dual.clone());
    let mut best = initial.map(|o| o.best);
    let mut surpassed_target = options
        .target_score
        .is_some_and(|t| best.as_ref().is_some_and(|b| b.score() > t));

    for (i, profile) in profiles.iter().enumerate() {
        attempts += 1;
        let (recommendation, fell_back) =
            run_single_profile(executor, cards, trump, profile, &solve_options)?;
        used_fallback |= fell_back;

        let candidate = recommendation.preferred();
        let improved = best.as_ref().is_none_or(|current| {
            compare_scheme_results(&candidate.best, &current.best) == Ordering::Less
        });
        if improved {
            best = Some(candidate.clone());
        }

        event!(
            target: "guandan_solver::coordinator",
            Level::DEBUG,
            profile = i,
            dispatch = ?profile.dispatch,
            time_limit_ms = profile.time_limit_ms,
            max_branch = profile.max_branch,
            score = candidate.score(),
            improved,
            fell_back
        );

        let beat_target = options
            .target_score
            .is_some_and(|t| recommendation_surpasses(&recommendation, t));
        if let Recommendation::Dual(result) = recommendation {
            dual = Some(result);
        }
        if beat_target {
            surpassed_target = true;
            if stop_after_surpass {
                break;
            }
        }
    }

    let best = match best {
        Some(best) => best,
        None => solve(
            cards,
            trump,
            &SolveOptions {
                time_limit_ms: DEFAULT_TIME_LIMIT_MS,
                top_k: DEFAULT_TOP_K,
                ..SolveOptions::default()
            },
        ),
    };

    Ok(SearchOutcome {
        best,
        dual,
        attempts,
        used_fallback,
        surpassed_target,
        mode: options.mode,
    })
}

/// Two-phase recommendation: a short first phase that stops as soon as the
/// target is beaten, then the remaining profiles continuing from its best.
pub fn find_recommendation<E: Executor + ?Sized>(
    executor: &E,
    cards: &[Card],
    trump: Rank,
    options: &CoordinatorOptions,
) -> Result<SearchOutcome, WorkerError> {
    let profiles = resolve_profiles(options.mode, options.constrained);
    let split = phase_one_size(options.mode, profiles.len());
    let (phase_one, phase_two) = profiles.split_at(split);

    let first = run_profiles(executor, cards, trump, phase_one, options, true, None)?;
    if first.surpassed_target || phase_two.is_empty() {
        return Ok(first);
    }

    let outcome = run_profiles(executor, cards, trump, phase_two, options, false, Some(first))?;
    event!(
        target: "guandan_solver::coordinator",
        Level::DEBUG,
        mode = %options.mode,
        attempts = outcome.attempts,
        score = outcome.best.score(),
        surpassed = outcome.surpasses(options.target_score),
        used_fallback = outcome.used_fallback
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::melds::covers_exactly;
    use crate::parse_hand;
    use crate::worker::{InlineExecutor, SolveResponse};
    use std::cell::Cell;

    /// Counts executions and fails every one with the given error.
    struct FailingExecutor {
        calls: Cell<usize>,
        cancel: bool,
    }

    impl Executor for FailingExecutor {
        fn execute(&self, request: SolveRequest) -> Result<SolveResponse, WorkerError> {
            self.calls.set(self.calls.get() + 1);
            if self.cancel {
                Err(WorkerError::Cancelled(request.id))
            } else {
                Err(WorkerError::Disconnected)
            }
        }
    }

    struct CountingExecutor {
        calls: Cell<usize>,
    }

    impl Executor for CountingExecutor {
        fn execute(&self, request: SolveRequest) -> Result<SolveResponse, WorkerError> {
            self.calls.set(self.calls.get() + 1);
            InlineExecutor.execute(request)
        }
    }

    fn small_hand() -> Vec<Card> {
        parse_hand("S7 H7 C7 D7 S3 SK HK").unwrap()
    }

    #[test]
    fn test_profile_tables() {
        assert_eq!(SearchMode::Fast.profiles().len(), 3);
        assert_eq!(SearchMode::Balanced.profiles().len(), 5);
        assert_eq!(SearchMode::Quality.profiles().len(), 5);
        assert_eq!(SearchMode::Balanced.profiles()[0], profile(Dispatch::Worker, 3000, 24));
        assert_eq!(SearchMode::Quality.profiles()[4], profile(Dispatch::Local, 13000, 52));
        for mode in [SearchMode::Fast, SearchMode::Balanced, SearchMode::Quality] {
            let times: Vec<u64> = mode.profiles().iter().map(|p| p.time_limit_ms).collect();
            assert!(times.windows(2).all(|w| w[0] < w[1]), "{mode} must escalate");
        }
    }

    #[test]
    fn test_constrained_profiles() {
        let capped = resolve_profiles(SearchMode::Balanced, true);
        let times: Vec<u64> = capped.iter().map(|p| p.time_limit_ms).collect();
        assert_eq!(times, vec![2200, 3200, 4200, 5200, 6200]);
        let branches: Vec<usize> = capped.iter().map(|p| p.max_branch).collect();
        assert_eq!(branches, vec![24, 30, 34, 30, 30]);

        let fast = resolve_profiles(SearchMode::Fast, true);
        assert_eq!(fast[0].time_limit_ms, 1800);
        assert_eq!(fast[0].max_branch, 18);

        assert_eq!(
            resolve_profiles(SearchMode::Quality, false),
            SearchMode::Quality.profiles().to_vec()
        );
    }

    #[test]
    fn test_phase_one_size() {
        assert_eq!(phase_one_size(SearchMode::Fast, 3), 1);
        assert_eq!(phase_one_size(SearchMode::Balanced, 5), 2);
        assert_eq!(phase_one_size(SearchMode::Quality, 5), 2);
        assert_eq!(phase_one_size(SearchMode::Balanced, 1), 1);
        assert_eq!(phase_one_size(SearchMode::Balanced, 0), 0);
    }

    #[test]
    fn test_fallback_time_limit() {
        assert_eq!(fallback_time_limit(1800), 2200);
        assert_eq!(fallback_time_limit(3000), 2600);
        assert_eq!(fallback_time_limit(4500), 4100);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("fast".parse::<SearchMode>().unwrap(), SearchMode::Fast);
        assert_eq!("Quality".parse::<SearchMode>().unwrap(), SearchMode::Quality);
        assert!("slow".parse::<SearchMode>().is_err());
        assert_eq!(SearchMode::Balanced.to_string(), "balanced");
    }

    #[test]
    fn test_stops_once_target_beaten() {
        let executor = CountingExecutor { calls: Cell::new(0) };
        let options = CoordinatorOptions {
            mode: SearchMode::Balanced,
            target_score: Some(-100),
            ..CoordinatorOptions::default()
        };
        let cards = small_hand();
        let outcome = find_recommendation(&executor, &cards, Rank::Two, &options).unwrap();
        assert!(outcome.surpassed_target);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(executor.calls.get(), 1);
        assert!(covers_exactly(&cards, &outcome.best.best.combos));
        assert!(outcome.dual.is_some());
    }

    #[test]
    fn test_runs_every_profile_when_target_unreachable() {
        let executor = CountingExecutor { calls: Cell::new(0) };
        let options = CoordinatorOptions {
            mode: SearchMode::Fast,
            target_score: Some(i32::MAX),
            dual_mode: false,
            ..CoordinatorOptions::default()
        };
        let cards = small_hand();
        let outcome = find_recommendation(&executor, &cards, Rank::Two, &options).unwrap();
        assert!(!outcome.surpassed_target);
        assert_eq!(outcome.attempts, 3);
        // Two worker profiles, one local.
        assert_eq!(executor.calls.get(), 2);
        assert!(outcome.dual.is_none());
        assert!(!outcome.used_fallback);
    }

    #[test]
    fn test_worker_failure_falls_back() {
        let executor = FailingExecutor {
            calls: Cell::new(0),
            cancel: false,
        };
        let options = CoordinatorOptions {
            mode: SearchMode::Fast,
            ..CoordinatorOptions::default()
        };
        let cards = small_hand();
        let outcome = find_recommendation(&executor, &cards, Rank::Two, &options).unwrap();
        assert!(outcome.used_fallback);
        assert_eq!(outcome.attempts, 3);
        assert!(covers_exactly(&cards, &outcome.best.best.combos));
    }

    #[test]
    fn test_cancellation_is_not_retried() {
        let executor = FailingExecutor {
            calls: Cell::new(0),
            cancel: true,
        };
        let err = find_recommendation(
            &executor,
            &small_hand(),
            Rank::Two,
            &CoordinatorOptions::default(),
        )
        .unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(executor.calls.get(), 1);
    }

    #[test]
    fn test_empty_profile_list_still_solves() {
        let cards = small_hand();
        let outcome = run_profiles(
            &InlineExecutor,
            &cards,
            Rank::Two,
            &[],
            &CoordinatorOptions::default(),
            false,
            None,
        )
        .unwrap();
        assert_eq!(outcome.attempts, 0);
        assert!(covers_exactly(&cards, &outcome.best.best.combos));
    }

    #[test]
    fn test_options_from_json() {
        let options: CoordinatorOptions =
            serde_json::from_str(r#"{"mode": "quality", "targetScore": 12}"#).unwrap();
        assert_eq!(options.mode, SearchMode::Quality);
        assert_eq!(options.target_score, Some(12));
        assert!(options.dual_mode);
        assert!(!options.constrained);
    }
}
