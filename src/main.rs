use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

use guandan_solver::coordinator::{CoordinatorOptions, SearchMode, find_recommendation};
use guandan_solver::deck::deal;
use guandan_solver::melds::describe;
use guandan_solver::protocol::handle_request_with;
use guandan_solver::scoring::score_meld;
use guandan_solver::solver::{Recommendation, SolveOptions, Solution, recommend};
use guandan_solver::worker::ThreadWorker;
use guandan_solver::{Card, Hand, Rank, parse_hand, sort_cards};

/// Partition a 27-card hand into high-scoring melds.
#[derive(Debug, Parser)]
#[command(name = "guandan-solver", author, version, about)]
struct Cli {
    /// Cards to solve, e.g. "S7 H7 C7 D7 S3 jk JK". Deals a random hand if omitted.
    #[arg(long, value_name = "CARDS")]
    hand: Option<String>,

    /// Trump rank (2-10, J, Q, K, A). Random for dealt hands, 2 otherwise.
    #[arg(long, value_name = "RANK", value_parser = parse_trump)]
    trump: Option<Rank>,

    /// RNG seed for the dealt hand.
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// JSON file with solver options; flags below override it.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "MS")]
    time_limit_ms: Option<u64>,

    #[arg(long, value_name = "N")]
    max_branch: Option<usize>,

    #[arg(long, value_name = "K")]
    top_k: Option<usize>,

    /// Score to beat.
    #[arg(long, value_name = "SCORE", allow_negative_numbers = true)]
    target: Option<i32>,

    /// Stop searching once the target is beaten.
    #[arg(long, requires = "target")]
    stop_after_surpass: bool,

    /// Produce both the ceiling and the control recommendation.
    #[arg(long)]
    dual: bool,

    /// Run the escalating profile search in this mode instead of a single solve.
    #[arg(long, value_name = "MODE")]
    mode: Option<SearchMode>,

    /// Apply constrained-device caps to the profile search.
    #[arg(long, requires = "mode")]
    constrained: bool,

    /// Answer one JSON protocol request read from FILE ("-" for stdin) and exit.
    #[arg(long, value_name = "FILE", conflicts_with_all = ["hand", "mode"])]
    request: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long)]
    json: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

fn parse_trump(s: &str) -> Result<Rank, String> {
    Rank::from_symbol(s).map_err(|e| e.to_string())
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::WARN.as_str()));
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr);

    // Ignore error if a global subscriber is already set
    let _ = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
}

fn load_options(cli: &Cli) -> Result<SolveOptions> {
    let mut options = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading solver config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing solver config {}", path.display()))?
        }
        None => SolveOptions::default(),
    };

    if let Some(time_limit_ms) = cli.time_limit_ms {
        options.time_limit_ms = time_limit_ms;
    }
    if let Some(max_branch) = cli.max_branch {
        options.max_branch = max_branch;
    }
    if let Some(top_k) = cli.top_k {
        options.top_k = top_k;
    }
    if cli.target.is_some() {
        options.target_score = cli.target;
    }
    options.stop_after_surpass |= cli.stop_after_surpass;
    options.dual_mode |= cli.dual;
    Ok(options)
}

fn load_hand(cli: &Cli) -> Result<Hand> {
    match &cli.hand {
        Some(text) => {
            let cards = parse_hand(text).context("parsing --hand")?;
            let trump = cli.trump.unwrap_or(Rank::Two);
            Ok(Hand::new(trump, sort_cards(&cards, trump)))
        }
        None => {
            let mut rng = match cli.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let mut hand = deal(&mut rng);
            if let Some(trump) = cli.trump {
                hand = Hand::new(trump, sort_cards(&hand.cards, trump));
            }
            Ok(hand)
        }
    }
}

fn read_request(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("reading request from stdin")?;
        Ok(text)
    } else {
        fs::read_to_string(path).with_context(|| format!("reading request {}", path.display()))
    }
}

fn format_cards(cards: &[Card]) -> String {
    cards
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_solution(label: &str, solution: &Solution, trump: Rank) {
    let best = &solution.best;
    println!("{label}: score {} in {} melds", best.score, best.detail.hand_count);
    for meld in &best.combos {
        let score = score_meld(meld, trump);
        println!(
            "  {:<32} {:<28} {:+}",
            describe(&meld.definition()),
            format_cards(&meld.cards),
            score.total
        );
    }
    println!(
        "  shape {:+}  burst {:+}  key {:+}  round {:+}",
        best.detail.shape_score,
        best.detail.burst_score,
        best.detail.key_score,
        best.detail.round_score
    );
    println!(
        "  {:?} after {} ms, {} nodes ({} memo skips, {} bound prunes){}",
        solution.stop_reason,
        solution.elapsed_ms,
        solution.search_nodes,
        solution.stats.memo_skips,
        solution.stats.bound_prunes,
        if solution.exact { "" } else { " (not exhaustive)" }
    );
    for (i, alternative) in solution.alternatives.iter().enumerate() {
        println!(
            "  alternative {}: score {} in {} melds",
            i + 1,
            alternative.score,
            alternative.detail.hand_count
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    if let Some(path) = &cli.request {
        let request = read_request(path)?;
        let worker = ThreadWorker::spawn()?;
        println!("{}", handle_request_with(&worker, &request));
        return Ok(());
    }

    let options = load_options(&cli)?;
    let hand = load_hand(&cli)?;
    if hand.trump.is_joker() {
        bail!("trump must be a standard rank");
    }
    if !hand.has_unique_ids() {
        bail!("hand contains duplicate card ids");
    }

    if !cli.json {
        println!("Trump: {}", hand.trump);
        println!("Hand ({} cards): {}", hand.len(), format_cards(&hand.cards));
    }

    if let Some(mode) = cli.mode {
        let worker = ThreadWorker::spawn()?;
        let coordinator_options = CoordinatorOptions {
            mode,
            constrained: cli.constrained,
            target_score: options.target_score,
            dual_mode: options.dual_mode,
            top_k: options.top_k,
        };
        let outcome = find_recommendation(&worker, &hand.cards, hand.trump, &coordinator_options)?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        } else {
            print_solution(&format!("Best ({mode})"), &outcome.best, hand.trump);
            println!(
                "{} profiles run{}{}",
                outcome.attempts,
                if outcome.surpassed_target { ", target beaten" } else { "" },
                if outcome.used_fallback { ", worker fallback used" } else { "" }
            );
        }
        return Ok(());
    }

    let recommendation = recommend(&hand.cards, hand.trump, &options);
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&recommendation)?);
        return Ok(());
    }
    match &recommendation {
        Recommendation::Single(solution) => print_solution("Best", solution, hand.trump),
        Recommendation::Dual(dual) => {
            print_solution("Ceiling", &dual.ceiling, hand.trump);
            print_solution("Control", &dual.control, hand.trump);
        }
    }
    Ok(())
}
