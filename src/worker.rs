//! Running the solver off the calling thread.
//!
//! A [`ThreadWorker`] owns one background thread fed through a channel. Each
//! request carries its own reply channel, so responses never cross. Calling
//! [`ThreadWorker::cancel_pending`] marks everything submitted so far as stale:
//! queued jobs are skipped and a solve already running reports `Cancelled`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Level, event};

use crate::solver::{Recommendation, SolveOptions, recommend};
use crate::{Card, Rank};

/// One hand to solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveRequest {
    #[serde(default)]
    pub id: u64,
    pub cards: Vec<Card>,
    pub trump: Rank,
    #[serde(default)]
    pub options: SolveOptions,
}

impl SolveRequest {
    pub fn new(id: u64, cards: Vec<Card>, trump: Rank, options: SolveOptions) -> Self {
        SolveRequest {
            id,
            cards,
            trump,
            options,
        }
    }

    pub fn run(&self) -> SolveResponse {
        SolveResponse {
            id: self.id,
            recommendation: recommend(&self.cards, self.trump, &self.options),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveResponse {
    pub id: u64,
    pub recommendation: Recommendation,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to spawn solver thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("solver worker channel closed")]
    Disconnected,

    #[error("solver worker panicked: {0}")]
    Panicked(String),

    #[error("solve request {0} was cancelled")]
    Cancelled(u64),
}

impl WorkerError {
    /// Cancelled work was superseded on purpose and must not be retried.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, WorkerError::Cancelled(_))
    }
}

/// Somewhere a solve request can be run.
pub trait Executor {
    fn execute(&self, request: SolveRequest) -> Result<SolveResponse, WorkerError>;
}

/// Runs requests synchronously on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, request: SolveRequest) -> Result<SolveResponse, WorkerError> {
        Ok(request.run())
    }
}

type Reply = Result<SolveResponse, WorkerError>;

struct Job {
    request: SolveRequest,
    epoch: u64,
    reply: Sender<Reply>,
}

/// A dedicated solver thread.
pub struct ThreadWorker {
    jobs: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
    epoch: Arc<AtomicU64>,
}

impl ThreadWorker {
    pub fn spawn() -> Result<Self, WorkerError> {
        let (jobs, queue) = mpsc::channel::<Job>();
        let epoch = Arc::new(AtomicU64::new(0));
        let worker_epoch = Arc::clone(&epoch);

        let handle = thread::Builder::new()
            .name("guandan-solver".to_string())
            .spawn(move || worker_loop(queue, worker_epoch))?;

        Ok(ThreadWorker {
            jobs: Some(jobs),
            handle: Some(handle),
            epoch,
        })
    }

    /// Queue a request and return a handle to its eventual response.
    pub fn submit(&self, request: SolveRequest) -> Result<PendingSolve, WorkerError> {
        let jobs = self.jobs.as_ref().ok_or(WorkerError::Disconnected)?;
        let (reply, response) = mpsc::channel();
        let job = Job {
            request,
            epoch: self.epoch.load(Ordering::SeqCst),
            reply,
        };
        jobs.send(job).map_err(|_| WorkerError::Disconnected)?;
        Ok(PendingSolve { response })
    }

    /// Mark all work submitted so far as stale.
    pub fn cancel_pending(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }
}

impl Executor for ThreadWorker {
    fn execute(&self, request: SolveRequest) -> Result<SolveResponse, WorkerError> {
        self.submit(request)?.wait()
    }
}

impl Drop for ThreadWorker {
    fn drop(&mut self) {
        // Closing the queue ends the worker loop once the current job is done.
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// A submitted request whose response has not been collected yet.
pub struct PendingSolve {
    response: Receiver<Reply>,
}

impl PendingSolve {
    pub fn wait(self) -> Result<SolveResponse, WorkerError> {
        self.response
            .recv()
            .map_err(|_| WorkerError::Disconnected)?
    }
}

fn worker_loop(queue: Receiver<Job>, epoch: Arc<AtomicU64>) {
    for job in queue {
        let id = job.request.id;
        let is_stale = |job: &Job| job.epoch != epoch.load(Ordering::SeqCst);

        let reply = if is_stale(&job) {
            Err(WorkerError::Cancelled(id))
        } else {
            match panic::catch_unwind(AssertUnwindSafe(|| job.request.run())) {
                Ok(_) if is_stale(&job) => Err(WorkerError::Cancelled(id)),
                Ok(response) => Ok(response),
                Err(payload) => Err(WorkerError::Panicked(panic_message(payload.as_ref()))),
            }
        };

        if let Err(err) = &reply {
            event!(
                target: "guandan_solver::worker",
                Level::DEBUG,
                request = id,
                error = %err
            );
        }
        // The caller may have stopped waiting; that is not an error here.
        let _ = job.reply.send(reply);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::deal;
    use crate::parse_hand;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn request(id: u64, time_limit_ms: u64) -> SolveRequest {
        let mut rng = StdRng::seed_from_u64(id);
        let hand = deal(&mut rng);
        SolveRequest::new(
            id,
            hand.cards,
            hand.trump,
            SolveOptions {
                time_limit_ms,
                ..SolveOptions::default()
            },
        )
    }

    #[test]
    fn test_thread_worker_matches_inline() {
        let worker = ThreadWorker::spawn().unwrap();
        let req = request(1, 60_000);

        let threaded = worker.execute(req.clone()).unwrap();
        let inline = InlineExecutor.execute(req).unwrap();

        assert_eq!(threaded.id, 1);
        let sigs = |r: &SolveResponse| {
            r.recommendation
                .preferred()
                .top_results
                .iter()
                .map(|s| s.signature.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(sigs(&threaded), sigs(&inline));
    }

    #[test]
    fn test_responses_keep_their_ids() {
        let worker = ThreadWorker::spawn().unwrap();
        let first = worker.submit(request(10, 200)).unwrap();
        let second = worker.submit(request(11, 200)).unwrap();
        assert_eq!(second.wait().unwrap().id, 11);
        assert_eq!(first.wait().unwrap().id, 10);
    }

    #[test]
    fn test_cancel_pending_skips_queued_work() {
        let worker = ThreadWorker::spawn().unwrap();
        let running = worker.submit(request(20, 2_000)).unwrap();
        let queued = worker.submit(request(21, 2_000)).unwrap();
        worker.cancel_pending();

        let err = queued.wait().unwrap_err();
        assert!(err.is_cancellation());
        assert!(matches!(err, WorkerError::Cancelled(21)));
        // The running solve either finished before the cancel or reports it.
        match running.wait() {
            Ok(response) => assert_eq!(response.id, 20),
            Err(err) => assert!(err.is_cancellation()),
        }

        // Work submitted after the cancel runs normally.
        let fresh = worker.execute(request(22, 200)).unwrap();
        assert_eq!(fresh.id, 22);
    }

    #[test]
    fn test_request_from_json() {
        let cards = parse_hand("S7 H7").unwrap();
        let json = serde_json::json!({
            "cards": cards,
            "trump": "2",
            "options": { "timeLimitMs": 100, "dualMode": true }
        });
        let req: SolveRequest = serde_json::from_value(json).unwrap();
        assert_eq!(req.id, 0);
        assert_eq!(req.trump, Rank::Two);
        assert_eq!(req.options.time_limit_ms, 100);
        assert!(matches!(req.run().recommendation, Recommendation::Dual(_)));
    }

    #[test]
    fn test_error_classification() {
        assert!(WorkerError::Cancelled(3).is_cancellation());
        assert!(!WorkerError::Disconnected.is_cancellation());
        assert!(!WorkerError::Panicked("boom".into()).is_cancellation());
    }
}
