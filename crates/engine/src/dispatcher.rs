//! Background compute worker.
//!
//! A [`Dispatcher`] owns one long-lived OS thread that runs the budget
//! computations, so large transaction sets never stall the async runtime.
//! Requests and responses cross the thread boundary as messages only:
//!
//! ```text
//! caller ──RequestEnvelope──▶ worker thread ──WorkerResponse──▶ router task ──▶ caller
//! ```
//!
//! Every request gets a correlation id that the worker echoes back; the
//! router task hands each response to the caller waiting on that id.
//! Overlapping requests of the same kind therefore each receive their own
//! answer, unless [`SameKindPolicy::Reject`] is configured.
//!
//! There is no cancellation and no timeout: once sent, a request runs to
//! completion. A caller that stops waiting simply never sees the answer.

use std::{
    collections::HashMap,
    error::Error,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
        mpsc,
    },
    thread,
};

use api_types::{
    stats::{
        BudgetStats, BudgetStatsRequest, Insights, InsightsRequest, ProcessRequest,
        ProcessedTransactions,
    },
    worker::{RequestEnvelope, TaskKind, TaskOutput, WorkerRequest, WorkerResponse},
};
use serde::Deserialize;
use tokio::sync::{mpsc as async_mpsc, oneshot};

use crate::{DispatchError, run_task};

/// What to do when a request arrives while another of the same kind is
/// still running.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameKindPolicy {
    /// Queue it; both callers get their own result.
    #[default]
    Concurrent,
    /// Fail the new request with [`DispatchError::Busy`].
    Reject,
}

#[derive(Clone, Debug)]
pub struct DispatcherOptions {
    pub same_kind_policy: SameKindPolicy,
    pub thread_name: String,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            same_kind_policy: SameKindPolicy::default(),
            thread_name: "budget-worker".to_string(),
        }
    }
}

struct PendingCall {
    kind: TaskKind,
    reply: oneshot::Sender<WorkerResponse>,
}

type PendingCalls = Arc<Mutex<HashMap<u64, PendingCall>>>;

fn lock(pending: &PendingCalls) -> MutexGuard<'_, HashMap<u64, PendingCall>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Running {
    requests: mpsc::Sender<RequestEnvelope>,
    pending: PendingCalls,
    worker: thread::JoinHandle<()>,
    router: tokio::task::JoinHandle<()>,
}

/// Handle to the background worker. Dropping it stops the worker once the
/// queued requests are done.
pub struct Dispatcher {
    running: Option<Running>,
    policy: SameKindPolicy,
    next_id: AtomicU64,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("available", &self.is_available())
            .field("policy", &self.policy)
            .finish()
    }
}

impl Dispatcher {
    /// Start the worker thread and its response router on the current tokio
    /// runtime.
    ///
    /// Never fails: when the thread cannot be spawned (or there is no
    /// runtime) the error is logged and every call returns
    /// [`DispatchError::WorkerUnavailable`].
    pub fn start(options: DispatcherOptions) -> Self {
        let running = match Self::spawn(&options) {
            Ok(running) => {
                tracing::info!("background worker {} started", options.thread_name);
                Some(running)
            }
            Err(err) => {
                tracing::error!("failed to start background worker: {err}");
                None
            }
        };
        Self {
            running,
            policy: options.same_kind_policy,
            next_id: AtomicU64::new(1),
        }
    }

    fn spawn(options: &DispatcherOptions) -> Result<Running, Box<dyn Error + Send + Sync>> {
        let runtime = tokio::runtime::Handle::try_current()?;
        let (request_tx, request_rx) = mpsc::channel::<RequestEnvelope>();
        let (response_tx, response_rx) = async_mpsc::unbounded_channel::<WorkerResponse>();

        let worker = thread::Builder::new()
            .name(options.thread_name.clone())
            .spawn(move || worker_loop(request_rx, response_tx))?;

        let pending: PendingCalls = Arc::new(Mutex::new(HashMap::new()));
        let router = runtime.spawn(route_responses(response_rx, Arc::clone(&pending)));

        Ok(Running {
            requests: request_tx,
            pending,
            worker,
            router,
        })
    }

    pub fn is_available(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.worker.is_finished())
    }

    /// Number of requests sent and not answered yet.
    pub fn in_flight(&self) -> usize {
        self.running
            .as_ref()
            .map_or(0, |running| lock(&running.pending).len())
    }

    /// Send `request` to the worker and wait for its result.
    pub async fn execute(&self, request: WorkerRequest) -> Result<TaskOutput, DispatchError> {
        let running = self
            .running
            .as_ref()
            .ok_or(DispatchError::WorkerUnavailable)?;
        let kind = request.kind();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();

        {
            let mut pending = lock(&running.pending);
            if self.policy == SameKindPolicy::Reject
                && pending.values().any(|call| call.kind == kind)
            {
                return Err(DispatchError::Busy(kind));
            }
            pending.insert(
                id,
                PendingCall {
                    kind,
                    reply: reply_tx,
                },
            );
        }

        if running.requests.send(RequestEnvelope { id, request }).is_err() {
            lock(&running.pending).remove(&id);
            return Err(DispatchError::WorkerUnavailable);
        }
        tracing::debug!(id, %kind, "request dispatched");

        let response = reply_rx
            .await
            .map_err(|_| DispatchError::WorkerUnavailable)?;
        response.into_result().map_err(DispatchError::Compute)
    }

    pub async fn budget_stats(
        &self,
        request: BudgetStatsRequest,
    ) -> Result<BudgetStats, DispatchError> {
        match self.execute(WorkerRequest::BudgetStats(request)).await? {
            TaskOutput::BudgetStats(stats) => Ok(stats),
            other => Err(DispatchError::UnexpectedResponse {
                expected: TaskKind::BudgetStats,
                got: other.kind(),
            }),
        }
    }

    pub async fn insights(&self, request: InsightsRequest) -> Result<Insights, DispatchError> {
        match self.execute(WorkerRequest::Insights(request)).await? {
            TaskOutput::Insights(insights) => Ok(insights),
            other => Err(DispatchError::UnexpectedResponse {
                expected: TaskKind::Insights,
                got: other.kind(),
            }),
        }
    }

    pub async fn process_transactions(
        &self,
        request: ProcessRequest,
    ) -> Result<ProcessedTransactions, DispatchError> {
        match self.execute(WorkerRequest::ProcessTransactions(request)).await? {
            TaskOutput::ProcessTransactions(processed) => Ok(processed),
            other => Err(DispatchError::UnexpectedResponse {
                expected: TaskKind::ProcessTransactions,
                got: other.kind(),
            }),
        }
    }

    /// Stop accepting requests, let the worker finish what is queued and
    /// wait for it to exit.
    pub async fn shutdown(mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let Running {
            requests,
            worker,
            router,
            ..
        } = running;
        drop(requests);

        match tokio::task::spawn_blocking(move || worker.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => tracing::error!("background worker panicked"),
            Err(err) => tracing::error!("failed to join background worker: {err}"),
        }
        if let Err(err) = router.await {
            tracing::error!("response router failed: {err}");
        }
        tracing::info!("background worker stopped");
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop; the router ends
        // when the worker drops its side of the response channel.
        if let Some(running) = self.running.take() {
            drop(running.requests);
        }
    }
}

fn worker_loop(
    requests: mpsc::Receiver<RequestEnvelope>,
    responses: async_mpsc::UnboundedSender<WorkerResponse>,
) {
    while let Ok(RequestEnvelope { id, request }) = requests.recv() {
        let kind = request.kind();
        let response = match run_task(&request) {
            Ok(output) => WorkerResponse::success(id, output),
            Err(err) => {
                tracing::warn!(id, %kind, "task failed: {err}");
                WorkerResponse::failure(id, kind, err.to_string())
            }
        };
        if responses.send(response).is_err() {
            break;
        }
    }
}

async fn route_responses(
    mut responses: async_mpsc::UnboundedReceiver<WorkerResponse>,
    pending: PendingCalls,
) {
    while let Some(response) = responses.recv().await {
        let call = lock(&pending).remove(&response.id);
        match call {
            Some(call) => {
                if call.reply.send(response).is_err() {
                    tracing::debug!("caller stopped waiting for a {} result", call.kind);
                }
            }
            None => tracing::warn!(id = response.id, "response for an unknown request"),
        }
    }
    // Worker gone: wake every remaining caller with `WorkerUnavailable`.
    lock(&pending).clear();
}
