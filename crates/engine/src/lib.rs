//! Budget computations and the background worker that runs them.
//!
//! The computations ([`stats`], [`insights`], [`grouping`]) are pure functions
//! over the wire types of `api_types`. [`Dispatcher`] runs them off the async
//! runtime; [`run_task`] runs one inline, for callers that cannot use a worker.
//! [`window`] projects scroll positions of long lists onto the rows to render.

use api_types::worker::{TaskOutput, WorkerRequest};

pub use dispatcher::{Dispatcher, DispatcherOptions, SameKindPolicy};
pub use error::{DispatchError, TaskError};
pub use grouping::process_transactions;
pub use insights::insights;
pub use stats::budget_stats;
pub use window::{ListMetrics, VisibleWindow, WindowedList, visible_window};

pub mod dispatcher;
mod error;
pub mod grouping;
pub mod insights;
pub mod stats;
mod util;
pub mod window;

type ResultTask<T> = Result<T, TaskError>;

/// Run `request` on the calling thread.
pub fn run_task(request: &WorkerRequest) -> ResultTask<TaskOutput> {
    match request {
        WorkerRequest::BudgetStats(payload) => budget_stats(payload).map(TaskOutput::BudgetStats),
        WorkerRequest::Insights(payload) => insights(payload).map(TaskOutput::Insights),
        WorkerRequest::ProcessTransactions(payload) => {
            process_transactions(payload).map(TaskOutput::ProcessTransactions)
        }
    }
}
