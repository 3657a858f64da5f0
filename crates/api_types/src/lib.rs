//! Wire types shared by the store, the compute worker and the CLI.
//!
//! Field names follow the JSON the budgeting front-end already produces
//! (`envelopeId`, `startDate`, ...), so payloads exported from it can be fed
//! to the worker unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod envelope {
    use super::*;

    /// A spending envelope (budget category).
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct Envelope {
        pub id: String,
        pub name: String,
    }
}

pub mod transaction {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum TransactionType {
        Income,
        Expense,
    }

    impl TransactionType {
        pub fn as_str(self) -> &'static str {
            match self {
                Self::Income => "income",
                Self::Expense => "expense",
            }
        }
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Transaction {
        /// Assigned on import when missing.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub id: Option<String>,
        /// ISO date (`2024-01-05`) or RFC3339 timestamp.
        pub date: String,
        pub amount: f64,
        #[serde(rename = "type")]
        pub kind: TransactionType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub envelope_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub description: Option<String>,
    }

    impl Transaction {
        pub fn is_expense(&self) -> bool {
            self.kind == TransactionType::Expense
        }
    }
}

pub mod stats {
    use super::*;
    use crate::{envelope::Envelope, transaction::Transaction};

    /// Inclusive date range, both ends ISO-parseable.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DateWindow {
        pub start_date: String,
        pub end_date: String,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BudgetStatsRequest {
        pub transactions: Vec<Transaction>,
        #[serde(default)]
        pub envelopes: Vec<Envelope>,
        pub date_range: DateWindow,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BudgetStats {
        pub total_income: f64,
        pub total_expenses: f64,
        pub net_cash_flow: f64,
        /// Expense totals keyed by envelope id.
        pub envelope_breakdown: BTreeMap<String, f64>,
        pub daily_average: f64,
        pub monthly_projection: f64,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct InsightsRequest {
        pub transactions: Vec<Transaction>,
        #[serde(default)]
        pub envelopes: Vec<Envelope>,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CategorySpending {
        pub envelope_id: String,
        /// `None` when the envelope id is not in the request's envelope list.
        pub name: Option<String>,
        pub amount: f64,
        pub percentage: f64,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Insights {
        pub top_spending_categories: Vec<CategorySpending>,
        pub largest_expense: Option<Transaction>,
        pub average_transaction_size: f64,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ProcessRequest {
        pub transactions: Vec<Transaction>,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ProcessedTransactions {
        /// Keyed by calendar date, `YYYY-MM-DD`.
        pub by_date: BTreeMap<String, Vec<Transaction>>,
        /// Keyed by envelope id; see [`UNASSIGNED_ENVELOPE`].
        pub by_envelope: BTreeMap<String, Vec<Transaction>>,
        pub total_count: usize,
    }

    /// Bucket for transactions without an envelope.
    pub const UNASSIGNED_ENVELOPE: &str = "unassigned";
}

pub mod worker {
    use std::fmt;

    use super::*;
    use crate::stats::{
        BudgetStats, BudgetStatsRequest, Insights, InsightsRequest, ProcessRequest,
        ProcessedTransactions,
    };

    /// The fixed set of tasks the compute worker knows about.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum TaskKind {
        BudgetStats,
        Insights,
        ProcessTransactions,
    }

    impl TaskKind {
        pub fn as_str(self) -> &'static str {
            match self {
                Self::BudgetStats => "budget_stats",
                Self::Insights => "insights",
                Self::ProcessTransactions => "process_transactions",
            }
        }
    }

    impl fmt::Display for TaskKind {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    /// A request for the compute worker, serialized as `{type, payload}`.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", content = "payload", rename_all = "snake_case")]
    pub enum WorkerRequest {
        BudgetStats(BudgetStatsRequest),
        Insights(InsightsRequest),
        ProcessTransactions(ProcessRequest),
    }

    impl WorkerRequest {
        pub fn kind(&self) -> TaskKind {
            match self {
                Self::BudgetStats(_) => TaskKind::BudgetStats,
                Self::Insights(_) => TaskKind::Insights,
                Self::ProcessTransactions(_) => TaskKind::ProcessTransactions,
            }
        }
    }

    /// A request tagged with its correlation id, `{id, type, payload}`.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct RequestEnvelope {
        pub id: u64,
        #[serde(flatten)]
        pub request: WorkerRequest,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(untagged)]
    pub enum TaskOutput {
        BudgetStats(BudgetStats),
        Insights(Insights),
        ProcessTransactions(ProcessedTransactions),
    }

    impl TaskOutput {
        pub fn kind(&self) -> TaskKind {
            match self {
                Self::BudgetStats(_) => TaskKind::BudgetStats,
                Self::Insights(_) => TaskKind::Insights,
                Self::ProcessTransactions(_) => TaskKind::ProcessTransactions,
            }
        }
    }

    /// Worker reply, `{id, type, result, error?}`. The id echoes the request.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct WorkerResponse {
        pub id: u64,
        #[serde(rename = "type")]
        pub kind: TaskKind,
        pub result: Option<TaskOutput>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub error: Option<String>,
    }

    impl WorkerResponse {
        pub fn success(id: u64, output: TaskOutput) -> Self {
            Self {
                id,
                kind: output.kind(),
                result: Some(output),
                error: None,
            }
        }

        pub fn failure(id: u64, kind: TaskKind, error: impl Into<String>) -> Self {
            Self {
                id,
                kind,
                result: None,
                error: Some(error.into()),
            }
        }

        /// Collapse the wire shape into a `Result`. A reply with neither a
        /// result nor an error counts as a failure.
        pub fn into_result(self) -> Result<TaskOutput, String> {
            match (self.result, self.error) {
                (_, Some(error)) => Err(error),
                (Some(output), None) => Ok(output),
                (None, None) => Err(format!("empty {} response", self.kind)),
            }
        }
    }
}
