use std::sync::Arc;

use api_types::{
    envelope::Envelope,
    stats::{BudgetStatsRequest, DateWindow, InsightsRequest, ProcessRequest},
    transaction::{Transaction, TransactionType},
    worker::{TaskKind, TaskOutput, WorkerRequest},
};
use engine::{DispatchError, Dispatcher, DispatcherOptions, SameKindPolicy};

fn tx(date: &str, amount: f64, kind: TransactionType, envelope: Option<&str>) -> Transaction {
    Transaction {
        id: None,
        date: date.to_string(),
        amount,
        kind,
        envelope_id: envelope.map(str::to_string),
        description: None,
    }
}

fn many_transactions(count: usize) -> Vec<Transaction> {
    (0..count)
        .map(|i| {
            tx(
                &format!("2024-01-{:02}", i % 28 + 1),
                (i % 97) as f64,
                if i % 5 == 0 {
                    TransactionType::Income
                } else {
                    TransactionType::Expense
                },
                Some(["e1", "e2", "e3"][i % 3]),
            )
        })
        .collect()
}

fn january_stats_request() -> BudgetStatsRequest {
    BudgetStatsRequest {
        transactions: vec![
            tx("2024-01-05", 100.0, TransactionType::Income, None),
            tx("2024-01-10", 40.0, TransactionType::Expense, Some("e1")),
        ],
        envelopes: vec![Envelope {
            id: "e1".to_string(),
            name: "Groceries".to_string(),
        }],
        date_range: DateWindow {
            start_date: "2024-01-01".to_string(),
            end_date: "2024-01-31".to_string(),
        },
    }
}

#[tokio::test]
async fn budget_stats_round_trip_through_the_worker() {
    let dispatcher = Dispatcher::start(DispatcherOptions::default());
    assert!(dispatcher.is_available());

    let stats = dispatcher
        .budget_stats(january_stats_request())
        .await
        .unwrap();

    assert_eq!(stats.total_income, 100.0);
    assert_eq!(stats.total_expenses, 40.0);
    assert_eq!(stats.net_cash_flow, 60.0);
    assert_eq!(stats.envelope_breakdown["e1"], 40.0);
    assert!((stats.daily_average - 40.0 / 31.0).abs() < 1e-9);
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn task_failures_are_reported_as_compute_errors() {
    let dispatcher = Dispatcher::start(DispatcherOptions::default());
    let mut request = january_stats_request();
    request.date_range.end_date = "end of month".to_string();

    let err = dispatcher.budget_stats(request).await.unwrap_err();

    assert_eq!(
        err,
        DispatchError::Compute("Invalid date: \"end of month\"".to_string())
    );
    // The worker survives a failed task.
    assert!(dispatcher.budget_stats(january_stats_request()).await.is_ok());
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn different_kinds_resolve_independently() {
    let dispatcher = Dispatcher::start(DispatcherOptions::default());

    let big = ProcessRequest {
        transactions: many_transactions(20_000),
    };
    let small = InsightsRequest {
        transactions: vec![
            tx("2024-01-01", 10.0, TransactionType::Expense, Some("e1")),
            tx("2024-01-02", 20.0, TransactionType::Expense, Some("e1")),
            tx("2024-01-03", 70.0, TransactionType::Expense, Some("e1")),
        ],
        envelopes: Vec::new(),
    };

    let processing = dispatcher.process_transactions(big);
    let insights = dispatcher.insights(small);
    let (processed, insights) = tokio::join!(processing, insights);

    let processed = processed.unwrap();
    assert_eq!(processed.total_count, 20_000);
    assert_eq!(processed.by_envelope.len(), 3);

    let insights = insights.unwrap();
    assert_eq!(insights.top_spending_categories[0].percentage, 100.0);
    assert_eq!(insights.largest_expense.map(|t| t.amount), Some(70.0));
    assert!((insights.average_transaction_size - 100.0 / 3.0).abs() < 1e-9);
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn later_request_can_be_awaited_first() {
    let dispatcher = Arc::new(Dispatcher::start(DispatcherOptions::default()));

    let first = tokio::spawn({
        let dispatcher = Arc::clone(&dispatcher);
        async move {
            dispatcher
                .execute(WorkerRequest::ProcessTransactions(ProcessRequest {
                    transactions: many_transactions(5_000),
                }))
                .await
        }
    });
    let second = tokio::spawn({
        let dispatcher = Arc::clone(&dispatcher);
        async move {
            dispatcher
                .execute(WorkerRequest::Insights(InsightsRequest {
                    transactions: Vec::new(),
                    envelopes: Vec::new(),
                }))
                .await
        }
    });

    let second = second.await.unwrap().unwrap();
    let first = first.await.unwrap().unwrap();

    assert!(matches!(second, TaskOutput::Insights(_)));
    assert!(matches!(first, TaskOutput::ProcessTransactions(_)));
    assert_eq!(dispatcher.in_flight(), 0);
}

#[tokio::test]
async fn overlapping_same_kind_requests_each_get_their_answer() {
    let dispatcher = Dispatcher::start(DispatcherOptions::default());

    let mut small = january_stats_request();
    small.transactions.truncate(1);
    let (full, partial) = tokio::join!(
        dispatcher.budget_stats(january_stats_request()),
        dispatcher.budget_stats(small)
    );

    assert_eq!(full.unwrap().total_expenses, 40.0);
    let partial = partial.unwrap();
    assert_eq!(partial.total_expenses, 0.0);
    assert_eq!(partial.total_income, 100.0);
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn reject_policy_refuses_a_second_request_of_the_same_kind() {
    let dispatcher = Dispatcher::start(DispatcherOptions {
        same_kind_policy: SameKindPolicy::Reject,
        ..DispatcherOptions::default()
    });

    // Poll the first request once so it is registered and sent. On the
    // current-thread runtime the router cannot deliver its answer until this
    // task yields.
    let mut first = Box::pin(dispatcher.budget_stats(january_stats_request()));
    tokio::select! {
        biased;
        _ = &mut first => panic!("answered before the router could run"),
        _ = std::future::ready(()) => {}
    }
    assert_eq!(dispatcher.in_flight(), 1);

    let second = dispatcher.budget_stats(january_stats_request()).await;
    assert_eq!(second.unwrap_err(), DispatchError::Busy(TaskKind::BudgetStats));

    // Other kinds are unaffected.
    let other = dispatcher
        .process_transactions(ProcessRequest {
            transactions: Vec::new(),
        })
        .await;
    assert!(other.is_ok());

    assert_eq!(first.await.unwrap().total_expenses, 40.0);
    let third = dispatcher.budget_stats(january_stats_request()).await;
    assert!(third.is_ok());
}

#[test]
fn starting_without_a_runtime_leaves_the_worker_unavailable() {
    let dispatcher = Dispatcher::start(DispatcherOptions::default());
    assert!(!dispatcher.is_available());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let err = runtime
        .block_on(dispatcher.insights(InsightsRequest {
            transactions: Vec::new(),
            envelopes: Vec::new(),
        }))
        .unwrap_err();

    assert_eq!(err, DispatchError::WorkerUnavailable);
}

#[tokio::test]
async fn independent_dispatchers_do_not_share_state() {
    let a = Dispatcher::start(DispatcherOptions {
        same_kind_policy: SameKindPolicy::Reject,
        ..DispatcherOptions::default()
    });
    let b = Dispatcher::start(DispatcherOptions {
        same_kind_policy: SameKindPolicy::Reject,
        ..DispatcherOptions::default()
    });

    let (left, right) = tokio::join!(
        a.budget_stats(january_stats_request()),
        b.budget_stats(january_stats_request())
    );

    assert!(left.is_ok());
    assert!(right.is_ok());
    a.shutdown().await;
    b.shutdown().await;
}

#[test]
fn run_task_answers_inline() {
    let output = engine::run_task(&WorkerRequest::BudgetStats(january_stats_request())).unwrap();

    let TaskOutput::BudgetStats(stats) = output else {
        panic!("expected budget stats, got {:?}", output.kind());
    };
    assert_eq!(stats.net_cash_flow, 60.0);
}
