//! One function per subcommand. Each returns the JSON document to print.

use std::path::Path;

use api_types::{
    envelope::Envelope,
    stats::{BudgetStatsRequest, DateWindow, InsightsRequest, ProcessRequest},
    transaction::Transaction,
};
use engine::{Dispatcher, WindowedList};
use serde::Deserialize;
use serde_json::{Value, json};
use store::LocalStore;

use crate::{
    error::Result,
    settings::{ENVELOPES, List, TRANSACTIONS},
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ImportFile {
    pub envelopes: Vec<Envelope>,
    pub transactions: Vec<Transaction>,
}

pub async fn import(store: &LocalStore, file: &Path) -> Result<Value> {
    let raw = tokio::fs::read_to_string(file).await?;
    let ImportFile {
        envelopes,
        mut transactions,
    } = serde_json::from_str(&raw)?;
    import_records(store, &envelopes, &mut transactions).await
}

/// Write `envelopes`, then `transactions`, each as one all-or-nothing batch.
///
/// The two batches are separate transactions: if the transactions fail, the
/// envelopes stay written. Both batches are keyed upserts, so importing the
/// same file again converges to the same state.
pub async fn import_records(
    store: &LocalStore,
    envelopes: &[Envelope],
    transactions: &mut [Transaction],
) -> Result<Value> {
    for tx in transactions.iter_mut().filter(|tx| tx.id.is_none()) {
        tx.id = Some(uuid::Uuid::new_v4().to_string());
    }

    store.batch_put(ENVELOPES, envelopes).await?;
    store.batch_put(TRANSACTIONS, transactions).await?;
    tracing::info!(
        envelopes = envelopes.len(),
        transactions = transactions.len(),
        "import done"
    );

    Ok(json!({
        "envelopes": envelopes.len(),
        "transactions": transactions.len(),
    }))
}

pub async fn stats(
    store: &LocalStore,
    dispatcher: &Dispatcher,
    start_date: String,
    end_date: String,
) -> Result<Value> {
    let request = BudgetStatsRequest {
        transactions: store.list(TRANSACTIONS).await?,
        envelopes: store.list(ENVELOPES).await?,
        date_range: DateWindow {
            start_date,
            end_date,
        },
    };
    let stats = dispatcher.budget_stats(request).await?;
    Ok(serde_json::to_value(stats)?)
}

pub async fn insights(store: &LocalStore, dispatcher: &Dispatcher) -> Result<Value> {
    let request = InsightsRequest {
        transactions: store.list(TRANSACTIONS).await?,
        envelopes: store.list(ENVELOPES).await?,
    };
    let insights = dispatcher.insights(request).await?;
    Ok(serde_json::to_value(insights)?)
}

pub async fn groups(store: &LocalStore, dispatcher: &Dispatcher) -> Result<Value> {
    let request = ProcessRequest {
        transactions: store.list(TRANSACTIONS).await?,
    };
    let processed = dispatcher.process_transactions(request).await?;
    Ok(serde_json::to_value(processed)?)
}

/// Rows of the transaction list, sorted by date, visible at `scroll_top`.
pub async fn list(
    store: &LocalStore,
    layout: &List,
    scroll_top: f64,
    viewport_height: Option<f64>,
) -> Result<Value> {
    let mut transactions: Vec<Transaction> = store.list(TRANSACTIONS).await?;
    transactions.sort_by(|a, b| a.date.cmp(&b.date));

    let mut list = WindowedList::new(
        transactions,
        layout.item_height,
        viewport_height.unwrap_or(layout.viewport_height),
        layout.overscan,
    );
    list.scroll_to(scroll_top);

    let rows = list
        .visible()
        .map(|(index, tx)| -> Result<Value> {
            Ok(json!({ "index": index, "transaction": serde_json::to_value(tx)? }))
        })
        .collect::<Result<Vec<Value>>>()?;
    let window = list.window().map(|window| {
        json!({
            "startIndex": window.start_index,
            "endIndex": window.end_index,
            "offsetY": window.offset_y,
            "totalHeight": window.total_height,
        })
    });

    Ok(json!({
        "scrollTop": list.scroll_top(),
        "window": window,
        "rows": rows,
    }))
}

pub async fn count(store: &LocalStore, collection: &str) -> Result<Value> {
    let count = store.count(collection).await?;
    Ok(json!({ "collection": collection, "count": count }))
}

pub async fn clear(store: &LocalStore, collection: &str) -> Result<Value> {
    store.clear(collection).await?;
    tracing::info!("cleared {collection}");
    Ok(json!({ "collection": collection, "count": 0 }))
}
