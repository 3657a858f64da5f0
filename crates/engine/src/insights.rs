//! Spending insights: where the money goes.

use std::collections::HashMap;

use api_types::{
    stats::{CategorySpending, Insights, InsightsRequest},
    transaction::Transaction,
};

use crate::{ResultTask, util::checked_amount};

/// How many envelopes `top_spending_categories` reports.
pub const TOP_CATEGORIES: usize = 5;

/// Compute spending insights over every expense in the request.
///
/// Percentages are relative to all expenses, including the ones without an
/// envelope, but only envelopes appear in the ranking. Ties keep the order in
/// which envelopes first appear in the input.
pub fn insights(request: &InsightsRequest) -> ResultTask<Insights> {
    let names: HashMap<&str, &str> = request
        .envelopes
        .iter()
        .map(|envelope| (envelope.id.as_str(), envelope.name.as_str()))
        .collect();

    let mut total = 0.0;
    let mut count = 0usize;
    let mut largest: Option<&Transaction> = None;
    let mut per_envelope: Vec<(&str, f64)> = Vec::new();
    let mut slot: HashMap<&str, usize> = HashMap::new();

    for tx in request.transactions.iter().filter(|tx| tx.is_expense()) {
        let amount = checked_amount(tx)?;
        total += amount;
        count += 1;

        // Strictly greater: the first of equal expenses wins.
        if largest.is_none_or(|current| amount > current.amount) {
            largest = Some(tx);
        }

        if let Some(envelope_id) = tx.envelope_id.as_deref() {
            let index = *slot.entry(envelope_id).or_insert_with(|| {
                per_envelope.push((envelope_id, 0.0));
                per_envelope.len() - 1
            });
            per_envelope[index].1 += amount;
        }
    }

    // Stable sort, so equal amounts stay in first-seen order.
    per_envelope.sort_by(|a, b| b.1.total_cmp(&a.1));
    let top_spending_categories = per_envelope
        .into_iter()
        .take(TOP_CATEGORIES)
        .map(|(envelope_id, amount)| CategorySpending {
            envelope_id: envelope_id.to_string(),
            name: names.get(envelope_id).map(|name| name.to_string()),
            amount,
            percentage: if total > 0.0 {
                amount / total * 100.0
            } else {
                0.0
            },
        })
        .collect();

    Ok(Insights {
        top_spending_categories,
        largest_expense: largest.cloned(),
        average_transaction_size: if count > 0 { total / count as f64 } else { 0.0 },
    })
}

#[cfg(test)]
mod tests {
    use api_types::{envelope::Envelope, transaction::TransactionType};

    use super::*;

    fn expense(id: &str, amount: f64, envelope: Option<&str>) -> Transaction {
        Transaction {
            id: Some(id.to_string()),
            date: "2024-03-01".to_string(),
            amount,
            kind: TransactionType::Expense,
            envelope_id: envelope.map(str::to_string),
            description: None,
        }
    }

    fn envelope(id: &str, name: &str) -> Envelope {
        Envelope {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn single_envelope_takes_everything() {
        let request = InsightsRequest {
            transactions: vec![
                expense("a", 10.0, Some("e1")),
                expense("b", 20.0, Some("e1")),
                expense("c", 70.0, Some("e1")),
            ],
            envelopes: vec![envelope("e1", "Groceries")],
        };

        let result = insights(&request).unwrap();

        assert_eq!(result.top_spending_categories.len(), 1);
        let top = &result.top_spending_categories[0];
        assert_eq!(top.envelope_id, "e1");
        assert_eq!(top.name.as_deref(), Some("Groceries"));
        assert_eq!(top.amount, 100.0);
        assert_eq!(top.percentage, 100.0);
        assert_eq!(
            result.largest_expense.and_then(|tx| tx.id),
            Some("c".to_string())
        );
        assert!((result.average_transaction_size - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn ranking_is_descending_and_truncated() {
        let transactions = (1..=7)
            .map(|i| {
                let envelope = format!("e{i}");
                expense(&format!("t{i}"), f64::from(i) * 10.0, Some(envelope.as_str()))
            })
            .collect();
        let request = InsightsRequest {
            transactions,
            envelopes: Vec::new(),
        };

        let result = insights(&request).unwrap();

        let ids: Vec<&str> = result
            .top_spending_categories
            .iter()
            .map(|c| c.envelope_id.as_str())
            .collect();
        assert_eq!(ids, vec!["e7", "e6", "e5", "e4", "e3"]);
        assert!(result.top_spending_categories.iter().all(|c| c.name.is_none()));
    }

    #[test]
    fn ties_keep_input_order() {
        let request = InsightsRequest {
            transactions: vec![
                expense("first", 50.0, Some("e2")),
                expense("second", 50.0, Some("e1")),
            ],
            envelopes: Vec::new(),
        };

        let result = insights(&request).unwrap();

        assert_eq!(
            result.largest_expense.and_then(|tx| tx.id),
            Some("first".to_string())
        );
        assert_eq!(result.top_spending_categories[0].envelope_id, "e2");
        assert_eq!(result.top_spending_categories[1].envelope_id, "e1");
    }

    #[test]
    fn unassigned_expenses_dilute_percentages() {
        let request = InsightsRequest {
            transactions: vec![expense("a", 25.0, Some("e1")), expense("b", 75.0, None)],
            envelopes: Vec::new(),
        };

        let result = insights(&request).unwrap();

        assert_eq!(result.top_spending_categories.len(), 1);
        assert_eq!(result.top_spending_categories[0].percentage, 25.0);
    }

    #[test]
    fn income_only_yields_empty_insights() {
        let mut income = expense("pay", 1000.0, None);
        income.kind = TransactionType::Income;
        let request = InsightsRequest {
            transactions: vec![income],
            envelopes: Vec::new(),
        };

        let result = insights(&request).unwrap();

        assert_eq!(result, Insights::default());
    }
}
