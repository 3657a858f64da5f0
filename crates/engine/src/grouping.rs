//! Group transactions by day and by envelope.

use api_types::stats::{ProcessRequest, ProcessedTransactions, UNASSIGNED_ENVELOPE};

use crate::{ResultTask, util::transaction_date};

/// Bucket every transaction by calendar date (`YYYY-MM-DD`) and by envelope
/// id. Transactions without an envelope land in [`UNASSIGNED_ENVELOPE`].
/// Each bucket keeps input order.
pub fn process_transactions(request: &ProcessRequest) -> ResultTask<ProcessedTransactions> {
    let mut processed = ProcessedTransactions {
        total_count: request.transactions.len(),
        ..Default::default()
    };

    for tx in &request.transactions {
        let day = transaction_date(tx)?.format("%Y-%m-%d").to_string();
        processed.by_date.entry(day).or_default().push(tx.clone());

        let envelope = tx
            .envelope_id
            .clone()
            .unwrap_or_else(|| UNASSIGNED_ENVELOPE.to_string());
        processed
            .by_envelope
            .entry(envelope)
            .or_default()
            .push(tx.clone());
    }

    Ok(processed)
}

#[cfg(test)]
mod tests {
    use api_types::transaction::{Transaction, TransactionType};

    use super::*;
    use crate::TaskError;

    fn tx(id: &str, date: &str, envelope: Option<&str>) -> Transaction {
        Transaction {
            id: Some(id.to_string()),
            date: date.to_string(),
            amount: 1.0,
            kind: TransactionType::Expense,
            envelope_id: envelope.map(str::to_string),
            description: None,
        }
    }

    fn ids(transactions: &[Transaction]) -> Vec<&str> {
        transactions
            .iter()
            .filter_map(|tx| tx.id.as_deref())
            .collect()
    }

    #[test]
    fn groups_by_day_and_envelope() {
        let request = ProcessRequest {
            transactions: vec![
                tx("a", "2024-02-01", Some("e1")),
                tx("b", "2024-02-01T18:45:00Z", None),
                tx("c", "2024-02-03", Some("e1")),
            ],
        };

        let processed = process_transactions(&request).unwrap();

        assert_eq!(processed.total_count, 3);
        assert_eq!(ids(&processed.by_date["2024-02-01"]), vec!["a", "b"]);
        assert_eq!(ids(&processed.by_date["2024-02-03"]), vec!["c"]);
        assert_eq!(ids(&processed.by_envelope["e1"]), vec!["a", "c"]);
        assert_eq!(ids(&processed.by_envelope[UNASSIGNED_ENVELOPE]), vec!["b"]);
    }

    #[test]
    fn empty_input_is_empty_output() {
        let processed = process_transactions(&ProcessRequest {
            transactions: Vec::new(),
        })
        .unwrap();

        assert_eq!(processed, ProcessedTransactions::default());
    }

    #[test]
    fn unparseable_date_fails() {
        let request = ProcessRequest {
            transactions: vec![tx("a", "02/01/2024", None)],
        };

        assert_eq!(
            process_transactions(&request),
            Err(TaskError::InvalidDate("02/01/2024".to_string()))
        );
    }
}
