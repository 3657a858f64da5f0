//! Budget totals over a date window.

use api_types::{
    stats::{BudgetStats, BudgetStatsRequest},
    transaction::TransactionType,
};

use crate::{
    ResultTask,
    util::{checked_amount, parse_date, transaction_date},
};

/// Days used to turn a daily average into a monthly projection.
pub const PROJECTION_DAYS: f64 = 30.0;

/// Sum income and expenses of the transactions dated inside
/// `[start_date, end_date]` (inclusive, by calendar day).
///
/// - Expense totals are broken down by envelope id; expenses without an
///   envelope count toward the totals only.
/// - `daily_average` divides expenses by the number of days in the window,
///   counting both ends, never less than one.
/// - `monthly_projection` is `daily_average * 30`.
pub fn budget_stats(request: &BudgetStatsRequest) -> ResultTask<BudgetStats> {
    let start = parse_date(&request.date_range.start_date)?;
    let end = parse_date(&request.date_range.end_date)?;

    let mut stats = BudgetStats::default();
    for tx in &request.transactions {
        let date = transaction_date(tx)?;
        if date < start || date > end {
            continue;
        }
        let amount = checked_amount(tx)?;
        match tx.kind {
            TransactionType::Income => stats.total_income += amount,
            TransactionType::Expense => {
                stats.total_expenses += amount;
                if let Some(envelope_id) = &tx.envelope_id {
                    *stats
                        .envelope_breakdown
                        .entry(envelope_id.clone())
                        .or_default() += amount;
                }
            }
        }
    }

    let days = ((end - start).num_days() + 1).max(1);
    stats.net_cash_flow = stats.total_income - stats.total_expenses;
    stats.daily_average = stats.total_expenses / days as f64;
    stats.monthly_projection = stats.daily_average * PROJECTION_DAYS;
    Ok(stats)
}
