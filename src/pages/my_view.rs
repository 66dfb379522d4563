// My View - personal totals per currency

use crate::access::Viewer;
use crate::backend::{fetch, Backend, Query};
use crate::entities::expense::{Expense, EXPENSE_TABLE};
use crate::error::BackendResult;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrencyTotal {
    pub currency: String,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MyViewPage {
    pub display_name: String,
    pub totals: Vec<CurrencyTotal>,
    pub entries: usize,
}

impl MyViewPage {
    pub fn load(backend: &dyn Backend) -> BackendResult<Self> {
        let viewer = Viewer::load(backend)?;
        let expenses: Vec<Expense> = fetch(
            backend,
            EXPENSE_TABLE,
            &Query::new()
                .select("amount,currency,spent_at_utc")
                .eq("user_id", viewer.id()),
        )?;
        Ok(Self {
            totals: totals_by_currency(&expenses),
            entries: expenses.len(),
            display_name: viewer.display_name,
        })
    }
}

/// First-seen currency order
pub fn totals_by_currency(expenses: &[Expense]) -> Vec<CurrencyTotal> {
    let mut totals: Vec<CurrencyTotal> = Vec::new();
    for expense in expenses {
        match totals.iter_mut().find(|t| t.currency == expense.currency) {
            Some(t) => t.total += expense.amount,
            None => totals.push(CurrencyTotal {
                currency: expense.currency.clone(),
                total: expense.amount,
            }),
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;
    use serde_json::json;

    #[test]
    fn test_totals_per_currency_for_own_rows() {
        let row = |user: &str, amount: f64, cur: &str| {
            json!({ "user_id": user, "amount": amount, "currency": cur, "spent_at_utc": "2025-01-01T00:00:00Z" })
        };
        let backend = FakeBackend::new()
            .signed_in_as("u-1", "a@example.com")
            .with_table(
                EXPENSE_TABLE,
                vec![
                    row("u-1", 10.0, "PLN"),
                    row("u-1", 5.5, "EUR"),
                    row("u-1", 2.5, "PLN"),
                    row("u-2", 100.0, "PLN"),
                ],
            );

        let page = MyViewPage::load(&backend).unwrap();
        assert_eq!(page.entries, 3);
        assert_eq!(
            page.totals,
            vec![
                CurrencyTotal { currency: "PLN".into(), total: 12.5 },
                CurrencyTotal { currency: "EUR".into(), total: 5.5 },
            ]
        );
        assert_eq!(page.display_name, "a@example.com");
    }
}
