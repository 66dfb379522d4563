// 📤 CSV export of the signed-in user's expenses
//
// Rows are pulled a thousand at a time, oldest first, and written with a
// header line: id, spent_at_utc, amount, currency, category, note.

use crate::backend::{current_user, fetch, timestamp_param, Backend, Query};
use crate::entities::expense::{Expense, EXPENSE_TABLE};
use crate::error::BackendResult;
use crate::pages::expenses::EXPENSE_COLUMNS;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub const EXPORT_BATCH: u64 = 1000;

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    id: &'a str,
    spent_at_utc: String,
    amount: f64,
    currency: &'a str,
    category: &'a str,
    note: &'a str,
}

impl<'a> From<&'a Expense> for ExportRow<'a> {
    fn from(expense: &'a Expense) -> Self {
        Self {
            id: &expense.id,
            spent_at_utc: timestamp_param(&expense.spent_at_utc),
            amount: expense.amount,
            currency: &expense.currency,
            category: expense.category_name(),
            note: expense.note_or_empty(),
        }
    }
}

/// Every expense owned by `user_id`, batch by batch
pub fn fetch_all(backend: &dyn Backend, user_id: &str) -> BackendResult<Vec<Expense>> {
    let mut all = Vec::new();
    let mut offset = 0;
    loop {
        let batch: Vec<Expense> = fetch(
            backend,
            EXPENSE_TABLE,
            &Query::new()
                .select(EXPENSE_COLUMNS)
                .eq("user_id", user_id)
                .order("spent_at_utc", true)
                .order("id", true)
                .range(offset, offset + EXPORT_BATCH - 1),
        )?;
        let done = (batch.len() as u64) < EXPORT_BATCH;
        all.extend(batch);
        if done {
            break;
        }
        offset += EXPORT_BATCH;
    }
    tracing::debug!(rows = all.len(), "fetched expenses for export");
    Ok(all)
}

pub fn write_csv<W: Write>(writer: W, expenses: &[Expense]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for expense in expenses {
        wtr.serialize(ExportRow::from(expense))
            .with_context(|| format!("writing expense {}", expense.id))?;
    }
    if expenses.is_empty() {
        wtr.write_record(["id", "spent_at_utc", "amount", "currency", "category", "note"])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Export the signed-in user's expenses; returns the row count
pub fn export_to_path(backend: &dyn Backend, path: &Path) -> Result<usize> {
    let user = current_user(backend)?;
    let expenses = fetch_all(backend, &user.id)?;
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    write_csv(file, &expenses)?;
    tracing::info!(rows = expenses.len(), path = %path.display(), "exported expenses");
    Ok(expenses.len())
}
