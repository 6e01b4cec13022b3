//! Per-process accounting of remote calls by operation and cost class.
//!
//! Every call that reaches the backend is recorded exactly once, failed and
//! timed-out calls included.

use std::sync::atomic::{AtomicU64, Ordering};

use site_sync_models::{CostClass, Operation};
use strum::IntoEnumIterator as _;

/// Atomic `Operation` × `CostClass` counter grid.
///
/// Shared between workers behind an `Arc`; increments never lose updates.
#[derive(Debug, Default)]
pub struct OperationAccountant {
    counts: [[AtomicU64; CostClass::COUNT]; Operation::COUNT],
}

impl OperationAccountant {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one backend call.
    pub fn record(&self, op: Operation, class: CostClass) {
        self.counts[op.index()][class.index()].fetch_add(1, Ordering::Relaxed);
        log::trace!("op: {op} ({class})");
    }

    /// Records one backend call under the operation's usual cost class.
    pub fn charge(&self, op: Operation) {
        self.record(op, op.cost_class());
    }

    /// Current count for a single cell.
    #[must_use]
    pub fn count(&self, op: Operation, class: CostClass) -> u64 {
        self.counts[op.index()][class.index()].load(Ordering::Relaxed)
    }

    /// Total calls recorded for an operation across all cost classes.
    #[must_use]
    pub fn calls(&self, op: Operation) -> u64 {
        CostClass::iter().map(|class| self.count(op, class)).sum()
    }

    /// Snapshot of all operations recorded so far.
    #[must_use]
    pub fn summary(&self) -> OperationSummary {
        let rows: Vec<OperationRow> = Operation::iter()
            .map(|op| OperationRow {
                op,
                counts: [
                    self.count(op, CostClass::A),
                    self.count(op, CostClass::B),
                    self.count(op, CostClass::Free),
                ],
            })
            .filter(|row| row.counts.iter().any(|&n| n > 0))
            .collect();

        let mut totals = [0u64; CostClass::COUNT];
        for row in &rows {
            for (total, n) in totals.iter_mut().zip(row.counts) {
                *total += n;
            }
        }

        OperationSummary { rows, totals }
    }
}

/// Counts for one operation, indexed by [`CostClass::index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationRow {
    pub op: Operation,
    pub counts: [u64; CostClass::COUNT],
}

/// Table of recorded operations plus column totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSummary {
    pub rows: Vec<OperationRow>,
    pub totals: [u64; CostClass::COUNT],
}

impl OperationSummary {
    /// Total calls recorded for `op`, or zero if it never ran.
    #[must_use]
    pub fn calls(&self, op: Operation) -> u64 {
        self.rows
            .iter()
            .find(|row| row.op == op)
            .map_or(0, |row| row.counts.iter().sum())
    }

    /// Renders the table as aligned text lines: a header, one line per
    /// operation (zero cells shown as `·`), and a totals line.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        let width = self
            .rows
            .iter()
            .map(|row| row.op.to_string().len())
            .chain(std::iter::once("total".len()))
            .max()
            .unwrap_or(0);

        let mut header = format!("{:<width$}", "op");
        for class in CostClass::iter() {
            header.push_str(&format!("{:>5}", class.to_string()));
        }

        let mut lines = vec![header];
        for row in &self.rows {
            let mut line = format!("{:<width$}", row.op.to_string());
            for n in row.counts {
                if n == 0 {
                    line.push_str("    ·");
                } else {
                    line.push_str(&format!("{n:>5}"));
                }
            }
            lines.push(line);
        }

        let mut total = format!("{:<width$}", "total");
        for n in self.totals {
            total.push_str(&format!("{n:>5}"));
        }
        lines.push(total);

        lines
    }
}

impl std::fmt::Display for OperationSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.lines().join("\n"))
    }
}
