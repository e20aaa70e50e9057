//! Console progress output for a migration run.

use plastigit_core::history::History;
use plastigit_core::models::{ChangesetResult, MigrationReport};
use plastigit_core::MigrationObserver;

use crate::style;

/// Prints one line per changeset and a summary at the end.
#[derive(Debug, Default)]
pub struct ConsoleObserver {
    width: usize,
}

impl ConsoleObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

/// `[  i/total] cs:<id> | <branch> | ✓` or `... | ✗ <reason>`.
pub fn progress_line(result: &ChangesetResult, width: usize) -> String {
    let outcome = match result.failure_reason() {
        None => style::ok_mark(),
        Some(reason) => style::error(reason),
    };
    format!(
        "[{:>width$}/{}] cs:{} | {} | {}",
        result.index,
        result.total,
        result.changeset_id,
        result.source_branch,
        outcome,
        width = width,
    )
}

/// The end-of-run summary: counts, the branches this run created, then
/// every branch in the destination.
pub fn summary_lines(report: &MigrationReport) -> Vec<String> {
    let mut lines = vec![
        style::header("Migration complete"),
        format!("  Total changesets : {}", report.total),
        format!("  Succeeded        : {}", report.succeeded),
        format!("  Failed           : {}", report.failed),
        format!("  Warnings         : {}", report.warning_count()),
        format!("  Branches created : {}", report.branches_created.len()),
    ];
    for name in &report.branches_created {
        lines.push(format!("    + {}", style::branch(name)));
    }
    lines.push(String::new());
    lines.push(style::header("Branches in destination"));
    if report.destination_branches.is_empty() {
        lines.push(format!("  {}", style::dim("(none)")));
    }
    for name in &report.destination_branches {
        lines.push(format!("  - {}", style::branch(name)));
    }
    lines
}

impl MigrationObserver for ConsoleObserver {
    fn on_start(&mut self, history: &History) {
        self.width = history.len().to_string().len();
        println!();
        println!(
            "{}",
            style::header(&format!("Replaying {} changeset(s)", history.len()))
        );
        println!();
    }

    fn on_changeset(&mut self, result: &ChangesetResult) {
        println!("{}", progress_line(result, self.width));
        for warning in &result.warnings {
            println!("    {}", style::warn(warning));
        }
    }

    fn on_finish(&mut self, report: &MigrationReport) {
        println!();
        for line in summary_lines(report) {
            println!("{}", line);
        }
        println!();
    }
}
