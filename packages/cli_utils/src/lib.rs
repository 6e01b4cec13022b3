#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI utilities for site sync.
//!
//! Provides [`TerminalReporter`], an `indicatif`-backed [`DecisionSink`]
//! that prints one aligned line per file above a progress bar, plus
//! [`init_logger`] which sets up `indicatif-log-bridge` so that
//! `log::info!` and friends are suspended while progress bars redraw.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use site_sync::{DecisionSink, RunStart};
use site_sync_models::{DecisionKind, FileOutcome, OrphanOutcome, OutcomeStatus};
use site_sync_r2::OperationSummary;

pub use indicatif::MultiProgress;

/// Renders outcomes as dot-padded lines above a progress bar.
///
/// Names are padded to the widest local or remote name of the run, as
/// reported by [`DecisionSink::on_start`].
pub struct TerminalReporter {
    bar: ProgressBar,
    name_width: AtomicUsize,
}

impl TerminalReporter {
    /// Creates a reporter whose bar starts as a spinner and turns into a
    /// bar once [`DecisionSink::on_start`] provides the total.
    #[must_use]
    pub fn new(multi: &MultiProgress) -> Self {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message("Listing remote...");

        Self {
            bar,
            name_width: AtomicUsize::new(0),
        }
    }

    fn line(&self, glyph: &str, name: &str, text: &str) -> String {
        let width = self.name_width.load(Ordering::Relaxed);
        format!("{glyph} {}{text}", pad_with_dots(name, width))
    }

    /// Removes the progress bar.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl DecisionSink for TerminalReporter {
    fn on_start(&self, start: RunStart) {
        self.name_width.store(start.name_width, Ordering::Relaxed);
        self.bar.set_length(start.total as u64);
        self.bar.set_position(0);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{msg} {wide_bar:.green/dim} {pos}/{len} [{elapsed_precise}]",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
        );
        self.bar.set_message("Reconciling");
    }

    fn on_outcome(&self, outcome: &FileOutcome) {
        let reason = outcome.decision.reason();
        let line = match (&outcome.status, outcome.decision.kind()) {
            (OutcomeStatus::Failed(e), _) => self.line(
                &style("✗").red().to_string(),
                &outcome.name,
                &style(format!("{reason} -> failed: {e}")).red().to_string(),
            ),
            (OutcomeStatus::Done, DecisionKind::Upload) => self.line(
                &style("↑").cyan().to_string(),
                &outcome.name,
                &format!("{reason} -> uploaded"),
            ),
            (OutcomeStatus::Done, DecisionKind::Skip) => self.line(
                &style("✓").green().to_string(),
                &outcome.name,
                &format!("{reason} -> skipped"),
            ),
            (OutcomeStatus::Done, DecisionKind::Warn | DecisionKind::Fail) => self.line(
                &style("!").yellow().to_string(),
                &outcome.name,
                &style(format!("{reason} -> skipped")).yellow().to_string(),
            ),
        };

        self.bar.println(line);
        self.bar.inc(1);
    }

    fn on_orphans(&self, outcome: &OrphanOutcome) {
        match outcome {
            OrphanOutcome::Clean => {
                self.bar.println(format!("{} remote is clean", style("✓").green()));
            }
            OrphanOutcome::Deleted { keys } => {
                for key in keys {
                    self.bar.println(self.line(
                        &style("−").magenta().to_string(),
                        key,
                        "extra remote file -> deleted",
                    ));
                }
            }
            OrphanOutcome::Failed { keys, error } => {
                for key in keys {
                    self.bar.println(self.line(
                        &style("✗").red().to_string(),
                        key,
                        &style("extra remote file -> delete failed").red().to_string(),
                    ));
                }
                self.bar
                    .println(style(format!("  delete failed: {error}")).red().to_string());
            }
        }
    }
}

/// Pads `s` with an alternating `· ` pattern up to `width` characters,
/// followed by one space. Names longer than `width` just get the space.
#[must_use]
pub fn pad_with_dots(s: &str, width: usize) -> String {
    let len = s.chars().count();
    let dots: String = "· ".chars().cycle().take(width).skip(len).collect();
    format!("{s}{dots} ")
}

/// Draws a rounded box around `lines`, separating the first line (header)
/// and the last line (totals) from the body.
#[must_use]
pub fn boxify(lines: &[String]) -> Vec<String> {
    let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let pad = |l: &str| format!("│ {l}{} │", " ".repeat(width - l.chars().count()));
    let rule = |left: &str, fill: &str, right: &str| {
        format!("{left}{}{right}", fill.repeat(width + 2))
    };

    let mut out = vec![rule("╭", "─", "╮")];
    match lines {
        [] => {}
        [only] => out.push(pad(only)),
        [header, body @ .., footer] => {
            out.push(pad(header));
            out.push(rule("├", "╶", "┤"));
            out.extend(body.iter().map(|l| pad(l)));
            out.push(rule("├", "╶", "┤"));
            out.push(pad(footer));
        }
    }
    out.push(rule("╰", "─", "╯"));
    out
}

/// Renders the operation-cost table inside a box.
#[must_use]
pub fn render_summary(summary: &OperationSummary) -> String {
    boxify(&summary.lines()).join("\n")
}

/// Initializes the global logger wrapped in `indicatif-log-bridge` so that
/// `log::info!` and friends are suspended while progress bars redraw.
///
/// Defaults to `info` when `RUST_LOG` is unset. Returns the
/// [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let mut builder = pretty_env_logger::formatted_builder();
    match std::env::var("RUST_LOG") {
        Ok(filters) => builder.parse_filters(&filters),
        Err(_) => builder.filter_level(log::LevelFilter::Info),
    };
    let logger = builder.build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // Ignore error if logger was already set (e.g., in tests)

    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use indicatif::ProgressDrawTarget;
    use site_sync_models::{CostClass, Operation};
    use site_sync_r2::OperationAccountant;

    use super::*;

    #[test]
    fn lines_align_to_the_widest_name_of_the_run() {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        let reporter = TerminalReporter::new(&multi);
        reporter.on_start(RunStart {
            total: 2,
            name_width: "a-rather-long-page-name.html".len(),
        });

        let short = reporter.line("+", "a.txt", "uploaded");
        let long = reporter.line("+", "a-rather-long-page-name.html", "uploaded");

        assert_eq!(short.chars().count(), long.chars().count());
        assert_eq!(long, "+ a-rather-long-page-name.html uploaded");
        reporter.finish();
    }

    #[test]
    fn pads_names_with_dots() {
        assert_eq!(pad_with_dots("a.txt", 9), "a.txt · · ");
        assert_eq!(pad_with_dots("b.txt", 10), "b.txt · ·  ");
        assert_eq!(pad_with_dots("very-long-name", 4), "very-long-name ");
    }

    #[test]
    fn boxes_header_body_and_footer() {
        let lines = vec!["op  A".to_string(), "put 1".to_string(), "tot 1".to_string()];
        assert_eq!(
            boxify(&lines),
            [
                "╭───────╮",
                "│ op  A │",
                "├╶╶╶╶╶╶╶┤",
                "│ put 1 │",
                "├╶╶╶╶╶╶╶┤",
                "│ tot 1 │",
                "╰───────╯",
            ]
        );
    }

    #[test]
    fn summary_box_contains_every_operation() {
        let acct = OperationAccountant::new();
        acct.record(Operation::ListObjectsV2, CostClass::A);
        acct.record(Operation::DeleteObjects, CostClass::Free);

        let rendered = render_summary(&acct.summary());
        let widths: Vec<usize> = rendered.lines().map(|l| l.chars().count()).collect();

        assert!(rendered.contains("listObjectsV2"));
        assert!(rendered.contains("deleteObjects"));
        assert!(widths.windows(2).all(|w| w[0] == w[1]));
    }
}
