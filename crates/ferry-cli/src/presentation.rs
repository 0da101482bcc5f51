//! Terminal rendering of upload events.
//!
//! Two renderers subscribe under the `cli` namespace:
//! - [`UploadReporter`]: an aggregate byte progress bar plus one line per
//!   finished or failed file; plain lines when stderr is not a terminal
//! - [`attach_json`]: every event as one JSON line on stdout

use std::io::{self, IsTerminal};

use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

use ferry_core::{Event, EventName, EventSpec, FileErrorReason, QueueResult};
use ferry_queue::TransferManager;

/// Namespace for every subscription made by the CLI.
pub const NAMESPACE: &str = "cli";

/// Progress bar and per-file result lines.
#[derive(Clone)]
pub struct UploadReporter {
    bar: ProgressBar,
}

impl UploadReporter {
    /// Reporter drawing on stderr when it is a terminal.
    pub fn new() -> Self {
        let bar = if io::stderr().is_terminal() {
            let bar = ProgressBar::new(0);
            bar.set_style(Self::bar_style());
            bar
        } else {
            ProgressBar::hidden()
        };
        Self { bar }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{bar:32.cyan/blue} {bytes:>9} / {total_bytes:>9} ({percent:>3}%) @ {binary_bytes_per_sec} ETA {eta}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
    }

    fn line(&self, message: &str) {
        if self.bar.is_hidden() {
            println!("{message}");
        } else {
            self.bar.println(message);
        }
    }

    /// Subscribe to progress and per-file results.
    pub fn attach(&self, manager: &TransferManager) -> QueueResult<()> {
        let reporter = self.clone();
        manager.on(
            EventSpec::namespaced(EventName::Progress, NAMESPACE),
            move |event: &Event| {
                if let Event::Progress { loaded, total, .. } = event {
                    reporter.bar.set_length(*total);
                    reporter.bar.set_position((*loaded).min(*total));
                }
            },
        )?;

        let reporter = self.clone();
        manager.on(
            EventSpec::namespaced(EventName::FinishFile, NAMESPACE),
            move |event: &Event| {
                if let Event::FinishFile { unit, .. } = event {
                    reporter.line(&format!("done  {} ({})", unit.name, HumanBytes(unit.size)));
                }
            },
        )?;

        let reporter = self.clone();
        manager.on(
            EventSpec::namespaced(EventName::ErrorFile, NAMESPACE),
            move |event: &Event| {
                if let Event::ErrorFile { file, reason, .. } = event {
                    reporter.line(&format!("fail  {}  {}", file.name, describe(reason)));
                }
            },
        )
    }

    /// Remove the bar and print the summary.
    pub fn finish(&self, uploaded: usize, total: usize) {
        self.bar.finish_and_clear();
        println!("{uploaded} of {total} files uploaded");
    }
}

impl Default for UploadReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Print every event as a JSON line.
pub fn attach_json(manager: &TransferManager) -> QueueResult<()> {
    for name in EventName::ALL {
        manager.on(
            EventSpec::namespaced(name, NAMESPACE),
            |event: &Event| match serde_json::to_string(event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(event = %event.name(), error = %e, "Cannot serialize event"),
            },
        )?;
    }
    Ok(())
}

/// One-line reason for an `errorFile`.
pub fn describe(reason: &FileErrorReason) -> String {
    match reason {
        FileErrorReason::Rejected { errors } => errors
            .iter()
            .map(|e| format!("{}: {e}", e.kind().as_str()))
            .collect::<Vec<_>>()
            .join("; "),
        FileErrorReason::Transfer { message } => message
            .clone()
            .unwrap_or_else(|| "transfer failed".to_string()),
    }
}
