//! Single-consumer progress printer.
//!
//! Worker tasks hold clones of a [`ChannelReporter`]; one task owns the
//! receiver and writes whole lines, so output from concurrent downloads never
//! interleaves mid-line.

use crossterm::style::Stylize;
use hats_core::{ChannelReporter, Phase, ProgressEvent};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

const PHASE_WIDTH: usize = 9;
const ID_WIDTH: usize = 18;

/// Handle to the printer task.
#[derive(Debug)]
pub struct Printer {
    handle: JoinHandle<usize>,
}

impl Printer {
    /// Spawn a printer and return the reporter that feeds it.
    pub fn spawn() -> (ChannelReporter, Self) {
        let (reporter, receiver) = ChannelReporter::new();
        let handle = tokio::spawn(run(receiver));
        (reporter, Self { handle })
    }

    /// Wait until every reporter clone is gone and the queue is drained.
    /// Returns how many failures were printed.
    pub async fn finish(self) -> usize {
        self.handle.await.unwrap_or(0)
    }
}

async fn run(mut receiver: UnboundedReceiver<ProgressEvent>) -> usize {
    let mut failures = 0;
    while let Some(event) = receiver.recv().await {
        if event.phase == Phase::Failed {
            failures += 1;
        }
        let line = format_event(&event);
        match event.phase {
            Phase::Done => println!("{}", line.green()),
            Phase::Warning => eprintln!("{}", line.yellow()),
            Phase::Failed => eprintln!("{}", line.red()),
            Phase::Info => println!("{}", line.dark_grey()),
            _ => println!("{line}"),
        }
    }
    failures
}

/// Render one event as a fixed-column line.
pub fn format_event(event: &ProgressEvent) -> String {
    let label = event.phase.label();
    match &event.component_id {
        Some(id) => format!(
            "{label:<PHASE_WIDTH$} {id:<ID_WIDTH$} {}",
            event.message
        ),
        None => format!("{label:<PHASE_WIDTH$} {}", event.message),
    }
}
