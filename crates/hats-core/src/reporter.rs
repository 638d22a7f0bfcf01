//! Reporter trait for dependency injection
//!
//! Core logic reports progress as structured [`ProgressEvent`]s instead of
//! printing. Worker tasks run concurrently, so every event funnels into one
//! consumer; [`ChannelReporter`] is the usual implementation, feeding an
//! unbounded channel that a single printer (CLI) or log pane drains.

use tokio::sync::mpsc;

/// Pipeline stage an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Working out which version to build.
    Resolve,
    /// Fetching release metadata or asset bytes.
    Download,
    /// Running processing steps into the staging tree.
    Process,
    /// Looking up supported firmware.
    Firmware,
    /// Writing metadata and the pack archive.
    Package,
    /// Moving components between installed and trash on a target.
    Reconcile,
    /// General information.
    Info,
    /// Something was skipped or looked wrong but work continues.
    Warning,
    /// A component or operation failed.
    Failed,
    /// A component or operation completed.
    Done,
}

impl Phase {
    /// Lowercase label for display.
    pub fn label(self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::Download => "download",
            Self::Process => "process",
            Self::Firmware => "firmware",
            Self::Package => "package",
            Self::Reconcile => "reconcile",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Failed => "failed",
            Self::Done => "done",
        }
    }
}

/// One progress message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Component the event concerns, if any.
    pub component_id: Option<String>,
    /// Pipeline stage.
    pub phase: Phase,
    /// Human-readable text.
    pub message: String,
}

impl ProgressEvent {
    /// An event about one component.
    pub fn component(id: &str, phase: Phase, message: impl Into<String>) -> Self {
        Self {
            component_id: Some(id.to_string()),
            phase,
            message: message.into(),
        }
    }

    /// An event about the whole operation.
    pub fn global(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            component_id: None,
            phase,
            message: message.into(),
        }
    }
}

/// Sink for progress events.
pub trait Reporter: Send + Sync {
    /// Deliver one event.
    fn report(&self, event: ProgressEvent);

    /// Report progress on a component.
    fn step(&self, id: &str, phase: Phase, msg: &str) {
        self.report(ProgressEvent::component(id, phase, msg));
    }

    /// Log an informational message.
    fn info(&self, msg: &str) {
        self.report(ProgressEvent::global(Phase::Info, msg));
    }

    /// Log a warning, optionally tied to a component.
    fn warning(&self, id: Option<&str>, msg: &str) {
        self.report(ProgressEvent {
            component_id: id.map(str::to_string),
            phase: Phase::Warning,
            message: msg.to_string(),
        });
    }

    /// Mark a component as failed with a specific reason.
    fn failed(&self, id: &str, reason: &str) {
        self.report(ProgressEvent::component(id, Phase::Failed, reason));
    }

    /// Mark a component as successfully completed.
    fn done(&self, id: &str, detail: &str) {
        self.report(ProgressEvent::component(id, Phase::Done, detail));
    }
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn report(&self, event: ProgressEvent) {
        (**self).report(event);
    }
}

impl<T: Reporter + ?Sized> Reporter for &T {
    fn report(&self, event: ProgressEvent) {
        (**self).report(event);
    }
}

/// A no-op reporter for silent operations (e.g., verification, testing).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&self, _: ProgressEvent) {}
}

/// Reporter that forwards events into an unbounded channel.
///
/// Clones share the same channel. Sends after the receiver is dropped are
/// silently discarded.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelReporter {
    /// Create a reporter and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Reporter for ChannelReporter {
    fn report(&self, event: ProgressEvent) {
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn channel_preserves_event_order_per_sender() {
        let (reporter, mut rx) = ChannelReporter::new();
        let shared = Arc::new(reporter);

        shared.step("a", Phase::Download, "start");
        shared.warning(Some("a"), "slow mirror");
        shared.done("a", "v1.0.0");
        drop(shared);

        let mut phases = Vec::new();
        while let Some(event) = rx.recv().await {
            assert_eq!(event.component_id.as_deref(), Some("a"));
            phases.push(event.phase);
        }
        assert_eq!(phases, vec![Phase::Download, Phase::Warning, Phase::Done]);
    }

    #[test]
    fn sending_after_receiver_drop_is_harmless() {
        let (reporter, rx) = ChannelReporter::new();
        drop(rx);
        reporter.info("nobody is listening");
    }
}
