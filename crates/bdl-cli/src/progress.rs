//! Running download counter on stderr

use bdl_core::ExecutorEvent;
use colored::Colorize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Prints executor events as they arrive.
///
/// Dropping every sender ends the printer; await [`Progress::finish`] to
/// flush the last lines before printing a summary.
pub struct Progress {
    sender: mpsc::UnboundedSender<ExecutorEvent>,
    printer: JoinHandle<()>,
}

impl Progress {
    pub fn start(repository: String) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let printer = tokio::spawn(async move {
            let mut counter = Counter::default();
            while let Some(event) = receiver.recv().await {
                if let Some(line) = counter.apply(&event) {
                    eprintln!("   {} {}", repository.dimmed(), line);
                }
            }
        });
        Self { sender, printer }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<ExecutorEvent> {
        self.sender.clone()
    }

    pub async fn finish(self) {
        drop(self.sender);
        // A panicking printer only loses progress lines
        let _ = self.printer.await;
    }
}

#[derive(Debug, Default)]
struct Counter {
    total: usize,
    done: usize,
}

impl Counter {
    /// Update the counts and render a line for finished or failed items.
    fn apply(&mut self, event: &ExecutorEvent) -> Option<String> {
        match event {
            ExecutorEvent::Queued { total } => {
                self.total = *total;
                None
            }
            ExecutorEvent::Started { .. } => None,
            ExecutorEvent::Finished { filename, .. } => {
                self.done += 1;
                Some(format!("[{}/{}] {}", self.done, self.total, filename))
            }
            ExecutorEvent::Failed {
                remote_id, cause, ..
            } => {
                self.done += 1;
                Some(format!(
                    "[{}/{}] {} {}: {}",
                    self.done,
                    self.total,
                    "failed".red(),
                    remote_id,
                    cause
                ))
            }
        }
    }
}
