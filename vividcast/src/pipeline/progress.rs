//! Progress reporting channel between pipeline runs and the scheduler.

use tokio::sync::mpsc;

/// Sender half handed to the pipeline collaborator.
///
/// Values are clamped to 0-100; sends after the receiver is gone are
/// silently dropped, so a pipeline that keeps reporting after cancellation
/// does no harm.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<i64>,
}

impl ProgressSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<i64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report progress as a 0-100 percentage.
    pub fn report(&self, percent: i64) {
        let _ = self.tx.send(percent.clamp(0, 100));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_report_clamps() {
        let (sender, mut rx) = ProgressSender::channel();
        sender.report(-5);
        sender.report(42);
        sender.report(250);
        drop(sender);

        let mut seen = Vec::new();
        while let Some(pct) = rx.recv().await {
            seen.push(pct);
        }
        assert_eq!(seen, vec![0, 42, 100]);
    }
}
