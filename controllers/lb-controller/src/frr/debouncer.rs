//! Collapses bursts of change signals into single reload triggers.

use crate::trigger::{ReconcileTrigger, TriggerSender};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Emits one `Reload` on `output` per burst of signals on `input`.
///
/// The first signal of a burst arms a timer of `interval`; signals arriving
/// while it is armed are absorbed. Returns when `input` closes, `output`
/// closes or `cancel` fires.
pub async fn debounce(
    mut input: mpsc::UnboundedReceiver<()>,
    output: TriggerSender,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut deadline: Option<Instant> = None;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Debouncer cancelled");
                return;
            }
            signal = input.recv() => {
                if signal.is_none() {
                    debug!("Debouncer input closed");
                    return;
                }
                if deadline.is_none() {
                    deadline = Some(Instant::now() + interval);
                }
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                if output.send(ReconcileTrigger::Reload).await.is_err() {
                    debug!("Debouncer output closed");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::trigger_channel;
    use tokio::time::timeout;

    const INTERVAL: Duration = Duration::from_secs(3);

    #[tokio::test(start_paused = true)]
    async fn test_burst_emits_single_reload() {
        let (signals, input) = mpsc::unbounded_channel();
        let (output, mut triggers) = trigger_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(debounce(input, output, INTERVAL, cancel.clone()));

        let start = Instant::now();
        for _ in 0..10 {
            signals.send(()).expect("send");
        }

        assert_eq!(triggers.recv().await, Some(ReconcileTrigger::Reload));
        assert!(start.elapsed() >= INTERVAL);
        assert!(
            timeout(INTERVAL * 2, triggers.recv()).await.is_err(),
            "a burst produces exactly one reload"
        );

        cancel.cancel();
        task.await.expect("debouncer exits");
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_after_fire_arms_again() {
        let (signals, input) = mpsc::unbounded_channel();
        let (output, mut triggers) = trigger_channel();
        tokio::spawn(debounce(input, output, INTERVAL, CancellationToken::new()));

        signals.send(()).expect("send");
        assert_eq!(triggers.recv().await, Some(ReconcileTrigger::Reload));
        signals.send(()).expect("send");
        assert_eq!(triggers.recv().await, Some(ReconcileTrigger::Reload));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_input_stops_debouncer() {
        let (signals, input) = mpsc::unbounded_channel::<()>();
        let (output, _triggers) = trigger_channel();
        let task = tokio::spawn(debounce(input, output, INTERVAL, CancellationToken::new()));

        drop(signals);
        task.await.expect("debouncer exits");
    }
}
