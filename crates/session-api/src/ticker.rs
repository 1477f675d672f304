use std::sync::Arc;
use std::time::Duration;

use session_core::TimerClock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::Clock;

/// Background task publishing the elapsed-seconds display once per interval.
/// Stops when frozen or dropped.
#[derive(Debug)]
pub struct Ticker {
    handle: JoinHandle<()>,
    tx: Arc<watch::Sender<u64>>,
    timer: TimerClock,
}

impl Ticker {
    /// Must be called from inside a tokio runtime.
    pub fn spawn(timer: TimerClock, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        let (tx, _) = watch::channel(timer.elapsed_seconds(clock.now_ms()));
        let tx = Arc::new(tx);

        let task_tx = Arc::clone(&tx);
        let task_timer = timer.clone();
        let handle = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                task_tx.send_replace(task_timer.elapsed_seconds(clock.now_ms()));
            }
        });

        Self { handle, tx, timer }
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Stops the task and pins the display to the frozen value.
    pub fn freeze(&mut self, completed_at: u64) {
        self.handle.abort();
        self.timer.freeze(completed_at);
        self.tx.send_replace(self.timer.elapsed_seconds(completed_at));
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn running_timer(created_at: u64, initial: u64) -> TimerClock {
        let mut timer = TimerClock::new(created_at, initial);
        timer.start();
        timer
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_elapsed_each_interval() {
        let clock = Arc::new(ManualClock::new(10_000));
        let ticker = Ticker::spawn(
            running_timer(10_000, 10),
            clock.clone(),
            Duration::from_millis(1_000),
        );
        let mut rx = ticker.subscribe();
        assert_eq!(*rx.borrow(), 10);

        clock.advance(5_000);
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        rx.changed().await.expect("ticker alive");
        assert_eq!(*rx.borrow_and_update(), 15);
    }

    #[tokio::test(start_paused = true)]
    async fn freeze_stops_updates() {
        let clock = Arc::new(ManualClock::new(0));
        let mut ticker = Ticker::spawn(running_timer(0, 30), clock.clone(), Duration::from_secs(1));

        ticker.freeze(62_000);
        assert_eq!(ticker.current(), 62);

        clock.advance(600_000);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticker.current(), 62);
        assert!(ticker.is_finished());
    }
}
