use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::quiz::session::Event;

/// Per-question countdown state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    remaining: u32,
    active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Remaining(u32),
    Expired,
}

impl Countdown {
    pub fn start(limit: u32) -> Self {
        Self {
            remaining: limit,
            active: true,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    /// Counts one second down. Returns `None` once stopped, so expiry is
    /// reported exactly once.
    pub fn tick(&mut self) -> Option<TickOutcome> {
        if !self.active {
            return None;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.active = false;
            return Some(TickOutcome::Expired);
        }
        Some(TickOutcome::Remaining(self.remaining))
    }
}

/// Background task sending [`Event::Tick`] into the session's own event
/// channel once per `period`, so ticks queue behind earlier events.
///
/// Only a weak sender is held: the ticker never keeps a session alive.
/// Dropping or cancelling the ticker aborts the task. Ticks already queued
/// carry the question id so the session can reject them as stale.
#[derive(Debug)]
pub struct Ticker {
    question: u64,
    task: JoinHandle<()>,
}

impl Ticker {
    pub fn spawn(
        question: u64,
        period: Duration,
        events: mpsc::WeakUnboundedSender<Event>,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                let Some(events) = events.upgrade() else {
                    break;
                };
                if events.send(Event::Tick { question }).is_err() {
                    break;
                }
            }
        });
        Self { question, task }
    }

    pub fn question(&self) -> u64 {
        self.question
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_expires_exactly_once() {
        let mut countdown = Countdown::start(3);
        assert_eq!(countdown.tick(), Some(TickOutcome::Remaining(2)));
        assert_eq!(countdown.tick(), Some(TickOutcome::Remaining(1)));
        assert_eq!(countdown.tick(), Some(TickOutcome::Expired));
        assert!(!countdown.is_active());
        assert_eq!(countdown.tick(), None);
        assert_eq!(countdown.remaining(), 0);
    }

    #[test]
    fn stopped_countdown_ignores_ticks() {
        let mut countdown = Countdown::start(10);
        countdown.stop();
        assert_eq!(countdown.tick(), None);
        assert_eq!(countdown.remaining(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_sends_once_per_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ticker = Ticker::spawn(7, Duration::from_secs(1), tx.downgrade());

        time::sleep(Duration::from_millis(3500)).await;
        let mut received = Vec::new();
        while let Ok(event) = rx.try_recv() {
            received.push(event);
        }
        assert_eq!(received, vec![Event::Tick { question: 7 }; 3]);
        assert_eq!(ticker.question(), 7);
        ticker.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_ticker_stays_silent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ticker = Ticker::spawn(1, Duration::from_secs(1), tx.downgrade());
        ticker.cancel();

        time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_does_not_keep_the_channel_open() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let ticker = Ticker::spawn(1, Duration::from_secs(1), tx.downgrade());
        drop(tx);

        time::sleep(Duration::from_secs(2)).await;
        assert!(rx.recv().await.is_none());
        ticker.cancel();
    }
}
