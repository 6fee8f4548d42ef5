use rand::Rng;
use tokio::sync::mpsc;
use tokio::time;

use crate::error::{QuizError, Result};
use crate::quiz::session::{Event, Session, Snapshot};
use crate::quiz::store::ScoreStore;
use crate::quiz::timer::Ticker;

/// Boundary-facing handle to a running session.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<Event>,
}

impl SessionHandle {
    pub fn send(&self, event: Event) -> Result<()> {
        self.events.send(event).map_err(|_| QuizError::SessionClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

/// Runs `session` on its own task. Boundary events and timer ticks share one
/// channel and are handled in the order they were sent.
///
/// Snapshots are published on the returned receiver. The task ends once
/// every [`SessionHandle`] is dropped, the receiver is closed, or no event
/// arrives for [`SessionSettings::idle_timeout`](crate::quiz::SessionSettings).
pub fn spawn_session<S, R>(mut session: Session<S, R>) -> (SessionHandle, mpsc::UnboundedReceiver<Snapshot>)
where
    S: ScoreStore + Send + 'static,
    R: Rng + Send + 'static,
{
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
    let ticks = event_tx.downgrade();
    let period = session.settings().tick_period;
    let idle_timeout = session.settings().idle_timeout;

    tokio::spawn(async move {
        let mut ticker: Option<Ticker> = None;

        loop {
            let event = match time::timeout(idle_timeout, event_rx.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(_) => {
                    log::debug!("Quiz session idle for {:?}, stopping", idle_timeout);
                    break;
                }
            };

            let Some(snapshot) = session.handle(event) else {
                continue;
            };

            match session.ticking_question() {
                Some(id) if ticker.as_ref().map(Ticker::question) == Some(id) => {}
                Some(id) => ticker = Some(Ticker::spawn(id, period, ticks.clone())),
                None => {
                    if let Some(stale) = ticker.take() {
                        stale.cancel();
                    }
                }
            }

            if snapshot_tx.send(snapshot).is_err() {
                log::debug!("Snapshot receiver dropped, stopping session");
                break;
            }
        }

        // Close the event side first so a renderer that sees the snapshot
        // channel end also sees the handle as closed.
        drop(event_rx);
        log::debug!("Quiz session stopped");
    });

    (SessionHandle { events: event_tx }, snapshot_rx)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::quiz::catalog::tests::sample_catalog;
    use crate::quiz::session::{Mode, Outcome, SessionSettings, Transition};
    use crate::quiz::store::MemoryStore;
    use crate::quiz::TIME_LIMIT;

    fn spawn() -> (SessionHandle, mpsc::UnboundedReceiver<Snapshot>) {
        spawn_with(99, SessionSettings::default())
    }

    fn spawn_with(seed: u64, settings: SessionSettings) -> (SessionHandle, mpsc::UnboundedReceiver<Snapshot>) {
        spawn_session(Session::new(
            Arc::new(sample_catalog()),
            MemoryStore::default(),
            StdRng::seed_from_u64(seed),
            settings,
        ))
    }

    fn one_second_limit() -> SessionSettings {
        SessionSettings {
            time_limit: 1,
            ..SessionSettings::default()
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Snapshot>) -> Vec<Snapshot> {
        let mut out = Vec::new();
        while let Ok(snapshot) = rx.try_recv() {
            out.push(snapshot);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_timed_question_times_out_once() {
        let (handle, mut rx) = spawn();
        handle.send(Event::SetMode(Mode::Timed)).unwrap();

        time::sleep(Duration::from_secs(u64::from(TIME_LIMIT) + 5)).await;
        let snapshots = drain(&mut rx);

        assert_eq!(snapshots[0].transition, Transition::Opened);
        assert_eq!(snapshots[0].remaining_seconds, Some(TIME_LIMIT));
        let ticks: Vec<u32> = snapshots
            .iter()
            .filter(|s| s.transition == Transition::Tick)
            .filter_map(|s| s.remaining_seconds)
            .collect();
        assert_eq!(ticks, (1..TIME_LIMIT).rev().collect::<Vec<_>>());

        let resolved: Vec<&Snapshot> = snapshots.iter().filter(|s| s.is_resolved()).collect();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].outcome, Some(Outcome::TimedOut));
        assert_eq!(resolved[0].streak, 0);
        assert_eq!(snapshots.last().unwrap().transition, Transition::Resolved);
    }

    #[tokio::test(start_paused = true)]
    async fn answering_cancels_the_countdown() {
        let (handle, mut rx) = spawn();
        handle.send(Event::SetMode(Mode::Timed)).unwrap();
        time::sleep(Duration::from_millis(3500)).await;

        let opened = drain(&mut rx);
        let option = opened[0].options[0].name.clone();
        handle.send(Event::Answer(Some(option))).unwrap();

        time::sleep(Duration::from_secs(30)).await;
        let after = drain(&mut rx);
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].transition, Transition::Resolved);
        assert_ne!(after[0].outcome, Some(Outcome::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn next_question_gets_a_fresh_countdown() {
        let (handle, mut rx) = spawn();
        handle.send(Event::SetMode(Mode::Timed)).unwrap();
        time::sleep(Duration::from_millis(2500)).await;
        handle.send(Event::Answer(None)).unwrap();
        handle.send(Event::Next).unwrap();
        time::sleep(Duration::from_millis(1500)).await;

        let snapshots = drain(&mut rx);
        let opened: Vec<&Snapshot> = snapshots
            .iter()
            .filter(|s| s.transition == Transition::Opened)
            .collect();
        assert_eq!(opened.len(), 2);
        assert_ne!(opened[0].question, opened[1].question);
        let last = snapshots.last().unwrap();
        assert_eq!(last.transition, Transition::Tick);
        assert_eq!(last.question, opened[1].question);
        assert_eq!(last.remaining_seconds, Some(TIME_LIMIT - 1));
    }

    #[tokio::test]
    async fn dropping_the_handle_stops_the_session() {
        let (handle, mut rx) = spawn();
        handle.send(Event::Start).unwrap();
        drop(handle);

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn answer_sent_just_before_the_deadline_wins() {
        for seed in 0..40 {
            let (handle, mut rx) = spawn_with(seed, one_second_limit());
            handle.send(Event::SetMode(Mode::Timed)).unwrap();
            let opened = rx.recv().await.unwrap();
            assert_eq!(opened.remaining_seconds, Some(1));

            time::sleep(Duration::from_micros(999_500)).await;
            handle
                .send(Event::Answer(Some(opened.options[0].name.clone())))
                .unwrap();
            time::sleep(Duration::from_secs(3)).await;

            let after = drain(&mut rx);
            assert_eq!(after.len(), 1, "seed {}", seed);
            assert_eq!(after[0].transition, Transition::Resolved);
            assert_ne!(after[0].outcome, Some(Outcome::TimedOut), "seed {}", seed);
        }
    }

    #[tokio::test]
    async fn events_are_handled_in_the_order_they_were_sent() {
        for seed in 0..40 {
            let (handle, mut rx) = spawn_with(seed, one_second_limit());
            handle.send(Event::SetMode(Mode::Timed)).unwrap();
            let opened = rx.recv().await.unwrap();
            let question = opened.question.unwrap();

            // Both queued before the session gets to run again.
            handle
                .send(Event::Answer(Some(opened.options[0].name.clone())))
                .unwrap();
            handle.send(Event::Tick { question }).unwrap();
            drop(handle);

            let resolved = rx.recv().await.unwrap();
            assert_ne!(resolved.outcome, Some(Outcome::TimedOut), "seed {}", seed);
            assert!(rx.recv().await.is_none());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_stop() {
        let settings = SessionSettings {
            idle_timeout: Duration::from_secs(60),
            ..SessionSettings::default()
        };
        let (handle, mut rx) = spawn_with(1, settings);
        handle.send(Event::Start).unwrap();
        assert!(rx.recv().await.is_some());

        time::sleep(Duration::from_secs(61)).await;
        assert!(rx.recv().await.is_none());
        assert!(handle.is_closed());
        assert!(matches!(handle.send(Event::Next), Err(QuizError::SessionClosed)));
    }
}
