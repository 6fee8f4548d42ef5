use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::quiz::catalog::{ActiveSet, Catalog, RegionFilter};
use crate::quiz::feedback;
use crate::quiz::question::{next_question, Question};
use crate::quiz::store::ScoreStore;
use crate::quiz::timer::{Countdown, TickOutcome};
use crate::quiz::{HIGH_SCORE_KEY, HINT_COUNT, HINT_ELIMINATES, TIME_LIMIT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub time_limit: u32,
    pub hint_count: u32,
    pub tick_period: Duration,
    /// A session with no events for this long shuts down.
    pub idle_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            time_limit: TIME_LIMIT,
            hint_count: HINT_COUNT,
            tick_period: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Normal,
    Timed,
}

impl Mode {
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Normal => "Normal",
            Mode::Timed => "Timed",
        }
    }
}

/// Boundary input, plus the timer's own tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start,
    Restart,
    SelectRegion(RegionFilter),
    SetMode(Mode),
    /// `None` is a forced submission (timeout).
    Answer(Option<String>),
    UseHint,
    Next,
    Tick { question: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Correct,
    Incorrect,
    TimedOut,
}

/// What caused a snapshot to be emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Opened,
    HintUsed,
    Tick,
    Resolved,
    Unplayable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionView {
    pub name: String,
    pub eliminated: bool,
    /// Picked by the player. Only set once resolved.
    pub chosen: bool,
    /// The right answer. Only set once resolved.
    pub correct: bool,
}

impl OptionView {
    pub fn disabled(&self, resolved: bool) -> bool {
        resolved || self.eliminated
    }
}

/// Everything the presentation layer needs to render the current state.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub transition: Transition,
    pub question: Option<u64>,
    pub flag_image_ref: Option<String>,
    pub flag_raster_ref: Option<String>,
    pub options: Vec<OptionView>,
    pub feedback: String,
    pub fun_fact: Option<String>,
    pub outcome: Option<Outcome>,
    pub score: u32,
    pub streak: u32,
    pub high_score: u32,
    pub hints_remaining: u32,
    pub hint_available: bool,
    pub mode: Mode,
    pub region: String,
    pub remaining_seconds: Option<u32>,
}

impl Snapshot {
    pub fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }
}

#[derive(Debug)]
struct OpenQuestion {
    id: u64,
    question: Question,
    eliminated: Vec<String>,
    hint_used: bool,
    countdown: Option<Countdown>,
}

#[derive(Debug)]
struct Resolution {
    id: u64,
    question: Question,
    eliminated: Vec<String>,
    chosen: Option<String>,
    outcome: Outcome,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Unplayable { message: String },
    Open(OpenQuestion),
    Resolved(Resolution),
}

/// The quiz state machine. Owns the counters and the current question;
/// every change goes through [`Session::handle`].
pub struct Session<S, R> {
    catalog: Arc<Catalog>,
    store: S,
    rng: R,
    settings: SessionSettings,
    region: RegionFilter,
    mode: Mode,
    active: Option<ActiveSet>,
    score: u32,
    streak: u32,
    high_score: u32,
    hints_remaining: u32,
    phase: Phase,
    last_question_id: u64,
}

impl<S: ScoreStore, R: Rng> Session<S, R> {
    pub fn new(catalog: Arc<Catalog>, store: S, rng: R, settings: SessionSettings) -> Self {
        let high_score = store.get(HIGH_SCORE_KEY).unwrap_or(0);
        Self {
            catalog,
            store,
            rng,
            settings,
            region: RegionFilter::Worldwide,
            mode: Mode::Normal,
            active: None,
            score: 0,
            streak: 0,
            high_score,
            hints_remaining: settings.hint_count,
            phase: Phase::Idle,
            last_question_id: 0,
        }
    }

    /// Applies one event. Returns `None` when the event does not apply to the
    /// current phase and was ignored.
    pub fn handle(&mut self, event: Event) -> Option<Snapshot> {
        match event {
            Event::Start | Event::Restart => self.restart(),
            Event::SelectRegion(region) => {
                log::info!("Region changed to {}", region);
                self.region = region;
                self.restart()
            }
            Event::SetMode(mode) => {
                log::info!("Mode changed to {}", mode.label());
                self.mode = mode;
                self.restart()
            }
            Event::Answer(selection) => self.answer(selection),
            Event::UseHint => self.use_hint(),
            Event::Next => self.next(),
            Event::Tick { question } => self.tick(question),
        }
    }

    fn restart(&mut self) -> Option<Snapshot> {
        self.score = 0;
        self.streak = 0;
        self.hints_remaining = self.settings.hint_count;
        let stored = self.store.get(HIGH_SCORE_KEY).unwrap_or(0);
        self.high_score = self.high_score.max(stored);

        match self.catalog.active_set(&self.region) {
            Ok(active) => {
                log::debug!(
                    "Starting game with {} countries from {}",
                    active.len(),
                    self.region
                );
                self.active = Some(active);
                self.open_question()
            }
            Err(err) => {
                log::warn!("{}", err);
                self.active = None;
                self.phase = Phase::Unplayable {
                    message: err.to_string(),
                };
                Some(self.snapshot(Transition::Unplayable))
            }
        }
    }

    fn open_question(&mut self) -> Option<Snapshot> {
        let active = self.active.as_ref()?;
        let question = next_question(active, &mut self.rng);
        self.last_question_id += 1;
        log::debug!(
            "Question {} opened: {} options",
            self.last_question_id,
            question.options.len()
        );

        let countdown = match self.mode {
            Mode::Timed => Some(Countdown::start(self.settings.time_limit)),
            Mode::Normal => None,
        };
        self.phase = Phase::Open(OpenQuestion {
            id: self.last_question_id,
            question,
            eliminated: Vec::new(),
            hint_used: false,
            countdown,
        });
        Some(self.snapshot(Transition::Opened))
    }

    fn answer(&mut self, selection: Option<String>) -> Option<Snapshot> {
        let mut open = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Open(open) => open,
            other => {
                self.phase = other;
                log::debug!("Ignoring answer outside an open question");
                return None;
            }
        };
        if let Some(countdown) = open.countdown.as_mut() {
            countdown.stop();
        }

        let outcome = match &selection {
            Some(name) if open.question.is_correct(name) => Outcome::Correct,
            Some(_) => Outcome::Incorrect,
            None => Outcome::TimedOut,
        };
        log::debug!("Question {} resolved: {:?}", open.id, outcome);

        if outcome == Outcome::Correct {
            self.score += 1;
            self.streak += 1;
            if self.score > self.high_score {
                self.high_score = self.score;
                if let Err(err) = self.store.set(HIGH_SCORE_KEY, self.high_score) {
                    log::warn!("Could not persist high score: {}", err);
                }
            }
        } else {
            self.streak = 0;
        }

        self.phase = Phase::Resolved(Resolution {
            id: open.id,
            question: open.question,
            eliminated: open.eliminated,
            chosen: selection,
            outcome,
        });
        Some(self.snapshot(Transition::Resolved))
    }

    fn next(&mut self) -> Option<Snapshot> {
        if !matches!(self.phase, Phase::Resolved(_)) {
            log::debug!("Ignoring next outside a resolved question");
            return None;
        }
        self.open_question()
    }

    fn use_hint(&mut self) -> Option<Snapshot> {
        let Phase::Open(open) = &mut self.phase else {
            return None;
        };
        if self.hints_remaining == 0 || open.hint_used {
            return None;
        }

        self.hints_remaining -= 1;
        open.hint_used = true;

        let mut wrong: Vec<String> = open
            .question
            .incorrect_options()
            .map(|o| o.name.clone())
            .collect();
        wrong.shuffle(&mut self.rng);
        open.eliminated = wrong.into_iter().take(HINT_ELIMINATES).collect();

        Some(self.snapshot(Transition::HintUsed))
    }

    fn tick(&mut self, question: u64) -> Option<Snapshot> {
        let Phase::Open(open) = &mut self.phase else {
            log::debug!("Dropping stale tick for question {}", question);
            return None;
        };
        if open.id != question {
            log::debug!("Dropping stale tick for question {}", question);
            return None;
        }

        let countdown = open.countdown.as_mut()?;
        let outcome = countdown.tick()?;
        match outcome {
            TickOutcome::Remaining(_) => Some(self.snapshot(Transition::Tick)),
            TickOutcome::Expired => self.answer(None),
        }
    }

    /// Id of the open question whose countdown is running, if any.
    pub fn ticking_question(&self) -> Option<u64> {
        match &self.phase {
            Phase::Open(open) if open.countdown.is_some_and(|c| c.is_active()) => Some(open.id),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn current_question(&self) -> Option<&Question> {
        match &self.phase {
            Phase::Open(open) => Some(&open.question),
            Phase::Resolved(resolution) => Some(&resolution.question),
            Phase::Idle | Phase::Unplayable { .. } => None,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    #[cfg(test)]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[cfg(test)]
    pub fn hints_remaining(&self) -> u32 {
        self.hints_remaining
    }

    fn snapshot(&self, transition: Transition) -> Snapshot {
        let mut snapshot = Snapshot {
            transition,
            question: None,
            flag_image_ref: None,
            flag_raster_ref: None,
            options: Vec::new(),
            feedback: String::new(),
            fun_fact: None,
            outcome: None,
            score: self.score,
            streak: self.streak,
            high_score: self.high_score,
            hints_remaining: self.hints_remaining,
            hint_available: false,
            mode: self.mode,
            region: self.region.to_string(),
            remaining_seconds: None,
        };

        match &self.phase {
            Phase::Idle => snapshot.feedback = feedback::LOADING.to_string(),
            Phase::Unplayable { message } => snapshot.feedback = message.clone(),
            Phase::Open(open) => {
                snapshot.question = Some(open.id);
                snapshot.flag_image_ref = Some(open.question.correct.flag_image_ref.clone());
                snapshot.flag_raster_ref = open.question.correct.flag_raster_ref.clone();
                snapshot.options = open
                    .question
                    .options
                    .iter()
                    .map(|o| OptionView {
                        name: o.name.clone(),
                        eliminated: open.eliminated.contains(&o.name),
                        chosen: false,
                        correct: false,
                    })
                    .collect();
                snapshot.feedback = feedback::PROMPT.to_string();
                snapshot.hint_available = self.hints_remaining > 0 && !open.hint_used;
                snapshot.remaining_seconds = open.countdown.map(|c| c.remaining());
            }
            Phase::Resolved(resolution) => {
                let question = &resolution.question;
                snapshot.question = Some(resolution.id);
                snapshot.flag_image_ref = Some(question.correct.flag_image_ref.clone());
                snapshot.flag_raster_ref = question.correct.flag_raster_ref.clone();
                snapshot.options = question
                    .options
                    .iter()
                    .map(|o| OptionView {
                        name: o.name.clone(),
                        eliminated: resolution.eliminated.contains(&o.name),
                        chosen: resolution.chosen.as_deref() == Some(o.name.as_str()),
                        correct: question.is_correct(&o.name),
                    })
                    .collect();
                let fun_fact = feedback::fun_fact(&question.correct);
                snapshot.feedback = format!(
                    "{}\n{}",
                    feedback::outcome_message(resolution.outcome, &question.correct),
                    fun_fact
                );
                snapshot.fun_fact = Some(fun_fact);
                snapshot.outcome = Some(resolution.outcome);
            }
        }

        snapshot
    }
}
