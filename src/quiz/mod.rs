pub mod catalog;
pub mod feedback;
pub mod provider;
pub mod question;
pub mod runtime;
pub mod session;
pub mod store;
pub mod timer;

pub use catalog::{Catalog, RegionFilter};
pub use runtime::{spawn_session, SessionHandle};
pub use session::{Event, Mode, Outcome, Session, SessionSettings, Snapshot, Transition};

/// Seconds per question in timed mode.
pub const TIME_LIMIT: u32 = 10;
/// Hints granted per game.
pub const HINT_COUNT: u32 = 3;
/// Key the high score is persisted under.
pub const HIGH_SCORE_KEY: &str = "flagGuesserHighScore";
/// Options offered per question.
pub const OPTION_COUNT: usize = 4;
/// Wrong options a hint eliminates.
pub const HINT_ELIMINATES: usize = 2;
