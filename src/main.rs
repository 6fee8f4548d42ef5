mod config;
mod error;
mod quiz;

use std::{collections::HashMap, sync::Arc};

use dotenv::dotenv;
use quiz::{
    feedback,
    provider::{load_catalog, RestCountries},
    session::OptionView,
    spawn_session,
    store::{ChatScoreStore, ScoreStorage},
    Catalog, Event, Mode, Outcome, RegionFilter, Session, SessionHandle, SessionSettings,
    Snapshot, Transition,
};
use rand::{rngs::StdRng, SeedableRng};
use teloxide::{
    dispatching::dialogue::{serializer::Json, SqliteStorage, Storage},
    prelude::*,
    types::{InputFile, KeyboardButton, KeyboardMarkup, KeyboardRemove, MessageId},
    utils::command::BotCommands,
};
use tokio::sync::{mpsc, Mutex};

use crate::config::Config;

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type Sessions = Arc<Mutex<HashMap<ChatId, SessionHandle>>>;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Guess the country from its flag!")]
enum Command {
    #[command(description = "show this text")]
    Help,
    #[command(description = "start a new game")]
    Start,
    #[command(description = "start over with score and hints reset")]
    Restart,
    #[command(description = "list the regions you can play")]
    Regions,
    #[command(description = "only show flags from one region, e.g. /region Europe")]
    Region(String),
    #[command(description = "answer against the clock")]
    Timed,
    #[command(description = "answer without a clock")]
    Normal,
    #[command(description = "eliminate two wrong answers")]
    Hint,
    #[command(description = "show the next flag")]
    Next,
}

const HINT_BUTTON: &str = "💡 Hint";
const NEXT_BUTTON: &str = "Next flag ➡️";
const RESTART_BUTTON: &str = "🔄 Restart";
const ELIMINATED_MARK: &str = "✖";

/// State shared by every chat: the catalog (if it loaded), the high score
/// storage and the running sessions.
struct QuizBot {
    catalog: Option<Arc<Catalog>>,
    scores: ScoreStorage,
    settings: SessionSettings,
    sessions: Sessions,
}

impl QuizBot {
    /// Returns the chat's session, spawning it (and its renderer) on first use.
    /// The flag is `true` when the session was just created.
    async fn session(
        &self,
        bot: &Bot,
        chat_id: ChatId,
        catalog: Arc<Catalog>,
    ) -> error::Result<(SessionHandle, bool)> {
        let mut sessions = self.sessions.lock().await;
        if let Some(handle) = sessions.get(&chat_id) {
            if !handle.is_closed() {
                return Ok((handle.clone(), false));
            }
        }

        let store = ChatScoreStore::load(self.scores.clone(), chat_id).await?;
        let session = Session::new(catalog, store, StdRng::from_entropy(), self.settings);
        let (handle, snapshots) = spawn_session(session);
        tokio::spawn(render_snapshots(
            bot.clone(),
            chat_id,
            snapshots,
            self.sessions.clone(),
        ));
        sessions.insert(chat_id, handle.clone());
        log::info!("Spawned quiz session for chat {}", chat_id.0);

        Ok((handle, true))
    }

    async fn dispatch(&self, bot: &Bot, chat_id: ChatId, event: Event) -> HandlerResult {
        let Some(catalog) = self.catalog.clone() else {
            bot.send_message(chat_id, feedback::FETCH_FAILED).await?;
            return Ok(());
        };

        let (handle, created) = self.session(bot, chat_id, catalog).await?;
        // A brand new session has no question yet, so anything that is not a
        // (re)start just starts the game.
        let event = if created && !starts_game(&event) {
            Event::Start
        } else {
            event
        };
        handle.send(event)?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The .env file is optional, real environment variables work too
    dotenv().ok();

    pretty_env_logger::init();
    log::info!("Starting flag quiz bot...");

    let config = Config::from_env()?;
    let bot = Bot::from_env();

    let scores: ScoreStorage = SqliteStorage::open(&config.score_db, Json)
        .await
        .map_err(|e| error::QuizError::Store(e.to_string()))?
        .erase();
    log::info!("High scores are kept in {}", config.score_db);

    log::info!("{}", feedback::LOADING);
    let catalog = match load_catalog(&RestCountries::new(config.api_url.clone())).await {
        Ok(catalog) => {
            log::info!("Successfully loaded {} countries.", catalog.len());
            Some(Arc::new(catalog))
        }
        Err(err) => {
            log::error!("{}", err);
            None
        }
    };

    if let Err(err) = bot.set_my_commands(Command::bot_commands()).await {
        log::warn!("Could not register bot commands: {}", err);
    }

    let quiz = Arc::new(QuizBot {
        catalog,
        scores,
        settings: config.session_settings(),
        sessions: Arc::new(Mutex::new(HashMap::new())),
    });

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .branch(
                dptree::entry()
                    .filter_command::<Command>()
                    .endpoint(handle_command),
            )
            .branch(dptree::endpoint(handle_text)),
    )
    .dependencies(dptree::deps![quiz])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;

    Ok(())
}

async fn handle_command(bot: Bot, msg: Message, cmd: Command, quiz: Arc<QuizBot>) -> HandlerResult {
    let event = match cmd {
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string())
                .await?;
            return Ok(());
        }
        Command::Regions => {
            let text = match &quiz.catalog {
                Some(catalog) => regions_text(catalog),
                None => feedback::FETCH_FAILED.to_string(),
            };
            bot.send_message(msg.chat.id, text).await?;
            return Ok(());
        }
        Command::Start | Command::Restart => Event::Restart,
        Command::Region(name) => match &quiz.catalog {
            Some(catalog) => Event::SelectRegion(RegionFilter::parse(&name, catalog)),
            None => Event::Restart,
        },
        Command::Timed => Event::SetMode(Mode::Timed),
        Command::Normal => Event::SetMode(Mode::Normal),
        Command::Hint => Event::UseHint,
        Command::Next => Event::Next,
    };

    quiz.dispatch(&bot, msg.chat.id, event).await
}

async fn handle_text(bot: Bot, msg: Message, quiz: Arc<QuizBot>) -> HandlerResult {
    let Some(text) = msg.text() else {
        bot.send_message(msg.chat.id, "Please answer with one of the buttons")
            .await?;
        return Ok(());
    };

    match event_from_text(text) {
        Some(event) => quiz.dispatch(&bot, msg.chat.id, event).await,
        // Eliminated options stay on the keyboard but cannot be picked
        None => Ok(()),
    }
}

fn starts_game(event: &Event) -> bool {
    matches!(
        event,
        Event::Start | Event::Restart | Event::SelectRegion(_) | Event::SetMode(_)
    )
}

fn event_from_text(text: &str) -> Option<Event> {
    match text.trim() {
        HINT_BUTTON => Some(Event::UseHint),
        NEXT_BUTTON => Some(Event::Next),
        RESTART_BUTTON => Some(Event::Restart),
        eliminated if eliminated.starts_with(ELIMINATED_MARK) => None,
        unknown_command if unknown_command.starts_with('/') => None,
        name => Some(Event::Answer(Some(name.to_string()))),
    }
}

async fn render_snapshots(
    bot: Bot,
    chat_id: ChatId,
    mut snapshots: mpsc::UnboundedReceiver<Snapshot>,
    sessions: Sessions,
) {
    // The countdown is one message, edited on every tick
    let mut countdown: Option<MessageId> = None;

    while let Some(snapshot) = snapshots.recv().await {
        if let Err(err) = render(&bot, chat_id, &snapshot, &mut countdown).await {
            log::warn!("Failed to render {:?} for chat {}: {}", snapshot.transition, chat_id.0, err);
        }
    }

    // The session has stopped (idle or closed); forget it unless a newer one
    // already took its place.
    let mut sessions = sessions.lock().await;
    if sessions.get(&chat_id).is_some_and(SessionHandle::is_closed) {
        sessions.remove(&chat_id);
        log::info!("Evicted quiz session for chat {}", chat_id.0);
    }
}

async fn render(
    bot: &Bot,
    chat_id: ChatId,
    snapshot: &Snapshot,
    countdown: &mut Option<MessageId>,
) -> HandlerResult {
    match snapshot.transition {
        Transition::Opened => {
            *countdown = None;
            let caption = format!("{}\n\n{}", snapshot.feedback, scoreboard(snapshot));
            match &snapshot.flag_raster_ref {
                Some(png) => {
                    bot.send_photo(chat_id, InputFile::url(png.parse()?))
                        .caption(caption)
                        .reply_markup(answer_keyboard(snapshot))
                        .await?;
                }
                None => {
                    let flag = snapshot.flag_image_ref.clone().unwrap_or_default();
                    bot.send_message(chat_id, format!("{}\n\n{}", flag, caption))
                        .reply_markup(answer_keyboard(snapshot))
                        .await?;
                }
            }

            if let Some(seconds) = snapshot.remaining_seconds {
                let sent = bot.send_message(chat_id, countdown_text(seconds)).await?;
                *countdown = Some(sent.id);
            }
        }
        Transition::Tick => {
            if let (Some(message_id), Some(seconds)) = (*countdown, snapshot.remaining_seconds) {
                bot.edit_message_text(chat_id, message_id, countdown_text(seconds))
                    .await?;
            }
        }
        Transition::HintUsed => {
            bot.send_message(
                chat_id,
                format!(
                    "💡 Two wrong answers are gone. Hints left: {}",
                    snapshot.hints_remaining
                ),
            )
            .reply_markup(answer_keyboard(snapshot))
            .await?;
        }
        Transition::Resolved => {
            if let Some(message_id) = countdown.take() {
                if snapshot.outcome == Some(Outcome::TimedOut) {
                    bot.edit_message_text(chat_id, message_id, countdown_text(0))
                        .await?;
                }
            }
            bot.send_message(chat_id, result_text(snapshot))
                .reply_markup(KeyboardMarkup::new(vec![vec![
                    KeyboardButton::new(NEXT_BUTTON),
                    KeyboardButton::new(RESTART_BUTTON),
                ]]))
                .await?;
        }
        Transition::Unplayable => {
            *countdown = None;
            bot.send_message(
                chat_id,
                format!(
                    "{}\nPick another region with /region, or see them all with /regions.",
                    snapshot.feedback
                ),
            )
            .reply_markup(KeyboardRemove::new())
            .await?;
        }
    }
    Ok(())
}

fn answer_keyboard(snapshot: &Snapshot) -> KeyboardMarkup {
    let mut rows: Vec<Vec<KeyboardButton>> = snapshot
        .options
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|option| KeyboardButton::new(option_label(option, snapshot.is_resolved())))
                .collect()
        })
        .collect();
    if snapshot.hint_available {
        rows.push(vec![KeyboardButton::new(HINT_BUTTON)]);
    }
    KeyboardMarkup::new(rows)
}

fn option_label(option: &OptionView, resolved: bool) -> String {
    if option.disabled(resolved) {
        format!("{} {}", ELIMINATED_MARK, option.name)
    } else {
        option.name.clone()
    }
}

fn scoreboard(snapshot: &Snapshot) -> String {
    format!(
        "Score: {} | Streak: {} | High score: {}\nHints: {} | Mode: {} | Region: {}",
        snapshot.score,
        snapshot.streak,
        snapshot.high_score,
        snapshot.hints_remaining,
        snapshot.mode.label(),
        snapshot.region
    )
}

fn countdown_text(seconds: u32) -> String {
    format!("⏳ {}s", seconds)
}

fn result_text(snapshot: &Snapshot) -> String {
    let options = snapshot
        .options
        .iter()
        .map(|option| {
            let mark = if option.correct {
                "✅"
            } else if option.chosen {
                "❌"
            } else {
                "▫️"
            };
            format!("{} {}", mark, option.name)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!("{}\n\n{}\n\n{}", snapshot.feedback, options, scoreboard(snapshot))
}

fn regions_text(catalog: &Catalog) -> String {
    let mut regions = vec![quiz::catalog::WORLDWIDE.to_string()];
    regions.extend(catalog.regions());
    format!("Regions you can play:\n{}", regions.join("\n"))
}
