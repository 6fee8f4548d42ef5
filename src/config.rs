use std::{env, str::FromStr, time::Duration};

use crate::error::{QuizError, Result};
use crate::quiz::{SessionSettings, HINT_COUNT, TIME_LIMIT};

pub const DEFAULT_API_URL: &str =
    "https://restcountries.com/v3.1/all?fields=name,flags,region,capital,population,subregion";
const DEFAULT_SCORE_DB: &str = "high_scores.sqlite";
const DEFAULT_IDLE_MINUTES: u64 = 30;

/// Bot configuration loaded from environment variables (and `.env`, if present).
///
/// `TELOXIDE_TOKEN` is read by teloxide itself, so it is not part of this struct.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    /// SQLite database holding each chat's high score.
    pub score_db: String,
    pub time_limit: u32,
    pub hint_count: u32,
    pub idle_minutes: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let time_limit = parse_or("FLAGS_TIME_LIMIT", lookup("FLAGS_TIME_LIMIT"), TIME_LIMIT)?;
        if time_limit == 0 {
            return Err(QuizError::Config(
                "FLAGS_TIME_LIMIT must be at least 1 second".to_string(),
            ));
        }

        Ok(Self {
            api_url: lookup("FLAGS_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            score_db: lookup("FLAGS_SCORE_DB").unwrap_or_else(|| DEFAULT_SCORE_DB.to_string()),
            time_limit,
            hint_count: parse_or("FLAGS_HINT_COUNT", lookup("FLAGS_HINT_COUNT"), HINT_COUNT)?,
            idle_minutes: parse_or(
                "FLAGS_IDLE_MINUTES",
                lookup("FLAGS_IDLE_MINUTES"),
                DEFAULT_IDLE_MINUTES,
            )?,
        })
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            time_limit: self.time_limit,
            hint_count: self.hint_count,
            idle_timeout: Duration::from_secs(self.idle_minutes * 60),
            ..SessionSettings::default()
        }
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| QuizError::Config(format!("{} must be a number, got {:?}", key, raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.score_db, "high_scores.sqlite");
        assert_eq!(config.time_limit, 10);
        assert_eq!(config.hint_count, 3);
        assert_eq!(config.session_settings().idle_timeout, Duration::from_secs(30 * 60));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("FLAGS_TIME_LIMIT", "15"),
            ("FLAGS_HINT_COUNT", " 5 "),
            ("FLAGS_SCORE_DB", "/tmp/scores.sqlite"),
            ("FLAGS_IDLE_MINUTES", "5"),
        ]))
        .unwrap();
        assert_eq!(config.time_limit, 15);
        assert_eq!(config.hint_count, 5);
        assert_eq!(config.score_db, "/tmp/scores.sqlite");

        let settings = config.session_settings();
        assert_eq!(settings.time_limit, 15);
        assert_eq!(settings.hint_count, 5);
        assert_eq!(settings.idle_timeout, Duration::from_secs(300));
    }

    #[test]
    fn rejects_garbage_and_zero_time_limit() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("FLAGS_HINT_COUNT", "lots")])),
            Err(QuizError::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("FLAGS_TIME_LIMIT", "0")])),
            Err(QuizError::Config(_))
        ));
    }
}
