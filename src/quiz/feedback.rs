use crate::quiz::catalog::CountryRecord;
use crate::quiz::session::Outcome;

pub const PROMPT: &str = "Which country's flag is this?";
pub const LOADING: &str = "Loading flags...";
pub const FETCH_FAILED: &str =
    "Failed to load country data. Please check your connection and try again later.";

pub fn outcome_message(outcome: Outcome, correct: &CountryRecord) -> String {
    match outcome {
        Outcome::Correct => "Correct!".to_string(),
        Outcome::Incorrect => format!("Wrong! The correct answer was {}.", correct.name),
        Outcome::TimedOut => format!("Time's up! The answer was {}.", correct.name),
    }
}

pub fn fun_fact(country: &CountryRecord) -> String {
    format!(
        "Did you know? The capital of {} is {}, and its population is around {}.",
        country.name,
        country.capital,
        group_thousands(country.population)
    )
}

/// Formats a number with comma thousands separators: `33000000` -> `33,000,000`.
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
