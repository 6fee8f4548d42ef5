use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::quiz::catalog::{ActiveSet, CountryRecord};
use crate::quiz::OPTION_COUNT;

/// Rejection sampling gives up after this many draws per active country and
/// falls back to picking among the remaining distinct names.
const MAX_DRAWS_PER_DISTRACTOR: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub correct: CountryRecord,
    pub options: Vec<CountryRecord>,
    pub created_at: DateTime<Utc>,
}

impl Question {
    pub fn is_correct(&self, name: &str) -> bool {
        self.correct.name == name
    }

    pub fn incorrect_options(&self) -> impl Iterator<Item = &CountryRecord> {
        self.options.iter().filter(|o| o.name != self.correct.name)
    }
}

/// Builds a question: one uniformly chosen correct country plus three
/// distractors with pairwise distinct names, in shuffled order.
pub fn next_question<R: Rng + ?Sized>(active: &ActiveSet, rng: &mut R) -> Question {
    let pool = active.countries();
    let correct = &pool[rng.gen_range(0..pool.len())];

    let mut taken: HashSet<&str> = HashSet::from([correct.name.as_str()]);
    let mut options = vec![correct.clone()];

    let mut draws = 0;
    let max_draws = MAX_DRAWS_PER_DISTRACTOR * pool.len();
    while options.len() < OPTION_COUNT && draws < max_draws {
        draws += 1;
        let candidate = &pool[rng.gen_range(0..pool.len())];
        if taken.insert(candidate.name.as_str()) {
            options.push(candidate.clone());
        }
    }

    if options.len() < OPTION_COUNT {
        log::debug!("Distractor sampling hit its cap after {} draws", draws);
        let mut remaining: Vec<&CountryRecord> = Vec::new();
        for country in pool {
            if !taken.contains(country.name.as_str()) {
                taken.insert(country.name.as_str());
                remaining.push(country);
            }
        }
        remaining.shuffle(rng);
        let missing = OPTION_COUNT - options.len();
        options.extend(remaining.into_iter().take(missing).cloned());
    }

    // Fisher-Yates
    options.shuffle(rng);

    Question {
        correct: correct.clone(),
        options,
        created_at: Utc::now(),
    }
}
