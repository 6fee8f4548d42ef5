use std::collections::HashMap;
use std::sync::Arc;

use teloxide::dispatching::dialogue::{ErasedStorage, Storage};
use teloxide::types::ChatId;
use tokio::sync::mpsc;

use crate::error::{QuizError, Result};

/// Key-value store for the high score.
pub trait ScoreStore {
    fn get(&self, key: &str) -> Option<u32>;
    fn set(&mut self, key: &str, value: u32) -> Result<()>;
}

/// Everything persisted for one chat.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatScores {
    pub scores: HashMap<String, u32>,
}

/// Per-chat storage, `SqliteStorage<Json>` in production.
pub type ScoreStorage = Arc<ErasedStorage<ChatScores>>;

/// One chat's scores. Reads are served from memory; writes go to a background
/// task that applies them to the storage in order.
pub struct ChatScoreStore {
    scores: ChatScores,
    writes: mpsc::UnboundedSender<ChatScores>,
}

impl ChatScoreStore {
    pub async fn load(storage: ScoreStorage, chat_id: ChatId) -> Result<Self> {
        let scores = storage
            .clone()
            .get_dialogue(chat_id)
            .await
            .map_err(|e| QuizError::Store(e.to_string()))?
            .unwrap_or_default();

        let (writes, mut pending) = mpsc::unbounded_channel::<ChatScores>();
        tokio::spawn(async move {
            while let Some(scores) = pending.recv().await {
                if let Err(err) = storage.clone().update_dialogue(chat_id, scores).await {
                    log::warn!("Could not save scores for chat {}: {}", chat_id.0, err);
                }
            }
        });

        Ok(Self { scores, writes })
    }
}

impl ScoreStore for ChatScoreStore {
    fn get(&self, key: &str) -> Option<u32> {
        self.scores.scores.get(key).copied()
    }

    fn set(&mut self, key: &str, value: u32) -> Result<()> {
        self.scores.scores.insert(key.to_string(), value);
        self.writes
            .send(self.scores.clone())
            .map_err(|_| QuizError::Store("score writer stopped".to_string()))
    }
}

#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, u32>,
}

#[cfg(test)]
impl ScoreStore for MemoryStore {
    fn get(&self, key: &str) -> Option<u32> {
        self.values.get(key).copied()
    }

    fn set(&mut self, key: &str, value: u32) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}
