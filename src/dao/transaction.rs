//! Read-modify-write transactions over [`GameStore`] documents.
//!
//! Every attempt reads the current revision, runs the caller's body against a
//! fresh copy and writes it back conditionally. A conflicting write restarts
//! the whole attempt, so bodies must be free of side effects beyond the draft
//! they receive.

use std::{sync::Arc, time::Duration, time::SystemTime};

use rand::Rng;
use thiserror::Error;
use tokio::time::sleep;
use tracing::debug;

use crate::{
    dao::{
        game_store::GameStore,
        models::RatingEntity,
        storage::StorageError,
    },
    state::game::{Game, GameId, GameType, UserId},
};

/// Rating assigned to users who never finished a game of a variant.
pub const DEFAULT_RATING: i32 = 1200;

const BACKOFF_STEP_MS: u64 = 10;
const BACKOFF_JITTER_MS: u64 = 10;

/// Why a transaction did not commit.
#[derive(Debug, Error)]
pub enum TransactionError<E> {
    #[error("document not found")]
    NotFound,
    /// The body rejected the current state; nothing was written.
    #[error(transparent)]
    Aborted(E),
    #[error("transaction gave up after {attempts} conflicting attempts")]
    Exhausted { attempts: u32 },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Runs transactions with a bounded number of attempts.
#[derive(Debug, Clone, Copy)]
pub struct TransactionRunner {
    max_attempts: u32,
}

impl TransactionRunner {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Apply `body` to game `id` and commit the result atomically.
    ///
    /// Returns the committed game together with the body's output.
    pub async fn update_game<T, E, F>(
        &self,
        store: &Arc<dyn GameStore>,
        id: &GameId,
        mut body: F,
    ) -> Result<(Game, T), TransactionError<E>>
    where
        F: FnMut(&mut Game) -> Result<T, E> + Send,
        T: Send,
        E: Send,
    {
        for attempt in 1..=self.max_attempts {
            let Some(current) = store.find_game(id.clone()).await? else {
                return Err(TransactionError::NotFound);
            };

            let mut game: Game = current.document.into();
            let output = body(&mut game).map_err(TransactionError::Aborted)?;

            match store
                .write_game(game.clone().into(), Some(current.revision))
                .await
            {
                Ok(_) => return Ok((game, output)),
                Err(err) if err.is_conflict() => {
                    debug!(game_id = %id, attempt, "game write conflicted, retrying");
                    backoff(attempt).await;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(TransactionError::Exhausted {
            attempts: self.max_attempts,
        })
    }

    /// Replace the rating of `user_id` for `game_type` by `body(current)`.
    ///
    /// Users without a stored rating start from [`DEFAULT_RATING`].
    pub async fn update_rating<F>(
        &self,
        store: &Arc<dyn GameStore>,
        user_id: &UserId,
        game_type: GameType,
        mut body: F,
    ) -> Result<RatingEntity, TransactionError<std::convert::Infallible>>
    where
        F: FnMut(i32) -> i32 + Send,
    {
        for attempt in 1..=self.max_attempts {
            let current = store.find_rating(user_id.clone(), game_type).await?;
            let (rating, expected) = match current {
                Some(versioned) => (versioned.document.rating, Some(versioned.revision)),
                None => (DEFAULT_RATING, None),
            };

            let updated = RatingEntity {
                user_id: user_id.clone(),
                game_type,
                rating: body(rating),
                updated_at: SystemTime::now(),
            };

            match store.write_rating(updated.clone(), expected).await {
                Ok(_) => return Ok(updated),
                Err(err) if err.is_conflict() => {
                    debug!(user_id = %user_id, attempt, "rating write conflicted, retrying");
                    backoff(attempt).await;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(TransactionError::Exhausted {
            attempts: self.max_attempts,
        })
    }
}

async fn backoff(attempt: u32) {
    let jitter = rand::rng().random_range(0..BACKOFF_JITTER_MS);
    sleep(Duration::from_millis(BACKOFF_STEP_MS * u64::from(attempt) + jitter)).await;
}
