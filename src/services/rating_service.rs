//! Elo ratings per user and game variant.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::{
    dao::{models::RatingEntity, transaction::DEFAULT_RATING},
    error::ServiceError,
    state::{
        SharedState,
        game::{GameType, MatchResult, Settlement, UserId},
    },
};

const K_FACTOR: f64 = 32.0;
const RATING_SCALE: f64 = 400.0;

/// Probability that a player rated `rating` beats one rated `opponent`.
pub fn expected_score(rating: i32, opponent: i32) -> f64 {
    let own = 10f64.powf(f64::from(rating) / RATING_SCALE);
    let other = 10f64.powf(f64::from(opponent) / RATING_SCALE);
    own / (own + other)
}

/// Rating after a game against `opponent` ended with `result`.
pub fn next_rating(rating: i32, opponent: i32, result: MatchResult) -> i32 {
    let actual = match result {
        MatchResult::Win => 1.0,
        MatchResult::Draw => 0.5,
        MatchResult::Loss => 0.0,
    };
    let delta = K_FACTOR * (actual - expected_score(rating, opponent));
    (f64::from(rating) + delta).round() as i32
}

async fn current_rating(
    state: &SharedState,
    user_id: &UserId,
    game_type: GameType,
) -> Result<i32, ServiceError> {
    let store = state.require_game_store().await?;
    Ok(store
        .find_rating(user_id.clone(), game_type)
        .await?
        .map(|versioned| versioned.document.rating)
        .unwrap_or(DEFAULT_RATING))
}

/// Apply `result` against an opponent rated `opponent_rating` to `user_id`'s rating.
pub async fn update_rating(
    state: &SharedState,
    user_id: &UserId,
    opponent_rating: i32,
    game_type: GameType,
    result: MatchResult,
) -> Result<RatingEntity, ServiceError> {
    let store = state.require_game_store().await?;
    state
        .transactions()
        .update_rating(&store, user_id, game_type, |rating| {
            next_rating(rating, opponent_rating, result)
        })
        .await
        .map_err(|err| ServiceError::from_transaction(user_id, err))
}

/// Update both participants of a finished game.
///
/// Both ratings are read before either is written so each side is computed
/// against the other's pre-game rating.
pub async fn settle(state: &SharedState, settlement: &Settlement) -> Result<(), ServiceError> {
    let Settlement {
        game_type,
        reporter,
        opponent,
        result,
    } = settlement;

    let reporter_before = current_rating(state, reporter, *game_type).await?;
    let opponent_before = current_rating(state, opponent, *game_type).await?;

    let reporter_after =
        update_rating(state, reporter, opponent_before, *game_type, *result).await?;
    let opponent_after =
        update_rating(state, opponent, reporter_before, *game_type, result.reversed()).await?;

    info!(
        game_type = game_type.as_str(),
        reporter = %reporter,
        reporter_rating = reporter_after.rating,
        opponent = %opponent,
        opponent_rating = opponent_after.rating,
        "ratings settled"
    );
    Ok(())
}

/// Current rating of `user_id` for every variant, defaulting unplayed ones.
pub async fn ratings_for(
    state: &SharedState,
    user_id: &UserId,
) -> Result<HashMap<GameType, i32>, ServiceError> {
    let store = state.require_game_store().await?;
    let stored = store.list_ratings(user_id.clone()).await?;

    let mut ratings: HashMap<GameType, i32> = GameType::ALL
        .iter()
        .map(|game_type| (*game_type, DEFAULT_RATING))
        .collect();
    for rating in stored {
        ratings.insert(rating.game_type, rating.rating);
    }
    Ok(ratings)
}

/// Run [`settle`] and log instead of failing; ratings never fail a mutation.
pub async fn settle_logged(state: &SharedState, settlement: &Settlement) {
    if let Err(err) = settle(state, settlement).await {
        warn!(
            reporter = %settlement.reporter,
            opponent = %settlement.opponent,
            error = %err,
            "failed to update ratings"
        );
    }
}
