//! Game lifecycle: creation, seating, moves and terminal outcomes.
//!
//! Every mutation runs as an optimistic transaction on the game document.
//! Side effects (move fan-out, rating settlement) only happen once the write
//! has committed. Settlement runs on its own task so a dropped request cannot
//! interrupt it halfway.

use std::time::SystemTime;

use tracing::{debug, info};

use crate::{
    error::ServiceError,
    services::{identity_service::Caller, rating_service},
    state::{
        SharedState,
        game::{Game, GameId, GameType, MoveNotation, Outcome, Seat, TimeLimit},
    },
};

/// Create a game with the caller in a randomly chosen seat.
pub async fn create_game(
    state: &SharedState,
    caller: &Caller,
    game_type: GameType,
    time_limit: TimeLimit,
) -> Result<Game, ServiceError> {
    create_game_in_seat(state, caller, game_type, time_limit, Seat::random()).await
}

pub(crate) async fn create_game_in_seat(
    state: &SharedState,
    caller: &Caller,
    game_type: GameType,
    time_limit: TimeLimit,
    seat: Seat,
) -> Result<Game, ServiceError> {
    let store = state.require_game_store().await?;

    for attempt in 1..=state.transactions().max_attempts() {
        let game = Game::new(
            GameId::generate(),
            caller.user_id.clone(),
            seat,
            game_type,
            time_limit,
            SystemTime::now(),
        );

        match store.write_game(game.clone().into(), None).await {
            Ok(_) => {
                info!(
                    game_id = %game.id,
                    user_id = %caller.user_id,
                    game_type = game_type.as_str(),
                    minutes = time_limit.minutes(),
                    "game created"
                );
                return Ok(game);
            }
            Err(err) if err.is_conflict() => {
                debug!(game_id = %game.id, attempt, "game id already taken, drawing another");
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(ServiceError::Internal("could not allocate a game id".into()))
}

/// Current committed state of a game.
pub async fn get_game(state: &SharedState, id: &GameId) -> Result<Game, ServiceError> {
    let store = state.require_game_store().await?;
    store
        .find_game(id.clone())
        .await?
        .map(|versioned| versioned.document.into())
        .ok_or_else(|| ServiceError::NotFound(format!("game `{id}` does not exist")))
}

/// Seat the caller in the first free slot of game `id`.
pub async fn join_game(state: &SharedState, caller: &Caller, id: &GameId) -> Result<Game, ServiceError> {
    let store = state.require_game_store().await?;
    let (game, seat) = state
        .transactions()
        .update_game(&store, id, |game| game.join(&caller.user_id))
        .await
        .map_err(|err| ServiceError::from_transaction(id, err))?;

    info!(game_id = %id, user_id = %caller.user_id, ?seat, "player joined");
    Ok(game)
}

/// Record a move and/or a final outcome reported by the caller.
///
/// The notation is validated before the store is touched. Once committed the
/// move is offered to the game's other observers and, for WIN/LOSS/DRAW, a
/// detached task settles both players' ratings. Rating failures are logged,
/// not returned.
pub async fn submit_move(
    state: &SharedState,
    caller: &Caller,
    id: &GameId,
    notation: Option<&str>,
    outcome: Outcome,
) -> Result<Game, ServiceError> {
    let notation = notation.map(MoveNotation::parse).transpose()?;
    let store = state.require_game_store().await?;
    let now = SystemTime::now();

    let (game, applied) = state
        .transactions()
        .update_game(&store, id, |game| {
            game.apply(&caller.user_id, notation.as_ref(), outcome, now)
        })
        .await
        .map_err(|err| ServiceError::from_transaction(id, err))?;

    if let Some(played) = &applied.appended {
        let delivered = state.moves().publish(id, &caller.user_id, played);
        debug!(game_id = %id, ply = played.ply, delivered, "move published");
    }

    if outcome != Outcome::InProgress {
        info!(game_id = %id, user_id = %caller.user_id, ?outcome, "game finished");
    }

    if let Some(settlement) = applied.settlement {
        let state = state.clone();
        tokio::spawn(async move {
            rating_service::settle_logged(&state, &settlement).await;
        });
    }

    Ok(game)
}

/// Abort a live game on behalf of the seated player whose turn it is.
pub async fn abort_game(state: &SharedState, caller: &Caller, id: &GameId) -> Result<Game, ServiceError> {
    submit_move(state, caller, id, None, Outcome::Aborted).await
}
