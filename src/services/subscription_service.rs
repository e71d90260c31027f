//! Binds move subscriptions to the lifetime of the consuming connection.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::ServiceError,
    services::identity_service::{Caller, require_caller},
    state::{
        SharedState,
        game::{GameId, PlayedMove, UserId},
        registry::Registration,
    },
};

/// Moves delivered to one subscriber, read straight from its registry slot.
///
/// Dropping the stream removes the registration. The stream completes when a
/// newer subscription of the same user on the same game replaces it.
pub struct MoveStream {
    state: SharedState,
    game_id: GameId,
    user_id: UserId,
    token: Uuid,
    receiver: mpsc::Receiver<PlayedMove>,
}

impl Stream for MoveStream {
    type Item = PlayedMove;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<PlayedMove>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for MoveStream {
    fn drop(&mut self) {
        let removed = self
            .state
            .moves()
            .deregister(&self.game_id, &self.user_id, self.token);
        debug!(
            game_id = %self.game_id,
            user_id = %self.user_id,
            removed,
            "move subscription closed"
        );
    }
}

/// Stream the moves other players commit on game `game_id`.
///
/// Registers the caller as the game's observer, replacing an earlier
/// subscription of the same user.
pub async fn subscribe(
    state: &SharedState,
    caller: Option<&Caller>,
    game_id: &GameId,
) -> Result<MoveStream, ServiceError> {
    let caller = require_caller(caller)?;
    let store = state.require_game_store().await?;
    if store.find_game(game_id.clone()).await?.is_none() {
        return Err(ServiceError::NotFound(format!("game `{game_id}` does not exist")));
    }

    let Registration { token, receiver } = state.moves().register(game_id, &caller.user_id);
    Ok(MoveStream {
        state: state.clone(),
        game_id: game_id.clone(),
        user_id: caller.user_id.clone(),
        token,
        receiver,
    })
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use futures::{FutureExt, StreamExt};
    use tokio::time::timeout;

    use super::*;
    use crate::{
        services::{
            game_service,
            test_support::{caller, test_state},
        },
        state::game::{GameType, MoveNotation, Seat, TimeLimit},
    };

    const WAIT: Duration = Duration::from_secs(2);

    fn played(ply: usize) -> PlayedMove {
        PlayedMove {
            ply,
            notation: MoveNotation::parse("c1c2").unwrap(),
            played_at: SystemTime::now(),
        }
    }

    async fn new_game(state: &SharedState) -> GameId {
        game_service::create_game_in_seat(
            state,
            &caller("alice"),
            GameType::Janggi,
            TimeLimit::Rapid,
            Seat::One,
        )
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn anonymous_subscription_is_rejected() {
        let state = test_state().await;
        let id = new_game(&state).await;
        let err = subscribe(&state, None, &id).await.err().unwrap();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn unknown_game_is_rejected() {
        let state = test_state().await;
        let err = subscribe(&state, Some(&caller("bob")), &GameId::generate())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn receives_moves_of_other_players_only() {
        let state = test_state().await;
        let id = new_game(&state).await;
        let bob = caller("bob");
        let mut stream = subscribe(&state, Some(&bob), &id).await.unwrap();

        assert_eq!(state.moves().publish(&id, &bob.user_id, &played(0)), 0);
        assert_eq!(state.moves().publish(&id, &caller("alice").user_id, &played(1)), 1);

        let received = timeout(WAIT, stream.next()).await.unwrap().unwrap();
        assert_eq!(received.ply, 1);
    }

    #[tokio::test]
    async fn unread_subscription_holds_a_single_move() {
        let state = test_state().await;
        let id = new_game(&state).await;
        let alice = caller("alice");
        let mut stream = subscribe(&state, Some(&caller("bob")), &id).await.unwrap();

        let accepted: usize = (0..5)
            .map(|ply| state.moves().publish(&id, &alice.user_id, &played(ply)))
            .sum();
        assert_eq!(accepted, 1);

        assert_eq!(stream.next().now_or_never().flatten().map(|m| m.ply), Some(0));
        assert!(stream.next().now_or_never().is_none());
    }

    #[tokio::test]
    async fn dropping_the_stream_deregisters() {
        let state = test_state().await;
        let id = new_game(&state).await;
        let bob = caller("bob");
        let stream = subscribe(&state, Some(&bob), &id).await.unwrap();
        assert!(state.moves().is_registered(&id, &bob.user_id));

        drop(stream);

        assert!(!state.moves().is_registered(&id, &bob.user_id));
        assert_eq!(state.moves().watched_games(), 0);
    }

    #[tokio::test]
    async fn second_subscription_replaces_first() {
        let state = test_state().await;
        let id = new_game(&state).await;
        let bob = caller("bob");
        let mut first = subscribe(&state, Some(&bob), &id).await.unwrap();
        let mut second = subscribe(&state, Some(&bob), &id).await.unwrap();

        assert!(timeout(WAIT, first.next()).await.unwrap().is_none());
        assert_eq!(state.moves().observer_count(&id), 1);

        drop(first);
        assert!(state.moves().is_registered(&id, &bob.user_id));

        state.moves().publish(&id, &caller("alice").user_id, &played(0));
        let received = timeout(WAIT, second.next()).await.unwrap().unwrap();
        assert_eq!(received.ply, 0);

        drop(second);
        assert!(!state.moves().is_registered(&id, &bob.user_id));
    }
}
