//! Shared fixtures for service unit tests.

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use tokio::time::{sleep, timeout};

use crate::{
    config::AppConfig,
    dao::game_store::{GameStore, memory::MemoryGameStore},
    services::{
        identity_service::{Caller, IdentityError, IdentityVerifier},
        rating_service,
    },
    state::{
        AppState, SharedState,
        game::{GameType, UserId},
    },
};

/// Accepts any lowercase alphabetic token as the subject of the same name.
pub(crate) struct NameVerifier;

impl IdentityVerifier for NameVerifier {
    fn verify(&self, token: &str) -> BoxFuture<'static, Result<Caller, IdentityError>> {
        let result = if !token.is_empty() && token.chars().all(|c| c.is_ascii_lowercase()) {
            Ok(caller(token))
        } else {
            Err(IdentityError::EmptySubject)
        };
        Box::pin(async move { result })
    }
}

pub(crate) fn caller(name: &str) -> Caller {
    Caller {
        user_id: UserId::from_subject(name),
        email: None,
    }
}

pub(crate) fn caller_with_email(name: &str, email: &str) -> Caller {
    Caller {
        email: Some(email.to_owned()),
        ..caller(name)
    }
}

/// State backed by a fresh in-memory store.
pub(crate) async fn test_state() -> SharedState {
    state_with_store(Arc::new(MemoryGameStore::new())).await
}

pub(crate) async fn state_with_store(store: Arc<dyn GameStore>) -> SharedState {
    let state = AppState::new(AppConfig::default(), Arc::new(NameVerifier));
    state.install_game_store(store).await;
    state
}

/// Wait until the detached settlement task has stored `expected` for `user_id`.
pub(crate) async fn wait_for_rating(
    state: &SharedState,
    user_id: &UserId,
    game_type: GameType,
    expected: i32,
) {
    timeout(Duration::from_secs(2), async {
        loop {
            let ratings = rating_service::ratings_for(state, user_id).await.unwrap();
            if ratings[&game_type] == expected {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("rating should settle");
}
