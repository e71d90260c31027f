//! Process-local fan-out of committed moves to the players watching a game.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;
use uuid::Uuid;

use crate::state::game::{GameId, PlayedMove, UserId};

/// Slot depth of every observer channel.
const OBSERVER_SLOT: usize = 1;

struct Observer {
    token: Uuid,
    tx: mpsc::Sender<PlayedMove>,
}

#[derive(Default)]
struct GameObservers {
    observers: DashMap<UserId, Observer>,
    /// One past the highest ply published so far; 0 before the first move.
    high_water: AtomicU64,
}

/// Handle returned to a freshly registered observer.
pub struct Registration {
    /// Identifies this registration when deregistering.
    pub token: Uuid,
    /// Single-slot queue the registry fills on [`MoveBroadcastRegistry::publish`].
    pub receiver: mpsc::Receiver<PlayedMove>,
}

/// Observers grouped per game, keyed by user within a game.
#[derive(Default)]
pub struct MoveBroadcastRegistry {
    games: DashMap<GameId, Arc<GameObservers>>,
}

impl MoveBroadcastRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `user_id` as an observer of `game_id`, replacing any previous
    /// registration of the same user on the same game.
    pub fn register(&self, game_id: &GameId, user_id: &UserId) -> Registration {
        let (tx, receiver) = mpsc::channel(OBSERVER_SLOT);
        let token = Uuid::new_v4();

        // The outer entry guard is held across the insert so a concurrent prune
        // cannot drop the set between lookup and insert.
        let game = self.games.entry(game_id.clone()).or_default();
        let replaced = game
            .observers
            .insert(user_id.clone(), Observer { token, tx })
            .is_some();
        drop(game);

        debug!(game_id = %game_id, user_id = %user_id, %token, replaced, "observer registered");
        Registration { token, receiver }
    }

    /// Remove the registration identified by `token`. Registrations that have
    /// since been replaced are left untouched.
    pub fn deregister(&self, game_id: &GameId, user_id: &UserId, token: Uuid) -> bool {
        let removed = match self.games.get(game_id) {
            Some(game) => game
                .observers
                .remove_if(user_id, |_, observer| observer.token == token)
                .is_some(),
            None => false,
        };

        self.games
            .remove_if(game_id, |_, game| game.observers.is_empty());

        if removed {
            debug!(game_id = %game_id, user_id = %user_id, %token, "observer deregistered");
        }
        removed
    }

    /// Offer `played` to every observer of `game_id` except `author`.
    ///
    /// Never blocks: an observer whose slot is still occupied misses the move.
    /// Moves older than one already published for the game are discarded.
    /// Returns the number of observers the move was handed to.
    pub fn publish(&self, game_id: &GameId, author: &UserId, played: &PlayedMove) -> usize {
        let Some(game) = self.games.get(game_id).map(|entry| Arc::clone(entry.value())) else {
            return 0;
        };

        let mark = played.ply as u64 + 1;
        let previous = game.high_water.fetch_max(mark, Ordering::AcqRel);
        if previous >= mark {
            debug!(game_id = %game_id, ply = played.ply, "stale move not published");
            return 0;
        }

        let mut delivered = 0;
        for observer in game.observers.iter() {
            if observer.key() == author {
                continue;
            }
            match observer.tx.try_send(played.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!(game_id = %game_id, user_id = %observer.key(), ply = played.ply, "observer slot full, move dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(game_id = %game_id, user_id = %observer.key(), "observer closed");
                }
            }
        }
        delivered
    }

    /// Number of users currently observing `game_id`.
    pub fn observer_count(&self, game_id: &GameId) -> usize {
        self.games
            .get(game_id)
            .map(|game| game.observers.len())
            .unwrap_or(0)
    }

    /// Whether `user_id` holds a live registration on `game_id`.
    pub fn is_registered(&self, game_id: &GameId, user_id: &UserId) -> bool {
        self.games
            .get(game_id)
            .is_some_and(|game| game.observers.contains_key(user_id))
    }

    /// Number of games with at least one observer.
    pub fn watched_games(&self) -> usize {
        self.games.len()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::AtomicBool,
        time::SystemTime,
    };

    use tokio::sync::mpsc::error::TryRecvError;

    use super::*;
    use crate::state::game::MoveNotation;

    fn played(ply: usize) -> PlayedMove {
        PlayedMove {
            ply,
            notation: MoveNotation::parse("a1a2").unwrap(),
            played_at: SystemTime::now(),
        }
    }

    fn user(name: &str) -> UserId {
        UserId::from_subject(name)
    }

    #[test]
    fn author_is_skipped() {
        let registry = MoveBroadcastRegistry::new();
        let game = GameId::generate();
        let mut alice = registry.register(&game, &user("alice"));
        let mut bob = registry.register(&game, &user("bob"));

        assert_eq!(registry.publish(&game, &user("alice"), &played(0)), 1);

        assert_eq!(bob.receiver.try_recv().unwrap().ply, 0);
        assert!(alice.receiver.try_recv().is_err());
    }

    #[test]
    fn publish_without_observers_allocates_nothing() {
        let registry = MoveBroadcastRegistry::new();
        let game = GameId::generate();

        assert_eq!(registry.publish(&game, &user("alice"), &played(0)), 0);
        assert_eq!(registry.watched_games(), 0);
    }

    #[test]
    fn full_slot_drops_only_for_that_observer() {
        let registry = MoveBroadcastRegistry::new();
        let game = GameId::generate();
        let mut slow = registry.register(&game, &user("slow"));
        let mut fast = registry.register(&game, &user("fast"));

        registry.publish(&game, &user("alice"), &played(0));
        assert_eq!(fast.receiver.try_recv().unwrap().ply, 0);

        assert_eq!(registry.publish(&game, &user("alice"), &played(1)), 1);
        assert_eq!(fast.receiver.try_recv().unwrap().ply, 1);

        assert_eq!(slow.receiver.try_recv().unwrap().ply, 0);
        assert!(slow.receiver.try_recv().is_err());
    }

    #[test]
    fn stale_plies_are_dropped() {
        let registry = MoveBroadcastRegistry::new();
        let game = GameId::generate();
        let mut bob = registry.register(&game, &user("bob"));

        registry.publish(&game, &user("alice"), &played(3));
        bob.receiver.try_recv().unwrap();

        assert_eq!(registry.publish(&game, &user("alice"), &played(2)), 0);
        assert_eq!(registry.publish(&game, &user("alice"), &played(3)), 0);
        assert!(bob.receiver.try_recv().is_err());
    }

    #[test]
    fn registration_replaces_previous_observer() {
        let registry = MoveBroadcastRegistry::new();
        let game = GameId::generate();
        let mut first = registry.register(&game, &user("bob"));
        let mut second = registry.register(&game, &user("bob"));

        assert_eq!(registry.observer_count(&game), 1);
        assert!(first.receiver.try_recv().is_err());
        assert!(first.receiver.is_closed());

        registry.publish(&game, &user("alice"), &played(0));
        assert_eq!(second.receiver.try_recv().unwrap().ply, 0);
    }

    #[test]
    fn stale_token_cannot_remove_replacement() {
        let registry = MoveBroadcastRegistry::new();
        let game = GameId::generate();
        let first = registry.register(&game, &user("bob"));
        let second = registry.register(&game, &user("bob"));

        assert!(!registry.deregister(&game, &user("bob"), first.token));
        assert!(registry.is_registered(&game, &user("bob")));

        assert!(registry.deregister(&game, &user("bob"), second.token));
        assert!(!registry.is_registered(&game, &user("bob")));
        assert_eq!(registry.watched_games(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn churn_keeps_live_observers_and_starves_departed_ones() {
        const CHURNERS: usize = 8;
        const ROUNDS: usize = 200;

        let registry = Arc::new(MoveBroadcastRegistry::new());
        let game = GameId::generate();
        let started = Arc::new(AtomicU64::new(0));
        let stop = Arc::new(AtomicBool::new(false));

        let publisher = {
            let (registry, game, started, stop) =
                (registry.clone(), game.clone(), started.clone(), stop.clone());
            tokio::spawn(async move {
                let mut ply = 0;
                while !stop.load(Ordering::SeqCst) {
                    started.store(ply as u64, Ordering::SeqCst);
                    registry.publish(&game, &user("author"), &played(ply));
                    ply += 1;
                    tokio::task::yield_now().await;
                }
            })
        };

        let churners: Vec<_> = (0..CHURNERS)
            .map(|index| {
                let (registry, game, started) = (registry.clone(), game.clone(), started.clone());
                tokio::spawn(async move {
                    let me = user(&format!("churner{index}"));
                    for _ in 0..ROUNDS {
                        let mut registration = registry.register(&game, &me);
                        tokio::task::yield_now().await;
                        assert!(registry.is_registered(&game, &me), "live observer was pruned");

                        assert!(registry.deregister(&game, &me, registration.token));
                        let last_started = started.load(Ordering::SeqCst);
                        loop {
                            match registration.receiver.try_recv() {
                                Ok(received) => assert!(
                                    received.ply as u64 <= last_started,
                                    "move {} published after deregistration was delivered",
                                    received.ply
                                ),
                                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                            }
                        }
                        assert!(registration.receiver.is_closed());
                    }
                })
            })
            .collect();

        for churner in churners {
            churner.await.unwrap();
        }
        stop.store(true, Ordering::SeqCst);
        publisher.await.unwrap();

        assert_eq!(registry.observer_count(&game), 0);
        assert_eq!(registry.watched_games(), 0);
    }
}
