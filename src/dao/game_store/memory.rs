//! In-process store backed by concurrent maps. Used when no database is
//! configured and by the test suites.

use std::{
    hash::Hash,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;

use crate::{
    dao::{
        game_store::{GameStore, Revision, Versioned},
        models::{GameEntity, RatingEntity, UserEntity, UsernameEntity},
        storage::{StorageError, StorageResult},
    },
    state::game::{GameId, GameType, UserId},
};

#[derive(Clone, Default)]
pub struct MemoryGameStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    games: Table<GameId, GameEntity>,
    ratings: Table<(UserId, GameType), RatingEntity>,
    users: Table<UserId, UserEntity>,
    usernames: Table<String, UsernameEntity>,
    revisions: AtomicU64,
}

struct Table<K, V> {
    rows: DashMap<K, (Revision, V)>,
}

impl<K: Eq + Hash, V> Default for Table<K, V> {
    fn default() -> Self {
        Self {
            rows: DashMap::new(),
        }
    }
}

impl<K, V> Table<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    fn find(&self, key: &K) -> Option<Versioned<V>> {
        self.rows.get(key).map(|row| Versioned {
            revision: row.0.clone(),
            document: row.1.clone(),
        })
    }

    fn write(&self, key: K, value: V, expected: Option<Revision>, next: Revision) -> StorageResult<Revision> {
        let document = format!("{key:?}");
        match (self.rows.entry(key), expected) {
            (Entry::Vacant(slot), None) => {
                slot.insert((next.clone(), value));
                Ok(next)
            }
            (Entry::Occupied(mut slot), Some(expected)) if slot.get().0 == expected => {
                slot.insert((next.clone(), value));
                Ok(next)
            }
            _ => Err(StorageError::conflict(document)),
        }
    }
}

impl MemoryGameStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_revision(&self) -> Revision {
        let value = self.inner.revisions.fetch_add(1, Ordering::Relaxed) + 1;
        Revision(value.to_string())
    }
}

impl GameStore for MemoryGameStore {
    fn find_game(&self, id: GameId) -> BoxFuture<'static, StorageResult<Option<Versioned<GameEntity>>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.games.find(&id)) })
    }

    fn write_game(
        &self,
        game: GameEntity,
        expected: Option<Revision>,
    ) -> BoxFuture<'static, StorageResult<Revision>> {
        let store = self.clone();
        Box::pin(async move {
            let next = store.next_revision();
            store.inner.games.write(game.id.clone(), game, expected, next)
        })
    }

    fn find_rating(
        &self,
        user_id: UserId,
        game_type: GameType,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<RatingEntity>>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.ratings.find(&(user_id, game_type))) })
    }

    fn write_rating(
        &self,
        rating: RatingEntity,
        expected: Option<Revision>,
    ) -> BoxFuture<'static, StorageResult<Revision>> {
        let store = self.clone();
        Box::pin(async move {
            let next = store.next_revision();
            let key = (rating.user_id.clone(), rating.game_type);
            store.inner.ratings.write(key, rating, expected, next)
        })
    }

    fn list_ratings(&self, user_id: UserId) -> BoxFuture<'static, StorageResult<Vec<RatingEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .ratings
                .rows
                .iter()
                .filter(|row| row.key().0 == user_id)
                .map(|row| row.value().1.clone())
                .collect())
        })
    }

    fn find_user(&self, user_id: UserId) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.users.find(&user_id).map(|row| row.document)) })
    }

    fn insert_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let next = store.next_revision();
            store.inner.users.write(user.user_id.clone(), user, None, next)?;
            Ok(())
        })
    }

    fn find_username(&self, username: String) -> BoxFuture<'static, StorageResult<Option<UsernameEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.usernames.find(&username).map(|row| row.document)) })
    }

    fn insert_username(&self, claim: UsernameEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let next = store.next_revision();
            store.inner.usernames.write(claim.username.clone(), claim, None, next)?;
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::state::game::{Game, Seat, TimeLimit};

    fn sample_game() -> GameEntity {
        Game::new(
            GameId::generate(),
            UserId::from_subject("alice"),
            Seat::One,
            GameType::Janggi,
            TimeLimit::Blitz,
            SystemTime::now(),
        )
        .into()
    }

    #[tokio::test]
    async fn create_only_write_rejects_existing_document() {
        let store = MemoryGameStore::new();
        let game = sample_game();

        store.write_game(game.clone(), None).await.unwrap();
        let err = store.write_game(game, None).await.unwrap_err();

        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn conditional_write_requires_current_revision() {
        let store = MemoryGameStore::new();
        let mut game = sample_game();
        let first = store.write_game(game.clone(), None).await.unwrap();

        game.draw = true;
        let second = store.write_game(game.clone(), Some(first.clone())).await.unwrap();
        assert_ne!(first, second);

        let stale = store.write_game(game.clone(), Some(first)).await.unwrap_err();
        assert!(stale.is_conflict());

        let loaded = store.find_game(game.id.clone()).await.unwrap().unwrap();
        assert_eq!(loaded.revision, second);
        assert!(loaded.document.draw);
    }

    #[tokio::test]
    async fn update_of_missing_document_conflicts() {
        let store = MemoryGameStore::new();
        let err = store
            .write_game(sample_game(), Some(Revision("1".into())))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn ratings_are_listed_per_user() {
        let store = MemoryGameStore::new();
        let alice = UserId::from_subject("alice");
        let bob = UserId::from_subject("bob");
        for (user, game_type) in [
            (&alice, GameType::Janggi),
            (&alice, GameType::Shogi),
            (&bob, GameType::Janggi),
        ] {
            let rating = RatingEntity {
                user_id: user.clone(),
                game_type,
                rating: 1200,
                updated_at: SystemTime::now(),
            };
            store.write_rating(rating, None).await.unwrap();
        }

        assert_eq!(store.list_ratings(alice).await.unwrap().len(), 2);
        assert_eq!(store.list_ratings(bob).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn username_is_held_by_one_user() {
        let store = MemoryGameStore::new();
        let claim = |subject: &str| UsernameEntity {
            username: "alice".into(),
            user_id: UserId::from_subject(subject),
        };

        store.insert_username(claim("a")).await.unwrap();
        let err = store.insert_username(claim("b")).await.unwrap_err();

        assert!(err.is_conflict());
        let owner = store.find_username("alice".into()).await.unwrap().unwrap();
        assert_eq!(owner.user_id, UserId::from_subject("a"));
    }
}
