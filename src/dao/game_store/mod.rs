#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{GameEntity, RatingEntity, UserEntity, UsernameEntity};
use crate::dao::storage::StorageResult;
use crate::state::game::{GameId, GameType, UserId};
use futures::future::BoxFuture;

/// Opaque version tag of a stored document, compared on conditional writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision(pub String);

/// A document together with the revision it was read at.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub revision: Revision,
    pub document: T,
}

/// Abstraction over the persistence layer for games, ratings and users.
///
/// Writes are conditional: `expected = None` only succeeds when the document
/// does not exist yet, `Some(rev)` only when the stored revision is still `rev`.
/// A lost race is reported as [`StorageError::Conflict`](crate::dao::storage::StorageError::Conflict).
pub trait GameStore: Send + Sync {
    fn find_game(&self, id: GameId) -> BoxFuture<'static, StorageResult<Option<Versioned<GameEntity>>>>;
    fn write_game(
        &self,
        game: GameEntity,
        expected: Option<Revision>,
    ) -> BoxFuture<'static, StorageResult<Revision>>;
    fn find_rating(
        &self,
        user_id: UserId,
        game_type: GameType,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<RatingEntity>>>>;
    fn write_rating(
        &self,
        rating: RatingEntity,
        expected: Option<Revision>,
    ) -> BoxFuture<'static, StorageResult<Revision>>;
    fn list_ratings(&self, user_id: UserId) -> BoxFuture<'static, StorageResult<Vec<RatingEntity>>>;
    fn find_user(&self, user_id: UserId) -> BoxFuture<'static, StorageResult<Option<UserEntity>>>;
    /// Create-only; an existing user is a conflict.
    fn insert_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_username(&self, username: String) -> BoxFuture<'static, StorageResult<Option<UsernameEntity>>>;
    /// Create-only; a name already held by anyone is a conflict.
    fn insert_username(&self, claim: UsernameEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
