use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database,
    bson::doc,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::IndexOptions,
};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoGameDocument, MongoRatingDocument, MongoUserDocument, MongoUsernameDocument,
        doc_at_revision, doc_id, rating_id,
    },
};
use crate::{
    dao::{
        game_store::{GameStore, Revision, Versioned},
        models::{GameEntity, RatingEntity, UserEntity, UsernameEntity},
        storage::StorageResult,
    },
    state::game::{GameId, GameType, UserId},
};

const GAME_COLLECTION_NAME: &str = "games";
const RATING_COLLECTION_NAME: &str = "ratings";
const USER_COLLECTION_NAME: &str = "users";
const USERNAME_COLLECTION_NAME: &str = "usernames";
const DUPLICATE_KEY: i32 = 11000;

#[derive(Clone)]
pub struct MongoGameStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.state.read().await.database.clone();

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref failure)) if failure.code == DUPLICATE_KEY
    )
}

fn parse_revision(revision: &Revision, document: &str) -> MongoResult<i64> {
    revision.0.parse().map_err(|_| MongoDaoError::Conflict {
        document: document.to_owned(),
    })
}

/// Insert when `expected` is `None`, otherwise replace the document only while
/// it is still at `expected`. Returns the revision that was written.
async fn conditional_write<T>(
    collection: Collection<T>,
    collection_name: &'static str,
    id: &str,
    expected: Option<Revision>,
    build: impl FnOnce(i64) -> T,
) -> MongoResult<Revision>
where
    T: serde::Serialize + Send + Sync,
{
    let write_error = |source| MongoDaoError::Write {
        collection: collection_name,
        id: id.to_owned(),
        source,
    };

    match expected {
        None => {
            let document = build(1);
            match collection.insert_one(&document).await {
                Ok(_) => Ok(Revision("1".into())),
                Err(err) if is_duplicate_key(&err) => Err(MongoDaoError::Conflict {
                    document: id.to_owned(),
                }),
                Err(err) => Err(write_error(err)),
            }
        }
        Some(expected) => {
            let current = parse_revision(&expected, id)?;
            let next = current + 1;
            let result = collection
                .replace_one(doc_at_revision(id, current), &build(next))
                .await
                .map_err(write_error)?;
            if result.matched_count == 0 {
                return Err(MongoDaoError::Conflict {
                    document: id.to_owned(),
                });
            }
            Ok(Revision(next.to_string()))
        }
    }
}

impl MongoGameStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"user_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("rating_user_idx".to_owned()))
                    .build(),
            )
            .build();

        self.rating_collection()
            .await
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: RATING_COLLECTION_NAME,
                index: "user_id",
                source,
            })?;

        Ok(())
    }

    async fn game_collection(&self) -> Collection<MongoGameDocument> {
        let guard = self.inner.state.read().await;
        guard.database.collection(GAME_COLLECTION_NAME)
    }

    async fn rating_collection(&self) -> Collection<MongoRatingDocument> {
        let guard = self.inner.state.read().await;
        guard.database.collection(RATING_COLLECTION_NAME)
    }

    async fn user_collection(&self) -> Collection<MongoUserDocument> {
        let guard = self.inner.state.read().await;
        guard.database.collection(USER_COLLECTION_NAME)
    }

    async fn username_collection(&self) -> Collection<MongoUsernameDocument> {
        let guard = self.inner.state.read().await;
        guard.database.collection(USERNAME_COLLECTION_NAME)
    }

    async fn find_game(&self, id: GameId) -> MongoResult<Option<Versioned<GameEntity>>> {
        let document = self
            .game_collection()
            .await
            .find_one(doc_id(id.as_str()))
            .await
            .map_err(|source| MongoDaoError::Load {
                collection: GAME_COLLECTION_NAME,
                id: id.to_string(),
                source,
            })?;

        Ok(document.map(|doc| Versioned {
            revision: Revision(doc.revision.to_string()),
            document: doc.into(),
        }))
    }

    async fn write_game(&self, game: GameEntity, expected: Option<Revision>) -> MongoResult<Revision> {
        let id = game.id.to_string();
        let collection = self.game_collection().await;
        conditional_write(collection, GAME_COLLECTION_NAME, &id, expected, |revision| {
            MongoGameDocument::from((game, revision))
        })
        .await
    }

    async fn find_rating(
        &self,
        user_id: UserId,
        game_type: GameType,
    ) -> MongoResult<Option<Versioned<RatingEntity>>> {
        let id = rating_id(&user_id, game_type);
        let document = self
            .rating_collection()
            .await
            .find_one(doc_id(&id))
            .await
            .map_err(|source| MongoDaoError::Load {
                collection: RATING_COLLECTION_NAME,
                id,
                source,
            })?;

        Ok(document.map(|doc| Versioned {
            revision: Revision(doc.revision.to_string()),
            document: doc.into(),
        }))
    }

    async fn write_rating(
        &self,
        rating: RatingEntity,
        expected: Option<Revision>,
    ) -> MongoResult<Revision> {
        let id = rating_id(&rating.user_id, rating.game_type);
        let collection = self.rating_collection().await;
        conditional_write(collection, RATING_COLLECTION_NAME, &id, expected, |revision| {
            MongoRatingDocument::from((rating, revision))
        })
        .await
    }

    async fn list_ratings(&self, user_id: UserId) -> MongoResult<Vec<RatingEntity>> {
        let list_error = |source| MongoDaoError::ListRatings {
            user_id: user_id.to_string(),
            source,
        };

        let documents: Vec<MongoRatingDocument> = self
            .rating_collection()
            .await
            .find(doc! {"user_id": user_id.as_str()})
            .await
            .map_err(list_error)?
            .try_collect()
            .await
            .map_err(list_error)?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn find_user(&self, user_id: UserId) -> MongoResult<Option<UserEntity>> {
        let document = self
            .user_collection()
            .await
            .find_one(doc_id(user_id.as_str()))
            .await
            .map_err(|source| MongoDaoError::Load {
                collection: USER_COLLECTION_NAME,
                id: user_id.to_string(),
                source,
            })?;

        Ok(document.map(Into::into))
    }

    async fn insert_user(&self, user: UserEntity) -> MongoResult<()> {
        let id = user.user_id.to_string();
        let collection = self.user_collection().await;
        conditional_write(collection, USER_COLLECTION_NAME, &id, None, |revision| {
            MongoUserDocument::from((user, revision))
        })
        .await?;
        Ok(())
    }

    async fn find_username(&self, username: String) -> MongoResult<Option<UsernameEntity>> {
        let document = self
            .username_collection()
            .await
            .find_one(doc_id(&username))
            .await
            .map_err(|source| MongoDaoError::Load {
                collection: USERNAME_COLLECTION_NAME,
                id: username,
                source,
            })?;

        Ok(document.map(Into::into))
    }

    async fn insert_username(&self, claim: UsernameEntity) -> MongoResult<()> {
        let id = claim.username.clone();
        let collection = self.username_collection().await;
        conditional_write(collection, USERNAME_COLLECTION_NAME, &id, None, |revision| {
            MongoUsernameDocument::from((claim, revision))
        })
        .await?;
        Ok(())
    }
}

impl GameStore for MongoGameStore {
    fn find_game(&self, id: GameId) -> BoxFuture<'static, StorageResult<Option<Versioned<GameEntity>>>> {
        let store = self.clone();
        Box::pin(async move { store.find_game(id).await.map_err(Into::into) })
    }

    fn write_game(
        &self,
        game: GameEntity,
        expected: Option<Revision>,
    ) -> BoxFuture<'static, StorageResult<Revision>> {
        let store = self.clone();
        Box::pin(async move { store.write_game(game, expected).await.map_err(Into::into) })
    }

    fn find_rating(
        &self,
        user_id: UserId,
        game_type: GameType,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<RatingEntity>>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_rating(user_id, game_type)
                .await
                .map_err(Into::into)
        })
    }

    fn write_rating(
        &self,
        rating: RatingEntity,
        expected: Option<Revision>,
    ) -> BoxFuture<'static, StorageResult<Revision>> {
        let store = self.clone();
        Box::pin(async move { store.write_rating(rating, expected).await.map_err(Into::into) })
    }

    fn list_ratings(&self, user_id: UserId) -> BoxFuture<'static, StorageResult<Vec<RatingEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_ratings(user_id).await.map_err(Into::into) })
    }

    fn find_user(&self, user_id: UserId) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_user(user_id).await.map_err(Into::into) })
    }

    fn insert_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_user(user).await.map_err(Into::into) })
    }

    fn find_username(&self, username: String) -> BoxFuture<'static, StorageResult<Option<UsernameEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_username(username).await.map_err(Into::into) })
    }

    fn insert_username(&self, claim: UsernameEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_username(claim).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
