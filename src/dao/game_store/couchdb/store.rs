use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::from_value;

use crate::{
    dao::{
        game_store::{GameStore, Revision, Versioned},
        models::{GameEntity, RatingEntity, UserEntity, UsernameEntity},
        storage::StorageResult,
    },
    state::game::{GameId, GameType, UserId},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, CouchGameDocument, CouchRatingDocument, CouchUserDocument,
        CouchUsernameDocument, END_SUFFIX, PutResponse, game_doc_id, rating_doc_id, user_doc_id,
        user_rating_prefix, username_doc_id,
    },
};

#[derive(Clone)]
pub struct CouchGameStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchGameStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let store = Self {
            client,
            base_url: Arc::from(config.base_url.trim_end_matches('/')),
            database: Arc::from(config.database),
            auth: config
                .credentials
                .map(|(user, pass)| (Arc::<str>::from(user), Arc::<str>::from(pass))),
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth {
            Some((ref user, ref pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.authorized(self.client.request(method, url))
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorized(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                // 412 means another instance created it first.
                if create.status().is_success() || create.status() == StatusCode::PRECONDITION_FAILED {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// `PUT` a document; CouchDB itself enforces the `_rev` precondition.
    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<Revision>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Err(CouchDaoError::Conflict {
                path: doc_id.to_string(),
            }),
            status if status.is_success() => {
                let body = response.json::<PutResponse>().await.map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })?;
                Ok(Revision(body.rev))
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn list_documents<T>(&self, prefix: &str) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        const ALL_DOCS: &str = "_all_docs";
        let query = [
            ("include_docs", "true".to_string()),
            ("startkey", format!("\"{prefix}\"")),
            ("endkey", format!("\"{prefix}{END_SUFFIX}\"")),
        ];

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<AllDocsResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_string(),
                source,
            }
        })?;

        payload
            .rows
            .into_iter()
            .filter_map(|row| row.doc)
            .map(|doc| {
                from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                    path: ALL_DOCS.to_string(),
                    source,
                })
            })
            .collect()
    }
}

fn versioned<T>(rev: Option<String>, document: T, doc_id: &str) -> CouchResult<Versioned<T>> {
    let rev = rev.ok_or_else(|| CouchDaoError::RequestStatus {
        path: doc_id.to_string(),
        status: StatusCode::UNPROCESSABLE_ENTITY,
    })?;
    Ok(Versioned {
        revision: Revision(rev),
        document,
    })
}

impl GameStore for CouchGameStore {
    fn find_game(&self, id: GameId) -> BoxFuture<'static, StorageResult<Option<Versioned<GameEntity>>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = game_doc_id(&id);
            let Some(doc) = store.get_document::<CouchGameDocument>(&doc_id).await? else {
                return Ok(None);
            };
            Ok(Some(versioned(doc.rev, doc.game, &doc_id)?))
        })
    }

    fn write_game(
        &self,
        game: GameEntity,
        expected: Option<Revision>,
    ) -> BoxFuture<'static, StorageResult<Revision>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = CouchGameDocument::from((game, expected.map(|rev| rev.0)));
            store.put_document(&doc.id, &doc).await.map_err(Into::into)
        })
    }

    fn find_rating(
        &self,
        user_id: UserId,
        game_type: GameType,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<RatingEntity>>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = rating_doc_id(&user_id, game_type);
            let Some(doc) = store.get_document::<CouchRatingDocument>(&doc_id).await? else {
                return Ok(None);
            };
            Ok(Some(versioned(doc.rev, doc.rating, &doc_id)?))
        })
    }

    fn write_rating(
        &self,
        rating: RatingEntity,
        expected: Option<Revision>,
    ) -> BoxFuture<'static, StorageResult<Revision>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = CouchRatingDocument::from((rating, expected.map(|rev| rev.0)));
            store.put_document(&doc.id, &doc).await.map_err(Into::into)
        })
    }

    fn list_ratings(&self, user_id: UserId) -> BoxFuture<'static, StorageResult<Vec<RatingEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store
                .list_documents::<CouchRatingDocument>(&user_rating_prefix(&user_id))
                .await?;
            Ok(docs.into_iter().map(|doc| doc.rating).collect())
        })
    }

    fn find_user(&self, user_id: UserId) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = store
                .get_document::<CouchUserDocument>(&user_doc_id(&user_id))
                .await?;
            Ok(doc.map(|doc| doc.user))
        })
    }

    fn insert_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = CouchUserDocument::from(user);
            store.put_document(&doc.id, &doc).await?;
            Ok(())
        })
    }

    fn find_username(&self, username: String) -> BoxFuture<'static, StorageResult<Option<UsernameEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = store
                .get_document::<CouchUsernameDocument>(&username_doc_id(&username))
                .await?;
            Ok(doc.map(|doc| doc.claim))
        })
    }

    fn insert_username(&self, claim: UsernameEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = CouchUsernameDocument::from(claim);
            store.put_document(&doc.id, &doc).await?;
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.database_url();
            let response = store
                .authorized(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
