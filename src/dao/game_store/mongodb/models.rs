use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};

use crate::{
    dao::models::{GameEntity, MoveEntity, RatingEntity, UserEntity, UsernameEntity},
    state::game::{GameId, GameType, MoveNotation, TimeLimit, UserId},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoGameDocument {
    #[serde(rename = "_id")]
    pub id: GameId,
    /// Incremented on every write, used as the optimistic concurrency token.
    pub revision: i64,
    pub player_one: Option<UserId>,
    pub player_two: Option<UserId>,
    pub moves: Vec<MongoMoveDocument>,
    pub winner: Option<UserId>,
    pub draw: bool,
    pub aborted: bool,
    pub game_type: GameType,
    pub time_limit: TimeLimit,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMoveDocument {
    notation: MoveNotation,
    played_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRatingDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub revision: i64,
    pub user_id: UserId,
    pub game_type: GameType,
    pub rating: i32,
    pub updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoUserDocument {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub revision: i64,
    pub username: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime,
}

/// Keyed by the username itself so the `_id` index enforces uniqueness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoUsernameDocument {
    #[serde(rename = "_id")]
    pub username: String,
    pub revision: i64,
    pub user_id: UserId,
}

impl From<(GameEntity, i64)> for MongoGameDocument {
    fn from((game, revision): (GameEntity, i64)) -> Self {
        Self {
            id: game.id,
            revision,
            player_one: game.player_one,
            player_two: game.player_two,
            moves: game
                .moves
                .into_iter()
                .map(|mv| MongoMoveDocument {
                    notation: mv.notation,
                    played_at: DateTime::from_system_time(mv.played_at),
                })
                .collect(),
            winner: game.winner,
            draw: game.draw,
            aborted: game.aborted,
            game_type: game.game_type,
            time_limit: game.time_limit,
            created_at: DateTime::from_system_time(game.created_at),
            updated_at: DateTime::from_system_time(game.updated_at),
        }
    }
}

impl From<MongoGameDocument> for GameEntity {
    fn from(value: MongoGameDocument) -> Self {
        Self {
            id: value.id,
            player_one: value.player_one,
            player_two: value.player_two,
            moves: value
                .moves
                .into_iter()
                .map(|mv| MoveEntity {
                    notation: mv.notation,
                    played_at: mv.played_at.to_system_time(),
                })
                .collect(),
            winner: value.winner,
            draw: value.draw,
            aborted: value.aborted,
            game_type: value.game_type,
            time_limit: value.time_limit,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

impl From<(RatingEntity, i64)> for MongoRatingDocument {
    fn from((rating, revision): (RatingEntity, i64)) -> Self {
        Self {
            id: rating_id(&rating.user_id, rating.game_type),
            revision,
            user_id: rating.user_id,
            game_type: rating.game_type,
            rating: rating.rating,
            updated_at: DateTime::from_system_time(rating.updated_at),
        }
    }
}

impl From<MongoRatingDocument> for RatingEntity {
    fn from(value: MongoRatingDocument) -> Self {
        Self {
            user_id: value.user_id,
            game_type: value.game_type,
            rating: value.rating,
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

impl From<(UserEntity, i64)> for MongoUserDocument {
    fn from((user, revision): (UserEntity, i64)) -> Self {
        Self {
            id: user.user_id,
            revision,
            username: user.username,
            email: user.email,
            created_at: DateTime::from_system_time(user.created_at),
        }
    }
}

impl From<MongoUserDocument> for UserEntity {
    fn from(value: MongoUserDocument) -> Self {
        Self {
            user_id: value.id,
            username: value.username,
            email: value.email,
            created_at: value.created_at.to_system_time(),
        }
    }
}

impl From<(UsernameEntity, i64)> for MongoUsernameDocument {
    fn from((claim, revision): (UsernameEntity, i64)) -> Self {
        Self {
            username: claim.username,
            revision,
            user_id: claim.user_id,
        }
    }
}

impl From<MongoUsernameDocument> for UsernameEntity {
    fn from(value: MongoUsernameDocument) -> Self {
        Self {
            username: value.username,
            user_id: value.user_id,
        }
    }
}

pub fn rating_id(user_id: &UserId, game_type: GameType) -> String {
    format!("{user_id}::{}", game_type.as_str())
}

pub fn doc_id(id: &str) -> Document {
    doc! {"_id": id}
}

/// Filter matching `id` only while it is still at `revision`.
pub fn doc_at_revision(id: &str, revision: i64) -> Document {
    doc! {"_id": id, "revision": revision}
}
