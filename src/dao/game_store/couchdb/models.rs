use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    dao::models::{GameEntity, RatingEntity, UserEntity, UsernameEntity},
    state::game::{GameId, GameType, UserId},
};

pub const GAME_PREFIX: &str = "game::";
pub const RATING_PREFIX: &str = "rating::";
pub const USER_PREFIX: &str = "user::";
pub const USERNAME_PREFIX: &str = "username::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Body CouchDB returns after a successful `PUT`.
#[derive(Debug, Deserialize)]
pub struct PutResponse {
    pub rev: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchGameDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub game: GameEntity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchRatingDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub rating: RatingEntity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchUserDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub user: UserEntity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchUsernameDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub claim: UsernameEntity,
}

impl From<(GameEntity, Option<String>)> for CouchGameDocument {
    fn from((game, rev): (GameEntity, Option<String>)) -> Self {
        Self {
            id: game_doc_id(&game.id),
            rev,
            game,
        }
    }
}

impl From<(RatingEntity, Option<String>)> for CouchRatingDocument {
    fn from((rating, rev): (RatingEntity, Option<String>)) -> Self {
        Self {
            id: rating_doc_id(&rating.user_id, rating.game_type),
            rev,
            rating,
        }
    }
}

impl From<UserEntity> for CouchUserDocument {
    fn from(user: UserEntity) -> Self {
        Self {
            id: user_doc_id(&user.user_id),
            rev: None,
            user,
        }
    }
}

impl From<UsernameEntity> for CouchUsernameDocument {
    fn from(claim: UsernameEntity) -> Self {
        Self {
            id: username_doc_id(&claim.username),
            rev: None,
            claim,
        }
    }
}

pub fn game_doc_id(id: &GameId) -> String {
    format!("{GAME_PREFIX}{id}")
}

/// Prefix shared by every rating document of `user_id`.
pub fn user_rating_prefix(user_id: &UserId) -> String {
    format!("{RATING_PREFIX}{user_id}::")
}

pub fn rating_doc_id(user_id: &UserId, game_type: GameType) -> String {
    format!("{}{}", user_rating_prefix(user_id), game_type.as_str())
}

pub fn user_doc_id(user_id: &UserId) -> String {
    format!("{USER_PREFIX}{user_id}")
}

/// Usernames are hex-encoded so any accepted name stays a single path segment.
pub fn username_doc_id(username: &str) -> String {
    let hex: String = username.bytes().map(|byte| format!("{byte:02x}")).collect();
    format!("{USERNAME_PREFIX}{hex}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_ids_share_user_prefix() {
        let user = UserId::from_subject("abc");
        let id = rating_doc_id(&user, GameType::Shogi);
        assert_eq!(id, "rating::iusrabc::shogi");
        assert!(id.starts_with(&user_rating_prefix(&user)));
    }

    #[test]
    fn fresh_user_document_carries_no_revision() {
        let doc = CouchUserDocument::from(UserEntity {
            user_id: UserId::from_subject("abc"),
            username: Some("abc".into()),
            email: None,
            created_at: std::time::SystemTime::UNIX_EPOCH,
        });
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["_id"], "user::iusrabc");
        assert!(json.get("_rev").is_none());
        assert_eq!(json["username"], "abc");
    }

    #[test]
    fn username_ids_are_path_safe() {
        assert_eq!(username_doc_id("a/b"), "username::612f62");
    }
}
