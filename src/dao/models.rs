use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::state::game::{Game, GameId, GameType, Move, MoveNotation, TimeLimit, UserId};

/// Representation of a game stored in persistence and shared across layers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameEntity {
    /// Stable identifier for the game.
    pub id: GameId,
    pub player_one: Option<UserId>,
    pub player_two: Option<UserId>,
    /// Committed moves, oldest first.
    pub moves: Vec<MoveEntity>,
    pub winner: Option<UserId>,
    pub draw: bool,
    pub aborted: bool,
    pub game_type: GameType,
    pub time_limit: TimeLimit,
    pub created_at: SystemTime,
    /// Last time this document was written.
    pub updated_at: SystemTime,
}

/// A single committed move.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MoveEntity {
    pub notation: MoveNotation,
    pub played_at: SystemTime,
}

/// Rating of one user for one game variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RatingEntity {
    pub user_id: UserId,
    pub game_type: GameType,
    pub rating: i32,
    pub updated_at: SystemTime,
}

/// Profile of a player, created the first time they look themselves up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserEntity {
    pub user_id: UserId,
    /// Unique handle derived from the email; absent when none could be derived.
    pub username: Option<String>,
    pub email: Option<String>,
    pub created_at: SystemTime,
}

/// Reservation of a username by the user holding it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsernameEntity {
    pub username: String,
    pub user_id: UserId,
}

impl From<Game> for GameEntity {
    fn from(game: Game) -> Self {
        Self {
            id: game.id,
            player_one: game.player_one,
            player_two: game.player_two,
            moves: game
                .moves
                .into_iter()
                .map(|mv| MoveEntity {
                    notation: mv.notation,
                    played_at: mv.played_at,
                })
                .collect(),
            winner: game.winner,
            draw: game.draw,
            aborted: game.aborted,
            game_type: game.game_type,
            time_limit: game.time_limit,
            created_at: game.created_at,
            updated_at: SystemTime::now(),
        }
    }
}

impl From<GameEntity> for Game {
    fn from(entity: GameEntity) -> Self {
        Self {
            id: entity.id,
            player_one: entity.player_one,
            player_two: entity.player_two,
            moves: entity
                .moves
                .into_iter()
                .map(|mv| Move {
                    notation: mv.notation,
                    played_at: mv.played_at,
                })
                .collect(),
            winner: entity.winner,
            draw: entity.draw,
            aborted: entity.aborted,
            game_type: entity.game_type,
            time_limit: entity.time_limit,
            created_at: entity.created_at,
        }
    }
}
