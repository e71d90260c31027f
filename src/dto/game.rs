//! GraphQL views of games, moves and users.

use async_graphql::{Context, Enum, Object, Result, SimpleObject};
use serde::Serialize;

use crate::{
    dao::models::UserEntity,
    dto::format_system_time,
    error::ServiceError,
    schema::{current_caller, graphql_error, shared_state},
    services::{rating_service, user_service},
    state::game::{Game, GamePhase, GameType, Outcome, PlayedMove, TimeLimit, UserId},
};

/// HTTP-like status code reported on successful mutations.
const MUTATION_OK: i32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
#[graphql(name = "GameType")]
pub enum GameTypeDto {
    Janggi,
    Shogi,
}

impl From<GameTypeDto> for GameType {
    fn from(value: GameTypeDto) -> Self {
        match value {
            GameTypeDto::Janggi => GameType::Janggi,
            GameTypeDto::Shogi => GameType::Shogi,
        }
    }
}

impl From<GameType> for GameTypeDto {
    fn from(value: GameType) -> Self {
        match value {
            GameType::Janggi => GameTypeDto::Janggi,
            GameType::Shogi => GameTypeDto::Shogi,
        }
    }
}

/// Clock allowance per player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
#[graphql(name = "TimeLimit")]
pub enum TimeLimitDto {
    /// 1 minute.
    #[graphql(name = "BULLET")]
    Bullet,
    /// 3 minutes.
    #[graphql(name = "BLITZ")]
    Blitz,
    /// 5 minutes.
    #[graphql(name = "BLITZ2")]
    Blitz2,
    /// 10 minutes.
    #[graphql(name = "RAPID")]
    Rapid,
    /// 15 minutes.
    #[graphql(name = "RAPID2")]
    Rapid2,
    /// 20 minutes.
    #[graphql(name = "RAPID3")]
    Rapid3,
    /// 30 minutes.
    #[graphql(name = "RAPID4")]
    Rapid4,
}

impl From<TimeLimitDto> for TimeLimit {
    fn from(value: TimeLimitDto) -> Self {
        match value {
            TimeLimitDto::Bullet => TimeLimit::Bullet,
            TimeLimitDto::Blitz => TimeLimit::Blitz,
            TimeLimitDto::Blitz2 => TimeLimit::Blitz2,
            TimeLimitDto::Rapid => TimeLimit::Rapid,
            TimeLimitDto::Rapid2 => TimeLimit::Rapid2,
            TimeLimitDto::Rapid3 => TimeLimit::Rapid3,
            TimeLimitDto::Rapid4 => TimeLimit::Rapid4,
        }
    }
}

/// Status a player reports alongside a move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Enum)]
#[graphql(name = "GameStatus")]
pub enum GameStatusDto {
    #[default]
    InProgress,
    Win,
    Loss,
    Draw,
    Aborted,
}

impl From<GameStatusDto> for Outcome {
    fn from(value: GameStatusDto) -> Self {
        match value {
            GameStatusDto::InProgress => Outcome::InProgress,
            GameStatusDto::Win => Outcome::Win,
            GameStatusDto::Loss => Outcome::Loss,
            GameStatusDto::Draw => Outcome::Draw,
            GameStatusDto::Aborted => Outcome::Aborted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
#[graphql(name = "GamePhase")]
pub enum GamePhaseDto {
    Created,
    InProgress,
    Won,
    Drawn,
    Aborted,
}

impl From<GamePhase> for GamePhaseDto {
    fn from(value: GamePhase) -> Self {
        match value {
            GamePhase::Created => GamePhaseDto::Created,
            GamePhase::InProgress => GamePhaseDto::InProgress,
            GamePhase::Won => GamePhaseDto::Won,
            GamePhase::Drawn => GamePhaseDto::Drawn,
            GamePhase::Aborted => GamePhaseDto::Aborted,
        }
    }
}

/// A committed move, as returned by queries and pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, SimpleObject)]
#[graphql(name = "Move")]
pub struct MoveView {
    #[graphql(name = "move")]
    #[serde(rename = "move")]
    pub notation: String,
    /// Zero-based position in the game's move sequence.
    pub ply: i32,
    /// RFC 3339 commit time.
    pub timestamp: String,
}

impl From<PlayedMove> for MoveView {
    fn from(value: PlayedMove) -> Self {
        Self {
            notation: value.notation.to_string(),
            ply: i32::try_from(value.ply).unwrap_or(i32::MAX),
            timestamp: format_system_time(value.played_at),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, SimpleObject)]
#[graphql(name = "Elo")]
pub struct EloView {
    pub janggi: i32,
    pub shogi: i32,
}

/// A player; profile and ratings are resolved lazily.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserView {
    id: UserId,
}

impl UserView {
    pub fn new(id: UserId) -> Self {
        Self { id }
    }

    async fn profile(&self, ctx: &Context<'_>) -> Result<Option<UserEntity>> {
        let state = shared_state(ctx)?;
        user_service::resolve_user(state, &self.id, current_caller(ctx))
            .await
            .map_err(graphql_error)
    }
}

#[Object(name = "User")]
impl UserView {
    async fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Whether a profile exists. Looking up yourself creates it.
    async fn exists(&self, ctx: &Context<'_>) -> Result<bool> {
        Ok(self.profile(ctx).await?.is_some())
    }

    /// Unique handle derived from the email the profile was created with.
    async fn username(&self, ctx: &Context<'_>) -> Result<Option<String>> {
        Ok(self.profile(ctx).await?.and_then(|user| user.username))
    }

    /// Current rating per variant; 1200 for variants never played.
    async fn elo(&self, ctx: &Context<'_>) -> Result<EloView> {
        let state = shared_state(ctx)?;
        let ratings = rating_service::ratings_for(state, &self.id)
            .await
            .map_err(graphql_error)?;
        let rating = |game_type: GameType| {
            ratings
                .get(&game_type)
                .copied()
                .ok_or_else(|| ServiceError::Internal(format!("no {} rating", game_type.as_str())))
        };
        Ok(EloView {
            janggi: rating(GameType::Janggi).map_err(graphql_error)?,
            shogi: rating(GameType::Shogi).map_err(graphql_error)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameView(Game);

impl From<Game> for GameView {
    fn from(value: Game) -> Self {
        Self(value)
    }
}

#[Object(name = "Game")]
impl GameView {
    async fn id(&self) -> &str {
        self.0.id.as_str()
    }

    async fn moves(&self) -> Vec<MoveView> {
        self.0.played_moves().map(MoveView::from).collect()
    }

    async fn player_one(&self) -> Option<UserView> {
        self.0.player_one.clone().map(UserView::new)
    }

    async fn player_two(&self) -> Option<UserView> {
        self.0.player_two.clone().map(UserView::new)
    }

    async fn winner(&self) -> Option<UserView> {
        self.0.winner.clone().map(UserView::new)
    }

    async fn draw(&self) -> bool {
        self.0.draw
    }

    async fn aborted(&self) -> bool {
        self.0.aborted
    }

    #[graphql(name = "type")]
    async fn game_type(&self) -> GameTypeDto {
        self.0.game_type.into()
    }

    /// Minutes per player.
    async fn time_limit(&self) -> i32 {
        i32::from(self.0.time_limit.minutes())
    }

    /// RFC 3339 creation time.
    async fn timestamp(&self) -> String {
        format_system_time(self.0.created_at)
    }

    async fn phase(&self) -> GamePhaseDto {
        self.0.phase().into()
    }
}

/// Envelope returned by every game mutation.
#[derive(Debug, Clone, SimpleObject)]
pub struct GameMutationResponse {
    pub code: i32,
    pub success: bool,
    pub message: String,
    pub game: GameView,
}

impl GameMutationResponse {
    pub fn ok(message: &str, game: Game) -> Self {
        Self {
            code: MUTATION_OK,
            success: true,
            message: message.to_owned(),
            game: game.into(),
        }
    }
}
