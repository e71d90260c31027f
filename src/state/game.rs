//! Domain model of a match: identifiers, seats, moves, outcomes and the pure
//! rules guarding every state transition of a [`Game`].

use std::{fmt, time::SystemTime};

use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::ValidationError;

use crate::dto::validation::validate_move_notation;

const GAME_ID_PREFIX: &str = "igam";
const USER_ID_PREFIX: &str = "iusr";
const GAME_ID_SUFFIX_LEN: usize = 32;

/// Raised when a client supplied identifier does not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{raw}` is not a valid {kind} id")]
pub struct IdError {
    kind: &'static str,
    raw: String,
}

/// Opaque game identifier (`igam` followed by 32 alphanumerics).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(String);

impl GameId {
    /// Allocate a fresh random identifier.
    pub fn generate() -> Self {
        let suffix: String = rand::rng()
            .sample_iter(Alphanumeric)
            .take(GAME_ID_SUFFIX_LEN)
            .map(char::from)
            .collect();
        Self(format!("{GAME_ID_PREFIX}{suffix}"))
    }

    /// Parse an identifier received from a client.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        let valid = raw
            .strip_prefix(GAME_ID_PREFIX)
            .is_some_and(|suffix| {
                suffix.len() == GAME_ID_SUFFIX_LEN
                    && suffix.chars().all(|c| c.is_ascii_alphanumeric())
            });

        if valid {
            Ok(Self(raw.to_owned()))
        } else {
            Err(IdError {
                kind: "game",
                raw: raw.to_owned(),
            })
        }
    }

    /// Identifier as stored and sent to clients.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable user identifier derived from the identity provider's subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Build the identifier for a verified identity provider subject.
    pub fn from_subject(subject: &str) -> Self {
        Self(format!("{USER_ID_PREFIX}{subject}"))
    }

    /// Parse an identifier received from a client.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        let valid = raw.strip_prefix(USER_ID_PREFIX).is_some_and(|subject| {
            !subject.is_empty() && subject.chars().all(|c| c.is_ascii_graphic())
        });

        if valid {
            Ok(Self(raw.to_owned()))
        } else {
            Err(IdError {
                kind: "user",
                raw: raw.to_owned(),
            })
        }
    }

    /// Identifier as stored and sent to clients.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Supported board game variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Janggi,
    Shogi,
}

impl GameType {
    /// Every variant, in display order.
    pub const ALL: [GameType; 2] = [GameType::Janggi, GameType::Shogi];

    /// Lowercase variant name used in logs and storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            GameType::Janggi => "janggi",
            GameType::Shogi => "shogi",
        }
    }
}

/// Per-player clock presets, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum TimeLimit {
    Bullet,
    Blitz,
    Blitz2,
    Rapid,
    Rapid2,
    Rapid3,
    Rapid4,
}

impl TimeLimit {
    pub fn minutes(&self) -> u16 {
        match self {
            TimeLimit::Bullet => 1,
            TimeLimit::Blitz => 3,
            TimeLimit::Blitz2 => 5,
            TimeLimit::Rapid => 10,
            TimeLimit::Rapid2 => 15,
            TimeLimit::Rapid3 => 20,
            TimeLimit::Rapid4 => 30,
        }
    }
}

impl From<TimeLimit> for u16 {
    fn from(value: TimeLimit) -> Self {
        value.minutes()
    }
}

impl TryFrom<u16> for TimeLimit {
    type Error = String;

    fn try_from(minutes: u16) -> Result<Self, Self::Error> {
        match minutes {
            1 => Ok(TimeLimit::Bullet),
            3 => Ok(TimeLimit::Blitz),
            5 => Ok(TimeLimit::Blitz2),
            10 => Ok(TimeLimit::Rapid),
            15 => Ok(TimeLimit::Rapid2),
            20 => Ok(TimeLimit::Rapid3),
            30 => Ok(TimeLimit::Rapid4),
            other => Err(format!("unsupported time limit of {other} minutes")),
        }
    }
}

/// Board move written as two coordinate pairs, e.g. `a1a2` or `e10e9`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MoveNotation(String);

impl MoveNotation {
    /// Validate raw client input against the board coordinate pattern.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        validate_move_notation(raw)?;
        Ok(Self(raw.to_owned()))
    }

    /// Notation as submitted, e.g. `e10e9`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MoveNotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A committed ply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Move {
    pub notation: MoveNotation,
    pub played_at: SystemTime,
}

/// A committed ply together with its position in the game, as pushed to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayedMove {
    /// Zero-based index of the move in the game's sequence.
    pub ply: usize,
    pub notation: MoveNotation,
    pub played_at: SystemTime,
}

/// One of the two player slots of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seat {
    One,
    Two,
}

impl Seat {
    /// Uniform 50/50 pick, used to seat a game's creator.
    pub fn random() -> Self {
        if rand::rng().random_bool(0.5) {
            Seat::One
        } else {
            Seat::Two
        }
    }

    pub fn other(self) -> Self {
        match self {
            Seat::One => Seat::Two,
            Seat::Two => Seat::One,
        }
    }

    /// Seat expected to play after `move_count` committed moves.
    pub fn to_move(move_count: usize) -> Self {
        if move_count % 2 == 0 {
            Seat::One
        } else {
            Seat::Two
        }
    }
}

/// Status reported by the player submitting a move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Outcome {
    #[default]
    InProgress,
    Win,
    Loss,
    Draw,
    Aborted,
}

/// Result of a finished match from one participant's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    Win,
    Loss,
    Draw,
}

impl MatchResult {
    /// The same result seen from the opponent's side.
    pub fn reversed(self) -> Self {
        match self {
            MatchResult::Win => MatchResult::Loss,
            MatchResult::Loss => MatchResult::Win,
            MatchResult::Draw => MatchResult::Draw,
        }
    }
}

/// Rating work owed once a terminal outcome has been committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub game_type: GameType,
    /// Player who reported the outcome.
    pub reporter: UserId,
    pub opponent: UserId,
    /// Result from the reporter's point of view.
    pub result: MatchResult,
}

/// Externally visible lifecycle phase of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    /// Waiting for a second player.
    Created,
    /// Both seats filled, moves accepted.
    InProgress,
    Won,
    Drawn,
    Aborted,
}

/// Rejections raised by [`Game::join`] and [`Game::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("move not allowed: the game is over")]
    GameOver,
    #[error("move not allowed: user is not seated in this game")]
    NotSeated,
    #[error("move not allowed: waiting for an opponent to join")]
    AwaitingOpponent,
    #[error("move not allowed: it is not your turn")]
    OutOfTurn,
    #[error("nothing to apply: a move or a final status is required")]
    NothingToApply,
    #[error("game was aborted")]
    Aborted,
    #[error("game cannot be joined: user is already seated")]
    AlreadySeated,
    #[error("game cannot be joined")]
    Full,
}

/// What a successful [`Game::apply`] changed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppliedTransition {
    pub appended: Option<PlayedMove>,
    pub settlement: Option<Settlement>,
}

/// A single match between two seats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    pub id: GameId,
    pub player_one: Option<UserId>,
    pub player_two: Option<UserId>,
    pub moves: Vec<Move>,
    pub winner: Option<UserId>,
    pub draw: bool,
    pub aborted: bool,
    pub game_type: GameType,
    pub time_limit: TimeLimit,
    pub created_at: SystemTime,
}

impl Game {
    /// New game with `creator` occupying `seat` and the other seat empty.
    pub fn new(
        id: GameId,
        creator: UserId,
        seat: Seat,
        game_type: GameType,
        time_limit: TimeLimit,
        created_at: SystemTime,
    ) -> Self {
        let (player_one, player_two) = match seat {
            Seat::One => (Some(creator), None),
            Seat::Two => (None, Some(creator)),
        };

        Self {
            id,
            player_one,
            player_two,
            moves: Vec::new(),
            winner: None,
            draw: false,
            aborted: false,
            game_type,
            time_limit,
            created_at,
        }
    }

    /// Moves are accepted only while no terminal flag is set.
    pub fn is_live(&self) -> bool {
        !self.aborted && !self.draw && self.winner.is_none()
    }

    pub fn phase(&self) -> GamePhase {
        if self.aborted {
            GamePhase::Aborted
        } else if self.draw {
            GamePhase::Drawn
        } else if self.winner.is_some() {
            GamePhase::Won
        } else if self.player_one.is_some() && self.player_two.is_some() {
            GamePhase::InProgress
        } else {
            GamePhase::Created
        }
    }

    pub fn player(&self, seat: Seat) -> Option<&UserId> {
        match seat {
            Seat::One => self.player_one.as_ref(),
            Seat::Two => self.player_two.as_ref(),
        }
    }

    pub fn seat_of(&self, user: &UserId) -> Option<Seat> {
        if self.player_one.as_ref() == Some(user) {
            Some(Seat::One)
        } else if self.player_two.as_ref() == Some(user) {
            Some(Seat::Two)
        } else {
            None
        }
    }

    pub fn next_to_move(&self) -> Seat {
        Seat::to_move(self.moves.len())
    }

    /// Moves annotated with their ply, oldest first.
    pub fn played_moves(&self) -> impl Iterator<Item = PlayedMove> + '_ {
        self.moves.iter().enumerate().map(|(ply, mv)| PlayedMove {
            ply,
            notation: mv.notation.clone(),
            played_at: mv.played_at,
        })
    }

    /// Seat `user` in the first free slot.
    pub fn join(&mut self, user: &UserId) -> Result<Seat, TransitionError> {
        if self.aborted {
            return Err(TransitionError::Aborted);
        }
        if !self.is_live() {
            return Err(TransitionError::GameOver);
        }
        if self.seat_of(user).is_some() {
            return Err(TransitionError::AlreadySeated);
        }

        if self.player_one.is_none() {
            self.player_one = Some(user.clone());
            Ok(Seat::One)
        } else if self.player_two.is_none() {
            self.player_two = Some(user.clone());
            Ok(Seat::Two)
        } else {
            Err(TransitionError::Full)
        }
    }

    /// Apply a move and/or a reported outcome on behalf of `user`.
    ///
    /// Either every change is applied or, on error, the game is left untouched.
    /// Every submission requires the player's turn. A bare abort may happen
    /// before the second seat is filled; anything else requires both seats.
    pub fn apply(
        &mut self,
        user: &UserId,
        notation: Option<&MoveNotation>,
        outcome: Outcome,
        now: SystemTime,
    ) -> Result<AppliedTransition, TransitionError> {
        if !self.is_live() {
            return Err(TransitionError::GameOver);
        }
        let seat = self.seat_of(user).ok_or(TransitionError::NotSeated)?;

        if notation.is_none() && outcome == Outcome::InProgress {
            return Err(TransitionError::NothingToApply);
        }

        let opponent = self.player(seat.other()).cloned();
        let abort_only = notation.is_none() && outcome == Outcome::Aborted;
        if opponent.is_none() && !abort_only {
            return Err(TransitionError::AwaitingOpponent);
        }
        if self.next_to_move() != seat {
            return Err(TransitionError::OutOfTurn);
        }

        let appended = notation.map(|notation| {
            let played = PlayedMove {
                ply: self.moves.len(),
                notation: notation.clone(),
                played_at: now,
            };
            self.moves.push(Move {
                notation: notation.clone(),
                played_at: now,
            });
            played
        });

        let settle = |result: MatchResult, opponent: Option<UserId>| {
            opponent.map(|opponent| Settlement {
                game_type: self.game_type,
                reporter: user.clone(),
                opponent,
                result,
            })
        };

        let settlement = match outcome {
            Outcome::InProgress => None,
            Outcome::Win => {
                let settlement = settle(MatchResult::Win, opponent);
                self.winner = Some(user.clone());
                settlement
            }
            Outcome::Loss => {
                let settlement = settle(MatchResult::Loss, opponent.clone());
                self.winner = opponent;
                settlement
            }
            Outcome::Draw => {
                let settlement = settle(MatchResult::Draw, opponent);
                self.draw = true;
                settlement
            }
            Outcome::Aborted => {
                self.aborted = true;
                None
            }
        };

        Ok(AppliedTransition {
            appended,
            settlement,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> UserId {
        UserId::from_subject(name)
    }

    fn notation(raw: &str) -> MoveNotation {
        MoveNotation::parse(raw).unwrap()
    }

    fn ready_game() -> Game {
        let mut game = Game::new(
            GameId::generate(),
            user("alice"),
            Seat::One,
            GameType::Janggi,
            TimeLimit::Rapid,
            SystemTime::now(),
        );
        game.join(&user("bob")).unwrap();
        game
    }

    fn terminal_flags(game: &Game) -> usize {
        [game.draw, game.aborted, game.winner.is_some()]
            .into_iter()
            .filter(|flag| *flag)
            .count()
    }

    #[test]
    fn generated_game_ids_parse_back() {
        let id = GameId::generate();
        assert_eq!(GameId::parse(id.as_str()).unwrap(), id);
        assert!(GameId::parse("igam123").is_err());
        assert!(GameId::parse("iusrAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA").is_err());
    }

    #[test]
    fn user_ids_carry_prefix() {
        let id = UserId::from_subject("abc123");
        assert_eq!(id.as_str(), "iusrabc123");
        assert_eq!(UserId::parse("iusrabc123").unwrap(), id);
        assert!(UserId::parse("iusr").is_err());
        assert!(UserId::parse("abc123").is_err());
    }

    #[test]
    fn time_limits_map_to_minutes() {
        for limit in [
            TimeLimit::Bullet,
            TimeLimit::Blitz,
            TimeLimit::Blitz2,
            TimeLimit::Rapid,
            TimeLimit::Rapid2,
            TimeLimit::Rapid3,
            TimeLimit::Rapid4,
        ] {
            assert_eq!(TimeLimit::try_from(limit.minutes()).unwrap(), limit);
        }
        assert!(TimeLimit::try_from(7).is_err());
    }

    #[test]
    fn creator_occupies_requested_seat() {
        let game = Game::new(
            GameId::generate(),
            user("alice"),
            Seat::Two,
            GameType::Shogi,
            TimeLimit::Blitz,
            SystemTime::now(),
        );
        assert_eq!(game.player_one, None);
        assert_eq!(game.player_two, Some(user("alice")));
        assert_eq!(game.phase(), GamePhase::Created);
    }

    #[test]
    fn join_fills_empty_seat_then_rejects() {
        let mut game = Game::new(
            GameId::generate(),
            user("alice"),
            Seat::Two,
            GameType::Janggi,
            TimeLimit::Rapid,
            SystemTime::now(),
        );

        assert_eq!(game.join(&user("bob")), Ok(Seat::One));
        assert_eq!(game.phase(), GamePhase::InProgress);

        let before = game.clone();
        assert_eq!(game.join(&user("carol")), Err(TransitionError::Full));
        assert_eq!(game, before);
    }

    #[test]
    fn join_rejects_seated_user_and_aborted_game() {
        let mut game = Game::new(
            GameId::generate(),
            user("alice"),
            Seat::One,
            GameType::Janggi,
            TimeLimit::Rapid,
            SystemTime::now(),
        );
        assert_eq!(
            game.join(&user("alice")),
            Err(TransitionError::AlreadySeated)
        );

        game.apply(&user("alice"), None, Outcome::Aborted, SystemTime::now())
            .unwrap();
        assert_eq!(game.join(&user("bob")), Err(TransitionError::Aborted));
        assert_eq!(game.player_two, None);
    }

    #[test]
    fn moves_alternate_by_parity() {
        let mut game = ready_game();
        let now = SystemTime::now();

        assert_eq!(
            game.apply(&user("bob"), Some(&notation("a1a2")), Outcome::InProgress, now),
            Err(TransitionError::OutOfTurn)
        );

        let applied = game
            .apply(&user("alice"), Some(&notation("a1a2")), Outcome::InProgress, now)
            .unwrap();
        assert_eq!(applied.appended.unwrap().ply, 0);
        assert_eq!(game.next_to_move(), Seat::Two);

        assert_eq!(
            game.apply(&user("alice"), Some(&notation("b1b2")), Outcome::InProgress, now),
            Err(TransitionError::OutOfTurn)
        );

        let applied = game
            .apply(&user("bob"), Some(&notation("i10i9")), Outcome::InProgress, now)
            .unwrap();
        assert_eq!(applied.appended.unwrap().ply, 1);
        assert_eq!(game.moves.len(), 2);
        assert_eq!(game.next_to_move(), Seat::One);
    }

    #[test]
    fn outsider_cannot_move_or_mutate() {
        let mut game = ready_game();
        let before = game.clone();

        let err = game
            .apply(
                &user("mallory"),
                Some(&notation("a1a2")),
                Outcome::Win,
                SystemTime::now(),
            )
            .unwrap_err();

        assert_eq!(err, TransitionError::NotSeated);
        assert_eq!(game, before);
    }

    #[test]
    fn moves_wait_for_opponent() {
        let mut game = Game::new(
            GameId::generate(),
            user("alice"),
            Seat::One,
            GameType::Janggi,
            TimeLimit::Rapid,
            SystemTime::now(),
        );
        assert_eq!(
            game.apply(
                &user("alice"),
                Some(&notation("a1a2")),
                Outcome::InProgress,
                SystemTime::now()
            ),
            Err(TransitionError::AwaitingOpponent)
        );
        assert!(game.moves.is_empty());
    }

    #[test]
    fn win_sets_winner_and_settlement() {
        let mut game = ready_game();
        let now = SystemTime::now();
        game.apply(&user("alice"), Some(&notation("a1a2")), Outcome::InProgress, now)
            .unwrap();

        let applied = game
            .apply(&user("bob"), Some(&notation("a1a2")), Outcome::Win, now)
            .unwrap();

        assert_eq!(game.winner, Some(user("bob")));
        assert_eq!(game.phase(), GamePhase::Won);
        assert_eq!(game.moves.len(), 2);
        assert_eq!(
            applied.settlement,
            Some(Settlement {
                game_type: GameType::Janggi,
                reporter: user("bob"),
                opponent: user("alice"),
                result: MatchResult::Win,
            })
        );
    }

    #[test]
    fn loss_crowns_the_opponent() {
        let mut game = ready_game();
        let applied = game
            .apply(&user("alice"), None, Outcome::Loss, SystemTime::now())
            .unwrap();

        assert_eq!(game.winner, Some(user("bob")));
        assert!(applied.appended.is_none());
        assert_eq!(applied.settlement.unwrap().result, MatchResult::Loss);
    }

    #[test]
    fn terminal_state_is_absorbing() {
        let mut game = ready_game();
        let now = SystemTime::now();
        game.apply(&user("alice"), None, Outcome::Draw, now).unwrap();
        assert_eq!(terminal_flags(&game), 1);

        let before = game.clone();
        for outcome in [
            Outcome::InProgress,
            Outcome::Win,
            Outcome::Loss,
            Outcome::Draw,
            Outcome::Aborted,
        ] {
            for player in ["alice", "bob"] {
                let err = game
                    .apply(&user(player), Some(&notation("a1a2")), outcome, now)
                    .unwrap_err();
                assert_eq!(err, TransitionError::GameOver);
            }
        }
        assert_eq!(game, before);
        assert_eq!(terminal_flags(&game), 1);
    }

    #[test]
    fn abort_requires_the_turn() {
        let mut game = ready_game();
        assert_eq!(
            game.apply(&user("bob"), None, Outcome::Aborted, SystemTime::now()),
            Err(TransitionError::OutOfTurn)
        );
        assert!(game.is_live());

        let applied = game
            .apply(&user("alice"), None, Outcome::Aborted, SystemTime::now())
            .unwrap();
        assert!(game.aborted);
        assert_eq!(applied, AppliedTransition::default());
        assert_eq!(game.phase(), GamePhase::Aborted);
    }

    #[test]
    fn empty_submission_is_rejected() {
        let mut game = ready_game();
        assert_eq!(
            game.apply(&user("alice"), None, Outcome::InProgress, SystemTime::now()),
            Err(TransitionError::NothingToApply)
        );
    }
}
