/// Game and rating persistence backends.
pub mod game_store;
/// Database model definitions.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
/// Optimistic read-modify-write transactions.
pub mod transaction;
