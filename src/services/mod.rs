/// Game lifecycle coordination: create, join, move, abort.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Credential verification and caller resolution.
pub mod identity_service;
/// Elo rating computation and persistence.
pub mod rating_service;
/// Storage connection supervisor with degraded-mode toggling.
pub mod storage_supervisor;
/// Per-connection move subscriptions.
pub mod subscription_service;
/// Player profiles and usernames.
pub mod user_service;

#[cfg(test)]
pub(crate) mod test_support;
