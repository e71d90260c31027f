use serde::Serialize;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Games with at least one live move subscription.
    pub watched_games: usize,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(watched_games: usize) -> Self {
        Self {
            status: "ok".to_string(),
            watched_games,
        }
    }

    /// Create a health response indicating the system is in degraded mode.
    pub fn degraded(watched_games: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            watched_games,
        }
    }
}
