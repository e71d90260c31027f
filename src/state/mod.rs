/// Game rules and identifiers.
pub mod game;
/// Move fan-out to subscribed players.
pub mod registry;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::{game_store::GameStore, transaction::TransactionRunner},
    error::ServiceError,
    services::identity_service::IdentityVerifier,
};

pub use self::registry::MoveBroadcastRegistry;

/// Handle to [`AppState`] shared by routes, resolvers and background tasks.
pub type SharedState = Arc<AppState>;

/// Central application state storing live subscriptions and database handles.
pub struct AppState {
    game_store: RwLock<Option<Arc<dyn GameStore>>>,
    degraded: watch::Sender<bool>,
    moves: MoveBroadcastRegistry,
    identity: Arc<dyn IdentityVerifier>,
    transactions: TransactionRunner,
    config: AppConfig,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, identity: Arc<dyn IdentityVerifier>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            game_store: RwLock::new(None),
            degraded: degraded_tx,
            moves: MoveBroadcastRegistry::new(),
            identity,
            transactions: TransactionRunner::new(config.transaction_max_attempts),
            config,
        })
    }

    /// Obtain a handle to the current game store, if one is installed.
    pub async fn game_store(&self) -> Option<Arc<dyn GameStore>> {
        let guard = self.game_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current game store, or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_game_store(&self) -> Result<Arc<dyn GameStore>, ServiceError> {
        self.game_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new game store implementation and leave degraded mode.
    pub async fn install_game_store(&self, store: Arc<dyn GameStore>) {
        {
            let mut guard = self.game_store.write().await;
            *guard = Some(store);
        }
        self.set_degraded(false);
    }

    /// Remove the current game store and enter degraded mode.
    pub async fn clear_game_store(&self) {
        {
            let mut guard = self.game_store.write().await;
            guard.take();
        }
        self.set_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Registry of players currently watching games.
    pub fn moves(&self) -> &MoveBroadcastRegistry {
        &self.moves
    }

    /// Verifier turning credentials into callers.
    pub fn identity(&self) -> &Arc<dyn IdentityVerifier> {
        &self.identity
    }

    /// Retry policy for optimistic transactions.
    pub fn transactions(&self) -> &TransactionRunner {
        &self.transactions
    }

    /// Configuration loaded at startup.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Broadcast the degraded flag when the value changes.
    ///
    /// The installed store is kept; callers still reach it and see its errors.
    pub fn set_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });
    }
}
