//! OAuth state management for CSRF protection.
//!
//! Tracks the `state` parameter issued at login so the callback can verify
//! the round-trip actually started here. States are single-use and expire.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// OAuth state manager with automatic expiration
#[derive(Clone)]
pub struct StateManager {
    states: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
    expiry_duration: Duration,
}

impl StateManager {
    /// Create a new state manager
    ///
    /// # Arguments
    /// * `expiry_seconds` - How long states remain valid (default: 600 = 10 minutes)
    pub fn new(expiry_seconds: i64) -> Self {
        Self {
            states: Arc::new(Mutex::new(HashMap::new())),
            expiry_duration: Duration::seconds(expiry_seconds),
        }
    }

    /// Generate a new state token and store it
    ///
    /// Returns the state token (UUID v4)
    pub fn create_state(&self) -> String {
        let state = Uuid::new_v4().to_string();

        let mut states = self.states.lock().unwrap();
        states.insert(state.clone(), Utc::now());

        state
    }

    /// Validate and consume a state token
    ///
    /// Returns true if the state was issued here and has not expired.
    /// The state is removed from the map (single-use).
    pub fn validate_and_consume(&self, state: &str) -> bool {
        let mut states = self.states.lock().unwrap();

        let Some(created_at) = states.remove(state) else {
            return false;
        };

        Utc::now() - created_at <= self.expiry_duration
    }

    /// Clean up expired states (should be called periodically)
    pub fn cleanup_expired(&self) {
        let mut states = self.states.lock().unwrap();
        let now = Utc::now();

        states.retain(|_, created_at| now - *created_at <= self.expiry_duration);
    }

    /// Get count of active states (for debugging/monitoring)
    pub fn count(&self) -> usize {
        self.states.lock().unwrap().len()
    }
}

/// Background task to periodically clean up expired states
pub async fn run_state_cleanup(manager: StateManager, interval_seconds: u64) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_seconds));

    loop {
        interval.tick().await;
        manager.cleanup_expired();
        tracing::debug!(
            "OAuth state cleanup complete, {} states remaining",
            manager.count()
        );
    }
}
