//! Session-scoped selection
//!
//! Picks only live for one interactive session. The guard clears them when
//! the session ends; a failure there is logged and never propagated.

use paperbot_common::db::Repository;
use tracing::{info, warn};

pub struct SelectionGuard {
    repository: Repository,
    released: bool,
}

impl SelectionGuard {
    pub fn new(repository: Repository) -> Self {
        Self {
            repository,
            released: false,
        }
    }

    /// Reset every pick; best effort
    pub async fn release(mut self) {
        self.released = true;
        match self.repository.reset_all_picked().await {
            Ok(cleared) => info!(cleared, "Picks reset at session end"),
            Err(e) => warn!(error = %e, "Failed to reset picks at session end"),
        }
    }
}

impl Drop for SelectionGuard {
    fn drop(&mut self) {
        if !self.released {
            warn!("Selection guard dropped without release; picks were kept");
        }
    }
}
