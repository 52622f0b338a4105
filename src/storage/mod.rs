//! Persistence layer.
//!
//! Saves and loads strategy execution state to/from a JSON file so DCA
//! counters, triggered grid levels and rebalance timestamps survive a
//! restart. Portfolio snapshots are not persisted; they are rebuilt on the
//! first tick.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::strategy::StrategyState;

/// Default state file path.
pub const DEFAULT_STATE_FILE: &str = "sentinel_state.json";

/// On-disk state of the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub saved_at: DateTime<Utc>,
    pub tick_count: u64,
    pub strategies: BTreeMap<u64, StrategyState>,
}

/// Save agent state to a JSON file.
pub fn save_state(state: &PersistedState, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    let json = serde_json::to_string_pretty(state).context("Failed to serialise agent state")?;

    // Write then rename so a crash mid-write never truncates the last good file.
    let tmp = format!("{path}.{}.tmp", uuid::Uuid::new_v4().simple());
    std::fs::write(&tmp, &json).context(format!("Failed to write state to {tmp}"))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e).context(format!("Failed to move state into {path}"));
    }

    debug!(path, strategies = state.strategies.len(), "State saved");
    Ok(())
}

/// Load agent state from a JSON file.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_state(path: Option<&str>) -> Result<Option<PersistedState>> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved state found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path).context(format!("Failed to read state from {path}"))?;

    let state: PersistedState =
        serde_json::from_str(&json).context(format!("Failed to parse state from {path}"))?;

    info!(
        path,
        saved_at = %state.saved_at,
        tick_count = state.tick_count,
        strategies = state.strategies.len(),
        "State loaded from disk"
    );

    Ok(Some(state))
}

/// Delete the state file (for testing or reset).
pub fn delete_state(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path).context(format!("Failed to delete state file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
