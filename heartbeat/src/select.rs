//! Batch selection and cycle advancement for `heartbeat run`.

use std::path::PathBuf;

use rand::Rng;
use tracing::{debug, info};

use crate::core::cycle::Cycle;
use crate::io::config::HeartbeatConfig;
use crate::io::run_state::RunState;

/// A repo picked for this invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedRepo {
    /// Index into `config.repos`.
    pub index: usize,
    pub path: PathBuf,
}

/// Next batch: up to `repos_per_run` repos from the current cycle position.
///
/// Returns fewer near the end of a cycle, and none when the cycle is exhausted
/// or does not match the configured repos.
pub fn select_batch(config: &HeartbeatConfig, state: &RunState) -> Vec<SelectedRepo> {
    if !state.cycle.is_consistent(config.repo_count()) {
        debug!("cycle inconsistent with config, nothing selected");
        return Vec::new();
    }
    state
        .cycle
        .window(config.repos_per_run)
        .iter()
        .map(|&index| SelectedRepo {
            index,
            path: config.repos[index].clone(),
        })
        .collect()
}

/// Consume `count` slots of the cycle, reshuffling at the boundary.
///
/// Returns true if a new cycle was started.
pub fn advance_cycle<R: Rng + ?Sized>(state: &mut RunState, count: usize, rng: &mut R) -> bool {
    let reshuffled = state.cycle.advance(count, rng);
    if reshuffled {
        info!(len = state.cycle.order.len(), "cycle complete, reshuffled");
    } else {
        debug!(position = state.cycle.position, "cycle advanced");
    }
    reshuffled
}

/// Select a batch, starting a fresh cycle first if the current one has nothing left.
///
/// Returns the batch and whether a reshuffle happened.
pub fn select_or_restart<R: Rng + ?Sized>(
    config: &HeartbeatConfig,
    state: &mut RunState,
    rng: &mut R,
) -> (Vec<SelectedRepo>, bool) {
    let batch = select_batch(config, state);
    if !batch.is_empty() {
        return (batch, false);
    }
    info!("cycle exhausted or malformed, reshuffling before selection");
    state.cycle = Cycle::shuffled(config.repo_count(), rng);
    (select_batch(config, state), true)
}
