//! Batched episode rollout.
//!
//! Episodes are independent: each worker builds its own simulation from the
//! shared configuration and a read-only provider, so rollout parallelizes
//! across a rayon pool with no shared mutable state.

use crate::agent::Agent;
use crate::config::{build_simulation, SimulationConfig};
use crate::graph::Observation;
use crate::simulation::SimulationError;
use crate::time_series::DataProvider;
use log::info;
use rayon::prelude::*;
use std::sync::Arc;

/// One recorded step of an episode.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub observation: Observation,
    pub action: Vec<bool>,
    pub reward: f64,
}

/// A full recorded episode.
#[derive(Debug, Clone)]
pub struct EpisodeResult {
    pub steps: Vec<StepRecord>,
    pub overall_reward: f64,
    pub final_net_worth: f64,
}

/// Runs one episode to completion, recording every transition.
pub fn run_episode(
    config: &SimulationConfig,
    provider: Arc<dyn DataProvider>,
    agent: &mut dyn Agent,
    seed: Option<u64>,
) -> Result<EpisodeResult, SimulationError> {
    let mut simulation = build_simulation(config, provider)?;
    if let Some(seed) = seed {
        simulation.set_seed(seed);
    }

    let mut observation = simulation.reset()?;
    let mut steps = Vec::new();
    while !simulation.done() {
        let action = agent.make_decision(&observation, &simulation);
        let (next_observation, reward, _) = simulation.step(&action)?;
        steps.push(StepRecord {
            observation: observation.clone(),
            action,
            reward,
        });
        observation = next_observation;
    }

    Ok(EpisodeResult {
        steps,
        overall_reward: simulation.overall_reward(),
        final_net_worth: simulation.net_worth(),
    })
}

/// Rolls out a batch of episodes in parallel.
///
/// `make_agent` is called once per episode with the episode index, so each
/// worker owns its agent. Seeds derive from `base_seed` plus the episode
/// index when given, making the whole batch reproducible.
pub fn run_batch<F>(
    config: &SimulationConfig,
    provider: Arc<dyn DataProvider>,
    episodes: usize,
    base_seed: Option<u64>,
    make_agent: F,
) -> Result<Vec<EpisodeResult>, SimulationError>
where
    F: Fn(usize) -> Box<dyn Agent> + Sync,
{
    let results: Result<Vec<EpisodeResult>, SimulationError> = (0..episodes)
        .into_par_iter()
        .map(|episode| {
            let mut agent = make_agent(episode);
            let seed = base_seed.map(|seed| seed.wrapping_add(episode as u64));
            run_episode(config, Arc::clone(&provider), agent.as_mut(), seed)
        })
        .collect();

    let results = results?;
    info!(
        "Rolled out {} episodes, {} total steps",
        results.len(),
        results.iter().map(|r| r.steps.len()).sum::<usize>()
    );
    Ok(results)
}
