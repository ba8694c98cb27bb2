//! Trading agents.
//!
//! An agent maps observations to actions. The core only needs the decision
//! seam plus a uniform-random baseline for rollout smoke tests and
//! exploration.

use crate::graph::Observation;
use crate::simulation::StockMarketSimulation;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Decision seam between the simulation and a policy.
pub trait Agent: Send {
    /// Picks an action for the current state. Implementations may consult
    /// the simulation's admissible action space.
    fn make_decision(
        &mut self,
        observation: &Observation,
        simulation: &StockMarketSimulation,
    ) -> Vec<bool>;
}

/// Picks uniformly from the admissible action space.
pub struct RandomAgent {
    rng: StdRng,
}

impl RandomAgent {
    pub fn new() -> Self {
        RandomAgent {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        RandomAgent {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomAgent {
    fn default() -> Self {
        RandomAgent::new()
    }
}

impl Agent for RandomAgent {
    fn make_decision(
        &mut self,
        _observation: &Observation,
        simulation: &StockMarketSimulation,
    ) -> Vec<bool> {
        let actions = simulation.action_space();
        if actions.is_empty() {
            return vec![false; simulation.stock_names().len()];
        }
        let pick = self.rng.gen_range(0..actions.len());
        actions[pick].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{build_simulation, NodeSpec, SimulationConfig};
    use crate::reward::RewardConfig;
    use crate::time_series::{DateRange, InMemoryDataProvider};
    use chrono::NaiveDate;
    use ordered_float::OrderedFloat;
    use std::sync::Arc;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn simulation() -> StockMarketSimulation {
        let range = DateRange::new(date(1), date(10));
        let mut provider = InMemoryDataProvider::new();
        provider.add_constant_series("STOCK_1", &range, 10.0);
        provider.add_constant_series("STOCK_2", &range, 5.0);

        let config = SimulationConfig {
            stock_names: vec!["STOCK_1".to_string(), "STOCK_2".to_string()],
            from_date: date(1),
            to_date: date(10),
            min_duration: 5,
            max_duration: 5,
            min_start_balance: 100,
            max_start_balance: 100,
            commission: OrderedFloat(0.0),
            max_stock_owned: 1,
            stock_data_randomization: None,
            data: vec![NodeSpec::RealStockData],
            reward: RewardConfig::Constant {
                value: OrderedFloat(0.0),
            },
        };
        build_simulation(&config, Arc::new(provider)).unwrap()
    }

    #[test]
    fn test_random_agent_emits_admissible_actions() {
        let mut simulation = simulation();
        simulation.set_seed(11);
        let mut agent = RandomAgent::with_seed(11);

        let mut observation = simulation.reset().unwrap();
        while !simulation.done() {
            let action = agent.make_decision(&observation, &simulation);
            assert_eq!(action.len(), 2);
            assert!(simulation.action_space().contains(&action));
            let (next_observation, _, _) = simulation.step(&action).unwrap();
            observation = next_observation;
        }
        // Ownership cap of one symbol held throughout.
        assert!(simulation.owned_stocks().iter().filter(|&&n| n > 0).count() <= 1);
    }

    #[test]
    fn test_seeded_agents_repeat_decisions() {
        let mut simulation = simulation();
        simulation.set_seed(5);
        simulation.reset().unwrap();
        let observation = simulation.observation().unwrap();

        let mut first = RandomAgent::with_seed(42);
        let mut second = RandomAgent::with_seed(42);
        assert_eq!(
            first.make_decision(&observation, &simulation),
            second.make_decision(&observation, &simulation)
        );
    }
}
