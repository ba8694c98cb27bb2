//! Stock market trading simulation.
//!
//! Episode-oriented environment over a [`DataGraph`]: `reset` samples the
//! episode window and starting balance, `step` applies one day of toggle
//! actions (buy if not owned, sell if owned) under budget, commission, and
//! ownership-cap constraints, and every step emits an observation and a
//! reward for the external agent.

use crate::graph::{DataGraph, GraphError, Observation};
use crate::node::DataNode;
use crate::reward::{create_reward, Reward, RewardConfig};
use crate::time_series::{DataProvider, DateRange};
use chrono::{Duration, NaiveDate};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Errors raised by simulation construction and stepping.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// Underlying data graph failure
    Graph(GraphError),
    /// Invalid simulation parameters
    Configuration(String),
    /// `step` called on a finished or un-reset episode
    EpisodeFinished,
}

impl std::fmt::Display for SimulationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimulationError::Graph(err) => write!(f, "Graph error: {}", err),
            SimulationError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            SimulationError::EpisodeFinished => write!(f, "Episode is finished; call reset"),
        }
    }
}

impl std::error::Error for SimulationError {}

impl From<GraphError> for SimulationError {
    fn from(err: GraphError) -> Self {
        SimulationError::Graph(err)
    }
}

/// Episode-family parameters for the simulation.
#[derive(Debug, Clone, Copy)]
pub struct SimulationParams {
    /// Start of the date range episodes are sampled from
    pub from_date: NaiveDate,
    /// End of the date range episodes are sampled from
    pub to_date: NaiveDate,
    /// Minimum episode length in trading days; 0 means "same as max"
    pub min_duration: usize,
    /// Maximum episode length in trading days; 0 means "all available"
    pub max_duration: usize,
    /// Starting balance is sampled uniformly in whole currency units
    pub min_start_balance: u64,
    pub max_start_balance: u64,
    /// Relative commission charged on both purchases and sales
    pub commission: f64,
    /// Maximum number of distinct symbols that can be held at once
    pub max_stock_owned: usize,
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            from_date: NaiveDate::from_ymd_opt(2014, 1, 1).unwrap_or_default(),
            to_date: NaiveDate::from_ymd_opt(2016, 1, 1).unwrap_or_default(),
            min_duration: 0,
            max_duration: 0,
            min_start_balance: 1000,
            max_start_balance: 1000,
            commission: 0.0,
            max_stock_owned: 1,
        }
    }
}

/// Ledger node ids the simulation writes into the graph.
const BALANCE_ID: &str = "balance";
const NET_WORTH_ID: &str = "net_worth";

/// A trading episode environment over a data dependency graph.
///
/// Actions are toggle bits per symbol: 1 sells the whole position if the
/// symbol is owned, otherwise buys as many units as the per-purchase budget
/// allows. The budget splits the balance evenly over the remaining ownership
/// slots and is fixed before the action is applied, so processing order
/// within one step cannot starve later purchases of their share.
pub struct StockMarketSimulation {
    graph: DataGraph,
    provider: Arc<dyn DataProvider>,
    reward: Box<dyn Reward>,
    available_dates: Vec<NaiveDate>,
    stock_names: Vec<String>,
    ownership_id: String,

    min_duration: usize,
    max_duration: usize,
    min_start_balance: u64,
    max_start_balance: u64,
    commission: f64,
    max_stock_owned: usize,

    balance: f64,
    net_worth: f64,
    owned_stocks: Vec<u64>,
    from_date_index: usize,
    curr_date_index: usize,
    to_date_index: usize,
    started: bool,

    rng: StdRng,
    saved_date_index: Option<usize>,
    saved_observation: Option<Observation>,
}

impl StockMarketSimulation {
    /// Builds the simulation around a prepared-to-be graph.
    ///
    /// Registers the balance, net worth, and ownership ledger nodes, widens
    /// the date range backwards by the graph's warm-up buffer, and runs the
    /// initial data preparation.
    pub fn new(
        mut graph: DataGraph,
        reward_config: &RewardConfig,
        provider: Arc<dyn DataProvider>,
        params: SimulationParams,
    ) -> Result<Self, SimulationError> {
        if params.max_stock_owned == 0 {
            return Err(SimulationError::Configuration(
                "max_stock_owned must be at least 1".to_string(),
            ));
        }
        if params.commission < 0.0 {
            return Err(SimulationError::Configuration(
                "commission cannot be negative".to_string(),
            ));
        }
        if params.min_start_balance > params.max_start_balance {
            return Err(SimulationError::Configuration(
                "min_start_balance exceeds max_start_balance".to_string(),
            ));
        }
        if params.from_date >= params.to_date {
            return Err(SimulationError::Configuration(
                "from_date must precede to_date".to_string(),
            ));
        }

        let ownership_id = graph.register(DataNode::ownership());
        graph.register(DataNode::single_value(BALANCE_ID));
        graph.register(DataNode::single_value(NET_WORTH_ID));

        // Widen backwards so every analysis has full history at from_date.
        let buffer = graph.get_buffer()?;
        let from_date = params.from_date - Duration::days(buffer as i64);
        let range = DateRange::new(from_date, params.to_date);
        graph.set_date_range(range);
        graph.prepare_data(provider.as_ref())?;

        let available_dates = graph.available_dates();
        if available_dates.len() < 2 {
            return Err(SimulationError::Configuration(
                "Not enough available dates for an episode".to_string(),
            ));
        }

        let max_duration = if params.max_duration > 0 {
            params.max_duration.min(available_dates.len())
        } else {
            available_dates.len()
        };
        let min_duration = if params.min_duration > 0 {
            params.min_duration.min(max_duration)
        } else {
            max_duration
        };

        let reward = create_reward(reward_config, provider.as_ref(), &range)?;
        let stock_names = graph.stock_names().to_vec();
        let num_stocks = stock_names.len();

        info!(
            "Simulation ready: {} symbols, {} available dates, buffer {} days",
            num_stocks,
            available_dates.len(),
            buffer
        );

        Ok(StockMarketSimulation {
            graph,
            provider,
            reward,
            available_dates,
            stock_names,
            ownership_id,
            min_duration,
            max_duration,
            min_start_balance: params.min_start_balance,
            max_start_balance: params.max_start_balance,
            commission: params.commission,
            max_stock_owned: params.max_stock_owned,
            balance: 0.0,
            net_worth: 0.0,
            owned_stocks: vec![0; num_stocks],
            from_date_index: 0,
            curr_date_index: 0,
            to_date_index: 0,
            started: false,
            rng: StdRng::from_entropy(),
            saved_date_index: None,
            saved_observation: None,
        })
    }

    /// Fixes episode sampling and the graph's randomized layer.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
        self.graph.set_seed(seed.wrapping_add(1));
    }

    pub fn graph(&self) -> &DataGraph {
        &self.graph
    }

    pub fn stock_names(&self) -> &[String] {
        &self.stock_names
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn net_worth(&self) -> f64 {
        self.net_worth
    }

    pub fn owned_stocks(&self) -> &[u64] {
        &self.owned_stocks
    }

    pub fn commission(&self) -> f64 {
        self.commission
    }

    pub fn max_stock_owned(&self) -> usize {
        self.max_stock_owned
    }

    /// Dates the simulation can step through.
    pub fn available_dates(&self) -> &[NaiveDate] {
        &self.available_dates
    }

    /// Current episode date.
    pub fn current_date(&self) -> Option<NaiveDate> {
        if self.started {
            self.available_dates.get(self.curr_date_index).copied()
        } else {
            None
        }
    }

    /// True once the episode has reached its final date.
    pub fn done(&self) -> bool {
        !self.started || self.curr_date_index >= self.to_date_index
    }

    /// Episode-end reward summary.
    pub fn overall_reward(&self) -> f64 {
        self.reward.calculate_overall_reward()
    }

    /// Starts a new episode: re-prepares the graph, samples the episode
    /// window and the starting balance, and zeroes ownership.
    pub fn reset(&mut self) -> Result<Observation, SimulationError> {
        self.graph.reset()?;
        self.graph.prepare_data(self.provider.as_ref())?;

        let duration = self.rng.gen_range(self.min_duration..=self.max_duration);
        let duration = duration.max(1);
        let start = self
            .rng
            .gen_range(0..=self.available_dates.len() - duration);
        self.from_date_index = start;
        self.curr_date_index = start;
        self.to_date_index = start + duration - 1;
        self.started = true;

        self.balance = self
            .rng
            .gen_range(self.min_start_balance..=self.max_start_balance) as f64;
        self.net_worth = self.balance;
        self.owned_stocks = vec![0; self.stock_names.len()];

        self.saved_date_index = None;
        self.saved_observation = None;

        let curr_date = self.available_dates[self.curr_date_index];
        debug!(
            "Episode reset: {} to {}, balance {}",
            curr_date, self.available_dates[self.to_date_index], self.balance
        );
        self.write_ledgers(curr_date)?;
        let observation = self.observation()?;
        self.reward.reset(&observation, curr_date);
        Ok(observation)
    }

    /// Simulates one day of trading.
    ///
    /// Returns the next observation, the step reward, and whether the
    /// episode is finished.
    ///
    /// # Errors
    /// - `EpisodeFinished` when called before `reset` or after the episode
    ///   reached its final date
    /// - `Configuration` when the action length does not match the symbol
    ///   count
    pub fn step(&mut self, action: &[bool]) -> Result<(Observation, f64, bool), SimulationError> {
        if self.done() {
            return Err(SimulationError::EpisodeFinished);
        }
        if action.len() != self.stock_names.len() {
            return Err(SimulationError::Configuration(format!(
                "Action has {} entries for {} symbols",
                action.len(),
                self.stock_names.len()
            )));
        }

        let curr_date = self.available_dates[self.curr_date_index];
        let next_date = self.available_dates[self.curr_date_index + 1];
        let stock_prices = self.graph.row(self.graph.primary_id(), curr_date)?.to_vec();

        // Per-purchase budget: an even split of the balance over the free
        // ownership slots, net of commission. Fixed before the action loop
        // so earlier purchases in the same step do not shrink later ones.
        let mut num_owned_stocks = self.owned_stocks.iter().filter(|&&n| n > 0).count();
        let max_purchase_price = if num_owned_stocks < self.max_stock_owned {
            self.balance / (self.max_stock_owned - num_owned_stocks) as f64
                / (1.0 + self.commission)
        } else {
            0.0
        };

        let mut sale_return = 0.0;
        let mut purchase_price = 0.0;
        for (index, &act) in action.iter().enumerate() {
            if !act {
                continue;
            }
            if self.owned_stocks[index] > 0 {
                sale_return += self.owned_stocks[index] as f64 * stock_prices[index];
                self.owned_stocks[index] = 0;
            } else if num_owned_stocks < self.max_stock_owned {
                let units = (max_purchase_price / stock_prices[index]).floor() as u64;
                if units > 0 {
                    num_owned_stocks += 1;
                }
                purchase_price += units as f64 * stock_prices[index];
                self.owned_stocks[index] = units;
            }
        }
        self.balance += sale_return * (1.0 - self.commission)
            - purchase_price * (1.0 + self.commission);

        self.curr_date_index += 1;
        self.net_worth = self.balance
            + self
                .owned_stocks
                .iter()
                .zip(stock_prices.iter())
                .map(|(&owned, &price)| owned as f64 * price)
                .sum::<f64>();

        self.saved_date_index = None;
        self.saved_observation = None;
        self.write_ledgers(next_date)?;
        let observation = self.observation()?;
        let reward = self.reward.calculate_value(&observation, next_date);
        Ok((observation, reward, self.done()))
    }

    /// Current observation, cached per date.
    pub fn observation(&mut self) -> Result<Observation, SimulationError> {
        if self.saved_date_index == Some(self.curr_date_index) {
            if let Some(observation) = &self.saved_observation {
                return Ok(observation.clone());
            }
        }
        let date = self.available_dates[self.curr_date_index];
        let observation = self.graph.observation(date)?;
        self.saved_date_index = Some(self.curr_date_index);
        self.saved_observation = Some(observation.clone());
        Ok(observation)
    }

    fn write_ledgers(&mut self, date: NaiveDate) -> Result<(), SimulationError> {
        let owned: Vec<f64> = self.owned_stocks.iter().map(|&n| n as f64).collect();
        self.graph.set_state_row(&self.ownership_id, date, &owned)?;
        self.graph
            .set_state_row(BALANCE_ID, date, &[self.balance])?;
        self.graph
            .set_state_row(NET_WORTH_ID, date, &[self.net_worth])?;
        Ok(())
    }

    /// Enumerates every admissible action in the current state.
    ///
    /// Purchases are bounded by the free ownership slots; every subset of
    /// owned positions can be sold. Enumeration is deterministic: purchase
    /// counts ascend, purchase combinations are lexicographic over the
    /// not-owned positions, and sell subsets count up with the last owned
    /// position varying fastest.
    pub fn action_space(&self) -> Vec<Vec<bool>> {
        let owned_positions: Vec<usize> = (0..self.owned_stocks.len())
            .filter(|&i| self.owned_stocks[i] > 0)
            .collect();
        let not_owned_positions: Vec<usize> = (0..self.owned_stocks.len())
            .filter(|&i| self.owned_stocks[i] == 0)
            .collect();
        let num_owned = owned_positions.len();
        let free_slots = self.max_stock_owned.saturating_sub(num_owned);

        let mut actions = Vec::new();
        for num_purchases in 0..=free_slots.min(not_owned_positions.len()) {
            for purchase_combo in combinations(not_owned_positions.len(), num_purchases) {
                for sell_mask in 0..(1u64 << num_owned) {
                    let mut action = vec![false; self.owned_stocks.len()];
                    for &combo_index in &purchase_combo {
                        action[not_owned_positions[combo_index]] = true;
                    }
                    for (bit, &position) in owned_positions.iter().enumerate() {
                        // Most significant bit first: the last owned
                        // position toggles fastest.
                        let shift = num_owned - 1 - bit;
                        action[position] = (sell_mask >> shift) & 1 == 1;
                    }
                    actions.push(action);
                }
            }
        }
        actions
    }
}

/// Lexicographic k-combinations of `0..n`.
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    if k > n {
        return Vec::new();
    }
    if k == 0 {
        return vec![Vec::new()];
    }
    let mut result = Vec::new();
    let mut combo: Vec<usize> = (0..k).collect();
    loop {
        result.push(combo.clone());
        // Advance the rightmost index that can still move.
        let mut i = k;
        while i > 0 {
            i -= 1;
            if combo[i] != i + n - k {
                combo[i] += 1;
                for j in i + 1..k {
                    combo[j] = combo[j - 1] + 1;
                }
                break;
            }
            if i == 0 {
                return result;
            }
        }
    }
}
