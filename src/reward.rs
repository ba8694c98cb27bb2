//! Per-episode reward signals.
//!
//! Rewards are stateful: each tracks running episode state (previous net
//! worth, accumulated per-step returns) and can summarize the whole episode
//! once it ends. Degenerate numeric states (non-positive net worth, single
//! data point dispersion) return sentinel values instead of failing, since
//! they are expected episode conditions rather than faults.

use crate::analytics;
use crate::graph::{GraphError, Observation};
use crate::time_series::{DataProvider, DateRange};
use chrono::NaiveDate;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Default market benchmark for the Sharpe-like reward.
pub const DEFAULT_BENCHMARK: &str = "SPY";

/// Episode-scoped reward signal.
///
/// Lifecycle: `reset` at episode start with the initial observation, then
/// `calculate_value` once per step, then `calculate_overall_reward` at the
/// end.
pub trait Reward: Send {
    /// Short configuration name of the reward.
    fn id(&self) -> &'static str;

    /// Re-initializes episode state from the reset observation.
    fn reset(&mut self, observation: &Observation, date: NaiveDate);

    /// Computes the per-step reward and advances internal state.
    fn calculate_value(&mut self, observation: &Observation, date: NaiveDate) -> f64;

    /// Summarizes the episode into one scalar.
    fn calculate_overall_reward(&self) -> f64;
}

/// Reward selection and parameters, as read from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum RewardConfig {
    Constant {
        #[serde(default)]
        value: OrderedFloat<f64>,
    },
    NetWorthRatio {
        #[serde(default = "default_scaling_factor")]
        scaling_factor: OrderedFloat<f64>,
        #[serde(default)]
        bias: OrderedFloat<f64>,
    },
    SharpeRatio {
        #[serde(default = "default_benchmark")]
        benchmark: String,
    },
}

fn default_scaling_factor() -> OrderedFloat<f64> {
    OrderedFloat(1.0)
}

fn default_benchmark() -> String {
    DEFAULT_BENCHMARK.to_string()
}

/// Builds a reward from configuration.
///
/// The Sharpe-like reward fetches its benchmark series for the episode
/// family's full date range up front, so no I/O happens during steps.
pub fn create_reward(
    config: &RewardConfig,
    provider: &dyn DataProvider,
    range: &DateRange,
) -> Result<Box<dyn Reward>, GraphError> {
    match config {
        RewardConfig::Constant { value } => Ok(Box::new(ConstantReward::new(value.0))),
        RewardConfig::NetWorthRatio {
            scaling_factor,
            bias,
        } => Ok(Box::new(NetWorthRatioReward::new(scaling_factor.0, bias.0))),
        RewardConfig::SharpeRatio { benchmark } => Ok(Box::new(SharpeRatioReward::new(
            benchmark, provider, range,
        )?)),
    }
}

fn net_worth_of(observation: &Observation) -> f64 {
    observation.get("net_worth").unwrap_or(0.0)
}

/// Fixed reward regardless of state. Useful as a baseline and in tests.
#[derive(Debug, Clone)]
pub struct ConstantReward {
    value: f64,
}

impl ConstantReward {
    pub fn new(value: f64) -> Self {
        ConstantReward { value }
    }
}

impl Reward for ConstantReward {
    fn id(&self) -> &'static str {
        "constant"
    }

    fn reset(&mut self, _observation: &Observation, _date: NaiveDate) {}

    fn calculate_value(&mut self, _observation: &Observation, _date: NaiveDate) -> f64 {
        self.value
    }

    fn calculate_overall_reward(&self) -> f64 {
        self.value
    }
}

/// Net worth growth ratio reward.
///
/// Per step: `(curr / prev - 1) * scaling_factor + bias`. Overall: total
/// growth amortized over the number of steps taken.
#[derive(Debug, Clone)]
pub struct NetWorthRatioReward {
    scaling_factor: f64,
    bias: f64,
    first_net_worth: f64,
    prev_net_worth: f64,
    steps: usize,
}

impl NetWorthRatioReward {
    pub fn new(scaling_factor: f64, bias: f64) -> Self {
        NetWorthRatioReward {
            scaling_factor,
            bias,
            first_net_worth: 0.0,
            prev_net_worth: 0.0,
            steps: 0,
        }
    }
}

impl Reward for NetWorthRatioReward {
    fn id(&self) -> &'static str {
        "net_worth_ratio"
    }

    fn reset(&mut self, observation: &Observation, _date: NaiveDate) {
        self.prev_net_worth = net_worth_of(observation);
        self.first_net_worth = self.prev_net_worth;
        self.steps = 0;
    }

    fn calculate_value(&mut self, observation: &Observation, _date: NaiveDate) -> f64 {
        // Non-positive previous net worth makes the ratio meaningless;
        // return the sentinel without advancing state.
        if self.prev_net_worth <= 0.0 {
            return -1.0;
        }
        let curr_net_worth = net_worth_of(observation);
        let result = (curr_net_worth / self.prev_net_worth - 1.0) * self.scaling_factor + self.bias;
        self.prev_net_worth = curr_net_worth;
        self.steps += 1;
        result
    }

    fn calculate_overall_reward(&self) -> f64 {
        if self.first_net_worth <= 0.0 || self.steps == 0 {
            return 0.0;
        }
        (self.prev_net_worth / self.first_net_worth - 1.0) / self.steps as f64
            * self.scaling_factor
            + self.bias
    }
}

/// Sharpe-like reward: agent return over a market benchmark, normalized by
/// the dispersion of the agent's own returns.
///
/// Per step it appends the agent's and the benchmark's per-step returns to
/// two running lists and yields `mean(agent) - mean(market)`, divided by the
/// population standard deviation of the agent returns once at least two
/// points exist. With fewer points no normalization happens yet.
pub struct SharpeRatioReward {
    benchmark: Vec<(NaiveDate, f64)>,
    agent_returns: Vec<f64>,
    market_returns: Vec<f64>,
    first_net_worth: f64,
    prev_net_worth: f64,
    first_market_value: f64,
    prev_market_value: f64,
}

impl SharpeRatioReward {
    /// Fetches the benchmark series for the episode family's date range.
    pub fn new(
        symbol: &str,
        provider: &dyn DataProvider,
        range: &DateRange,
    ) -> Result<Self, GraphError> {
        let points = provider.get_price_series(symbol, range)?;
        if points.is_empty() {
            return Err(GraphError::Configuration(format!(
                "Benchmark {} has no data in the requested range",
                symbol
            )));
        }
        let benchmark = points
            .into_iter()
            .map(|point| (point.date, point.close))
            .collect();
        Ok(SharpeRatioReward {
            benchmark,
            agent_returns: Vec::new(),
            market_returns: Vec::new(),
            first_net_worth: 0.0,
            prev_net_worth: 0.0,
            first_market_value: 0.0,
            prev_market_value: 0.0,
        })
    }

    /// Benchmark value at `date`, carrying the last known value forward
    /// across non-trading days.
    fn market_value(&self, date: NaiveDate) -> f64 {
        match self.benchmark.binary_search_by_key(&date, |&(d, _)| d) {
            Ok(position) => self.benchmark[position].1,
            Err(0) => self.benchmark[0].1,
            Err(position) => self.benchmark[position - 1].1,
        }
    }

    fn normalized(&self, raw: f64) -> f64 {
        if self.agent_returns.len() < 2 {
            return raw;
        }
        let dispersion = analytics::std_dev(&self.agent_returns);
        if dispersion > 0.0 {
            raw / dispersion
        } else {
            raw
        }
    }
}

impl Reward for SharpeRatioReward {
    fn id(&self) -> &'static str {
        "sharpe_ratio"
    }

    fn reset(&mut self, observation: &Observation, date: NaiveDate) {
        self.prev_net_worth = net_worth_of(observation);
        self.first_net_worth = self.prev_net_worth;
        self.prev_market_value = self.market_value(date);
        self.first_market_value = self.prev_market_value;
        self.agent_returns.clear();
        self.market_returns.clear();
    }

    fn calculate_value(&mut self, observation: &Observation, date: NaiveDate) -> f64 {
        if self.prev_net_worth <= 0.0 {
            return -1.0;
        }

        let curr_net_worth = net_worth_of(observation);
        let curr_market_value = self.market_value(date);

        self.agent_returns
            .push(curr_net_worth / self.prev_net_worth - 1.0);
        self.market_returns
            .push(curr_market_value / self.prev_market_value - 1.0);

        let raw = analytics::mean(&self.agent_returns) - analytics::mean(&self.market_returns);
        let result = self.normalized(raw);

        self.prev_net_worth = curr_net_worth;
        self.prev_market_value = curr_market_value;
        result
    }

    fn calculate_overall_reward(&self) -> f64 {
        if self.first_net_worth <= 0.0
            || self.first_market_value <= 0.0
            || self.agent_returns.is_empty()
        {
            return 0.0;
        }
        let agent_growth = self.prev_net_worth / self.first_net_worth - 1.0;
        let market_growth = self.prev_market_value / self.first_market_value - 1.0;
        let raw = (agent_growth - market_growth) / self.agent_returns.len() as f64;
        self.normalized(raw)
    }
}
