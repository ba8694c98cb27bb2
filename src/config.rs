//! Declarative simulation configuration.
//!
//! A [`SimulationConfig`] describes one environment end to end: the symbol
//! universe, episode sampling bounds, trading constraints, the data-node
//! composition, and the reward selection. [`build_simulation`] turns it into
//! a ready [`StockMarketSimulation`] in two phases: assemble the data graph,
//! then hand it to the simulation which registers its own ledger nodes and
//! prepares everything.

use crate::analytics::CompareOp;
use crate::graph::{DataGraph, GraphError};
use crate::node::{DataNode, NoiseParams, SyntheticCurve, PRIMARY_PRICE_SERIES};
use crate::reward::RewardConfig;
use crate::simulation::{SimulationError, SimulationParams, StockMarketSimulation};
use crate::time_series::DataProvider;
use chrono::NaiveDate;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One data-node entry in the configuration.
///
/// OrderedFloat parameters keep specs `Eq + Hash`, so identical entries
/// collapse to a single graph node on registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum NodeSpec {
    /// Provider-backed absolute prices; must come first
    RealStockData,
    /// Synthetic absolute prices; must come first
    GeneratedStockData { curves: Vec<SyntheticCurve> },
    RunningAverage {
        #[serde(default = "default_dependency")]
        dependency: String,
        num_days: usize,
        #[serde(default = "default_true")]
        visible: bool,
    },
    RelativeChange {
        #[serde(default = "default_dependency")]
        dependency: String,
        #[serde(default = "default_scaling")]
        scaling_factor: OrderedFloat<f64>,
        #[serde(default)]
        visible: bool,
    },
    Comparator {
        left: String,
        right: String,
        op: CompareOp,
        #[serde(default = "default_true")]
        visible: bool,
    },
}

fn default_dependency() -> String {
    PRIMARY_PRICE_SERIES.to_string()
}

fn default_true() -> bool {
    true
}

fn default_scaling() -> OrderedFloat<f64> {
    OrderedFloat(1.0)
}

impl NodeSpec {
    /// True for the specs that can open the data list as the primary
    /// price series.
    pub fn is_price_series(&self) -> bool {
        matches!(
            self,
            NodeSpec::RealStockData | NodeSpec::GeneratedStockData { .. }
        )
    }

    /// Builds the data node this spec describes.
    pub fn to_node(&self) -> Result<DataNode, GraphError> {
        match self {
            NodeSpec::RealStockData => Ok(DataNode::provider_prices()),
            NodeSpec::GeneratedStockData { curves } => DataNode::generated_prices(curves.clone()),
            NodeSpec::RunningAverage {
                dependency,
                num_days,
                visible,
            } => Ok(DataNode::running_average(dependency.clone(), *num_days)?
                .with_visibility(*visible)),
            NodeSpec::RelativeChange {
                dependency,
                scaling_factor,
                visible,
            } => Ok(DataNode::relative_change(dependency.clone(), scaling_factor.0)
                .with_visibility(*visible)),
            NodeSpec::Comparator {
                left,
                right,
                op,
                visible,
            } => Ok(DataNode::comparator(left.clone(), right.clone(), *op)
                .with_visibility(*visible)),
        }
    }
}

/// Full configuration of one simulation environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Tradable symbols, in observation column order
    pub stock_names: Vec<String>,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    #[serde(default)]
    pub min_duration: usize,
    #[serde(default)]
    pub max_duration: usize,
    #[serde(default = "default_balance")]
    pub min_start_balance: u64,
    #[serde(default = "default_balance")]
    pub max_start_balance: u64,
    #[serde(default)]
    pub commission: OrderedFloat<f64>,
    #[serde(default = "default_max_stock_owned")]
    pub max_stock_owned: usize,
    /// When set, a noise layer over the primary prices becomes the series
    /// every analysis and trade reads
    #[serde(default)]
    pub stock_data_randomization: Option<NoiseParams>,
    /// Data-node composition; the first entry must be a price series
    pub data: Vec<NodeSpec>,
    #[serde(default = "default_reward")]
    pub reward: RewardConfig,
}

fn default_balance() -> u64 {
    1000
}

fn default_max_stock_owned() -> usize {
    1
}

fn default_reward() -> RewardConfig {
    RewardConfig::NetWorthRatio {
        scaling_factor: OrderedFloat(1.0),
        bias: OrderedFloat(0.0),
    }
}

impl SimulationConfig {
    /// Parses a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Structural validation beyond what deserialization enforces.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.stock_names.is_empty() {
            return Err(SimulationError::Configuration(
                "stock_names cannot be empty".to_string(),
            ));
        }
        if self.data.is_empty() {
            return Err(SimulationError::Configuration(
                "data list cannot be empty".to_string(),
            ));
        }
        if !self.data[0].is_price_series() {
            return Err(SimulationError::Configuration(
                "First data entry must be a price series".to_string(),
            ));
        }
        if self.data[1..].iter().any(NodeSpec::is_price_series) {
            return Err(SimulationError::Configuration(
                "Only the first data entry can be a price series".to_string(),
            ));
        }
        Ok(())
    }

    fn params(&self) -> SimulationParams {
        SimulationParams {
            from_date: self.from_date,
            to_date: self.to_date,
            min_duration: self.min_duration,
            max_duration: self.max_duration,
            min_start_balance: self.min_start_balance,
            max_start_balance: self.max_start_balance,
            commission: self.commission.0,
            max_stock_owned: self.max_stock_owned,
        }
    }
}

/// Builds a ready simulation from configuration.
///
/// Assembles the data graph (primary prices, optional randomization layer,
/// analyses in listed order) and constructs the simulation around it.
pub fn build_simulation(
    config: &SimulationConfig,
    provider: Arc<dyn DataProvider>,
) -> Result<StockMarketSimulation, SimulationError> {
    config.validate()?;

    let primary = config.data[0].to_node()?;
    let mut graph = DataGraph::new(primary, config.stock_names.clone())?;

    if let Some(noise) = config.stock_data_randomization {
        graph.register_primary(DataNode::randomized(PRIMARY_PRICE_SERIES, noise))?;
    }

    for spec in &config.data[1..] {
        graph.register(spec.to_node()?);
    }

    StockMarketSimulation::new(graph, &config.reward, provider, config.params())
}
