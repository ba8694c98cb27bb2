pub mod time_series;
pub mod analytics;
pub mod frame;
pub mod node;
pub mod graph;
pub mod plan;
pub mod reward;
pub mod simulation;
pub mod config;
pub mod csv_provider;
pub mod agent;
pub mod rollout;


pub use time_series::{PricePoint, DateRange, DataProvider, ProviderError, InMemoryDataProvider};
pub use analytics::CompareOp;
pub use frame::Frame;
pub use node::{DataNode, NodeKind, NodeVariant, NoiseParams, SyntheticCurve, PRIMARY_PRICE_SERIES};
pub use graph::{DataGraph, GraphError, Observation};
pub use plan::ExecutionPlan;
pub use reward::{
    create_reward,
    Reward,
    RewardConfig,
    ConstantReward,
    NetWorthRatioReward,
    SharpeRatioReward,
};
pub use simulation::{SimulationError, SimulationParams, StockMarketSimulation};
pub use config::{build_simulation, NodeSpec, SimulationConfig};
pub use csv_provider::CsvDataProvider;
pub use agent::{Agent, RandomAgent};
pub use rollout::{run_batch, run_episode, EpisodeResult, StepRecord};
