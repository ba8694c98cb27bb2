//! Demo: build a simulation over generated prices and roll out a batch of
//! random-agent episodes.

use chrono::NaiveDate;
use ordered_float::OrderedFloat;
use std::sync::Arc;
use stocksim::{
    run_batch, Agent, DataProvider, ExecutionPlan, InMemoryDataProvider, NodeSpec, NoiseParams,
    RandomAgent, RewardConfig, SimulationConfig, SyntheticCurve, PRIMARY_PRICE_SERIES,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = SimulationConfig {
        stock_names: vec!["GEN_1".to_string(), "GEN_2".to_string(), "GEN_3".to_string()],
        from_date: NaiveDate::from_ymd_opt(2015, 1, 1).ok_or("bad date")?,
        to_date: NaiveDate::from_ymd_opt(2015, 12, 31).ok_or("bad date")?,
        min_duration: 20,
        max_duration: 60,
        min_start_balance: 500,
        max_start_balance: 2000,
        commission: OrderedFloat(0.001),
        max_stock_owned: 2,
        stock_data_randomization: Some(NoiseParams::new(0.0, 0.02)),
        data: vec![
            NodeSpec::GeneratedStockData {
                curves: vec![
                    SyntheticCurve::Linear {
                        base: OrderedFloat(50.0),
                        slope: OrderedFloat(0.02),
                    },
                    SyntheticCurve::Sine {
                        base: OrderedFloat(30.0),
                        amplitude: OrderedFloat(5.0),
                        period_days: OrderedFloat(90.0),
                    },
                    SyntheticCurve::Constant {
                        value: OrderedFloat(75.0),
                    },
                ],
            },
            NodeSpec::RunningAverage {
                dependency: PRIMARY_PRICE_SERIES.to_string(),
                num_days: 10,
                visible: true,
            },
            NodeSpec::Comparator {
                left: PRIMARY_PRICE_SERIES.to_string(),
                right: "running_average_10_for_stock_data".to_string(),
                op: stocksim::CompareOp::Gt,
                visible: true,
            },
        ],
        reward: RewardConfig::NetWorthRatio {
            scaling_factor: OrderedFloat(1.0),
            bias: OrderedFloat(0.0),
        },
    };

    // Generated prices need no external data.
    let provider: Arc<dyn DataProvider> = Arc::new(InMemoryDataProvider::new());

    let simulation = stocksim::build_simulation(&config, Arc::clone(&provider))?;
    let plan = ExecutionPlan::from_graph(simulation.graph())?;
    println!("Data graph ({} nodes):", plan.node_count());
    println!("{}", plan.to_dot());
    println!("Execution order: {:?}", plan.execution_order()?);
    drop(simulation);

    let results = run_batch(&config, provider, 8, Some(1234), |episode| {
        Box::new(RandomAgent::with_seed(1000 + episode as u64)) as Box<dyn Agent>
    })?;

    for (episode, result) in results.iter().enumerate() {
        println!(
            "episode {:2}: {:3} steps, final net worth {:8.2}, overall reward {:+.6}",
            episode,
            result.steps.len(),
            result.final_net_worth,
            result.overall_reward
        );
    }
    let mean_overall: f64 =
        results.iter().map(|r| r.overall_reward).sum::<f64>() / results.len() as f64;
    println!("mean overall reward: {:+.6}", mean_overall);

    Ok(())
}
