//! End-to-end scenarios through the public API.

use chrono::NaiveDate;
use ordered_float::OrderedFloat;
use std::sync::Arc;
use stocksim::{
    build_simulation, CompareOp, DataGraph, DataNode, DateRange, GraphError, InMemoryDataProvider,
    NodeSpec, RewardConfig, SimulationConfig, PRIMARY_PRICE_SERIES,
};

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn two_stock_config() -> SimulationConfig {
    SimulationConfig {
        stock_names: vec!["STOCK_1".to_string(), "STOCK_2".to_string()],
        from_date: date(1),
        to_date: date(5),
        min_duration: 5,
        max_duration: 5,
        min_start_balance: 100,
        max_start_balance: 100,
        commission: OrderedFloat(0.0),
        max_stock_owned: 2,
        stock_data_randomization: None,
        data: vec![NodeSpec::RealStockData],
        reward: RewardConfig::NetWorthRatio {
            scaling_factor: OrderedFloat(1.0),
            bias: OrderedFloat(0.0),
        },
    }
}

fn two_stock_provider() -> Arc<InMemoryDataProvider> {
    let mut provider = InMemoryDataProvider::new();
    let range = DateRange::new(date(1), date(5));
    provider.add_constant_series("STOCK_1", &range, 20.0);
    provider.add_constant_series("STOCK_2", &range, 10.0);
    Arc::new(provider)
}

#[test]
fn toggle_actions_conserve_net_worth_at_constant_prices() {
    let mut simulation = build_simulation(&two_stock_config(), two_stock_provider()).unwrap();
    simulation.set_seed(1);
    simulation.reset().unwrap();
    assert_eq!(simulation.balance(), 100.0);

    // Buy the first symbol: budget 100/2 = 50 buys 2 units at 20.
    let (observation, _, done) = simulation.step(&[true, false]).unwrap();
    assert!(!done);
    assert_eq!(simulation.balance(), 60.0);
    assert_eq!(simulation.owned_stocks(), &[2, 0]);
    assert_eq!(observation.get("net_worth"), Some(100.0));

    // Buy the second: the remaining slot gets the whole 60, 6 units at 10.
    simulation.step(&[false, true]).unwrap();
    assert_eq!(simulation.balance(), 0.0);
    assert_eq!(simulation.owned_stocks(), &[2, 6]);
    assert_eq!(simulation.net_worth(), 100.0);

    // Sell back both positions over the last two days.
    simulation.step(&[true, false]).unwrap();
    assert_eq!(simulation.balance(), 40.0);
    assert_eq!(simulation.owned_stocks(), &[0, 6]);

    let (observation, _, done) = simulation.step(&[false, true]).unwrap();
    assert!(done);
    assert_eq!(simulation.balance(), 100.0);
    assert_eq!(simulation.owned_stocks(), &[0, 0]);
    assert_eq!(observation.get("net_worth"), Some(100.0));
}

#[test]
fn too_expensive_stock_is_skipped() {
    let mut config = two_stock_config();
    config.min_start_balance = 10;
    config.max_start_balance = 10;
    config.max_stock_owned = 1;
    let mut simulation = build_simulation(&config, two_stock_provider()).unwrap();
    simulation.set_seed(1);
    simulation.reset().unwrap();

    // Budget 10 cannot afford a single unit at 20.
    simulation.step(&[true, false]).unwrap();
    assert_eq!(simulation.balance(), 10.0);
    assert_eq!(simulation.owned_stocks(), &[0, 0]);
    assert_eq!(simulation.net_worth(), 10.0);
}

#[test]
fn net_worth_reward_follows_growth() {
    // Prices double on day 3: an agent holding stock gains, one in cash
    // does not.
    let mut provider = InMemoryDataProvider::new();
    provider.add_series(
        "STOCK_1",
        vec![
            stocksim::PricePoint::new(date(1), 10.0),
            stocksim::PricePoint::new(date(2), 10.0),
            stocksim::PricePoint::new(date(3), 20.0),
            stocksim::PricePoint::new(date(4), 20.0),
            stocksim::PricePoint::new(date(5), 20.0),
        ],
    );
    let mut config = two_stock_config();
    config.stock_names = vec!["STOCK_1".to_string()];
    config.max_stock_owned = 1;
    let mut simulation = build_simulation(&config, Arc::new(provider)).unwrap();
    simulation.set_seed(1);
    simulation.reset().unwrap();

    // Buy 10 units at 10.
    let (_, reward, _) = simulation.step(&[true]).unwrap();
    assert!((reward - 0.0).abs() < 1e-12);

    // Day 2 -> 3: position rides the doubling. Net worth at the step's
    // action date still prices at 10; the next step sees 20.
    simulation.step(&[false]).unwrap();
    let (_, reward, _) = simulation.step(&[false]).unwrap();
    assert!(reward > 0.9);
    assert!(simulation.net_worth() > 190.0);
    assert!(simulation.overall_reward() > 0.0);
}

#[test]
fn graph_preparation_is_idempotent_and_buffered() {
    let mut graph = DataGraph::new(
        DataNode::provider_prices(),
        vec!["STOCK_1".to_string(), "STOCK_2".to_string()],
    )
    .unwrap();
    let average = graph.register(DataNode::running_average(PRIMARY_PRICE_SERIES, 4).unwrap());
    graph.register(DataNode::comparator(
        PRIMARY_PRICE_SERIES,
        average,
        CompareOp::Gt,
    ));

    // Warm-up buffer flows down the chain.
    assert_eq!(graph.get_buffer().unwrap(), 4);

    graph.set_date_range(DateRange::new(date(1), date(10)));
    let provider = {
        let mut provider = InMemoryDataProvider::new();
        let range = DateRange::new(date(1), date(10));
        provider.add_constant_series("STOCK_1", &range, 20.0);
        provider.add_constant_series("STOCK_2", &range, 10.0);
        provider
    };

    graph.prepare_data(&provider).unwrap();
    assert_eq!(graph.computations(), 3);
    graph.prepare_data(&provider).unwrap();
    assert_eq!(graph.computations(), 3);

    // The comparator's dates are clipped by the average's warm-up.
    assert_eq!(graph.available_dates().first(), Some(&date(4)));
}

#[test]
fn cycles_surface_from_graph_operations() {
    let mut graph =
        DataGraph::new(DataNode::provider_prices(), vec!["STOCK_1".to_string()]).unwrap();
    let mut looped = DataNode::comparator(PRIMARY_PRICE_SERIES, PRIMARY_PRICE_SERIES, CompareOp::Gt);
    let own_id = looped.id().to_string();
    looped.rewrite_dependency(PRIMARY_PRICE_SERIES, &own_id);
    graph.register(looped);
    graph.set_date_range(DateRange::new(date(1), date(5)));

    let provider = InMemoryDataProvider::new();
    assert!(matches!(
        graph.prepare_data(&provider),
        Err(GraphError::CircularDependency(_))
    ));
    assert!(matches!(
        graph.get_buffer(),
        Err(GraphError::CircularDependency(_))
    ));
}
