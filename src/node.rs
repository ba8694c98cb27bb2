//! Data nodes: the units of computable, date-indexed data.
//!
//! Each node owns one [`Frame`], declares its dependencies by id, and knows
//! how to prepare itself once those dependencies are ready. The node kinds
//! form a closed set, so behavior is dispatched over a sum type rather than
//! trait objects: raw price series (provider-backed, generated, or a
//! randomized layer), derived analyses, and the simulation-state ledgers
//! the trading loop writes into.

use crate::analytics::CompareOp;
use crate::frame::Frame;
use crate::graph::GraphError;
use crate::time_series::{DataProvider, DateRange};
use chrono::NaiveDate;
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Symbolic dependency id that registration rewrites to the graph's
/// concrete primary price-series id.
pub const PRIMARY_PRICE_SERIES: &str = "stock_data";

/// Anchor for synthetic price generation; curves are functions of days
/// elapsed from this date so generated data is reproducible.
pub fn generation_anchor() -> NaiveDate {
    NaiveDate::from_ymd_opt(2010, 1, 1).unwrap_or_default()
}

/// Coarse classification of a data node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Absolute price data, one column per tradable symbol
    PriceSeries,
    /// Derived analysis computed from other nodes
    Analysis,
    /// Ledger written by the simulation as the episode progresses
    SimulationState,
}

/// Gaussian noise parameters for the randomized price layer.
///
/// OrderedFloat keeps the parameters `Eq + Hash` so node specs can be
/// deduplicated and used as map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoiseParams {
    pub mean: OrderedFloat<f64>,
    pub stdev: OrderedFloat<f64>,
}

impl NoiseParams {
    pub fn new(mean: f64, stdev: f64) -> Self {
        NoiseParams {
            mean: OrderedFloat(mean),
            stdev: OrderedFloat(stdev),
        }
    }
}

/// Deterministic per-symbol price curve for generated stock data.
///
/// Evaluated on the number of days elapsed from [`generation_anchor`];
/// symbols cycle through the configured curve list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum SyntheticCurve {
    /// `base + slope * days`
    Linear {
        base: OrderedFloat<f64>,
        slope: OrderedFloat<f64>,
    },
    /// `base + amplitude * sin(2 * pi * days / period_days)`
    Sine {
        base: OrderedFloat<f64>,
        amplitude: OrderedFloat<f64>,
        period_days: OrderedFloat<f64>,
    },
    /// Always `value`
    Constant { value: OrderedFloat<f64> },
}

impl SyntheticCurve {
    /// Evaluates the curve at `days` elapsed from the anchor date.
    pub fn evaluate(&self, days: i64) -> f64 {
        match self {
            SyntheticCurve::Linear { base, slope } => base.0 + slope.0 * days as f64,
            SyntheticCurve::Sine {
                base,
                amplitude,
                period_days,
            } => base.0 + amplitude.0 * (2.0 * std::f64::consts::PI * days as f64 / period_days.0).sin(),
            SyntheticCurve::Constant { value } => value.0,
        }
    }
}

/// Behavior of a data node. Closed set: dispatch is by pattern match.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeVariant {
    /// Absolute prices fetched from the raw price provider
    ProviderPrices,
    /// Absolute prices generated from deterministic curves
    GeneratedPrices { curves: Vec<SyntheticCurve> },
    /// Dependency prices multiplied by `1 + N(mean, stdev)` noise
    Randomized { noise: NoiseParams },
    /// Rolling mean over `num_days`
    RunningAverage { num_days: usize },
    /// Day-over-day change scaled by `scaling_factor`
    RelativeChange { scaling_factor: f64 },
    /// Element-wise 0/1 comparison between two dependencies
    Comparator { op: CompareOp },
    /// One-column ledger (balance, net worth) written by the simulation
    SingleValue { name: String },
    /// Per-symbol ownership ledger written by the simulation
    Ownership,
}

impl NodeVariant {
    /// Dependency arity this variant expects.
    pub fn expected_dependencies(&self) -> usize {
        match self {
            NodeVariant::ProviderPrices
            | NodeVariant::GeneratedPrices { .. }
            | NodeVariant::SingleValue { .. }
            | NodeVariant::Ownership => 0,
            NodeVariant::Randomized { .. }
            | NodeVariant::RunningAverage { .. }
            | NodeVariant::RelativeChange { .. } => 1,
            NodeVariant::Comparator { .. } => 2,
        }
    }

    /// Kind classification for the variant.
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeVariant::ProviderPrices
            | NodeVariant::GeneratedPrices { .. }
            | NodeVariant::Randomized { .. } => NodeKind::PriceSeries,
            NodeVariant::RunningAverage { .. }
            | NodeVariant::RelativeChange { .. }
            | NodeVariant::Comparator { .. } => NodeKind::Analysis,
            NodeVariant::SingleValue { .. } | NodeVariant::Ownership => NodeKind::SimulationState,
        }
    }

    /// Derives the canonical node id from the variant and its dependencies.
    fn derive_id(&self, dependencies: &[String]) -> String {
        match self {
            NodeVariant::ProviderPrices => PRIMARY_PRICE_SERIES.to_string(),
            NodeVariant::GeneratedPrices { .. } => "generated_stock_data".to_string(),
            NodeVariant::Randomized { .. } => "randomized_stock_data".to_string(),
            NodeVariant::RunningAverage { num_days } => {
                format!("running_average_{}_for_{}", num_days, dependencies[0])
            }
            NodeVariant::RelativeChange { .. } => format!("relative_{}", dependencies[0]),
            NodeVariant::Comparator { op } => {
                format!("{}_{}_{}", dependencies[0], op, dependencies[1])
            }
            NodeVariant::SingleValue { name } => name.clone(),
            NodeVariant::Ownership => "stock_ownership".to_string(),
        }
    }

    fn default_visibility(&self) -> bool {
        // Relative change mirrors the price series it derives from; it is
        // an input to comparators rather than an observation feature.
        !matches!(self, NodeVariant::RelativeChange { .. })
    }
}

/// One named, date-indexed table of values with declared dependencies.
#[derive(Debug, Clone)]
pub struct DataNode {
    id: String,
    kind: NodeKind,
    dependencies: Vec<String>,
    visible: bool,
    variant: NodeVariant,
    pub(crate) buffer: usize,
    pub(crate) ready: bool,
    pub(crate) frame: Frame,
}

impl DataNode {
    /// Creates a node, validating the dependency arity for the variant.
    ///
    /// # Errors
    /// Returns `GraphError::Configuration` when the dependency count does
    /// not match the variant's expected arity.
    pub fn new(variant: NodeVariant, dependencies: Vec<String>) -> Result<Self, GraphError> {
        let expected = variant.expected_dependencies();
        if dependencies.len() != expected {
            return Err(GraphError::Configuration(format!(
                "Expected {} dependencies, got {}",
                expected,
                dependencies.len()
            )));
        }

        Ok(DataNode::build(variant, dependencies))
    }

    /// Infallible constructor for variants whose arity the caller supplied
    /// by signature.
    fn build(variant: NodeVariant, dependencies: Vec<String>) -> Self {
        let id = variant.derive_id(&dependencies);
        let visible = variant.default_visibility();
        DataNode {
            id,
            kind: variant.kind(),
            dependencies,
            visible,
            variant,
            buffer: 0,
            ready: false,
            frame: Frame::empty(),
        }
    }

    /// Provider-backed absolute price series.
    pub fn provider_prices() -> Self {
        DataNode::build(NodeVariant::ProviderPrices, Vec::new())
    }

    /// Synthetic absolute price series.
    pub fn generated_prices(curves: Vec<SyntheticCurve>) -> Result<Self, GraphError> {
        if curves.is_empty() {
            return Err(GraphError::Configuration(
                "Generated price series needs at least one curve".to_string(),
            ));
        }
        DataNode::new(NodeVariant::GeneratedPrices { curves }, Vec::new())
    }

    /// Randomization layer over a price series dependency.
    pub fn randomized(dependency: impl Into<String>, noise: NoiseParams) -> Self {
        DataNode::build(NodeVariant::Randomized { noise }, vec![dependency.into()])
    }

    /// Rolling average analysis over a dependency.
    pub fn running_average(dependency: impl Into<String>, num_days: usize) -> Result<Self, GraphError> {
        if num_days == 0 {
            return Err(GraphError::Configuration(
                "Running average needs num_days >= 1".to_string(),
            ));
        }
        DataNode::new(
            NodeVariant::RunningAverage { num_days },
            vec![dependency.into()],
        )
    }

    /// Day-over-day relative change analysis over a dependency.
    pub fn relative_change(dependency: impl Into<String>, scaling_factor: f64) -> Self {
        DataNode::build(
            NodeVariant::RelativeChange { scaling_factor },
            vec![dependency.into()],
        )
    }

    /// Element-wise comparator between two dependencies.
    pub fn comparator(
        left: impl Into<String>,
        right: impl Into<String>,
        op: CompareOp,
    ) -> Self {
        DataNode::build(NodeVariant::Comparator { op }, vec![left.into(), right.into()])
    }

    /// One-column simulation ledger (balance, net worth).
    pub fn single_value(name: impl Into<String>) -> Self {
        DataNode::build(NodeVariant::SingleValue { name: name.into() }, Vec::new())
    }

    /// Per-symbol ownership ledger.
    pub fn ownership() -> Self {
        DataNode::build(NodeVariant::Ownership, Vec::new())
    }

    /// Overrides the default visibility of the node.
    pub fn with_visibility(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Rewrites a dependency entry in place. Registration uses this to
    /// resolve the symbolic primary id; custom wiring can use it directly.
    pub fn rewrite_dependency(&mut self, from: &str, to: &str) {
        for dep in &mut self.dependencies {
            if dep == from {
                *dep = to.to_string();
            }
        }
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn ready(&self) -> bool {
        self.ready
    }

    /// Buffer days as of the last `get_buffer` traversal.
    pub fn buffer(&self) -> usize {
        self.buffer
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Writes a row into a simulation-state ledger.
    ///
    /// Computed nodes are immutable between resets, so writes to them are
    /// rejected as lookup misuse.
    pub fn set_row(&mut self, date: NaiveDate, values: &[f64]) -> Result<(), GraphError> {
        if self.kind != NodeKind::SimulationState {
            return Err(GraphError::Configuration(format!(
                "Node {} is not simulation state and cannot be written",
                self.id
            )));
        }
        if !self.frame.set_row(date, values) {
            return Err(GraphError::Lookup(format!(
                "{} is not in the data for {}",
                date, self.id
            )));
        }
        Ok(())
    }

    /// Computes this node's frame from prepared dependency frames.
    ///
    /// Pure with respect to the node: the caller stores the returned frame
    /// and flips `ready`, which keeps the computation side-effect-free for
    /// the computed variants and lets ledgers re-zero on each preparation.
    pub(crate) fn compute_frame(
        &self,
        range: &DateRange,
        stock_names: &[String],
        provider: &dyn DataProvider,
        rng: &mut StdRng,
        deps: &[&Frame],
    ) -> Result<Frame, GraphError> {
        match &self.variant {
            NodeVariant::ProviderPrices => fetch_price_frame(provider, range, stock_names),
            NodeVariant::GeneratedPrices { curves } => {
                Ok(generate_price_frame(curves, range, stock_names))
            }
            NodeVariant::Randomized { noise } => {
                Ok(deps[0].perturbed(rng, noise.mean.0, noise.stdev.0))
            }
            NodeVariant::RunningAverage { num_days } => {
                let mut frame = deps[0].rolling_mean(*num_days);
                let template = format!("ra_{}_{}", num_days, self.dependencies[0]);
                frame.rename_columns(
                    stock_names
                        .iter()
                        .map(|name| format!("{}_{}", template, name))
                        .collect(),
                );
                Ok(frame)
            }
            NodeVariant::RelativeChange { scaling_factor } => {
                let mut frame = deps[0].relative_change(*scaling_factor);
                frame.rename_columns(
                    stock_names
                        .iter()
                        .map(|name| format!("relative_{}_{}", self.dependencies[0], name))
                        .collect(),
                );
                Ok(frame)
            }
            NodeVariant::Comparator { op } => {
                let mut frame = deps[0].compare(deps[1], *op);
                frame.rename_columns(
                    stock_names
                        .iter()
                        .take(frame.columns().len())
                        .map(|name| format!("{}_{}", self.id, name))
                        .collect(),
                );
                Ok(frame)
            }
            NodeVariant::SingleValue { name } => {
                Ok(Frame::zeros(range, vec![name.clone()]))
            }
            NodeVariant::Ownership => Ok(Frame::zeros(
                range,
                stock_names
                    .iter()
                    .map(|name| format!("owned_{}", name))
                    .collect(),
            )),
        }
    }

    /// Applies the variant's reset policy given the dependencies' outcomes.
    ///
    /// Returns the node's readiness after the reset. Price sources keep
    /// their fetched data; the randomized layer and simulation ledgers
    /// always clear; analyses clear when any dependency cleared.
    pub(crate) fn apply_reset(&mut self, deps_ready: &[bool]) -> bool {
        match &self.variant {
            NodeVariant::ProviderPrices | NodeVariant::GeneratedPrices { .. } => {}
            NodeVariant::Randomized { .. }
            | NodeVariant::SingleValue { .. }
            | NodeVariant::Ownership => {
                self.ready = false;
            }
            NodeVariant::RunningAverage { .. }
            | NodeVariant::RelativeChange { .. }
            | NodeVariant::Comparator { .. } => {
                self.ready = self.ready && deps_ready.iter().all(|&ready| ready);
            }
        }
        self.ready
    }

    /// Recomputes the node's buffer from dependency buffers.
    ///
    /// Buffers are monotonically non-decreasing along a dependency chain:
    /// warm-up analyses add their own requirement on top of the largest
    /// dependency buffer.
    pub(crate) fn apply_buffer(&mut self, dep_buffers: &[usize]) -> usize {
        let inherited = dep_buffers.iter().copied().max().unwrap_or(0);
        self.buffer = match &self.variant {
            NodeVariant::RunningAverage { num_days } => inherited + num_days,
            NodeVariant::RelativeChange { .. } => inherited + 1,
            _ => inherited,
        };
        self.buffer
    }
}

/// Fetches a per-symbol price frame, aligned on the dates every symbol has.
fn fetch_price_frame(
    provider: &dyn DataProvider,
    range: &DateRange,
    stock_names: &[String],
) -> Result<Frame, GraphError> {
    let mut series = Vec::with_capacity(stock_names.len());
    for symbol in stock_names {
        let points = provider.get_price_series(symbol, range)?;
        series.push(points);
    }

    // Intersection of the per-symbol date indices: a date is usable only if
    // every symbol traded on it.
    let mut common: Option<BTreeSet<NaiveDate>> = None;
    for points in &series {
        let dates: BTreeSet<NaiveDate> = points.iter().map(|point| point.date).collect();
        common = Some(match common {
            Some(existing) => existing.intersection(&dates).copied().collect(),
            None => dates,
        });
    }
    let dates: Vec<NaiveDate> = common.unwrap_or_default().into_iter().collect();

    let rows: Vec<Vec<f64>> = dates
        .iter()
        .map(|date| {
            series
                .iter()
                .map(|points| {
                    points
                        .iter()
                        .find(|point| point.date == *date)
                        .map(|point| point.close)
                        .unwrap_or(f64::NAN)
                })
                .collect()
        })
        .collect();

    Ok(Frame::from_rows(stock_names.to_vec(), dates, rows))
}

/// Builds a synthetic price frame from deterministic curves.
fn generate_price_frame(
    curves: &[SyntheticCurve],
    range: &DateRange,
    stock_names: &[String],
) -> Frame {
    let dates: Vec<NaiveDate> = range.iter_days().collect();
    let base_offset = (range.start - generation_anchor()).num_days().abs();

    let rows: Vec<Vec<f64>> = dates
        .iter()
        .enumerate()
        .map(|(day_index, _)| {
            let days = base_offset + day_index as i64;
            stock_names
                .iter()
                .enumerate()
                .map(|(stock_index, _)| curves[stock_index % curves.len()].evaluate(days))
                .collect()
        })
        .collect();

    Frame::from_rows(stock_names.to_vec(), dates, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_series::{InMemoryDataProvider, PricePoint};
    use rand::SeedableRng;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_dependency_arity_is_validated() {
        let result = DataNode::new(NodeVariant::RunningAverage { num_days: 5 }, Vec::new());
        assert!(matches!(result, Err(GraphError::Configuration(_))));

        let result = DataNode::new(
            NodeVariant::Comparator { op: CompareOp::Gt },
            vec!["a".to_string()],
        );
        assert!(matches!(result, Err(GraphError::Configuration(_))));
    }

    #[test]
    fn test_derived_ids() {
        assert_eq!(DataNode::provider_prices().id(), "stock_data");
        assert_eq!(
            DataNode::running_average("stock_data", 10).unwrap().id(),
            "running_average_10_for_stock_data"
        );
        assert_eq!(
            DataNode::relative_change("stock_data", 1.0).id(),
            "relative_stock_data"
        );
        assert_eq!(
            DataNode::comparator("a", "b", CompareOp::Ge).id(),
            "a_ge_b"
        );
        assert_eq!(DataNode::single_value("balance").id(), "balance");
        assert_eq!(DataNode::ownership().id(), "stock_ownership");
    }

    #[test]
    fn test_relative_change_invisible_by_default() {
        assert!(!DataNode::relative_change("stock_data", 1.0).visible());
        assert!(DataNode::provider_prices().visible());
        assert!(DataNode::relative_change("stock_data", 1.0)
            .with_visibility(true)
            .visible());
    }

    #[test]
    fn test_provider_frame_aligns_on_common_dates() {
        let mut provider = InMemoryDataProvider::new();
        provider.add_series(
            "A",
            vec![
                PricePoint::new(date(1), 10.0),
                PricePoint::new(date(2), 11.0),
                PricePoint::new(date(3), 12.0),
            ],
        );
        // Symbol B is missing the middle date.
        provider.add_series(
            "B",
            vec![PricePoint::new(date(1), 20.0), PricePoint::new(date(3), 22.0)],
        );

        let range = DateRange::new(date(1), date(3));
        let node = DataNode::provider_prices();
        let mut rng = StdRng::seed_from_u64(0);
        let frame = node
            .compute_frame(&range, &names(&["A", "B"]), &provider, &mut rng, &[])
            .unwrap();

        assert_eq!(frame.len(), 2);
        assert_eq!(frame.row(date(1)), Some(&[10.0, 20.0][..]));
        assert_eq!(frame.row(date(3)), Some(&[12.0, 22.0][..]));
        assert!(!frame.contains(date(2)));
    }

    #[test]
    fn test_generated_prices_are_deterministic() {
        let curves = vec![
            SyntheticCurve::Linear {
                base: OrderedFloat(100.0),
                slope: OrderedFloat(1.0),
            },
            SyntheticCurve::Constant {
                value: OrderedFloat(50.0),
            },
        ];
        let node = DataNode::generated_prices(curves).unwrap();
        let range = DateRange::new(date(1), date(3));
        let provider = InMemoryDataProvider::new();
        let mut rng = StdRng::seed_from_u64(0);

        let frame = node
            .compute_frame(&range, &names(&["A", "B", "C"]), &provider, &mut rng, &[])
            .unwrap();

        assert_eq!(frame.len(), 3);
        let offset = (date(1) - generation_anchor()).num_days();
        let first = frame.row(date(1)).unwrap();
        assert_eq!(first[0], 100.0 + offset as f64); // linear curve
        assert_eq!(first[1], 50.0); // constant curve
        assert_eq!(first[2], first[0]); // third symbol cycles back to linear
        let second = frame.row(date(2)).unwrap();
        assert_eq!(second[0], first[0] + 1.0);
    }

    #[test]
    fn test_ledger_write_rules() {
        let range = DateRange::new(date(1), date(3));
        let provider = InMemoryDataProvider::new();
        let mut rng = StdRng::seed_from_u64(0);

        let mut balance = DataNode::single_value("balance");
        balance.frame = balance
            .compute_frame(&range, &names(&["A"]), &provider, &mut rng, &[])
            .unwrap();
        assert!(balance.set_row(date(2), &[120.0]).is_ok());
        assert_eq!(balance.frame().row(date(2)), Some(&[120.0][..]));
        assert!(matches!(
            balance.set_row(date(9), &[1.0]),
            Err(GraphError::Lookup(_))
        ));

        let mut prices = DataNode::provider_prices();
        assert!(matches!(
            prices.set_row(date(1), &[1.0]),
            Err(GraphError::Configuration(_))
        ));
    }

    #[test]
    fn test_buffer_propagation_rules() {
        let mut average = DataNode::running_average("stock_data", 30).unwrap();
        assert_eq!(average.apply_buffer(&[0]), 30);
        assert_eq!(average.apply_buffer(&[5]), 35);

        let mut relative = DataNode::relative_change("stock_data", 1.0);
        assert_eq!(relative.apply_buffer(&[10]), 11);

        let mut comparator = DataNode::comparator("a", "b", CompareOp::Gt);
        assert_eq!(comparator.apply_buffer(&[3, 8]), 8);

        let mut prices = DataNode::provider_prices();
        assert_eq!(prices.apply_buffer(&[]), 0);
    }

    #[test]
    fn test_reset_policies() {
        let mut prices = DataNode::provider_prices();
        prices.ready = true;
        assert!(prices.apply_reset(&[]));

        let mut randomized = DataNode::randomized("stock_data", NoiseParams::new(0.0, 0.01));
        randomized.ready = true;
        assert!(!randomized.apply_reset(&[true]));

        let mut average = DataNode::running_average("stock_data", 5).unwrap();
        average.ready = true;
        assert!(average.apply_reset(&[true]));
        assert!(!average.apply_reset(&[false]));

        let mut balance = DataNode::single_value("balance");
        balance.ready = true;
        assert!(!balance.apply_reset(&[]));
    }
}
