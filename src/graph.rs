//! Data dependency graph.
//!
//! Holds every registered [`DataNode`] keyed by id and drives the three
//! graph-wide operations (`prepare_data`, `reset`, `get_buffer`) through one
//! shared depth-first fold. Dependencies are resolved lazily at traversal
//! time, so cycles and dangling references surface as errors from the
//! operations rather than at registration.

use crate::frame::Frame;
use crate::node::{DataNode, NodeKind, PRIMARY_PRICE_SERIES};
use crate::time_series::{DataProvider, DateRange, ProviderError};
use chrono::NaiveDate;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Errors raised by graph construction and traversal.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphError {
    /// Invalid node or graph configuration
    Configuration(String),
    /// A dependency chain loops back on itself; payload is the node id
    /// where the loop was detected
    CircularDependency(String),
    /// A referenced node, date, or column does not exist
    Lookup(String),
    /// The raw price provider failed
    Provider(ProviderError),
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            GraphError::CircularDependency(id) => {
                write!(f, "Circular dependency detected at node: {}", id)
            }
            GraphError::Lookup(msg) => write!(f, "Lookup error: {}", msg),
            GraphError::Provider(err) => write!(f, "Provider error: {}", err),
        }
    }
}

impl std::error::Error for GraphError {}

impl From<ProviderError> for GraphError {
    fn from(err: ProviderError) -> Self {
        GraphError::Provider(err)
    }
}

/// One flattened row of every visible node's values at a single date.
///
/// Feature names follow node registration order, so the layout is stable
/// across steps and episodes of the same graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    names: Vec<String>,
    values: Vec<f64>,
}

impl Observation {
    pub(crate) fn new(names: Vec<String>, values: Vec<f64>) -> Self {
        Observation { names, values }
    }

    /// Feature names, in graph registration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Feature values, aligned with `names`.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Looks up a single feature by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|position| self.values[position])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The dependency graph of data nodes backing one simulation.
///
/// The graph always has a primary price series; analyses registered with the
/// symbolic dependency id `"stock_data"` are rewired to it, which lets the
/// same analysis configuration run against real, generated, or randomized
/// prices.
#[derive(Debug, Clone)]
pub struct DataGraph {
    order: Vec<String>,
    nodes: HashMap<String, DataNode>,
    primary_id: String,
    stock_names: Vec<String>,
    date_range: Option<DateRange>,
    rng: StdRng,
    computations: usize,
}

impl DataGraph {
    /// Creates a graph around a primary price series node.
    ///
    /// # Errors
    /// `Configuration` when the primary node is not a price series or the
    /// symbol list is empty.
    pub fn new(primary: DataNode, stock_names: Vec<String>) -> Result<Self, GraphError> {
        if primary.kind() != NodeKind::PriceSeries {
            return Err(GraphError::Configuration(format!(
                "Primary node {} must be a price series",
                primary.id()
            )));
        }
        if stock_names.is_empty() {
            return Err(GraphError::Configuration(
                "At least one stock name is required".to_string(),
            ));
        }

        let primary_id = primary.id().to_string();
        let mut graph = DataGraph {
            order: Vec::new(),
            nodes: HashMap::new(),
            primary_id: primary_id.clone(),
            stock_names,
            date_range: None,
            rng: StdRng::from_entropy(),
            computations: 0,
        };
        graph.insert(primary);
        Ok(graph)
    }

    /// Reseeds the graph's random source, fixing the randomized price layer.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Registers a node, rewriting the symbolic `"stock_data"` dependency to
    /// the current primary price series. Registration is idempotent: an
    /// already-registered id is returned unchanged.
    ///
    /// Returns the id the node is registered under.
    pub fn register(&mut self, mut node: DataNode) -> String {
        node.rewrite_dependency(PRIMARY_PRICE_SERIES, &self.primary_id);
        // Id derivation happens at construction, so a node built against the
        // symbolic name keeps its symbolic-name id. That is intentional: two
        // registrations of the same analysis collapse to one node.
        let id = node.id().to_string();
        if self.nodes.contains_key(&id) {
            debug!("Node {} already registered, skipping", id);
            return id;
        }
        debug!("Registering node {}", id);
        self.insert(node);
        id
    }

    /// Registers a price-series node that becomes the new primary.
    ///
    /// Used for the randomization layer: analyses registered afterwards with
    /// the symbolic dependency read the noisy prices instead of the raw ones.
    ///
    /// # Errors
    /// `Configuration` when the node is not a price series.
    pub fn register_primary(&mut self, node: DataNode) -> Result<String, GraphError> {
        if node.kind() != NodeKind::PriceSeries {
            return Err(GraphError::Configuration(format!(
                "Node {} cannot act as primary price series",
                node.id()
            )));
        }
        let id = self.register(node);
        self.primary_id = id.clone();
        Ok(id)
    }

    fn insert(&mut self, node: DataNode) {
        self.order.push(node.id().to_string());
        self.nodes.insert(node.id().to_string(), node);
    }

    /// Id of the current primary price series.
    pub fn primary_id(&self) -> &str {
        &self.primary_id
    }

    /// Tradable symbols, in column order.
    pub fn stock_names(&self) -> &[String] {
        &self.stock_names
    }

    /// Registered node ids in registration order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn node(&self, id: &str) -> Option<&DataNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Sets the date range the next `prepare_data` will cover.
    pub fn set_date_range(&mut self, range: DateRange) {
        self.date_range = Some(range);
    }

    pub fn date_range(&self) -> Option<DateRange> {
        self.date_range
    }

    /// Number of node computations performed so far. Unchanged by a
    /// `prepare_data` call that finds every node ready.
    pub fn computations(&self) -> usize {
        self.computations
    }

    /// Depth-first fold over the dependency graph with memoization.
    ///
    /// `busy` marks nodes whose dependencies are still being resolved;
    /// hitting one again means the dependency chain loops. `done` memoizes
    /// per-node results so shared dependencies are visited once.
    fn fold<T, F>(
        &mut self,
        id: &str,
        busy: &mut HashSet<String>,
        done: &mut HashMap<String, T>,
        apply: &mut F,
    ) -> Result<T, GraphError>
    where
        T: Clone,
        F: FnMut(&mut DataGraph, &str, Vec<T>) -> Result<T, GraphError>,
    {
        if let Some(memoized) = done.get(id) {
            return Ok(memoized.clone());
        }
        if busy.contains(id) {
            return Err(GraphError::CircularDependency(id.to_string()));
        }
        busy.insert(id.to_string());

        let dependencies = self
            .nodes
            .get(id)
            .ok_or_else(|| GraphError::Lookup(format!("Unknown node: {}", id)))?
            .dependencies()
            .to_vec();

        let mut dep_results = Vec::with_capacity(dependencies.len());
        for dependency in &dependencies {
            dep_results.push(self.fold(dependency, busy, done, apply)?);
        }

        busy.remove(id);
        let result = apply(self, id, dep_results)?;
        done.insert(id.to_string(), result.clone());
        Ok(result)
    }

    /// Runs a fold over every registered node, in registration order.
    fn fold_all<T, F>(&mut self, mut apply: F) -> Result<HashMap<String, T>, GraphError>
    where
        T: Clone,
        F: FnMut(&mut DataGraph, &str, Vec<T>) -> Result<T, GraphError>,
    {
        let mut busy = HashSet::new();
        let mut done = HashMap::new();
        for id in self.order.clone() {
            self.fold(&id, &mut busy, &mut done, &mut apply)?;
        }
        Ok(done)
    }

    /// Computes every node that is not already ready, dependencies first.
    ///
    /// # Errors
    /// - `Configuration` when no date range has been set
    /// - `CircularDependency` / `Lookup` for malformed dependency chains
    /// - `Provider` when the raw price source fails
    pub fn prepare_data(&mut self, provider: &dyn DataProvider) -> Result<(), GraphError> {
        let range = self.date_range.ok_or_else(|| {
            GraphError::Configuration("Date range must be set before preparing data".to_string())
        })?;

        let before = self.computations;
        self.fold_all(|graph, id, _deps: Vec<()>| {
            let node = graph
                .nodes
                .get(id)
                .ok_or_else(|| GraphError::Lookup(format!("Unknown node: {}", id)))?;
            if node.ready() {
                return Ok(());
            }

            let dep_ids = node.dependencies().to_vec();
            let mut dep_frames = Vec::with_capacity(dep_ids.len());
            for dep_id in &dep_ids {
                let dep = graph
                    .nodes
                    .get(dep_id)
                    .ok_or_else(|| GraphError::Lookup(format!("Unknown node: {}", dep_id)))?;
                dep_frames.push(dep.frame());
            }

            let node = &graph.nodes[id];
            let frame = node.compute_frame(
                &range,
                &graph.stock_names,
                provider,
                &mut graph.rng,
                &dep_frames,
            )?;

            let node = graph
                .nodes
                .get_mut(id)
                .ok_or_else(|| GraphError::Lookup(format!("Unknown node: {}", id)))?;
            node.frame = frame;
            node.ready = true;
            graph.computations += 1;
            Ok(())
        })?;

        info!(
            "Prepared data graph: {} of {} nodes computed",
            self.computations - before,
            self.order.len()
        );
        Ok(())
    }

    /// Resets the graph for a new episode, applying each node's reset
    /// policy dependencies-first.
    pub fn reset(&mut self) -> Result<(), GraphError> {
        self.fold_all(|graph, id, deps_ready: Vec<bool>| {
            let node = graph
                .nodes
                .get_mut(id)
                .ok_or_else(|| GraphError::Lookup(format!("Unknown node: {}", id)))?;
            Ok(node.apply_reset(&deps_ready))
        })?;
        Ok(())
    }

    /// Recomputes per-node warm-up buffers and returns the largest one.
    ///
    /// The buffer is the number of extra leading days the graph needs so
    /// that every analysis has full history at the episode's first date.
    pub fn get_buffer(&mut self) -> Result<usize, GraphError> {
        let buffers = self.fold_all(|graph, id, dep_buffers: Vec<usize>| {
            let node = graph
                .nodes
                .get_mut(id)
                .ok_or_else(|| GraphError::Lookup(format!("Unknown node: {}", id)))?;
            Ok(node.apply_buffer(&dep_buffers))
        })?;
        Ok(buffers.values().copied().max().unwrap_or(0))
    }

    /// Dates at which every visible node has a row, ascending.
    ///
    /// These are the dates an episode can step through: raw series drop
    /// non-trading days and analyses drop their warm-up rows, so the usable
    /// index is the intersection.
    pub fn available_dates(&self) -> Vec<NaiveDate> {
        let mut common: Option<BTreeSet<NaiveDate>> = None;
        for id in &self.order {
            let node = &self.nodes[id];
            if !node.visible() {
                continue;
            }
            let dates: BTreeSet<NaiveDate> = node.frame().dates().iter().copied().collect();
            common = Some(match common {
                Some(existing) => existing.intersection(&dates).copied().collect(),
                None => dates,
            });
        }
        common.unwrap_or_default().into_iter().collect()
    }

    /// Flattens every visible node's row at `date` into one observation,
    /// in registration order.
    ///
    /// # Errors
    /// `Lookup` when a visible node has no row at `date`.
    pub fn observation(&self, date: NaiveDate) -> Result<Observation, GraphError> {
        let mut names = Vec::new();
        let mut values = Vec::new();
        for id in &self.order {
            let node = &self.nodes[id];
            if !node.visible() {
                continue;
            }
            let row = node.frame().row(date).ok_or_else(|| {
                GraphError::Lookup(format!("{} is not in the data for {}", date, id))
            })?;
            names.extend(node.frame().columns().iter().cloned());
            values.extend_from_slice(row);
        }
        Ok(Observation::new(names, values))
    }

    /// Reads one node's row at `date`.
    pub fn row(&self, id: &str, date: NaiveDate) -> Result<&[f64], GraphError> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| GraphError::Lookup(format!("Unknown node: {}", id)))?;
        node.frame()
            .row(date)
            .ok_or_else(|| GraphError::Lookup(format!("{} is not in the data for {}", date, id)))
    }

    /// Writes a row into a simulation-state ledger node.
    pub fn set_state_row(
        &mut self,
        id: &str,
        date: NaiveDate,
        values: &[f64],
    ) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::Lookup(format!("Unknown node: {}", id)))?;
        node.set_row(date, values)
    }

    /// Frame of one node, for inspection and tests.
    pub fn frame(&self, id: &str) -> Result<&Frame, GraphError> {
        self.nodes
            .get(id)
            .map(|node| node.frame())
            .ok_or_else(|| GraphError::Lookup(format!("Unknown node: {}", id)))
    }
}
