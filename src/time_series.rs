use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single daily price observation for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Trading date of the observation
    pub date: NaiveDate,
    /// Close price on that date
    pub close: f64,
}

impl PricePoint {
    /// Creates a new PricePoint.
    pub fn new(date: NaiveDate, close: f64) -> Self {
        PricePoint { date, close }
    }
}

/// Date range for querying price data, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Start date (inclusive)
    pub start: NaiveDate,
    /// End date (inclusive)
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a new DateRange.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    /// Iterates every calendar date in the range, inclusive.
    pub fn iter_days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |date| *date <= end)
    }

    /// Number of calendar days covered by the range.
    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// Errors that can occur when querying a data provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Symbol not present in the data source
    SymbolNotFound(String),
    /// Invalid date range (start > end)
    InvalidDateRange,
    /// Underlying storage failure
    Storage(String),
    /// Generic error message
    Other(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::SymbolNotFound(symbol) => write!(f, "Symbol not found: {}", symbol),
            ProviderError::InvalidDateRange => write!(f, "Invalid date range"),
            ProviderError::Storage(msg) => write!(f, "Storage error: {}", msg),
            ProviderError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Trait for raw price sources.
///
/// The simulation core is decoupled from how price history is obtained;
/// implementations can be backed by an in-memory map (testing), a local
/// CSV cache, or any other storage.
///
/// Providers are shared across parallel episode rollouts, so they must be
/// `Send + Sync` and `get_price_series` takes `&self`.
pub trait DataProvider: Send + Sync {
    /// Retrieves the daily close series for one symbol over a date range.
    ///
    /// # Arguments
    /// * `symbol` - The ticker symbol to query
    /// * `date_range` - The date range to query (inclusive on both ends)
    ///
    /// # Errors
    /// Returns an error if the symbol is unknown, the range is invalid,
    /// or the underlying source cannot be read.
    fn get_price_series(
        &self,
        symbol: &str,
        date_range: &DateRange,
    ) -> Result<Vec<PricePoint>, ProviderError>;
}

/// In-memory data provider implementation for testing.
///
/// Stores price series in a HashMap keyed by symbol, which allows testing
/// the full graph/simulation stack without touching the filesystem.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataProvider {
    data: HashMap<String, Vec<PricePoint>>,
}

impl InMemoryDataProvider {
    /// Creates a new empty in-memory data provider.
    pub fn new() -> Self {
        InMemoryDataProvider {
            data: HashMap::new(),
        }
    }

    /// Adds a price series for a symbol. Points should be sorted by date.
    pub fn add_series(&mut self, symbol: impl Into<String>, points: Vec<PricePoint>) {
        self.data.insert(symbol.into(), points);
    }

    /// Adds a flat series at a constant price over the given range.
    pub fn add_constant_series(
        &mut self,
        symbol: impl Into<String>,
        range: &DateRange,
        price: f64,
    ) {
        let points = range
            .iter_days()
            .map(|date| PricePoint::new(date, price))
            .collect();
        self.data.insert(symbol.into(), points);
    }

    /// Clears all data from the provider.
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

impl DataProvider for InMemoryDataProvider {
    fn get_price_series(
        &self,
        symbol: &str,
        date_range: &DateRange,
    ) -> Result<Vec<PricePoint>, ProviderError> {
        if date_range.start > date_range.end {
            return Err(ProviderError::InvalidDateRange);
        }

        let all_points = self
            .data
            .get(symbol)
            .ok_or_else(|| ProviderError::SymbolNotFound(symbol.to_string()))?;

        let filtered: Vec<PricePoint> = all_points
            .iter()
            .filter(|point| point.date >= date_range.start && point.date <= date_range.end)
            .copied()
            .collect();

        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_date_range_iter_days() {
        let range = DateRange::new(date(2024, 1, 15), date(2024, 1, 18));
        let days: Vec<NaiveDate> = range.iter_days().collect();
        assert_eq!(days.len(), 4);
        assert_eq!(days[0], date(2024, 1, 15));
        assert_eq!(days[3], date(2024, 1, 18));
        assert_eq!(range.num_days(), 4);
    }

    #[test]
    fn test_in_memory_provider_add_and_query() {
        let mut provider = InMemoryDataProvider::new();
        provider.add_series(
            "AAPL",
            vec![
                PricePoint::new(date(2024, 1, 15), 150.0),
                PricePoint::new(date(2024, 1, 16), 151.0),
                PricePoint::new(date(2024, 1, 17), 152.0),
            ],
        );

        let range = DateRange::new(date(2024, 1, 15), date(2024, 1, 16));
        let result = provider.get_price_series("AAPL", &range).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].close, 150.0);
        assert_eq!(result[1].close, 151.0);
    }

    #[test]
    fn test_in_memory_provider_symbol_not_found() {
        let provider = InMemoryDataProvider::new();
        let range = DateRange::new(date(2024, 1, 15), date(2024, 1, 16));
        let result = provider.get_price_series("AAPL", &range);
        assert_eq!(
            result.unwrap_err(),
            ProviderError::SymbolNotFound("AAPL".to_string())
        );
    }

    #[test]
    fn test_in_memory_provider_invalid_date_range() {
        let mut provider = InMemoryDataProvider::new();
        provider.add_series("MSFT", vec![PricePoint::new(date(2024, 1, 15), 400.0)]);
        let range = DateRange::new(date(2024, 1, 16), date(2024, 1, 15));
        let result = provider.get_price_series("MSFT", &range);
        assert_eq!(result.unwrap_err(), ProviderError::InvalidDateRange);
    }

    #[test]
    fn test_constant_series_covers_range() {
        let mut provider = InMemoryDataProvider::new();
        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 10));
        provider.add_constant_series("GOOG", &range, 20.0);

        let result = provider.get_price_series("GOOG", &range).unwrap();
        assert_eq!(result.len(), 10);
        assert!(result.iter().all(|point| point.close == 20.0));
    }
}
