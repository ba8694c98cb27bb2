//! CSV-backed price provider.
//!
//! Stores one file per symbol (`<SYMBOL>.csv`, columns `date,close`) in a
//! data directory. Useful as a local cache of downloaded price history:
//! `write_series` persists a fetched series so later runs read it straight
//! from disk.

use crate::time_series::{DataProvider, DateRange, PricePoint, ProviderError};
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
struct CsvRecord {
    date: NaiveDate,
    close: f64,
}

/// Price provider reading `<SYMBOL>.csv` files from one directory.
#[derive(Debug, Clone)]
pub struct CsvDataProvider {
    directory: PathBuf,
}

impl CsvDataProvider {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        CsvDataProvider {
            directory: directory.into(),
        }
    }

    fn symbol_path(&self, symbol: &str) -> PathBuf {
        self.directory.join(format!("{}.csv", symbol))
    }

    /// Reads a symbol's full series from disk, sorted by date.
    fn read_series(&self, symbol: &str) -> Result<Vec<PricePoint>, ProviderError> {
        let path = self.symbol_path(symbol);
        if !path.exists() {
            return Err(ProviderError::SymbolNotFound(symbol.to_string()));
        }

        let mut reader = csv::Reader::from_path(&path)
            .map_err(|err| ProviderError::Storage(err.to_string()))?;
        let mut points = Vec::new();
        for record in reader.deserialize() {
            let record: CsvRecord =
                record.map_err(|err| ProviderError::Storage(err.to_string()))?;
            points.push(PricePoint::new(record.date, record.close));
        }
        points.sort_by_key(|point| point.date);
        debug!("Read {} rows for {} from {:?}", points.len(), symbol, path);
        Ok(points)
    }

    /// Persists a symbol's series, overwriting any existing file.
    pub fn write_series(
        &self,
        symbol: &str,
        points: &[PricePoint],
    ) -> Result<(), ProviderError> {
        std::fs::create_dir_all(&self.directory)
            .map_err(|err| ProviderError::Storage(err.to_string()))?;
        let path = self.symbol_path(symbol);
        let mut writer = csv::Writer::from_path(&path)
            .map_err(|err| ProviderError::Storage(err.to_string()))?;
        for point in points {
            writer
                .serialize(CsvRecord {
                    date: point.date,
                    close: point.close,
                })
                .map_err(|err| ProviderError::Storage(err.to_string()))?;
        }
        writer
            .flush()
            .map_err(|err| ProviderError::Storage(err.to_string()))?;
        debug!("Wrote {} rows for {} to {:?}", points.len(), symbol, path);
        Ok(())
    }

    /// Whether a series for `symbol` exists on disk.
    pub fn has_symbol(&self, symbol: &str) -> bool {
        self.symbol_path(symbol).exists()
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl DataProvider for CsvDataProvider {
    fn get_price_series(
        &self,
        symbol: &str,
        date_range: &DateRange,
    ) -> Result<Vec<PricePoint>, ProviderError> {
        if date_range.start > date_range.end {
            return Err(ProviderError::InvalidDateRange);
        }
        let points = self.read_series(symbol)?;
        Ok(points
            .into_iter()
            .filter(|point| point.date >= date_range.start && point.date <= date_range.end)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn temp_directory(tag: &str) -> PathBuf {
        let directory = std::env::temp_dir().join(format!(
            "stocksim_csv_{}_{}",
            tag,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&directory);
        directory
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let directory = temp_directory("round_trip");
        let provider = CsvDataProvider::new(&directory);

        let points = vec![
            PricePoint::new(date(1), 100.0),
            PricePoint::new(date(2), 101.5),
            PricePoint::new(date(3), 99.25),
        ];
        provider.write_series("TEST", &points).unwrap();
        assert!(provider.has_symbol("TEST"));

        let range = DateRange::new(date(1), date(3));
        let read = provider.get_price_series("TEST", &range).unwrap();
        assert_eq!(read, points);

        let _ = fs::remove_dir_all(&directory);
    }

    #[test]
    fn test_range_filtering() {
        let directory = temp_directory("filtering");
        let provider = CsvDataProvider::new(&directory);
        let points: Vec<PricePoint> =
            (1..=10).map(|d| PricePoint::new(date(d), d as f64)).collect();
        provider.write_series("TEST", &points).unwrap();

        let range = DateRange::new(date(3), date(5));
        let read = provider.get_price_series("TEST", &range).unwrap();
        assert_eq!(read.len(), 3);
        assert_eq!(read[0].date, date(3));
        assert_eq!(read[2].date, date(5));

        let _ = fs::remove_dir_all(&directory);
    }

    #[test]
    fn test_missing_symbol() {
        let directory = temp_directory("missing");
        let provider = CsvDataProvider::new(&directory);
        let range = DateRange::new(date(1), date(2));
        assert_eq!(
            provider.get_price_series("NOPE", &range),
            Err(ProviderError::SymbolNotFound("NOPE".to_string()))
        );
    }

    #[test]
    fn test_invalid_range() {
        let directory = temp_directory("invalid_range");
        let provider = CsvDataProvider::new(&directory);
        let range = DateRange::new(date(2), date(1));
        assert_eq!(
            provider.get_price_series("TEST", &range),
            Err(ProviderError::InvalidDateRange)
        );
    }
}
