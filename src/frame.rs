//! Date-indexed numeric table.
//!
//! A `Frame` holds one row of f64 values per calendar date for a fixed set
//! of named columns. It is the storage type behind every data node: raw
//! price series, derived analyses, and the simulation-state ledgers all
//! read and write through this structure.

use crate::analytics::{self, CompareOp};
use crate::time_series::DateRange;
use chrono::NaiveDate;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::collections::HashMap;

/// A date-indexed table of f64 values with named columns.
///
/// Dates are strictly ascending and rows align one-to-one with them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    dates: Vec<NaiveDate>,
    rows: Vec<Vec<f64>>,
    index: HashMap<NaiveDate, usize>,
}

impl Frame {
    /// Creates an empty frame with no columns and no rows.
    pub fn empty() -> Self {
        Frame::default()
    }

    /// Creates a zero-filled frame covering every calendar day in `range`.
    pub fn zeros(range: &DateRange, columns: Vec<String>) -> Self {
        let dates: Vec<NaiveDate> = range.iter_days().collect();
        let width = columns.len();
        let rows = vec![vec![0.0; width]; dates.len()];
        Frame::from_parts(columns, dates, rows)
    }

    /// Creates a frame from aligned dates and rows.
    ///
    /// Callers must pass dates in ascending order with one row per date;
    /// rows wider or narrower than the column list are truncated/zero-padded.
    pub fn from_rows(columns: Vec<String>, dates: Vec<NaiveDate>, rows: Vec<Vec<f64>>) -> Self {
        let width = columns.len();
        let normalized = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, 0.0);
                row
            })
            .collect();
        Frame::from_parts(columns, dates, normalized)
    }

    fn from_parts(columns: Vec<String>, dates: Vec<NaiveDate>, rows: Vec<Vec<f64>>) -> Self {
        let index = dates
            .iter()
            .enumerate()
            .map(|(position, date)| (*date, position))
            .collect();
        Frame {
            columns,
            dates,
            rows,
            index,
        }
    }

    /// Number of rows (dates) in the frame.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// True when the frame has no rows.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Column names, in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Dates, in ascending order.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Whether the frame has a row for `date`.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.index.contains_key(&date)
    }

    /// The row of values at `date`, if present.
    pub fn row(&self, date: NaiveDate) -> Option<&[f64]> {
        self.index
            .get(&date)
            .map(|&position| self.rows[position].as_slice())
    }

    /// Overwrites the row at `date`. Returns false when the date is absent.
    pub fn set_row(&mut self, date: NaiveDate, values: &[f64]) -> bool {
        match self.index.get(&date) {
            Some(&position) => {
                let row = &mut self.rows[position];
                for (slot, value) in row.iter_mut().zip(values.iter()) {
                    *slot = *value;
                }
                true
            }
            None => false,
        }
    }

    /// Extracts one column as a contiguous vector.
    fn column_values(&self, column_index: usize) -> Vec<f64> {
        self.rows.iter().map(|row| row[column_index]).collect()
    }

    /// Replaces the column names. Length mismatches keep existing names.
    pub fn rename_columns(&mut self, columns: Vec<String>) {
        if columns.len() == self.columns.len() {
            self.columns = columns;
        }
    }

    /// Rolling mean over `num_days` per column, dropping the first
    /// `num_days - 1` rows.
    pub fn rolling_mean(&self, num_days: usize) -> Frame {
        if num_days == 0 || num_days > self.len() {
            return Frame::empty();
        }
        let skip = num_days - 1;
        self.column_map(skip, |values| analytics::rolling_mean(values, num_days))
    }

    /// Day-over-day relative change per column, dropping the first row.
    pub fn relative_change(&self, scaling_factor: f64) -> Frame {
        if self.len() < 2 {
            return Frame::empty();
        }
        self.column_map(1, |values| analytics::relative_change(values, scaling_factor))
    }

    /// Applies a column-wise transformation whose output drops the first
    /// `skip` rows of the input.
    fn column_map<F>(&self, skip: usize, transform: F) -> Frame
    where
        F: Fn(&[f64]) -> Vec<f64>,
    {
        let dates: Vec<NaiveDate> = self.dates[skip..].to_vec();
        let per_column: Vec<Vec<f64>> = (0..self.columns.len())
            .map(|column_index| transform(&self.column_values(column_index)))
            .collect();

        let rows: Vec<Vec<f64>> = (0..dates.len())
            .map(|row_index| per_column.iter().map(|col| col[row_index]).collect())
            .collect();

        Frame::from_parts(self.columns.clone(), dates, rows)
    }

    /// Element-wise comparison with another frame as 0/1 values, aligned on
    /// the intersection of the two date indices. Column count follows `self`.
    pub fn compare(&self, other: &Frame, op: CompareOp) -> Frame {
        let dates: Vec<NaiveDate> = self
            .dates
            .iter()
            .filter(|date| other.contains(**date))
            .copied()
            .collect();

        let width = self.columns.len().min(other.columns.len());
        let rows: Vec<Vec<f64>> = dates
            .iter()
            .map(|date| {
                let left = self.row(*date).unwrap_or(&[]);
                let right = other.row(*date).unwrap_or(&[]);
                analytics::compare(&left[..width], &right[..width], op)
            })
            .collect();

        let columns = self.columns[..width].to_vec();
        Frame::from_parts(columns, dates, rows)
    }

    /// Multiplies every value by `1 + N(mean, stdev)` noise, drawn
    /// independently per date and column.
    pub fn perturbed<R: Rng>(&self, rng: &mut R, mean: f64, stdev: f64) -> Frame {
        // A non-finite stdev parameterization is a configuration bug; fall
        // back to the identity transform rather than panic mid-episode.
        let normal = match Normal::new(mean, stdev) {
            Ok(normal) => normal,
            Err(_) => return self.clone(),
        };

        let rows: Vec<Vec<f64>> = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|value| value * (1.0 + normal.sample(rng)))
                    .collect()
            })
            .collect();

        Frame::from_parts(self.columns.clone(), self.dates.clone(), rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn sample_frame() -> Frame {
        Frame::from_rows(
            vec!["STOCK_1".to_string(), "STOCK_2".to_string()],
            vec![date(1), date(2), date(3), date(4)],
            vec![
                vec![100.0, 10.0],
                vec![200.0, 20.0],
                vec![200.0, 30.0],
                vec![100.0, 40.0],
            ],
        )
    }

    #[test]
    fn test_zeros_covers_calendar_range() {
        let range = DateRange::new(date(1), date(5));
        let frame = Frame::zeros(&range, vec!["balance".to_string()]);
        assert_eq!(frame.len(), 5);
        assert_eq!(frame.row(date(3)), Some(&[0.0][..]));
    }

    #[test]
    fn test_row_lookup_and_mutation() {
        let mut frame = sample_frame();
        assert_eq!(frame.row(date(2)), Some(&[200.0, 20.0][..]));
        assert!(frame.row(date(9)).is_none());

        assert!(frame.set_row(date(2), &[5.0, 6.0]));
        assert_eq!(frame.row(date(2)), Some(&[5.0, 6.0][..]));
        assert!(!frame.set_row(date(9), &[1.0, 1.0]));
    }

    #[test]
    fn test_rolling_mean_trims_dates() {
        let frame = sample_frame();
        let averaged = frame.rolling_mean(2);

        assert_eq!(averaged.len(), 3);
        assert_eq!(averaged.dates()[0], date(2));
        assert_eq!(averaged.row(date(2)), Some(&[150.0, 15.0][..]));
        assert_eq!(averaged.row(date(4)), Some(&[150.0, 35.0][..]));
    }

    #[test]
    fn test_relative_change_trims_first_date() {
        let frame = sample_frame();
        let relative = frame.relative_change(1.0);

        assert_eq!(relative.len(), 3);
        assert_eq!(relative.dates()[0], date(2));
        let row = relative.row(date(2)).unwrap();
        assert!((row[0] - 1.0).abs() < 1e-12);
        assert!((row[1] - 1.0).abs() < 1e-12);
        let last = relative.row(date(4)).unwrap();
        assert!((last[0] - (-0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_compare_aligns_on_date_intersection() {
        let frame = sample_frame();
        // Second frame misses the first date; comparison should drop it.
        let other = Frame::from_rows(
            vec!["STOCK_1".to_string(), "STOCK_2".to_string()],
            vec![date(2), date(3), date(4)],
            vec![vec![150.0, 25.0], vec![250.0, 25.0], vec![100.0, 25.0]],
        );

        let compared = frame.compare(&other, CompareOp::Gt);
        assert_eq!(compared.len(), 3);
        assert_eq!(compared.row(date(2)), Some(&[1.0, 0.0][..]));
        assert_eq!(compared.row(date(3)), Some(&[0.0, 1.0][..]));
        assert_eq!(compared.row(date(4)), Some(&[0.0, 1.0][..]));
    }

    #[test]
    fn test_perturbed_with_zero_noise_is_identity() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let frame = sample_frame();
        let mut rng = StdRng::seed_from_u64(7);
        let noisy = frame.perturbed(&mut rng, 0.0, 0.0);
        assert_eq!(noisy, frame);
    }

    #[test]
    fn test_perturbed_changes_values_deterministically() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let frame = sample_frame();
        let noisy_a = frame.perturbed(&mut StdRng::seed_from_u64(42), 0.0, 0.05);
        let noisy_b = frame.perturbed(&mut StdRng::seed_from_u64(42), 0.0, 0.05);
        assert_eq!(noisy_a, noisy_b);
        assert_ne!(noisy_a, frame);
        assert_eq!(noisy_a.dates(), frame.dates());
    }

    #[test]
    fn test_rename_columns() {
        let mut frame = sample_frame();
        frame.rename_columns(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(frame.columns(), &["a".to_string(), "b".to_string()]);

        // Length mismatch keeps the existing names.
        frame.rename_columns(vec!["only_one".to_string()]);
        assert_eq!(frame.columns(), &["a".to_string(), "b".to_string()]);
    }
}
