//! Cross-sectional kernels
//!
//! Each kernel receives one row of cells across symbols. Symbols outside
//! index membership have already been blanked by the caller, so every
//! kernel only aggregates over defined cells and leaves undefined ones
//! undefined.

use super::finite;
use super::time_series::{mean, std_dev};
use crate::panel::Cell;
use std::collections::BTreeMap;

fn defined(row: &[Cell]) -> Vec<f64> {
    row.iter().filter_map(|c| *c).collect()
}

/// Average 1-based rank of `value` within `pool`.
fn rank_in(pool: &[f64], value: f64) -> f64 {
    let below = pool.iter().filter(|v| **v < value).count() as f64;
    let equal = pool.iter().filter(|v| **v == value).count() as f64;
    below + (equal + 1.0) / 2.0
}

/// 1-based rank, ties averaged.
pub fn rank(row: &[Cell]) -> Vec<Cell> {
    let pool = defined(row);
    row.iter().map(|c| c.map(|v| rank_in(&pool, v))).collect()
}

/// Rank divided by the number of defined cells.
pub fn percentile(row: &[Cell]) -> Vec<Cell> {
    let pool = defined(row);
    let count = pool.len() as f64;
    row.iter()
        .map(|c| c.map(|v| rank_in(&pool, v) / count))
        .collect()
}

/// Z-score against the row mean and sample standard deviation.
pub fn standardize(row: &[Cell]) -> Vec<Cell> {
    let pool = defined(row);
    let m = mean(&pool);
    let s = std_dev(&pool);
    row.iter()
        .map(|c| c.and_then(|v| finite((v - m) / s)))
        .collect()
}

/// Clip to `mean ± z * std` of the row.
pub fn cutoff(row: &[Cell], z: f64) -> Vec<Cell> {
    let pool = defined(row);
    let m = mean(&pool);
    let s = std_dev(&pool);
    if !s.is_finite() {
        return row.to_vec();
    }
    let (lo, hi) = (m - z * s, m + z * s);
    row.iter().map(|c| c.map(|v| v.clamp(lo, hi))).collect()
}

/// Rank within each group of equal `groups` value. A symbol without a
/// group is undefined.
pub fn group_rank(row: &[Cell], groups: &[Cell]) -> Vec<Cell> {
    let mut pools: BTreeMap<u64, Vec<f64>> = BTreeMap::new();
    for (value, group) in row.iter().zip(groups) {
        if let (Some(v), Some(g)) = (value, group) {
            pools.entry(g.to_bits()).or_default().push(*v);
        }
    }
    row.iter()
        .zip(groups)
        .map(|(value, group)| {
            let pool = pools.get(&(*group)?.to_bits())?;
            Some(rank_in(pool, (*value)?))
        })
        .collect()
}

/// Bucket `1..=n` by rank, lowest values in bucket 1.
pub fn quantile(row: &[Cell], n: usize) -> Vec<Cell> {
    let pool = defined(row);
    let count = pool.len() as f64;
    let buckets = n as f64;
    row.iter()
        .map(|c| {
            let v = (*c)?;
            if n == 0 {
                return None;
            }
            let bucket = ((rank_in(&pool, v) - 1.0) * buckets / count).floor() + 1.0;
            Some(bucket.clamp(1.0, buckets))
        })
        .collect()
}
