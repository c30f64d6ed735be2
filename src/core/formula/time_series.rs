//! Time-series kernels
//!
//! Each kernel works on one symbol's column in row order. A window that
//! reaches before the first row or holds an undefined cell yields an
//! undefined result.

use super::finite;
use crate::panel::Cell;

/// Value `n` rows earlier.
pub fn delay(column: &[Cell], n: usize) -> Vec<Cell> {
    (0..column.len())
        .map(|i| if i >= n { column[i - n] } else { None })
        .collect()
}

/// Combine each cell with the one `n` rows earlier.
pub fn lagged(column: &[Cell], n: usize, f: impl Fn(f64, f64) -> f64) -> Vec<Cell> {
    (0..column.len())
        .map(|i| {
            if i < n {
                return None;
            }
            finite(f(column[i]?, column[i - n]?))
        })
        .collect()
}

/// Apply `f` over each trailing window of `n` fully defined cells.
pub fn rolling(column: &[Cell], n: usize, f: impl Fn(&[f64]) -> f64) -> Vec<Cell> {
    let mut window = Vec::with_capacity(n);
    (0..column.len())
        .map(|i| {
            if n == 0 || i + 1 < n {
                return None;
            }
            window.clear();
            for cell in &column[i + 1 - n..=i] {
                window.push((*cell)?);
            }
            finite(f(&window))
        })
        .collect()
}

/// Pearson correlation of two columns over trailing windows of `n`.
pub fn rolling_correlation(x: &[Cell], y: &[Cell], n: usize) -> Vec<Cell> {
    (0..x.len())
        .map(|i| {
            if n < 2 || i + 1 < n {
                return None;
            }
            let mut xs = Vec::with_capacity(n);
            let mut ys = Vec::with_capacity(n);
            for j in i + 1 - n..=i {
                xs.push(x[j]?);
                ys.push(y[j]?);
            }
            finite(correlation(&xs, &ys))
        })
        .collect()
}

pub fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

pub fn mean(values: &[f64]) -> f64 {
    sum(values) / values.len() as f64
}

pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

pub fn min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

/// Sample standard deviation (n - 1 denominator). NaN below two values.
pub fn std_dev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / (n - 1) as f64).sqrt()
}

/// 1-based rank of the last value inside its window, ties averaged.
pub fn last_rank(values: &[f64]) -> f64 {
    match values.last() {
        Some(&last) => {
            let below = values.iter().filter(|v| **v < last).count() as f64;
            let equal = values.iter().filter(|v| **v == last).count() as f64;
            below + (equal + 1.0) / 2.0
        }
        None => f64::NAN,
    }
}

fn correlation(xs: &[f64], ys: &[f64]) -> f64 {
    let mx = mean(xs);
    let my = mean(ys);
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - mx) * (y - my);
        vx += (x - mx) * (x - mx);
        vy += (y - my) * (y - my);
    }
    cov / (vx * vy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(values: &[f64]) -> Vec<Cell> {
        values.iter().map(|v| Some(*v)).collect()
    }

    #[test]
    fn test_delay_and_delta() {
        let c = col(&[1.0, 3.0, 6.0]);
        assert_eq!(delay(&c, 1), vec![None, Some(1.0), Some(3.0)]);
        assert_eq!(delay(&c, 0), c);
        assert_eq!(lagged(&c, 1, |a, b| a - b), vec![None, Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_rolling_window_with_hole() {
        let c = vec![Some(1.0), Some(2.0), None, Some(4.0), Some(5.0)];
        assert_eq!(
            rolling(&c, 2, sum),
            vec![None, Some(3.0), None, None, Some(9.0)]
        );
    }

    #[test]
    fn test_std_dev_is_sample() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((std_dev(&v) - 2.138089935299395).abs() < 1e-12);
        assert!(std_dev(&[1.0]).is_nan());
    }

    #[test]
    fn test_last_rank_averages_ties() {
        assert_eq!(last_rank(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(last_rank(&[2.0, 1.0, 2.0]), 2.5);
    }

    #[test]
    fn test_rolling_correlation() {
        let x = col(&[1.0, 2.0, 3.0, 4.0]);
        let y = col(&[2.0, 4.0, 6.0, 7.0]);
        let out = rolling_correlation(&x, &y, 3);
        assert_eq!(out[..2], [None, None]);
        assert!((out[2].unwrap() - 1.0).abs() < 1e-12);
        // constant window has no correlation
        let flat = col(&[1.0, 1.0, 1.0]);
        assert_eq!(rolling_correlation(&flat, &x[..3], 3)[2], None);
    }
}
