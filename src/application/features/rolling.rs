//! Windowed primitives for lag/rolling features.
//!
//! All functions are pure over an ordered series and look strictly backward:
//! the value at index `i` depends only on indices `..=i`. Missing values are
//! carried as `f64::NAN` and resolved by [`forward_fill`] then [`zero_fill`],
//! in that order.

/// Guard added to denominators before dividing.
pub const EPSILON: f64 = 1e-6;

/// Series shifted back by `lag` observations; the first `lag` entries are NaN.
pub fn lag(series: &[f64], lag: usize) -> Vec<f64> {
    series
        .iter()
        .enumerate()
        .map(|(i, _)| if i < lag { f64::NAN } else { series[i - lag] })
        .collect()
}

/// Simple moving average with a shrinking window: before `window`
/// observations accumulate, the mean runs over everything seen so far
/// (minimum period 1).
pub fn rolling_mean(series: &[f64], window: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(series.len());
    let mut sum = 0.0;
    for i in 0..series.len() {
        sum += series[i];
        if i >= window {
            sum -= series[i - window];
        }
        let n = (i + 1).min(window);
        out.push(sum / n as f64);
    }
    out
}

/// Exponential moving average over `span`, seeded with the first observation
/// (the `adjust=false` recursion): `ema_t = alpha * x_t + (1 - alpha) *
/// ema_{t-1}` with `alpha = 2 / (span + 1)`.
pub fn ewm_mean(series: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(series.len());
    let mut ema = f64::NAN;
    for (i, &x) in series.iter().enumerate() {
        ema = if i == 0 { x } else { alpha * x + (1.0 - alpha) * ema };
        out.push(ema);
    }
    out
}

/// Rolling sample standard deviation (ddof = 1) with minimum period 1.
/// A single observation has no spread; it yields 0 rather than NaN.
pub fn rolling_std(series: &[f64], window: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(series.len());
    for i in 0..series.len() {
        let start = (i + 1).saturating_sub(window);
        let slice = &series[start..=i];
        out.push(sample_std(slice));
    }
    out
}

fn sample_std(slice: &[f64]) -> f64 {
    let n = slice.len();
    if n < 2 {
        return 0.0;
    }
    let mean = slice.iter().sum::<f64>() / n as f64;
    let var = slice.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}

fn sample_cov(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len());
    let n = x.len();
    if n < 2 {
        return 0.0;
    }
    let mx = x.iter().sum::<f64>() / n as f64;
    let my = y.iter().sum::<f64>() / n as f64;
    x.iter()
        .zip(y)
        .map(|(a, b)| (a - mx) * (b - my))
        .sum::<f64>()
        / (n - 1) as f64
}

/// Rolling beta of `series` against `market` over `window` observations:
/// windowed sample covariance divided by the market's own windowed sample
/// variance, epsilon-guarded. Indices with fewer than `window` observations
/// are NaN (resolved later by the missing-value policy).
pub fn rolling_beta(series: &[f64], market: &[f64], window: usize) -> Vec<f64> {
    debug_assert_eq!(series.len(), market.len());
    let mut out = Vec::with_capacity(series.len());
    for i in 0..series.len() {
        if i + 1 < window {
            out.push(f64::NAN);
            continue;
        }
        let start = i + 1 - window;
        let xs = &series[start..=i];
        let ms = &market[start..=i];
        let cov = sample_cov(xs, ms);
        let var = sample_cov(ms, ms);
        out.push(cov / (var + EPSILON));
    }
    out
}

/// One-period fractional change; the first entry is NaN.
pub fn pct_change(series: &[f64]) -> Vec<f64> {
    series
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            if i == 0 {
                f64::NAN
            } else {
                let prev = series[i - 1];
                if prev.abs() < EPSILON {
                    0.0
                } else {
                    (x - prev) / prev
                }
            }
        })
        .collect()
}

/// Replace each NaN with the last preceding non-NaN value, if any.
pub fn forward_fill(series: &mut [f64]) {
    let mut last = f64::NAN;
    for v in series.iter_mut() {
        if v.is_nan() {
            if !last.is_nan() {
                *v = last;
            }
        } else {
            last = *v;
        }
    }
}

/// Replace any remaining NaN (or non-finite value) with zero.
pub fn zero_fill(series: &mut [f64]) {
    for v in series.iter_mut() {
        if !v.is_finite() {
            *v = 0.0;
        }
    }
}
