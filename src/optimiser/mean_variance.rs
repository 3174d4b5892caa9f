use ndarray::{Array1, Array2};

use crate::model::Symbol;
use crate::sorted_vec_map::SortedVecMap;

use super::constraints::WeightBounds;

/// Outcome of the mean-variance leg: which of the two strategies produced
/// usable weights, mirroring the original system's `fallback_used` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeanVarianceStrategy {
    EfficientReturn,
    MaxSharpe,
}

/// Runs mean-variance optimisation with the same two-step fallback as the
/// original `_run_mean_variance`: first target the requested annual return,
/// and if that can't be satisfied within the bounds, fall back to
/// maximising the Sharpe ratio. Returns `None` only if neither converges to
/// a usable allocation.
///
/// Where the original delegates the quadratic program to PyPortfolioOpt,
/// this solves the same box-and-simplex-constrained problem with projected
/// gradient ascent: cheap, dependency-free, and accurate enough for a
/// portfolio of a few dozen symbols.
pub fn run_mean_variance(
    expected_returns: &SortedVecMap<Symbol, f64>,
    covariance: &Array2<f64>,
    order: &[Symbol],
    bounds: &SortedVecMap<Symbol, WeightBounds>,
    target_return: f64,
) -> Option<(SortedVecMap<Symbol, f64>, MeanVarianceStrategy)> {
    if order.len() < 2 {
        return None;
    }

    let mu = Array1::from_iter(
        order
            .iter()
            .map(|s| expected_returns.get(s).copied().unwrap_or(0.0)),
    );
    let (lower, upper) = bound_vectors(order, bounds);

    if let Some(weights) = efficient_return(&mu, covariance, &lower, &upper, target_return) {
        return Some((to_map(order, &weights), MeanVarianceStrategy::EfficientReturn));
    }

    max_sharpe(&mu, covariance, &lower, &upper)
        .map(|weights| (to_map(order, &weights), MeanVarianceStrategy::MaxSharpe))
}

fn bound_vectors(
    order: &[Symbol],
    bounds: &SortedVecMap<Symbol, WeightBounds>,
) -> (Array1<f64>, Array1<f64>) {
    let lower = Array1::from_iter(
        order
            .iter()
            .map(|s| bounds.get(s).map(|b| b.lower).unwrap_or(0.0)),
    );
    let upper = Array1::from_iter(
        order
            .iter()
            .map(|s| bounds.get(s).map(|b| b.upper).unwrap_or(0.20)),
    );
    (lower, upper)
}

fn to_map(order: &[Symbol], weights: &Array1<f64>) -> SortedVecMap<Symbol, f64> {
    let mut map = SortedVecMap::new();
    for (symbol, weight) in order.iter().zip(weights.iter()) {
        map.insert(symbol.clone(), *weight);
    }
    map
}

/// Minimises `w'Sw` subject to `mu.w = target_return`, `sum(w) = 1` and box
/// bounds, via projected gradient descent with a quadratic penalty on the
/// return constraint. Returns `None` if the achieved return after
/// convergence still misses the target by more than 50bps, the same
/// tolerance the original treats as an infeasible `efficient_return` call.
fn efficient_return(
    mu: &Array1<f64>,
    covariance: &Array2<f64>,
    lower: &Array1<f64>,
    upper: &Array1<f64>,
    target_return: f64,
) -> Option<Array1<f64>> {
    let n = mu.len();
    let mut w = initial_weights(lower, upper);
    let step = 0.05;
    let penalty = 50.0;

    for _ in 0..500 {
        let cov_w = covariance.dot(&w);
        let achieved = mu.dot(&w);
        let residual = achieved - target_return;
        let grad = &cov_w * 2.0 + mu * (2.0 * penalty * residual);
        w = &w - &(grad * step);
        w = project_to_box_simplex(&w, lower, upper, 1.0);
    }

    let achieved = mu.dot(&w);
    if (achieved - target_return).abs() > 0.005 || w.iter().any(|v| v.is_nan()) {
        return None;
    }
    if n == 0 {
        return None;
    }
    Some(w)
}

/// Maximises the Sharpe-like ratio `mu.w / sqrt(w'Sw)` via projected
/// gradient ascent. Falls back from [`efficient_return`] when no
/// bounds-feasible portfolio reaches the target return.
fn max_sharpe(
    mu: &Array1<f64>,
    covariance: &Array2<f64>,
    lower: &Array1<f64>,
    upper: &Array1<f64>,
) -> Option<Array1<f64>> {
    let mut w = initial_weights(lower, upper);
    let step = 0.05;

    for _ in 0..500 {
        let cov_w = covariance.dot(&w);
        let variance = w.dot(&cov_w).max(1e-8);
        let ret = mu.dot(&w);
        let vol = variance.sqrt();
        // d(sharpe)/dw = mu/vol - ret * cov_w / vol^3
        let grad = mu / vol - &cov_w * (ret / (vol * variance));
        w = &w + &(grad * step);
        w = project_to_box_simplex(&w, lower, upper, 1.0);
    }

    if w.iter().any(|v| v.is_nan()) {
        None
    } else {
        Some(w)
    }
}

fn initial_weights(lower: &Array1<f64>, upper: &Array1<f64>) -> Array1<f64> {
    let n = lower.len();
    let equal = 1.0 / n as f64;
    Array1::from_iter(
        lower
            .iter()
            .zip(upper.iter())
            .map(|(&lo, &hi)| equal.clamp(lo, hi.max(lo))),
    )
}

/// Projects `w` onto `{w : lower <= w <= upper, sum(w) = target_sum}` by
/// alternating a box clip with a simplex-renormalisation; a handful of
/// passes is enough to converge for portfolio-sized bound sets.
pub fn project_to_box_simplex(
    w: &Array1<f64>,
    lower: &Array1<f64>,
    upper: &Array1<f64>,
    target_sum: f64,
) -> Array1<f64> {
    let mut weights = w.clone();
    for _ in 0..20 {
        weights = weights
            .iter()
            .zip(lower.iter())
            .zip(upper.iter())
            .map(|((&v, &lo), &hi)| v.clamp(lo, hi.max(lo)))
            .collect();

        let total: f64 = weights.sum();
        if total.abs() < 1e-12 {
            break;
        }
        let slack = target_sum - total;
        if slack.abs() < 1e-9 {
            break;
        }
        // Distribute the shortfall/excess proportionally across symbols that
        // still have headroom in the direction needed.
        let headroom: f64 = weights
            .iter()
            .zip(lower.iter())
            .zip(upper.iter())
            .map(|((&v, &lo), &hi)| if slack > 0.0 { hi - v } else { v - lo })
            .sum();
        if headroom <= 1e-12 {
            break;
        }
        for ((v, &lo), &hi) in weights.iter_mut().zip(lower.iter()).zip(upper.iter()) {
            let room = if slack > 0.0 { hi - *v } else { *v - lo };
            if room > 0.0 {
                *v += slack * (room / headroom);
            }
        }
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_respects_bounds_and_sum() {
        let w = Array1::from_vec(vec![0.9, 0.05, 0.05]);
        let lower = Array1::from_vec(vec![0.0, 0.0, 0.0]);
        let upper = Array1::from_vec(vec![0.2, 0.2, 0.2]);
        let projected = project_to_box_simplex(&w, &lower, &upper, 1.0);
        assert!((projected.sum() - 1.0).abs() < 1e-6);
        for v in projected.iter() {
            assert!(*v <= 0.2 + 1e-9 && *v >= -1e-9);
        }
    }
}
