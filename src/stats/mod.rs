//! Numeric backend shared by the Optimiser (C5) and the Sequence Evaluator
//! (C3): return/risk statistics over a price history, expressed with
//! `ndarray` the way the optimiser math wants it.

use ndarray::{Array1, Array2};

/// Daily simple returns from a price series, `len(prices) - 1` long.
pub fn simple_returns(prices: &[f64]) -> Array1<f64> {
    Array1::from_iter(prices.windows(2).map(|w| w[1] / w[0] - 1.0))
}

pub fn mean(series: &Array1<f64>) -> f64 {
    series.mean().unwrap_or(0.0)
}

/// Sample standard deviation (ddof = 1), the convention the optimiser's
/// covariance estimates use throughout.
pub fn std_dev(series: &Array1<f64>) -> f64 {
    if series.len() < 2 {
        return 0.0;
    }
    series.std(1.0)
}

/// Annualises a per-period mean return assuming `periods_per_year` i.i.d.
/// periods (252 trading days by default).
pub fn annualize_return(mean_return: f64, periods_per_year: f64) -> f64 {
    (1.0 + mean_return).powf(periods_per_year) - 1.0
}

pub fn annualize_volatility(period_std: f64, periods_per_year: f64) -> f64 {
    period_std * periods_per_year.sqrt()
}

/// Compound annual growth rate between two portfolio values separated by
/// `years`. Returns `0.0` for a non-positive starting value rather than
/// producing `NaN`, since a zero-value portfolio has no meaningful growth
/// rate.
pub fn cagr(start_value: f64, end_value: f64, years: f64) -> f64 {
    if start_value <= 0.0 || years <= 0.0 {
        return 0.0;
    }
    (end_value / start_value).powf(1.0 / years) - 1.0
}

pub fn sharpe_ratio(annual_return: f64, annual_volatility: f64, risk_free_rate: f64) -> f64 {
    if annual_volatility <= 0.0 {
        return 0.0;
    }
    (annual_return - risk_free_rate) / annual_volatility
}

/// Sortino ratio: like Sharpe but penalises only downside deviation.
pub fn sortino_ratio(returns: &Array1<f64>, target: f64, periods_per_year: f64) -> f64 {
    let downside: Vec<f64> = returns
        .iter()
        .map(|r| (target - r).max(0.0).powi(2))
        .collect();
    if downside.is_empty() {
        return 0.0;
    }
    let downside_dev = (downside.iter().sum::<f64>() / downside.len() as f64).sqrt();
    if downside_dev <= 0.0 {
        return 0.0;
    }
    let annual_return = annualize_return(mean(returns), periods_per_year);
    let annual_downside_dev = downside_dev * periods_per_year.sqrt();
    (annual_return - target) / annual_downside_dev
}

/// Maximum peak-to-trough drawdown over a value path, expressed as a
/// negative fraction (e.g. `-0.35` for a 35% drawdown).
pub fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0_f64;
    for &value in values {
        peak = peak.max(value);
        if peak > 0.0 {
            worst = worst.min(value / peak - 1.0);
        }
    }
    worst
}

/// Sample covariance matrix over a set of return series of equal length,
/// one row per asset.
pub fn covariance_matrix(returns_by_asset: &[Array1<f64>]) -> Array2<f64> {
    let n = returns_by_asset.len();
    let mut cov = Array2::<f64>::zeros((n, n));
    let means: Vec<f64> = returns_by_asset.iter().map(mean).collect();
    for i in 0..n {
        for j in 0..n {
            let len = returns_by_asset[i].len().min(returns_by_asset[j].len());
            if len < 2 {
                continue;
            }
            let cov_ij: f64 = (0..len)
                .map(|t| (returns_by_asset[i][t] - means[i]) * (returns_by_asset[j][t] - means[j]))
                .sum::<f64>()
                / (len as f64 - 1.0);
            cov[[i, j]] = cov_ij;
        }
    }
    cov
}

/// Pearson correlation matrix derived from a covariance matrix.
pub fn correlation_matrix(covariance: &Array2<f64>) -> Array2<f64> {
    let n = covariance.nrows();
    let std_devs: Vec<f64> = (0..n).map(|i| covariance[[i, i]].sqrt()).collect();
    let mut correlation = Array2::<f64>::eye(n);
    for i in 0..n {
        for j in 0..n {
            if std_devs[i] <= 0.0 || std_devs[j] <= 0.0 {
                continue;
            }
            correlation[[i, j]] = covariance[[i, j]] / (std_devs[i] * std_devs[j]);
        }
    }
    correlation
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cagr_doubles_over_one_year() {
        assert!((cagr(100.0, 200.0, 1.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn max_drawdown_tracks_worst_trough() {
        let values = [100.0, 120.0, 90.0, 95.0, 130.0];
        let dd = max_drawdown(&values);
        assert!((dd - (90.0 / 120.0 - 1.0)).abs() < 1e-9);
    }

    #[test]
    fn correlation_of_identical_series_is_one() {
        let series = Array1::from_vec(vec![0.01, -0.02, 0.03, 0.01, -0.01]);
        let cov = covariance_matrix(&[series.clone(), series]);
        let corr = correlation_matrix(&cov);
        assert!((corr[[0, 1]] - 1.0).abs() < 1e-9);
    }
}
