use ndarray::Array2;

use crate::model::Symbol;
use crate::sorted_vec_map::SortedVecMap;

/// Hierarchical risk parity: a clustering-based risk allocation that avoids
/// inverting the covariance matrix (spec GLOSSARY). Grounded on the
/// original system's `hrp_optimizer.py`, which itself follows Lopez de
/// Prado's three-stage recipe:
///
/// 1. Single-linkage hierarchical clustering of the correlation distance
///    `sqrt(0.5 * (1 - corr))`.
/// 2. Quasi-diagonalisation: reorder assets so correlated ones sit adjacent.
/// 3. Recursive bisection: split the reordered list in half repeatedly,
///    allocating inversely to each half's cluster variance.
pub fn hierarchical_risk_parity(
    covariance: &Array2<f64>,
    order: &[Symbol],
) -> Option<SortedVecMap<Symbol, f64>> {
    let n = order.len();
    if n < 2 {
        return None;
    }

    let correlation = crate::stats::correlation_matrix(covariance);
    let distance = correlation_distance(&correlation);
    let linkage = single_linkage_cluster(&distance);
    let quasi_diag = quasi_diagonal_order(&linkage, n);
    // `quasi_diag` holds asset ids (indices into `order`/`covariance`) in
    // bisection order; `recursive_bisection` writes each leaf's allocation
    // back at that same asset-id index, so the result is already
    // `order`-indexed.
    let weights = recursive_bisection(covariance, &quasi_diag);

    let mut aligned = SortedVecMap::new();
    for (asset_id, symbol) in order.iter().enumerate() {
        aligned.insert(symbol.clone(), weights[asset_id]);
    }
    Some(aligned)
}

fn correlation_distance(correlation: &Array2<f64>) -> Array2<f64> {
    let n = correlation.nrows();
    let mut distance = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            let corr = correlation[[i, j]].clamp(-1.0, 1.0);
            distance[[i, j]] = (0.5 * (1.0 - corr)).max(0.0).sqrt();
        }
    }
    distance
}

/// A minimal single-linkage agglomerative clustering: repeatedly merges the
/// two closest clusters (by minimum pairwise distance between members) until
/// one cluster remains. Returns the merge order as pairs of cluster ids.
struct Merge {
    left: usize,
    right: usize,
}

fn single_linkage_cluster(distance: &Array2<f64>) -> Vec<Merge> {
    let n = distance.nrows();
    let mut clusters: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
    let mut merges = Vec::new();
    let mut active: Vec<usize> = (0..n).collect();

    while active.len() > 1 {
        let mut best = (f64::MAX, 0usize, 1usize);
        for (ai, &a) in active.iter().enumerate() {
            for (bi, &b) in active.iter().enumerate().skip(ai + 1) {
                let d = min_linkage_distance(&clusters[a], &clusters[b], distance);
                if d < best.0 {
                    best = (d, ai, bi);
                }
            }
        }
        let a = active[best.1];
        let b = active[best.2];
        let mut merged = clusters[a].clone();
        merged.extend(clusters[b].clone());
        merges.push(Merge { left: a, right: b });
        clusters.push(merged);
        let new_id = clusters.len() - 1;
        active.retain(|&x| x != a && x != b);
        active.push(new_id);
    }

    merges
}

fn min_linkage_distance(a: &[usize], b: &[usize], distance: &Array2<f64>) -> f64 {
    a.iter()
        .flat_map(|&i| b.iter().map(move |&j| distance[[i, j]]))
        .fold(f64::MAX, f64::min)
}

/// Replays the merge tree to produce a quasi-diagonal leaf order: each merge
/// concatenates its two children's leaf lists, so correlated assets end up
/// adjacent in the final ordering.
fn quasi_diagonal_order(merges: &[Merge], n: usize) -> Vec<usize> {
    let mut leaves: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
    for merge in merges {
        let mut combined = leaves[merge.left].clone();
        combined.extend(leaves[merge.right].clone());
        leaves.push(combined);
    }
    leaves.last().cloned().unwrap_or_else(|| (0..n).collect())
}

/// Recursive bisection over the quasi-diagonal order: split in half, weight
/// each half inversely to its cluster variance, recurse.
fn recursive_bisection(covariance: &Array2<f64>, order: &[usize]) -> Vec<f64> {
    let mut weights = vec![1.0; order.len()];
    bisect(covariance, order, &mut weights, 1.0);
    weights
}

/// `cluster` holds positions into the top-level quasi-diagonal order, which
/// is also how `weights` is indexed — so a leaf cluster writes directly to
/// `weights[cluster[0]]`, no re-indexing needed.
fn bisect(covariance: &Array2<f64>, cluster: &[usize], weights: &mut [f64], allocation: f64) {
    if cluster.len() == 1 {
        weights[cluster[0]] = allocation;
        return;
    }

    let mid = cluster.len() / 2;
    let left = &cluster[..mid];
    let right = &cluster[mid..];

    let left_var = cluster_variance(covariance, left);
    let right_var = cluster_variance(covariance, right);
    let total_inv_var = 1.0 / left_var.max(1e-12) + 1.0 / right_var.max(1e-12);
    let left_alloc = if total_inv_var > 0.0 {
        (1.0 / left_var.max(1e-12)) / total_inv_var
    } else {
        0.5
    };
    let right_alloc = 1.0 - left_alloc;

    bisect(covariance, left, weights, allocation * left_alloc);
    bisect(covariance, right, weights, allocation * right_alloc);
}

fn cluster_variance(covariance: &Array2<f64>, members: &[usize]) -> f64 {
    let n = members.len();
    if n == 0 {
        return 1e-12;
    }
    // Inverse-variance weights within the cluster, then the variance of
    // that sub-portfolio: `w' C w` with `w_i = (1/C_ii) / sum(1/C_jj)`.
    let inv_vars: Vec<f64> = members.iter().map(|&i| 1.0 / covariance[[i, i]].max(1e-12)).collect();
    let total: f64 = inv_vars.iter().sum();
    if total <= 0.0 {
        return 1e-12;
    }
    let local_weights: Vec<f64> = inv_vars.iter().map(|v| v / total).collect();
    let mut variance = 0.0;
    for (ai, &i) in members.iter().enumerate() {
        for (aj, &j) in members.iter().enumerate() {
            variance += local_weights[ai] * local_weights[aj] * covariance[[i, j]];
        }
    }
    variance.max(1e-12)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_one_and_are_non_negative() {
        let covariance = Array2::from_shape_vec(
            (3, 3),
            vec![
                0.04, 0.01, 0.00, //
                0.01, 0.09, 0.02, //
                0.00, 0.02, 0.01,
            ],
        )
        .unwrap();
        let order = vec![Symbol::from("A"), Symbol::from("B"), Symbol::from("C")];
        let weights = hierarchical_risk_parity(&covariance, &order).unwrap();
        let sum: f64 = weights.values().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(weights.values().all(|&w| w >= -1e-9));
    }

    #[test]
    fn fewer_than_two_symbols_returns_none() {
        let covariance = Array2::from_shape_vec((1, 1), vec![0.04]).unwrap();
        let order = vec![Symbol::from("A")];
        assert!(hierarchical_risk_parity(&covariance, &order).is_none());
    }

    #[test]
    fn lower_variance_cluster_gets_more_weight() {
        // Two nearly uncorrelated assets, B much more volatile than A;
        // recursive bisection should tilt the allocation toward A.
        let covariance = Array2::from_shape_vec(
            (2, 2),
            vec![
                0.01, 0.00, //
                0.00, 0.25,
            ],
        )
        .unwrap();
        let order = vec![Symbol::from("A"), Symbol::from("B")];
        let weights = hierarchical_risk_parity(&covariance, &order).unwrap();
        assert!(weights.get(&Symbol::from("A")).copied().unwrap_or(0.0) > weights.get(&Symbol::from("B")).copied().unwrap_or(0.0));
    }
}
