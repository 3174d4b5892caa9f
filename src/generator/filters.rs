//! Post-pattern filters applied to generated sequences (spec §4.3): drop
//! correlated buy pairs, suppress recently-traded symbols, and prune
//! near-duplicate sequences for diversity. Eligibility re-application lives
//! with the caller via [`crate::safety::check_eligibility`], since it needs
//! live position/time state these pure filters don't carry.

use std::collections::{HashMap, HashSet};

use crate::model::{Sequence, Side, Symbol};

const CORRELATION_THRESHOLD: f64 = 0.7;

/// Drops sequences containing two buys whose pairwise return correlation
/// exceeds 0.7 (spec §4.3 `correlation_aware`). `correlations` is typically
/// sourced from the optimiser's high-correlation report (SPEC_FULL B.4).
pub fn correlation_aware(sequences: Vec<Sequence>, correlations: &[(Symbol, Symbol, f64)]) -> Vec<Sequence> {
    let mut lookup: HashMap<(Symbol, Symbol), f64> = HashMap::with_capacity(correlations.len() * 2);
    for (a, b, corr) in correlations {
        lookup.insert((a.clone(), b.clone()), *corr);
        lookup.insert((b.clone(), a.clone()), *corr);
    }

    sequences
        .into_iter()
        .filter(|sequence| {
            let buys: Vec<&Symbol> = sequence
                .steps()
                .iter()
                .filter(|step| step.side == Side::Buy)
                .map(|step| &step.symbol)
                .collect();
            for i in 0..buys.len() {
                for j in (i + 1)..buys.len() {
                    let key = (buys[i].clone(), buys[j].clone());
                    if lookup.get(&key).is_some_and(|corr| *corr > CORRELATION_THRESHOLD) {
                        return false;
                    }
                }
            }
            true
        })
        .collect()
}

/// Suppresses any sequence touching a symbol with a same-side trade inside
/// `cooloff_days` (spec §4.3 `recently_traded`). `last_traded_days_ago` maps
/// `(symbol, side)` to how many days have passed since the last trade on
/// that side; a missing entry means no such trade is on record.
pub fn recently_traded(
    sequences: Vec<Sequence>,
    last_traded_days_ago: &HashMap<(Symbol, Side), i64>,
    cooloff_days: i64,
) -> Vec<Sequence> {
    sequences
        .into_iter()
        .filter(|sequence| {
            sequence.steps().iter().all(|step| {
                last_traded_days_ago
                    .get(&(step.symbol.clone(), step.side))
                    .is_none_or(|&days_ago| days_ago >= cooloff_days)
            })
        })
        .collect()
}

/// Drops a sequence if an already-accepted sequence has Jaccard similarity
/// above `1 - diversity_weight` on the multiset of `(symbol, side)` pairs
/// (spec §4.3 "diversity pruning", default weight 0.3). Input order is
/// accepted-order, so callers that want the highest-priority sequences kept
/// should sort before calling this.
pub fn diversity_prune(sequences: Vec<Sequence>, diversity_weight: f64) -> Vec<Sequence> {
    let similarity_ceiling = 1.0 - diversity_weight.clamp(0.0, 1.0);
    let mut accepted: Vec<Sequence> = Vec::new();
    let mut accepted_sets: Vec<HashSet<(Symbol, Side)>> = Vec::new();

    for sequence in sequences {
        let set: HashSet<(Symbol, Side)> = sequence
            .steps()
            .iter()
            .map(|step| (step.symbol.clone(), step.side))
            .collect();
        let too_similar = accepted_sets.iter().any(|other| jaccard(&set, other) > similarity_ceiling);
        if !too_similar {
            accepted_sets.push(set);
            accepted.push(sequence);
        }
    }
    accepted
}

fn jaccard(a: &HashSet<(Symbol, Side)>, b: &HashSet<(Symbol, Side)>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let union = a.union(b).count() as f64;
    if union <= 0.0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionCandidate, Eur};

    fn seq(steps: Vec<(Side, &str)>) -> Sequence {
        let actions = steps
            .into_iter()
            .map(|(side, symbol)| ActionCandidate::new(side, symbol, 10, Eur(100.0)))
            .collect();
        Sequence::try_new(actions).unwrap()
    }

    #[test]
    fn correlation_aware_drops_highly_correlated_buy_pairs() {
        let sequences = vec![seq(vec![(Side::Buy, "A"), (Side::Buy, "B")])];
        let correlations = vec![(Symbol::from("A"), Symbol::from("B"), 0.9)];
        let filtered = correlation_aware(sequences, &correlations);
        assert!(filtered.is_empty());
    }

    #[test]
    fn correlation_aware_keeps_uncorrelated_pairs() {
        let sequences = vec![seq(vec![(Side::Buy, "A"), (Side::Buy, "B")])];
        let correlations = vec![(Symbol::from("A"), Symbol::from("B"), 0.2)];
        let filtered = correlation_aware(sequences, &correlations);
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn recently_traded_suppresses_symbols_within_cooloff() {
        let sequences = vec![seq(vec![(Side::Buy, "A")])];
        let mut last_traded = HashMap::new();
        last_traded.insert((Symbol::from("A"), Side::Buy), 0i64);
        let filtered = recently_traded(sequences, &last_traded, 2);
        assert!(filtered.is_empty());
    }

    #[test]
    fn diversity_prune_drops_near_duplicate_sequences() {
        let sequences = vec![
            seq(vec![(Side::Buy, "A"), (Side::Sell, "B")]),
            seq(vec![(Side::Buy, "A"), (Side::Sell, "B")]),
        ];
        let pruned = diversity_prune(sequences, 0.3);
        assert_eq!(pruned.len(), 1);
    }

    #[test]
    fn diversity_prune_keeps_dissimilar_sequences() {
        let sequences = vec![
            seq(vec![(Side::Buy, "A")]),
            seq(vec![(Side::Sell, "Z")]),
        ];
        let pruned = diversity_prune(sequences, 0.3);
        assert_eq!(pruned.len(), 2);
    }
}
