use crate::config::{
    GEO_ALLOCATION_TOLERANCE, IND_ALLOCATION_TOLERANCE, MAX_CONCENTRATION,
    MAX_COUNTRY_CONCENTRATION, MAX_SECTOR_CONCENTRATION,
};
use crate::model::{GroupKey, PortfolioContext, Security, Symbol, OTHER_GROUP};
use crate::sorted_vec_map::SortedVecMap;

/// Lower/upper weight bound for a single symbol, after business rules
/// (allow_buy/allow_sell/min_lot/per-symbol targets) have narrowed the
/// default `[0, max_concentration]` range.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightBounds {
    pub symbol: Symbol,
    pub lower: f64,
    pub upper: f64,
}

/// Which group kind a [`SectorConstraint`] groups by; only used for the
/// industry-specific small-universe relaxation in §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Country,
    Industry,
}

/// A geography or industry group constraint: keep the group's combined
/// weight within `[lower, upper]`, itself derived from `target ± tolerance`
/// and then hard-capped and renormalised per §4.1.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorConstraint {
    pub name: GroupKey,
    pub symbols: Vec<Symbol>,
    pub target: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectorConstraintSummary {
    pub name: GroupKey,
    pub target: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Diagnostic classification of every symbol's bounds plus the active group
/// constraints, returned alongside target weights (§ SPEC_FULL B.1:
/// `get_constraint_summary` in the original).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConstraintSummary {
    pub total_symbols: usize,
    pub locked: Vec<Symbol>,
    pub buy_only: Vec<Symbol>,
    pub sell_blocked: Vec<Symbol>,
    pub geography_constraints: Vec<SectorConstraintSummary>,
    pub industry_constraints: Vec<SectorConstraintSummary>,
}

/// Translates business rules into optimiser weight bounds and sector
/// constraints. Grounded on the original system's `constraints_manager.py`.
pub struct ConstraintsManager {
    pub max_concentration: f64,
    pub geo_tolerance: f64,
    pub ind_tolerance: f64,
}

impl Default for ConstraintsManager {
    fn default() -> Self {
        Self {
            max_concentration: MAX_CONCENTRATION,
            geo_tolerance: GEO_ALLOCATION_TOLERANCE,
            ind_tolerance: IND_ALLOCATION_TOLERANCE,
        }
    }
}

impl ConstraintsManager {
    /// Per-symbol bounds: `allow_buy`/`allow_sell`/`min_lot` first, then the
    /// security's own `min_portfolio_target`/`max_portfolio_target`
    /// (percentages) override, re-interacting with `allow_buy`/`allow_sell`
    /// which keep the tighter of the two. A final conflict check clamps
    /// `lower == upper == current_weight` if the rules still disagree.
    pub fn calculate_weight_bounds(
        &self,
        securities: &[&Security],
        context: &PortfolioContext,
    ) -> SortedVecMap<Symbol, WeightBounds> {
        let portfolio_value = context.total_value().0;
        let mut bounds = SortedVecMap::new();

        for security in securities {
            let symbol = &security.symbol;
            let position = context.positions.get(symbol);
            let current_weight = context.position_weight(symbol);

            let mut lower = 0.0_f64;
            let mut upper = self.max_concentration;

            if !security.allow_buy {
                upper = upper.min(current_weight);
            }
            if !security.allow_sell {
                lower = lower.max(current_weight);
            }

            if let Some(position) = position {
                if security.min_lot > 0 && security.price.0 > 0.0 {
                    if position.quantity <= security.min_lot {
                        lower = lower.max(current_weight);
                    } else if portfolio_value > 0.0 {
                        let min_lot_value = security.min_lot as f64 * security.price.0;
                        let candidate_lower = min_lot_value / portfolio_value;
                        if candidate_lower <= upper {
                            lower = lower.max(candidate_lower);
                        }
                    }
                }
            }

            if let Some(target_min) = security.min_portfolio_target {
                let mut min_override = (target_min / 100.0).max(0.0);
                if !security.allow_sell {
                    min_override = min_override.max(current_weight);
                }
                lower = lower.max(min_override);
            }
            if let Some(target_max) = security.max_portfolio_target {
                let mut max_override = (target_max / 100.0).min(self.max_concentration);
                if !security.allow_buy {
                    max_override = max_override.min(current_weight);
                }
                upper = upper.min(max_override);
            }

            if lower > upper {
                lower = current_weight;
                upper = current_weight;
            }

            bounds.insert(
                symbol.clone(),
                WeightBounds {
                    symbol: symbol.clone(),
                    lower,
                    upper,
                },
            );
        }

        bounds
    }

    /// Builds both group constraint sets, applying normalise-then-scale
    /// (§9 open question: this spec fixes that order) and the small-universe
    /// industry relaxation.
    pub fn build_sector_constraints(
        &self,
        securities: &[&Security],
        geo_targets: &SortedVecMap<GroupKey, f64>,
        ind_targets: &SortedVecMap<GroupKey, f64>,
    ) -> (Vec<SectorConstraint>, Vec<SectorConstraint>) {
        let geo = self.group_constraints(
            securities,
            geo_targets,
            self.geo_tolerance,
            MAX_COUNTRY_CONCENTRATION,
            GroupKind::Country,
            |security| {
                security
                    .country
                    .clone()
                    .map(GroupKey)
                    .unwrap_or_else(|| GroupKey(OTHER_GROUP.to_string()))
            },
        );
        let ind = self.group_constraints(
            securities,
            ind_targets,
            self.ind_tolerance,
            MAX_SECTOR_CONCENTRATION,
            GroupKind::Industry,
            |security| {
                security
                    .industry
                    .clone()
                    .map(GroupKey)
                    .unwrap_or_else(|| GroupKey(OTHER_GROUP.to_string()))
            },
        );
        (geo, ind)
    }

    fn group_constraints(
        &self,
        securities: &[&Security],
        targets: &SortedVecMap<GroupKey, f64>,
        tolerance: f64,
        hard_cap: f64,
        kind: GroupKind,
        group_of: impl Fn(&Security) -> GroupKey,
    ) -> Vec<SectorConstraint> {
        let mut groups: SortedVecMap<GroupKey, Vec<Symbol>> = SortedVecMap::new();
        for security in securities {
            groups
                .entry(group_of(security))
                .or_insert_with(Vec::new)
                .push(security.symbol.clone());
        }

        // Only groups with at least one active stock participate in
        // normalisation (§4.1: "normalise over groups with active stocks only").
        let active_targets: Vec<(GroupKey, f64)> = groups
            .iter()
            .filter_map(|(name, _)| targets.get(name).filter(|t| **t > 0.0).map(|t| (name.clone(), *t)))
            .collect();

        let target_sum: f64 = active_targets.iter().map(|(_, t)| *t).sum();
        let normalise_by = if target_sum > 1.0 { target_sum } else { 1.0 };

        let mut constraints: Vec<SectorConstraint> = Vec::new();
        for (name, target) in &active_targets {
            let normalised_target = target / normalise_by;
            let raw_lower = (normalised_target - tolerance).max(0.0);
            let upper = (normalised_target + tolerance).min(1.0).min(hard_cap);
            constraints.push(SectorConstraint {
                name: name.clone(),
                symbols: groups.get(name).cloned().unwrap_or_default(),
                target: normalised_target,
                lower: raw_lower,
                upper,
            });
        }

        // If lower bounds collectively exceed 0.7, scale them down uniformly
        // (§4.1), applied *after* the normalisation above.
        let lower_sum: f64 = constraints.iter().map(|c| c.lower).sum();
        if lower_sum > 0.7 {
            let scale = 0.7 / lower_sum;
            for constraint in &mut constraints {
                constraint.lower *= scale;
            }
        }

        // With only one or two active groups, a hard per-group cap would
        // make the portfolio infeasible to diversify into just 1-2 buckets;
        // relax the upper bound accordingly (§4.1). This only applies to
        // industry groups, per spec §4.1 and §8 boundary behaviour.
        if kind == GroupKind::Industry {
            let active_count = constraints.len();
            let relaxed_upper = match active_count {
                1 => Some(0.7),
                2 => Some(0.5),
                _ => None,
            };
            if let Some(relaxed) = relaxed_upper {
                for constraint in &mut constraints {
                    constraint.upper = constraint.upper.max(relaxed).min(1.0);
                }
            }
        }

        constraints
    }

    pub fn get_constraint_summary(
        &self,
        bounds: &SortedVecMap<Symbol, WeightBounds>,
        geo_constraints: &[SectorConstraint],
        ind_constraints: &[SectorConstraint],
    ) -> ConstraintSummary {
        let mut summary = ConstraintSummary {
            total_symbols: bounds.len(),
            ..Default::default()
        };

        for (symbol, bound) in bounds.iter() {
            if bound.lower == bound.upper {
                summary.locked.push(symbol.clone());
            } else if bound.lower == 0.0 && bound.upper < self.max_concentration {
                summary.buy_only.push(symbol.clone());
            } else if bound.lower > 0.0 {
                summary.sell_blocked.push(symbol.clone());
            }
        }

        summary.geography_constraints = geo_constraints
            .iter()
            .map(|c| SectorConstraintSummary {
                name: c.name.clone(),
                target: c.target,
                lower: c.lower,
                upper: c.upper,
            })
            .collect();
        summary.industry_constraints = ind_constraints
            .iter()
            .map(|c| SectorConstraintSummary {
                name: c.name.clone(),
                target: c.target,
                lower: c.lower,
                upper: c.upper,
            })
            .collect();

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Eur;

    fn security(symbol: &str, industry: &str) -> Security {
        let mut security = Security::new(symbol, symbol, Eur(100.0));
        security.industry = Some(industry.to_string());
        security
    }

    #[test]
    fn single_active_industry_relaxes_upper_bound_to_0_7() {
        let manager = ConstraintsManager::default();
        let securities = vec![security("A", "Tech"), security("B", "Tech")];
        let refs: Vec<&Security> = securities.iter().collect();
        let mut targets = SortedVecMap::new();
        targets.insert(GroupKey::from("Tech"), 0.5);
        let (_, ind) = manager.build_sector_constraints(&refs, &SortedVecMap::new(), &targets);
        assert_eq!(ind.len(), 1);
        assert!((ind[0].upper - 0.7).abs() < 1e-9);
    }

    #[test]
    fn two_active_industries_relax_upper_bound_to_0_5() {
        let manager = ConstraintsManager::default();
        let securities = vec![security("A", "Tech"), security("B", "Health")];
        let refs: Vec<&Security> = securities.iter().collect();
        let mut targets = SortedVecMap::new();
        targets.insert(GroupKey::from("Tech"), 0.5);
        targets.insert(GroupKey::from("Health"), 0.5);
        let (_, ind) = manager.build_sector_constraints(&refs, &SortedVecMap::new(), &targets);
        assert_eq!(ind.len(), 2);
        assert!(ind.iter().all(|c| c.upper >= 0.5 - 1e-9));
    }

    #[test]
    fn group_targets_summing_above_one_are_normalised() {
        let manager = ConstraintsManager::default();
        let securities = vec![security("A", "Tech"), security("B", "Health"), security("C", "Energy")];
        let refs: Vec<&Security> = securities.iter().collect();
        let mut targets = SortedVecMap::new();
        targets.insert(GroupKey::from("Tech"), 0.6);
        targets.insert(GroupKey::from("Health"), 0.6);
        targets.insert(GroupKey::from("Energy"), 0.6);
        let (_, ind) = manager.build_sector_constraints(&refs, &SortedVecMap::new(), &targets);
        let total_target: f64 = ind.iter().map(|c| c.target).sum();
        assert!((total_target - 1.0).abs() < 1e-9);
    }

    #[test]
    fn lower_bounds_summing_above_0_7_are_scaled_down() {
        let manager = ConstraintsManager::default();
        let securities: Vec<Security> = (0..6)
            .map(|i| security(&format!("S{i}"), &format!("Ind{i}")))
            .collect();
        let refs: Vec<&Security> = securities.iter().collect();
        let mut targets = SortedVecMap::new();
        for i in 0..6 {
            targets.insert(GroupKey::from(format!("Ind{i}").as_str()), 0.16);
        }
        let (_, ind) = manager.build_sector_constraints(&refs, &SortedVecMap::new(), &targets);
        let lower_sum: f64 = ind.iter().map(|c| c.lower).sum();
        assert!(lower_sum <= 0.7 + 1e-9);
    }

    #[test]
    fn locked_symbol_when_allow_buy_and_sell_both_false() {
        let manager = ConstraintsManager::default();
        let mut sec = security("A", "Tech");
        sec.allow_buy = false;
        sec.allow_sell = false;
        let context = PortfolioContext {
            as_of: chrono::Utc::now(),
            cash: Eur(0.0),
            positions: SortedVecMap::new(),
            securities: SortedVecMap::new(),
            country_targets: SortedVecMap::new(),
            industry_targets: SortedVecMap::new(),
            ..Default::default()
        };
        let bounds = manager.calculate_weight_bounds(&[&sec], &context);
        let bound = bounds.get(&Symbol::from("A")).unwrap();
        assert_eq!(bound.lower, bound.upper);
    }
}
