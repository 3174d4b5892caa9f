use chrono::{DateTime, Utc};

use crate::config::PlannerConfig;
use crate::error::SafetyError;
use crate::model::{ActionCandidate, Position, Side};

/// Per-symbol eligibility checks applied to a single candidate action:
/// buy/sell cooldowns, minimum holding period, and a maximum-loss floor on
/// sells. Grounded on the original system's `eligibility.py`.
///
/// Where the underlying position data needed for a check is missing (no
/// prior trade on record, a brand-new symbol), the check defaults to
/// eligible rather than blocking — there is nothing to cool down from or
/// hold against. This mirrors the original's conservative fail-open stance
/// for missing *position history*, which is a different posture from the
/// frequency limiter's fail-closed stance on missing *frequency counters*
/// (see [`super::frequency::FrequencyLimiter`]).
pub fn check_eligibility(
    candidate: &ActionCandidate,
    position: Option<&Position>,
    config: &PlannerConfig,
    as_of: DateTime<Utc>,
) -> Result<(), SafetyError> {
    match candidate.side {
        Side::Buy => check_buy_cooldown(candidate, position, config, as_of),
        Side::Sell => {
            check_sell_cooldown(candidate, position, config, as_of)?;
            check_min_hold(candidate, position, config, as_of)?;
            check_max_loss(candidate, position, config)
        }
    }
}

fn check_buy_cooldown(
    candidate: &ActionCandidate,
    position: Option<&Position>,
    config: &PlannerConfig,
    as_of: DateTime<Utc>,
) -> Result<(), SafetyError> {
    let Some(position) = position else {
        return Ok(());
    };
    let Some(last_buy_at) = position.last_buy_at else {
        return Ok(());
    };
    let days_since = (as_of - last_buy_at).num_days();
    if days_since < config.buy_cooldown_days {
        return Err(SafetyError::SafetyRejected {
            rule: "buy_cooldown".to_string(),
            reason: format!(
                "{} was bought {days_since}d ago, cooldown is {}d",
                candidate.symbol, config.buy_cooldown_days
            ),
        });
    }
    Ok(())
}

fn check_sell_cooldown(
    candidate: &ActionCandidate,
    position: Option<&Position>,
    config: &PlannerConfig,
    as_of: DateTime<Utc>,
) -> Result<(), SafetyError> {
    let Some(position) = position else {
        return Ok(());
    };
    let Some(last_sell_at) = position.last_sell_at else {
        return Ok(());
    };
    let days_since = (as_of - last_sell_at).num_days();
    if days_since < config.sell_cooldown_days {
        return Err(SafetyError::SafetyRejected {
            rule: "sell_cooldown".to_string(),
            reason: format!(
                "{} was sold {days_since}d ago, cooldown is {}d",
                candidate.symbol, config.sell_cooldown_days
            ),
        });
    }
    Ok(())
}

fn check_min_hold(
    candidate: &ActionCandidate,
    position: Option<&Position>,
    config: &PlannerConfig,
    as_of: DateTime<Utc>,
) -> Result<(), SafetyError> {
    let Some(position) = position else {
        return Ok(());
    };
    let held_days = position.held_days(as_of);
    if held_days < config.min_hold_days {
        return Err(SafetyError::SafetyRejected {
            rule: "min_hold".to_string(),
            reason: format!(
                "{} held {held_days}d, minimum hold is {}d",
                candidate.symbol, config.min_hold_days
            ),
        });
    }
    Ok(())
}

fn check_max_loss(
    candidate: &ActionCandidate,
    position: Option<&Position>,
    config: &PlannerConfig,
) -> Result<(), SafetyError> {
    let Some(position) = position else {
        return Ok(());
    };
    let Some(unrealized_return) = position.unrealized_return() else {
        return Ok(());
    };
    if unrealized_return < config.max_loss_threshold {
        return Err(SafetyError::SafetyRejected {
            rule: "max_loss".to_string(),
            reason: format!(
                "{} is at {:.1}% return, below the {:.1}% floor",
                candidate.symbol,
                unrealized_return * 100.0,
                config.max_loss_threshold * 100.0
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Eur, Symbol};

    fn position(last_buy_at: Option<DateTime<Utc>>, opened_at: DateTime<Utc>, avg: f64, current: f64) -> Position {
        Position {
            symbol: Symbol::from("ACME"),
            quantity: 10,
            avg_price: Eur(avg),
            current_price: Eur(current),
            opened_at,
            flat_since: None,
            last_buy_at,
            last_sell_at: None,
        }
    }

    #[test]
    fn buy_within_cooldown_is_rejected() {
        let config = PlannerConfig::default();
        let now = Utc::now();
        let candidate = ActionCandidate::new(Side::Buy, "ACME", 5, Eur(10.0));
        let pos = position(Some(now - chrono::Duration::days(1)), now, 10.0, 10.0);
        let result = check_eligibility(&candidate, Some(&pos), &config, now);
        assert!(result.is_err());
    }

    #[test]
    fn sell_with_no_position_history_is_eligible() {
        let config = PlannerConfig::default();
        let now = Utc::now();
        let candidate = ActionCandidate::new(Side::Sell, "NEW", 5, Eur(10.0));
        assert!(check_eligibility(&candidate, None, &config, now).is_ok());
    }

    #[test]
    fn sell_below_max_loss_threshold_is_rejected() {
        let config = PlannerConfig::default();
        let now = Utc::now();
        let candidate = ActionCandidate::new(Side::Sell, "ACME", 5, Eur(6.0));
        let pos = position(None, now - chrono::Duration::days(200), 10.0, 6.0);
        let result = check_eligibility(&candidate, Some(&pos), &config, now);
        assert!(result.is_err());
    }
}
