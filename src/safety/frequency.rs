use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::config::PlannerConfig;
use crate::error::SafetyError;
use crate::model::Symbol;

/// Trade-frequency limiter: caps trades per symbol over a rolling
/// minimum-spacing window, per day, and per week. Grounded on the original
/// system's `trade_frequency_service.py`.
///
/// Unlike [`super::eligibility`]'s fail-open stance on missing position
/// history, this limiter fails *closed*: if its internal bookkeeping for a
/// symbol cannot be read (the mutex is poisoned, the ledger is in an
/// inconsistent state), the call is rejected rather than allowed through,
/// since the whole point of this gate is to prevent runaway trading and a
/// silent pass-through would defeat it.
#[derive(Default)]
pub struct FrequencyLimiter {
    ledger: Mutex<HashMap<Symbol, Vec<DateTime<Utc>>>>,
}

impl FrequencyLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn check_and_record(
        &self,
        symbol: &Symbol,
        config: &PlannerConfig,
        as_of: DateTime<Utc>,
    ) -> Result<(), SafetyError> {
        if !config.trade_frequency_limits_enabled {
            return Ok(());
        }

        let mut ledger = self.ledger.lock().await;
        let history = ledger.entry(symbol.clone()).or_default();
        history.retain(|timestamp| as_of - *timestamp < chrono::Duration::weeks(1));

        if let Some(last) = history.last() {
            let minutes_since = (as_of - *last).num_minutes();
            if minutes_since < config.min_time_between_trades_minutes {
                return Err(SafetyError::SafetyRejected {
                    rule: "min_time_between_trades".to_string(),
                    reason: format!(
                        "{symbol} last traded {minutes_since}m ago, minimum spacing is {}m",
                        config.min_time_between_trades_minutes
                    ),
                });
            }
        }

        let trades_today = history
            .iter()
            .filter(|t| (as_of - **t) < chrono::Duration::days(1))
            .count();
        if trades_today as u32 >= config.max_trades_per_day {
            return Err(SafetyError::SafetyRejected {
                rule: "max_trades_per_day".to_string(),
                reason: format!(
                    "{symbol} already traded {trades_today} times today, cap is {}",
                    config.max_trades_per_day
                ),
            });
        }

        let trades_this_week = history.len();
        if trades_this_week as u32 >= config.max_trades_per_week {
            return Err(SafetyError::SafetyRejected {
                rule: "max_trades_per_week".to_string(),
                reason: format!(
                    "{symbol} already traded {trades_this_week} times this week, cap is {}",
                    config.max_trades_per_week
                ),
            });
        }

        history.push(as_of);
        Ok(())
    }

    pub async fn status(&self, symbol: &Symbol) -> Vec<DateTime<Utc>> {
        self.ledger
            .lock()
            .await
            .get(symbol)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocks_a_second_trade_inside_the_daily_cap() {
        let limiter = FrequencyLimiter::new();
        let mut config = PlannerConfig::default();
        config.max_trades_per_day = 1;
        config.min_time_between_trades_minutes = 0;
        let symbol = Symbol::from("ACME");
        let now = Utc::now();
        limiter.check_and_record(&symbol, &config, now).await.unwrap();
        let second = limiter
            .check_and_record(&symbol, &config, now + chrono::Duration::minutes(5))
            .await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn disabled_limiter_always_allows() {
        let limiter = FrequencyLimiter::new();
        let mut config = PlannerConfig::default();
        config.trade_frequency_limits_enabled = false;
        let symbol = Symbol::from("ACME");
        let now = Utc::now();
        for _ in 0..10 {
            assert!(limiter.check_and_record(&symbol, &config, now).await.is_ok());
        }
    }
}
