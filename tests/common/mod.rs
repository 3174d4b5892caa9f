//! Shared fixtures for the integration suite, the teacher's
//! `tests/common/mod.rs` convention: a reusable universe/portfolio builder
//! rather than each `*_it.rs` file hand-rolling its own.

use std::collections::BTreeMap;

use cairn::rpc::{CreatePlanRequest, EvaluatorPoolConfig, PortfolioSummary, PositionInput, SearchParameters, SecurityInput};

/// One held position: 20 shares of `ACME` bought well below its current
/// price, a stable quality name rather than a trigger for any single C1
/// category on its own.
pub fn acme_position() -> PositionInput {
    PositionInput {
        symbol: "ACME".to_string(),
        quantity: 20,
        avg_price: 90.0,
        current_price: 100.0,
        value_eur: 2_000.0,
        currency: "EUR".to_string(),
        unrealized_gain_abs: 200.0,
        unrealized_gain_pct: 0.111,
        opened_at: chrono::Utc::now() - chrono::Duration::days(400),
        last_buy_at: None,
        last_sell_at: None,
    }
}

pub fn acme_security() -> SecurityInput {
    SecurityInput {
        symbol: "ACME".to_string(),
        name: "Acme Corp".to_string(),
        price: 100.0,
        currency: "EUR".to_string(),
        market_cap: Some(50_000_000_000.0),
        sector: Some("Industrials".to_string()),
        industry: Some("Industrials".to_string()),
        country: Some("DE".to_string()),
        isin: None,
        min_lot: 1,
        allow_buy: true,
        allow_sell: true,
        min_portfolio_target: None,
        max_portfolio_target: None,
        active: true,
    }
}

/// A second, unheld security attractive enough on quality alone to surface
/// as an opportunistic buy once cash is available (spec §4.2
/// `opportunity_buys`).
pub fn sap_security() -> SecurityInput {
    SecurityInput {
        symbol: "SAP".to_string(),
        name: "SAP SE".to_string(),
        price: 50.0,
        currency: "EUR".to_string(),
        market_cap: Some(180_000_000_000.0),
        sector: Some("Technology".to_string()),
        industry: Some("Software".to_string()),
        country: Some("DE".to_string()),
        isin: None,
        min_lot: 1,
        allow_buy: true,
        allow_sell: true,
        min_portfolio_target: None,
        max_portfolio_target: None,
        active: true,
    }
}

/// A `CreatePlanRequest` holding `ACME` plus cash, with `SAP` in the universe
/// as a high-quality, currently-unheld opportunity — enough for C1 to surface
/// at least one `opportunity_buys` candidate once cash clears the
/// worthwhileness floor.
pub fn create_plan_request(available_cash: f64) -> CreatePlanRequest {
    let mut quality_scores = BTreeMap::new();
    quality_scores.insert("SAP".to_string(), 0.8);
    quality_scores.insert("ACME".to_string(), 0.7);

    CreatePlanRequest {
        portfolio_context: PortfolioSummary {
            total_value: 2_000.0 + available_cash,
            available_cash,
            num_positions: 1,
            country_targets: BTreeMap::new(),
            industry_targets: BTreeMap::new(),
        },
        positions: vec![acme_position()],
        securities: vec![acme_security(), sap_security()],
        available_cash,
        target_weights: None,
        current_prices: None,
        parameters: SearchParameters::default(),
        evaluator_config: EvaluatorPoolConfig::default(),
        quality_scores,
        dividend_yields: BTreeMap::new(),
        trailing_cagr: BTreeMap::new(),
        risk_scores: BTreeMap::new(),
        recently_sold: Vec::new(),
        ineligible_symbols: Vec::new(),
        as_of: chrono::Utc::now(),
    }
}

/// The same request but with an empty universe and no holdings — nothing for
/// C1 to find, so C4's pipeline should short-circuit to `Plan::no_actions`
/// (spec §8 scenario 3).
pub fn cash_only_request(available_cash: f64) -> CreatePlanRequest {
    CreatePlanRequest {
        portfolio_context: PortfolioSummary {
            total_value: available_cash,
            available_cash,
            num_positions: 0,
            country_targets: BTreeMap::new(),
            industry_targets: BTreeMap::new(),
        },
        positions: Vec::new(),
        securities: Vec::new(),
        available_cash,
        target_weights: None,
        current_prices: None,
        parameters: SearchParameters::default(),
        evaluator_config: EvaluatorPoolConfig::default(),
        quality_scores: BTreeMap::new(),
        dividend_yields: BTreeMap::new(),
        trailing_cagr: BTreeMap::new(),
        risk_scores: BTreeMap::new(),
        recently_sold: Vec::new(),
        ineligible_symbols: Vec::new(),
        as_of: chrono::Utc::now(),
    }
}
