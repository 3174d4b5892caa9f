//! The Safety / Frequency Gate (S): per-symbol eligibility rules plus a
//! trade-frequency limiter, applied to the winning plan before it is handed
//! back to the caller. Grounded on the original system's `eligibility.py`
//! and `trade_frequency_service.py`.

pub mod eligibility;
pub mod frequency;

pub use eligibility::check_eligibility;
pub use frequency::FrequencyLimiter;
