use serde::{Deserialize, Serialize};

use super::{Eur, PortfolioContext};

/// A content hash over the economically significant shape of a portfolio:
/// held quantities, prices rounded to the cent, and cash rounded to the
/// nearest 10 EUR. Two contexts that differ only in noise (a stale price tick
/// that didn't move the cent, a cosmetic field) hash identically, which is
/// what lets the Resilience Layer's cache actually get hits (spec §8
/// scenario 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortfolioFingerprint(pub [u8; 32]);

impl PortfolioFingerprint {
    pub fn compute(context: &PortfolioContext) -> Self {
        let mut hasher = blake3::Hasher::new();

        let mut positions: Vec<_> = context.positions.iter().collect();
        positions.sort_by(|a, b| a.0.cmp(b.0));
        for (symbol, position) in positions {
            hasher.update(symbol.0.as_bytes());
            hasher.update(&position.quantity.to_le_bytes());
            hasher.update(&round_cents(position.current_price).to_le_bytes());
        }

        hasher.update(&round_to_bucket(context.cash, 10.0).to_le_bytes());

        Self(*hasher.finalize().as_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex_encode(&self.0)
    }
}

fn round_cents(value: Eur) -> i64 {
    (value.0 * 100.0).round() as i64
}

fn round_to_bucket(value: Eur, bucket: f64) -> i64 {
    ((value.0 / bucket).round() * bucket) as i64
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(&mut out, "{byte:02x}").expect("writing to a String never fails");
    }
    out
}

impl std::fmt::Display for PortfolioFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
