pub mod client;

pub use client::BinanceClient;

use anyhow::{Context, Result};

/// Binance sends prices and quantities as JSON strings; accept numbers too.
pub fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
    if let Some(s) = val.as_str() {
        s.parse::<f64>()
            .with_context(|| format!("failed to parse '{s}' as f64"))
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        anyhow::bail!("expected string or number, got: {val}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_string_and_number() {
        assert!((parse_str_f64(&serde_json::json!("1.25")).unwrap() - 1.25).abs() < 1e-12);
        assert!((parse_str_f64(&serde_json::json!(2.5)).unwrap() - 2.5).abs() < 1e-12);
        assert!(parse_str_f64(&serde_json::json!(null)).is_err());
        assert!(parse_str_f64(&serde_json::json!("abc")).is_err());
    }
}
