//! Canonical alert payloads for tests.

/// A complete, valid alert body with every optional field present.
pub fn full_alert() -> serde_json::Value {
    serde_json::json!({
        "ticker": "BTCUSDT",
        "signal": "Buy",
        "price": 45000.0,
        "time": "2025-08-05T18:30:00Z",
        "interval": "1h",
        "chart": "https://www.tradingview.com/chart/?symbol=BTCUSDT"
    })
}

/// A minimal valid alert body, optional fields omitted.
pub fn minimal_alert() -> serde_json::Value {
    serde_json::json!({
        "ticker": "BTCUSDT",
        "signal": "Buy",
        "price": 45000.0,
        "time": "2025-08-05T18:30:00Z"
    })
}

/// A minimal alert for an arbitrary ticker and signal literal.
pub fn alert_for(ticker: &str, signal: &str) -> serde_json::Value {
    serde_json::json!({
        "ticker": ticker,
        "signal": signal,
        "price": 100.0,
        "time": "2025-08-05T18:30:00Z"
    })
}

/// Serializes an alert value to body bytes.
pub fn to_bytes(value: &serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(value).expect("alert fixtures serialize")
}
