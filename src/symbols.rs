//! Ticker symbol normalization.
//!
//! Exchanges and networks do not agree on tickers for rebranded or wrapped
//! assets. Every symbol goes through [`normalize`] before balances are grouped,
//! so the same asset always ends up under one canonical, upper-case ticker.

/// Fixed overrides from source-native tickers to their canonical ticker.
const SYMBOL_OVERRIDES: &[(&str, &str)] = &[
    ("BEAMX", "BEAM"),
    ("RNDR", "RENDER"),
    ("ATOR", "ANYONE"),
];

/// Maps a raw ticker to its canonical form.
///
/// Matching is case-insensitive and ignores surrounding whitespace. Symbols
/// without an override map to their upper-cased selves. Canonical targets never
/// appear as override keys, so applying this twice is the same as applying it
/// once.
pub fn normalize(symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();
    SYMBOL_OVERRIDES
        .iter()
        .find(|(raw, _)| *raw == upper)
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or(upper)
}
