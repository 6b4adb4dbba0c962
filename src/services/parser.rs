//! Line Parser
//!
//! Extracts one PM2.5 value from a text chunk of the form
//! `PM2.5(ATM): <decimal> ug/m3`. Anything else is silently ignored.

use std::sync::LazyLock;

use regex::Regex;

static PM25_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"PM2\.5\(ATM\):\s*([\d.]+)\s*ug/m3").expect("PM2.5 pattern compiles")
});

/// Parse the first PM2.5 value in `text`
///
/// The capture allows digits and dots only, so negative values never match.
/// A capture that is not a valid float (e.g. `1.2.3`) is a miss.
pub fn parse_chunk(text: &str) -> Option<f64> {
    let captures = PM25_PATTERN.captures(text)?;
    let value: f64 = captures.get(1)?.as_str().parse().ok()?;
    value.is_finite().then_some(value)
}
