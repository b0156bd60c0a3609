//! Sweep parameter tokens
//!
//! Every token keeps the text the operator typed so the result log can echo
//! it back verbatim, next to the normalized value the harness computes with.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Re-export commonly used types
pub use crate::error::{AppError, Result};

/// Split a token into its leading numeric part and the remaining unit suffix
fn split_numeric(token: &str) -> (&str, &str) {
    let end = token
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    (&token[..end], token[end..].trim())
}

/// One-way delay token, e.g. `30ms`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelaySpec {
    token: String,
    millis: u64,
}

impl DelaySpec {
    /// The token as written in the configuration
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Delay in milliseconds
    pub fn millis(&self) -> u64 {
        self.millis
    }
}

impl FromStr for DelaySpec {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim();
        let (number, unit) = split_numeric(token);
        if number.is_empty() {
            return Err(AppError::config(format!("Invalid delay token '{}': expected e.g. 30ms", token)));
        }

        let value: f64 = number
            .parse()
            .map_err(|_| AppError::config(format!("Invalid delay token '{}'", token)))?;

        let millis = match unit.to_ascii_lowercase().as_str() {
            "" | "ms" => value,
            "s" => value * 1000.0,
            other => {
                return Err(AppError::config(format!(
                    "Invalid delay unit '{}' in '{}': use ms or s",
                    other, token
                )))
            }
        };

        Ok(Self {
            token: token.to_string(),
            millis: millis.round() as u64,
        })
    }
}

impl fmt::Display for DelaySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

/// How the bandwidth token's unit was interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateUnit {
    Mbps,
    Kbps,
    /// Unit not recognized, numeric prefix taken as Mbps
    AssumedMbps,
}

/// Link rate token, e.g. `10Mbps`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandwidthSpec {
    token: String,
    kbps: u64,
    unit: RateUnit,
}

impl BandwidthSpec {
    /// The token as written in the configuration
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Rate normalized to kilobits per second
    pub fn kbps(&self) -> u64 {
        self.kbps
    }

    /// How the unit suffix was interpreted
    pub fn unit(&self) -> RateUnit {
        self.unit
    }

    /// True when the unit was not recognized and Mbps was assumed
    pub fn is_lenient(&self) -> bool {
        self.unit == RateUnit::AssumedMbps
    }
}

impl FromStr for BandwidthSpec {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim();
        let (number, unit) = split_numeric(token);
        if number.is_empty() {
            return Err(AppError::config(format!(
                "Invalid bandwidth token '{}': expected e.g. 10Mbps",
                token
            )));
        }

        let value: f64 = number
            .parse()
            .map_err(|_| AppError::config(format!("Invalid bandwidth token '{}'", token)))?;

        let (kbps, unit) = match unit.to_ascii_lowercase().as_str() {
            "mbps" => (value * 1000.0, RateUnit::Mbps),
            "kbps" => (value, RateUnit::Kbps),
            _ => (value * 1000.0, RateUnit::AssumedMbps),
        };

        Ok(Self {
            token: token.to_string(),
            kbps: kbps.round() as u64,
            unit,
        })
    }
}

impl fmt::Display for BandwidthSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

/// Payload size token, `<integer>K` or `<integer>M`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeSpec {
    token: String,
    bytes: u64,
}

impl SizeSpec {
    /// The token as written in the configuration
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Expected payload length in bytes
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl FromStr for SizeSpec {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim();
        let invalid = || AppError::config(format!("Invalid size token '{}': expected <integer>K or <integer>M", token));

        let (digits, multiplier) = if let Some(digits) = token.strip_suffix('K') {
            (digits, 1024u64)
        } else if let Some(digits) = token.strip_suffix('M') {
            (digits, 1024 * 1024)
        } else {
            return Err(invalid());
        };

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let count: u64 = digits.parse().map_err(|_| invalid())?;
        let bytes = count.checked_mul(multiplier).ok_or_else(invalid)?;

        Ok(Self {
            token: token.to_string(),
            bytes,
        })
    }
}

impl fmt::Display for SizeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

/// Parse a comma-separated token list, rejecting an empty result
pub fn parse_token_list<T>(name: &str, raw: &str) -> Result<Vec<T>>
where
    T: FromStr<Err = AppError>,
{
    let tokens: Vec<T> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<Result<_>>()?;

    if tokens.is_empty() {
        return Err(AppError::config(format!("{} must list at least one value", name)));
    }

    Ok(tokens)
}
