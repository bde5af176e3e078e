//! Money formatting for chat replies.
//!
//! Amounts that are missing or not finite render as zero rather than
//! failing, so a bad quote can never break a reply.

use serde::Deserialize;

/// Fixed-rate secondary currency shown next to USD prices.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SecondaryCurrency {
    pub label: String,
    /// Units of the secondary currency per USD.
    pub rate: f64,
}

impl Default for SecondaryCurrency {
    fn default() -> Self {
        Self {
            label: "AED".to_string(),
            rate: 3.6725,
        }
    }
}

/// Format a USD amount as `$1,234.56`, with the sign before the symbol.
pub fn format_usd(amount: Option<f64>) -> String {
    let (negative, body) = split_amount(amount);
    if negative {
        format!("-${body}")
    } else {
        format!("${body}")
    }
}

/// Format a USD amount converted at the fixed secondary rate, e.g.
/// `8,614.47 AED`.
pub fn format_secondary(amount_usd: Option<f64>, currency: &SecondaryCurrency) -> String {
    let converted = amount_usd.map(|a| a * currency.rate);
    let (negative, body) = split_amount(converted);
    let sign = if negative { "-" } else { "" };
    format!("{sign}{body} {}", currency.label)
}

/// Format a price change with an explicit sign: `+$12.30`, `-$4.00`.
pub fn format_change(change: f64) -> String {
    let formatted = format_usd(Some(change));
    if formatted.starts_with('-') || formatted == "$0.00" {
        formatted
    } else {
        format!("+{formatted}")
    }
}

/// Returns the sign and the grouped absolute value with two decimals.
fn split_amount(amount: Option<f64>) -> (bool, String) {
    let value = amount.filter(|v| v.is_finite()).unwrap_or(0.0);
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let body = format!("{}.{frac_part}", group_thousands(int_part));
    // -0.001 rounds to zero and must not print a minus
    let negative = value < 0.0 && body != "0.00";
    (negative, body)
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
