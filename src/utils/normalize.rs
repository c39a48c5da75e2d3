//! Funding rate and symbol normalization.
//!
//! Every venue settles funding on its own period (Hyperliquid hourly, most
//! CEXs every 8 hours, some contracts every 1, 2 or 4 hours). Rows are compared
//! on a single scale: percent per year over 365 days.

/// The only quote currency tracked across venues.
pub const QUOTE_ASSET: &str = "USDT";

/// Fallback funding period when a venue does not state one for a symbol.
pub const DEFAULT_FUNDING_INTERVAL_HOURS: f64 = 8.0;

const MILLIS_PER_HOUR: f64 = 60.0 * 60.0 * 1000.0;

/// Funding settlement period of a symbol, in whichever unit the venue reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FundingInterval {
    Hours(f64),
    Minutes(f64),
    Millis(i64),
}

impl FundingInterval {
    /// Period in hours, `None` when the venue reported a non-positive period.
    pub fn hours(&self) -> Option<f64> {
        let hours = match *self {
            FundingInterval::Hours(h) => h,
            FundingInterval::Minutes(m) => m / 60.0,
            FundingInterval::Millis(ms) => ms as f64 / MILLIS_PER_HOUR,
        };
        (hours.is_finite() && hours > 0.0).then_some(hours)
    }
}

/// Resolve a possibly missing interval to hours, falling back to `default_hours`.
pub fn resolve_interval_hours(interval: Option<FundingInterval>, default_hours: f64) -> f64 {
    interval.and_then(|i| i.hours()).unwrap_or(default_hours)
}

/// Annualize a per-period funding rate into percent per year.
///
/// `APR% = rate / interval_hours * 24 * 365 * 100`
pub fn annualize_apr(rate: f64, interval_hours: f64) -> f64 {
    rate / interval_hours * 24.0 * 365.0 * 100.0
}

/// Strip the quote suffix from a concatenated symbol (`BTCUSDT` -> `BTC`).
///
/// Repeated suffixes are stripped too, but a bare `USDT` is left alone so the
/// result is never empty and applying the function twice changes nothing.
pub fn strip_quote(symbol: &str) -> &str {
    let mut base = symbol;
    while let Some(rest) = base.strip_suffix(QUOTE_ASSET) {
        if rest.is_empty() {
            break;
        }
        base = rest;
    }
    base
}

/// Whether a concatenated symbol is quoted in [`QUOTE_ASSET`].
pub fn is_quote_symbol(symbol: &str) -> bool {
    symbol.len() > QUOTE_ASSET.len() && symbol.ends_with(QUOTE_ASSET)
}

/// Build the concatenated venue symbol for a base asset (`BTC` -> `BTCUSDT`).
pub fn quote_symbol(base: &str) -> String {
    format!("{}{}", base, QUOTE_ASSET)
}

/// Base asset of a dash-delimited instrument id (`BTC-USDT-SWAP` -> `BTC`).
pub fn base_of_inst_id(inst_id: &str) -> &str {
    inst_id.split('-').next().unwrap_or(inst_id)
}

/// Human readable number with `digits` significant digits and thousands separators.
///
/// `50123.456` with 5 digits renders as `50,123`; `0.0012345678` as `0.0012346`.
pub fn format_price(value: f64, digits: u32) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    if value == 0.0 {
        return format!("{:.*}", digits.saturating_sub(1) as usize, 0.0);
    }
    let pow = value.abs().log10().floor() as i32 + 1;
    let scale = 10f64.powi(pow);
    let factor = 10f64.powi(digits as i32);
    let rounded = (value / scale * factor).round() / factor * scale;
    let fraction_digits = (digits as i32 - pow).max(0) as usize;
    group_thousands(&format!("{:.*}", fraction_digits, rounded))
}

fn group_thousands(formatted: &str) -> String {
    let (sign, unsigned) = match formatted.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", formatted),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    match frac_part {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annualize_apr_matches_formula() {
        let cases = [
            (0.0001, 8.0),
            (-0.0003, 4.0),
            (0.00001234, 1.0),
            (0.0075, 2.0),
            (0.0, 8.0),
        ];
        for (rate, hours) in cases {
            let expected = rate / hours * 24.0 * 365.0 * 100.0;
            assert_eq!(annualize_apr(rate, hours), expected);
        }
    }

    #[test]
    fn test_btc_eight_hour_rate() {
        let apr = annualize_apr(0.0001, 8.0);
        assert!((apr - 10.95).abs() < 1e-9, "got {}", apr);
    }

    #[test]
    fn test_interval_units_agree() {
        let hours = FundingInterval::Hours(4.0).hours();
        assert_eq!(FundingInterval::Minutes(240.0).hours(), hours);
        assert_eq!(FundingInterval::Millis(4 * 3_600_000).hours(), hours);
        assert_eq!(FundingInterval::Millis(0).hours(), None);
        assert_eq!(FundingInterval::Hours(-1.0).hours(), None);
    }

    #[test]
    fn test_resolve_interval_falls_back() {
        assert_eq!(resolve_interval_hours(None, 8.0), 8.0);
        assert_eq!(resolve_interval_hours(Some(FundingInterval::Millis(0)), 8.0), 8.0);
        assert_eq!(resolve_interval_hours(Some(FundingInterval::Hours(1.0)), 8.0), 1.0);
    }

    #[test]
    fn test_strip_quote_is_idempotent() {
        for symbol in ["BTCUSDT", "BTC", "USDT", "USDTUSDT", "XUSDTUSDT", "1000PEPEUSDT", ""] {
            let once = strip_quote(symbol);
            assert_eq!(strip_quote(once), once, "symbol {}", symbol);
        }
        assert_eq!(strip_quote("BTCUSDT"), "BTC");
        assert_eq!(strip_quote("USDT"), "USDT");
        assert_eq!(strip_quote("ETHUSDC"), "ETHUSDC");
    }

    #[test]
    fn test_symbol_helpers() {
        assert!(is_quote_symbol("BTCUSDT"));
        assert!(!is_quote_symbol("USDT"));
        assert!(!is_quote_symbol("BTCUSDC"));
        assert_eq!(quote_symbol("ETH"), "ETHUSDT");
        assert_eq!(base_of_inst_id("BTC-USDT-SWAP"), "BTC");
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(50123.456, 5), "50,123");
        assert_eq!(format_price(1234567.0, 5), "1,234,600");
        assert_eq!(format_price(3.14159265, 5), "3.1416");
        assert_eq!(format_price(0.0012345678, 5), "0.0012346");
        assert_eq!(format_price(-2500.5, 5), "-2,500.5");
    }
}
