//! Currency and month display helpers

/// Pick the display currency: explicit override, then `DEFAULT_CURRENCY`, then GBP
pub fn resolve_currency(override_code: Option<&str>) -> String {
    override_code
        .map(str::to_string)
        .or_else(|| std::env::var("DEFAULT_CURRENCY").ok())
        .filter(|c| !c.trim().is_empty())
        .map(|c| c.trim().to_uppercase())
        .unwrap_or_else(|| "GBP".to_string())
}

/// Symbol for an ISO 4217 code; unknown codes render as the code itself
pub fn symbol_for(code: &str) -> String {
    match code.to_uppercase().as_str() {
        "USD" => "$".to_string(),
        "GBP" => "£".to_string(),
        "EUR" => "€".to_string(),
        "JPY" => "¥".to_string(),
        "CAD" => "CA$".to_string(),
        "AUD" => "A$".to_string(),
        "INR" => "₹".to_string(),
        other => other.to_string(),
    }
}

/// `-£1,234.50` style formatting
pub fn format_amount(value: f64, code: &str) -> String {
    let symbol = symbol_for(code);
    let sign = if value < 0.0 && (value * 100.0).round() != 0.0 {
        "-"
    } else {
        ""
    };

    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    format!("{}{}{}.{}", sign, symbol, group_thousands(int_part), frac_part)
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

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sept", "Oct", "Nov", "Dec",
];

/// `2025-09` -> `Sept 2025`; anything unparsable is returned unchanged
pub fn format_month(ym: &str) -> String {
    let Some((year, month)) = ym.split_once('-') else {
        return ym.to_string();
    };
    match month.parse::<usize>() {
        Ok(m) if (1..=12).contains(&m) && year.len() == 4 => {
            format!("{} {}", MONTH_NAMES[m - 1], year)
        }
        _ => ym.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbols() {
        assert_eq!(symbol_for("usd"), "$");
        assert_eq!(symbol_for("GBP"), "£");
        assert_eq!(symbol_for("CAD"), "CA$");
        assert_eq!(symbol_for("CHF"), "CHF");
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(1234.5, "GBP"), "£1,234.50");
        assert_eq!(format_amount(-1234567.891, "USD"), "-$1,234,567.89");
        assert_eq!(format_amount(0.0, "EUR"), "€0.00");
        assert_eq!(format_amount(999.999, "GBP"), "£1,000.00");
        assert_eq!(format_amount(-0.001, "GBP"), "£0.00");
    }

    #[test]
    fn test_format_month() {
        assert_eq!(format_month("2025-01"), "Jan 2025");
        assert_eq!(format_month("2024-09"), "Sept 2024");
        assert_eq!(format_month("garbage"), "garbage");
        assert_eq!(format_month("2024-13"), "2024-13");
    }

    #[test]
    fn test_resolve_currency_override() {
        assert_eq!(resolve_currency(Some("eur")), "EUR");
    }
}
