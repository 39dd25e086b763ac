// Amounts travel as integer minor units; only display converts to major units.

const MINOR_PER_MAJOR: u64 = 100;

pub fn currency_symbol(currency: &str) -> Option<&'static str> {
    match currency.to_ascii_uppercase().as_str() {
        "INR" => Some("₹"),
        "USD" => Some("$"),
        "EUR" => Some("€"),
        "GBP" => Some("£"),
        _ => None,
    }
}

/// Formats minor units with two decimals, e.g. `₹100.00` or `JPY 12.34`.
pub fn format_amount(amount: u64, currency: &str) -> String {
    let major = amount / MINOR_PER_MAJOR;
    let minor = amount % MINOR_PER_MAJOR;

    match currency_symbol(currency) {
        Some(symbol) => format!("{}{}.{:02}", symbol, major, minor),
        None => format!("{} {}.{:02}", currency.to_ascii_uppercase(), major, minor),
    }
}
