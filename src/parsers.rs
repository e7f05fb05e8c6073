use regex::Regex;
use std::sync::OnceLock;

/// Placeholder shown in place of blank spreadsheet cells.
pub const PLACEHOLDER: &str = "—";

fn symbol_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[$,%]").expect("valid symbol pattern"))
}

/// Parses a spreadsheet cell into a number.
///
/// Strips currency symbols, percent signs, and thousands separators before
/// parsing. Returns 0.0 for empty, malformed, or non-finite input. Blank cells
/// are routine for inactive clients; downstream arithmetic must never see NaN.
pub fn parse_number(raw: &str) -> f64 {
    let cleaned = symbol_pattern().replace_all(raw.trim(), "");
    match cleaned.parse::<f64>() {
        Ok(n) if n.is_finite() => n,
        _ => 0.0,
    }
}

/// Formats a value as whole-dollar currency, e.g. `$1,200`.
pub fn format_currency(value: f64) -> String {
    format!("${}", group_thousands(&format!("{:.0}", value)))
}

/// Formats a value as currency with cents, e.g. `$24.00`.
pub fn format_currency_precise(value: f64) -> String {
    let whole = format!("{:.2}", value);
    let (int_part, frac_part) = whole.split_once('.').unwrap_or((whole.as_str(), "00"));
    format!("${}.{}", group_thousands(int_part), frac_part)
}

/// Formats a value as a whole number with thousands separators.
pub fn format_count(value: f64) -> String {
    group_thousands(&format!("{:.0}", value))
}

/// Formats a value as a percentage with one decimal place.
pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

fn group_thousands(digits: &str) -> String {
    let (sign, digits) = match digits.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", digits),
    };
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    let len = digits.len();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}{}", sign, grouped)
}

/// Returns the trimmed string, or the placeholder sentinel for blank input.
pub fn clean_or_placeholder(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Derives a display name from an email address for attribution.
///
/// "jane.doe@example.com" becomes "Jane Doe". Used when the caller supplies
/// only an email identity on the write path.
pub fn display_name_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or("");
    if local.is_empty() {
        return "Unknown".to_string();
    }
    local
        .split(['.', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
