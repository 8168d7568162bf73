/// Formats an amount with thousands separators and two decimals, e.g. `1,234,567.89`.
pub fn format_amount(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let formatted = format!("{:.2}", value.abs());
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((&formatted, "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && formatted != "0.00" {
        "-"
    } else {
        ""
    };
    format!("{}{}.{}", sign, grouped, frac_part)
}

/// Formats a ratio expressed in percent, e.g. `16.00%`.
pub fn format_percent(value: f64) -> String {
    format!("{:.2}%", value)
}

/// Truncates to at most `max_chars` characters without splitting a UTF-8 sequence.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Like [`truncate_chars`] but appends an ellipsis when something was cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let cut = truncate_chars(text, max_chars);
    if cut.len() < text.len() {
        format!("{}...", cut)
    } else {
        cut.to_string()
    }
}

/// Strips both thousands-separator glyphs (ASCII comma and full-width comma).
pub fn strip_separators(token: &str) -> String {
    token
        .chars()
        .filter(|c| *c != ',' && *c != '，')
        .collect::<String>()
        .trim()
        .to_string()
}
