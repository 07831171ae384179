//! Utility functions and helpers

pub mod time;

/// Parse a float the way loosely-typed stored values are read: leading
/// whitespace is skipped and the longest numeric prefix is used. Input with
/// no numeric prefix yields 0.
pub fn parse_lenient_float(s: &str) -> f64 {
    let s = s.trim_start();
    let end = s
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E')))
        .map(|(i, _)| i)
        .unwrap_or(s.len());

    (1..=end)
        .rev()
        .find_map(|len| s[..len].parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Undo the HTML-entity escaping applied to user input before it was stored.
pub fn unsanitize_input_value(s: &str) -> String {
    // `&amp;` last so that `&amp;lt;` decodes to `&lt;`, not `<`
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
