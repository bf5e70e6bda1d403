/// Truncate a string to at most `max_chars` characters, counting chars rather
/// than bytes so multibyte input never splits a codepoint.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}
