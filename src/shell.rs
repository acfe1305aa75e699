// ============================================================================
// Shell Escaping
// ============================================================================

/// Characters that keep a meaning inside a double-quoted shell string.
const DOUBLE_QUOTE_SPECIALS: &[char] = &['"', '\\', '$', '`', '!'];

/// Escape `text` for interpolation inside a double-quoted shell literal.
///
/// Every quote, backslash, dollar, backtick and exclamation mark gets a
/// leading backslash, so the text can neither close the quotes nor trigger
/// command, parameter or history expansion.
pub(crate) fn escape_double_quoted(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if DOUBLE_QUOTE_SPECIALS.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
