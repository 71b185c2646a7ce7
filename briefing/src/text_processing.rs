//! Text cleanup applied before texts are sent to the embedding service.
//! User-generated content carries stray backslash escapes and control
//! characters that break the service's JSON parser.

/// Replaces incomplete `\xHH` / `\uHHHH` escapes and remaining literal
/// backslashes with spaces.
///
/// An incomplete escape consumes the backslash and the marker character;
/// a complete escape only loses its backslash, keeping the readable rest.
fn remove_invalid_escapes(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '\\' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let incomplete = match chars.get(i + 1) {
            Some('x') => !is_hex_run(&chars, i + 2, 2),
            Some('u') => !is_hex_run(&chars, i + 2, 4),
            _ => false,
        };
        out.push(' ');
        i += if incomplete { 2 } else { 1 };
    }
    out
}

fn is_hex_run(chars: &[char], start: usize, len: usize) -> bool {
    (start..start + len).all(|i| chars.get(i).is_some_and(|c| c.is_ascii_hexdigit()))
}

/// Removes control characters except common whitespace
fn filter_control_chars(text: &str) -> String {
    text.chars()
        .filter(|&c| c as u32 >= 32 || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

/// Cleans a text so it survives the embedding service's JSON parser
pub fn clean_text_for_embedding(text: &str) -> String {
    let text = remove_invalid_escapes(text);
    let text = filter_control_chars(&text);
    text.trim().to_owned()
}

/// Truncates a text to at most `max_chars` characters
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    text.chars().take(max_chars).collect()
}
