//! Small string helpers shared by the main loop and the builtins.

/// Cut `line` at the first `#`, dropping the comment text.
///
/// There is no escaping: a `#` inside quotes starts a comment too.
pub fn remove_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Strip leading and trailing space characters.
///
/// Only `' '` is stripped; tabs and other whitespace are left for the
/// word expander to deal with.
pub fn strip_spaces(s: &str) -> &str {
    s.trim_matches(' ')
}

/// Parse a leading decimal integer the way C `atoi` does.
///
/// Leading whitespace and one sign are accepted, parsing stops at the first
/// non-digit and a string without digits yields 0. Out-of-range values
/// saturate.
pub fn atoi(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut value: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        let digit = i64::from(b - b'0');
        value = value.saturating_mul(10);
        value = if negative {
            value.saturating_sub(digit)
        } else {
            value.saturating_add(digit)
        };
    }
    value
}
