//! Lenient numeric checks kept for configuration-file compatibility.
//!
//! Existing configuration files were validated with a character-class test,
//! not a number grammar: `"1.2.3"` and `"--1"` pass as floats. That looseness
//! is preserved here on purpose. Conversion afterwards reads the longest
//! numeric prefix (after leading spaces), so `"1.2.3"` reads as `1.2` and
//! `"--1"` has no value at all.

/// Which character class [`legacy_is_numeric`] checks against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumericClass {
    /// Digits, `.`, `-` and space.
    Float,
    /// Digits, `-` and space.
    Int,
}

impl NumericClass {
    fn allows(self, c: char) -> bool {
        match self {
            NumericClass::Float => c.is_ascii_digit() || matches!(c, '.' | '-' | ' '),
            NumericClass::Int => c.is_ascii_digit() || matches!(c, '-' | ' '),
        }
    }
}

/// True iff `raw` is non-empty and every character belongs to `class`.
pub fn legacy_is_numeric(raw: &str, class: NumericClass) -> bool {
    !raw.is_empty() && raw.chars().all(|c| class.allows(c))
}

/// Parse the longest float prefix of `raw` (leading spaces skipped).
pub(crate) fn parse_float_prefix(raw: &str) -> Option<f32> {
    let s = raw.trim_start_matches(' ');
    let bytes = s.as_bytes();
    let mut end = 0;
    if bytes.first() == Some(&b'-') {
        end = 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let int_digits = end - int_start;
    let mut frac_digits = 0;
    if end < bytes.len() && bytes[end] == b'.' {
        let mut cursor = end + 1;
        while cursor < bytes.len() && bytes[cursor].is_ascii_digit() {
            cursor += 1;
        }
        frac_digits = cursor - end - 1;
        if int_digits > 0 || frac_digits > 0 {
            end = cursor;
        }
    }
    if int_digits == 0 && frac_digits == 0 {
        return None;
    }

    let mut literal = String::with_capacity(end + 2);
    let (sign, body) = s[..end].split_at(int_start);
    literal.push_str(sign);
    if body.starts_with('.') {
        literal.push('0');
    }
    literal.push_str(body);
    if body.ends_with('.') {
        literal.push('0');
    }
    literal.parse::<f32>().ok()
}

/// Parse the longest integer prefix of `raw` (leading spaces skipped).
///
/// Values outside `i32` yield `None`.
pub(crate) fn parse_int_prefix(raw: &str) -> Option<i32> {
    let s = raw.trim_start_matches(' ');
    let bytes = s.as_bytes();
    let mut end = 0;
    if bytes.first() == Some(&b'-') {
        end = 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return None;
    }
    s[..end].parse::<i32>().ok()
}
