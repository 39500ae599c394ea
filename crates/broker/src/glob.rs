//! Allow-list matching with `*` wildcards
//!
//! `*` matches any run of characters, including an empty one. No other
//! character is special, so role names containing `?` or `[` match only
//! themselves.

/// Whether `value` matches `pattern`
pub fn matches(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return value.is_empty();
    };
    if !pattern.contains('*') {
        return pattern == value;
    }
    let Some(mut rest) = value.strip_prefix(first) else {
        return false;
    };

    let parts: Vec<&str> = parts.collect();
    let (last, middle) = match parts.split_last() {
        Some((last, middle)) => (*last, middle),
        None => return true,
    };
    for part in middle {
        match rest.find(part) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}

/// Whether any pattern in `patterns` matches `value`
pub fn any_matches<S: AsRef<str>>(patterns: &[S], value: &str) -> bool {
    patterns.iter().any(|p| matches(p.as_ref(), value))
}
