use crate::core::{DbError, Result};
use lru::LruCache;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

const REGEX_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(200) {
    Some(size) => size,
    None => NonZeroUsize::MIN,
};

lazy_static::lazy_static! {
    static ref REGEX_LRU_CACHE: Mutex<LruCache<String, Arc<Regex>>> =
        Mutex::new(LruCache::new(REGEX_CACHE_SIZE));
}

/// Translate a LIKE pattern (`%` any run, `_` any one char, `\` escapes) to
/// an anchored regex.
fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => regex.push_str(&regex::escape(&escaped.to_string())),
                None => regex.push_str(r"\\"),
            },
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }

    regex.push('$');
    regex
}

/// Simple patterns answered without a regex
fn fast_path_like(text: &str, pattern: &str, case_sensitive: bool) -> Option<bool> {
    if pattern.contains('\\') || pattern.contains('_') {
        return None;
    }
    let fold = |s: &str| {
        if case_sensitive {
            s.to_string()
        } else {
            s.to_lowercase()
        }
    };

    let wildcards = pattern.matches('%').count();
    let text = fold(text);
    match wildcards {
        0 => Some(text == fold(pattern)),
        1 if pattern.ends_with('%') => Some(text.starts_with(&fold(&pattern[..pattern.len() - 1]))),
        1 if pattern.starts_with('%') => Some(text.ends_with(&fold(&pattern[1..]))),
        2 if pattern.len() >= 2 && pattern.starts_with('%') && pattern.ends_with('%') => {
            Some(text.contains(&fold(&pattern[1..pattern.len() - 1])))
        }
        _ => None,
    }
}

fn get_or_compile_regex(pattern: &str, case_sensitive: bool) -> Result<Arc<Regex>> {
    let cache_key = if case_sensitive {
        format!("s:{}", pattern)
    } else {
        format!("i:{}", pattern)
    };

    if let Some(regex) = REGEX_LRU_CACHE.lock()?.get(&cache_key) {
        return Ok(Arc::clone(regex));
    }

    let compiled = regex::RegexBuilder::new(&like_to_regex(pattern))
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| DbError::InvalidPredicate(format!("Invalid LIKE pattern: {}", e)))?;
    let compiled = Arc::new(compiled);

    REGEX_LRU_CACHE
        .lock()?
        .put(cache_key, Arc::clone(&compiled));
    Ok(compiled)
}

/// Evaluate `text LIKE pattern`
pub fn eval_like(text: &str, pattern: &str, case_sensitive: bool) -> Result<bool> {
    if let Some(result) = fast_path_like(text, pattern, case_sensitive) {
        return Ok(result);
    }
    let regex = get_or_compile_regex(pattern, case_sensitive)?;
    Ok(regex.is_match(text))
}

/// Escape `literal` so it matches itself inside a LIKE pattern.
pub fn escape_like(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_paths() {
        assert!(eval_like("abc", "abc", true).unwrap());
        assert!(eval_like("abc", "ab%", true).unwrap());
        assert!(eval_like("abc", "%bc", true).unwrap());
        assert!(eval_like("abc", "%b%", true).unwrap());
        assert!(!eval_like("abc", "AB%", true).unwrap());
        assert!(eval_like("abc", "AB%", false).unwrap());
    }

    #[test]
    fn test_regex_paths() {
        assert!(eval_like("abc", "a_c", true).unwrap());
        assert!(!eval_like("abbc", "a_c", true).unwrap());
        assert!(eval_like("a.c", "a.c", true).unwrap());
        assert!(!eval_like("abc", "a.c", true).unwrap());
        assert!(eval_like("x(1)y", "x(%)y", true).unwrap());
    }

    #[test]
    fn test_escapes() {
        let pattern = format!("{}%", escape_like("50%_"));
        assert!(eval_like("50%_ off", &pattern, true).unwrap());
        assert!(!eval_like("50xy off", &pattern, true).unwrap());
    }
}
