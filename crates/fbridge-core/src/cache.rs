//! Bounded memoization tables owned by a single bridge.
//!
//! Result files repeat the same keys poll after poll, so keys are interned
//! and numeric literals memoized. Both tables have a fixed entry cap; when
//! the cap is reached the whole table is cleared (no LRU bookkeeping).
//! Neither table is synchronized: the owning bridge guards them with its
//! request lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

// ============================================================================
// Interning
// ============================================================================

/// Source of shared key strings for the result parser.
pub trait Interner {
    fn intern(&mut self, s: &str) -> Arc<str>;
}

/// Interner that allocates a fresh string every time.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Interner for Passthrough {
    fn intern(&mut self, s: &str) -> Arc<str> {
        Arc::from(s)
    }
}

/// String interning pool with a hard entry cap.
#[derive(Debug)]
pub struct StringPool {
    entries: HashSet<Arc<str>>,
    capacity: usize,
}

impl StringPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Interner for StringPool {
    /// Returns the pooled copy of `s`, adding it if absent.
    ///
    /// Empty strings are never pooled.
    fn intern(&mut self, s: &str) -> Arc<str> {
        if s.is_empty() {
            return Arc::from("");
        }
        if let Some(existing) = self.entries.get(s) {
            return Arc::clone(existing);
        }
        if self.entries.len() >= self.capacity {
            debug!(capacity = self.capacity, "String pool full, clearing");
            self.entries.clear();
        }
        let shared: Arc<str> = Arc::from(s);
        self.entries.insert(Arc::clone(&shared));
        shared
    }
}

// ============================================================================
// Number Parsing
// ============================================================================

/// Parses an integer literal as written by the interpreter.
///
/// Accepts decimal (`42`, `-7`) and hexadecimal with a `0x`/`0X` prefix
/// (`0xdeadbeef`, `-0x10`), surrounded by optional spaces, tabs or line
/// breaks. Hex literals cover the full 64-bit range and are reinterpreted
/// as two's complement, so addresses above `i64::MAX` round-trip through
/// `as u64`.
pub fn parse_int_literal(text: &str) -> Option<i64> {
    let trimmed = text.trim_matches(&[' ', '\t', '\r', '\n'][..]);
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    if digits.is_empty() {
        return None;
    }

    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) if hex.bytes().all(|b| b.is_ascii_hexdigit()) => {
            u64::from_str_radix(hex, 16).ok()? as i64
        }
        Some(_) => return None,
        None => {
            if !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            if negative {
                // i64::MIN has no positive counterpart; parse with the sign attached.
                return format!("-{digits}").parse::<i64>().ok();
            }
            digits.parse::<i64>().ok()?
        }
    };

    Some(if negative {
        magnitude.wrapping_neg()
    } else {
        magnitude
    })
}

/// Memoizes [`parse_int_literal`] by input text.
#[derive(Debug)]
pub struct NumberCache {
    entries: HashMap<String, i64>,
    capacity: usize,
}

impl NumberCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Parses `text`, consulting the cache first. Failed parses are not cached.
    pub fn parse(&mut self, text: &str) -> Option<i64> {
        if text.is_empty() {
            return None;
        }
        if let Some(&value) = self.entries.get(text) {
            return Some(value);
        }

        let value = parse_int_literal(text)?;
        if self.entries.len() >= self.capacity {
            debug!(capacity = self.capacity, "Number cache full, clearing");
            self.entries.clear();
        }
        self.entries.insert(text.to_string(), value);
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ============================================================================
// Response Cache
// ============================================================================

/// The pair of tables a bridge keeps between polls.
#[derive(Debug)]
pub struct ResponseCache {
    pub strings: StringPool,
    pub numbers: NumberCache,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            strings: StringPool::new(capacity),
            numbers: NumberCache::new(capacity),
        }
    }

    /// Drops per-batch state. Called after every completed batch.
    pub fn end_batch(&mut self) {
        self.strings.clear();
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        self.strings.clear();
        self.numbers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_returns_shared_allocation() {
        let mut pool = StringPool::new(10);
        let a = pool.intern("game.exe+0x10");
        let b = pool.intern("game.exe+0x10");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_intern_empty_not_pooled() {
        let mut pool = StringPool::new(10);
        assert_eq!(&*pool.intern(""), "");
        assert!(pool.is_empty());
    }

    #[test]
    fn test_pool_full_clear_at_capacity() {
        let mut pool = StringPool::new(2);
        pool.intern("a");
        pool.intern("b");
        assert_eq!(pool.len(), 2);

        pool.intern("c");
        assert_eq!(pool.len(), 1, "pool should clear fully before inserting");
    }

    #[test]
    fn test_parse_decimal_and_hex() {
        assert_eq!(parse_int_literal("42"), Some(42));
        assert_eq!(parse_int_literal("  -7\t"), Some(-7));
        assert_eq!(parse_int_literal("0x10"), Some(16));
        assert_eq!(parse_int_literal("0XfF"), Some(255));
        assert_eq!(parse_int_literal("-0x10"), Some(-16));
        assert_eq!(parse_int_literal("0xdeadbeef"), Some(0xdead_beef));
    }

    #[test]
    fn test_parse_full_width_hex_address() {
        let value = parse_int_literal("0xFFFFFFFFFFFFFFFF").unwrap();
        assert_eq!(value as u64, u64::MAX);
    }

    #[test]
    fn test_parse_extremes() {
        assert_eq!(parse_int_literal("-9223372036854775808"), Some(i64::MIN));
        assert_eq!(parse_int_literal("9223372036854775808"), None);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_int_literal(""), None);
        assert_eq!(parse_int_literal("-"), None);
        assert_eq!(parse_int_literal("0x"), None);
        assert_eq!(parse_int_literal("12abc"), None);
        assert_eq!(parse_int_literal("+5"), None);
    }

    #[test]
    fn test_number_cache_memoizes_successes_only() {
        let mut cache = NumberCache::new(10);
        assert_eq!(cache.parse("0x20"), Some(32));
        assert_eq!(cache.parse("0x20"), Some(32));
        assert_eq!(cache.parse("nope"), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_number_cache_full_clear() {
        let mut cache = NumberCache::new(2);
        cache.parse("1");
        cache.parse("2");
        cache.parse("3");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_response_cache_end_batch_keeps_numbers() {
        let mut cache = ResponseCache::new(8);
        cache.strings.intern("key");
        cache.numbers.parse("5");

        cache.end_batch();
        assert!(cache.strings.is_empty());
        assert_eq!(cache.numbers.len(), 1);

        cache.clear();
        assert!(cache.numbers.is_empty());
    }
}
