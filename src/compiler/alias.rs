//! Output column alias generation

use std::collections::{HashMap, HashSet};

use super::error::CompileError;

/// Longest identifier accepted by every supported database (Postgres: 63 bytes)
pub const DEFAULT_MAX_ALIAS_LENGTH: usize = 63;

const MAX_REPEATS: u32 = 99_999;

/// Produces unique, length-bounded SQL aliases for one compilation
#[derive(Debug)]
pub struct AliasGenerator {
    max_len: usize,
    counters: HashMap<String, u32>,
    issued: HashSet<String>,
}

impl Default for AliasGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ALIAS_LENGTH)
    }
}

impl AliasGenerator {
    pub fn new(max_len: usize) -> Self {
        Self {
            // room for at least one character plus the longest counter suffix
            max_len: max_len.max(8),
            counters: HashMap::new(),
            issued: HashSet::new(),
        }
    }

    /// Alias for `name`, unique within this generator
    ///
    /// The first request returns the sanitized, truncated name; later ones
    /// append `_1`, `_2`, ... re-truncating the base so the result fits.
    pub fn generate(&mut self, name: &str) -> Result<String, CompileError> {
        let base = truncate(&sanitize(name), self.max_len);
        loop {
            let counter = self.counters.entry(base.clone()).or_insert(0);
            let n = *counter;
            if n >= MAX_REPEATS {
                return Err(CompileError::AliasExhausted(name.to_string()));
            }
            *counter += 1;

            let candidate = if n == 0 {
                base.clone()
            } else {
                let suffix = format!("_{}", n);
                let keep = self.max_len - suffix.len();
                format!("{}{}", truncate(&base, keep), suffix)
            };
            // a suffixed alias may coincide with a name requested verbatim
            if self.issued.insert(candidate.clone()) {
                return Ok(candidate);
            }
        }
    }

    /// Truncated alias without collision tracking
    ///
    /// Used for the helper columns of the percentile rewrite, which live in
    /// their own derived-table scope.
    pub fn generate_for_percentile(&self, name: &str) -> String {
        truncate(&sanitize(name), self.max_len)
    }
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "expr".to_string()
    } else {
        cleaned
    }
}

// sanitized names are ASCII, so byte truncation is safe
fn truncate(name: &str, max_len: usize) -> String {
    name[..name.len().min(max_len)].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_use_is_sanitized_name() {
        let mut gen = AliasGenerator::default();
        assert_eq!(gen.generate("sum_Amount").unwrap(), "sum_amount");
        assert_eq!(gen.generate("time day.created at").unwrap(), "time_day_created_at");
    }

    #[test]
    fn test_repeats_get_counter_suffix() {
        let mut gen = AliasGenerator::default();
        assert_eq!(gen.generate("sum_x").unwrap(), "sum_x");
        assert_eq!(gen.generate("sum_x").unwrap(), "sum_x_1");
        assert_eq!(gen.generate("sum_x").unwrap(), "sum_x_2");
        assert_eq!(gen.generate("other").unwrap(), "other");
    }

    #[test]
    fn test_suffix_fits_max_length() {
        let mut gen = AliasGenerator::new(10);
        assert_eq!(gen.generate("abcdefghijklmno").unwrap(), "abcdefghij");
        let second = gen.generate("abcdefghijklmno").unwrap();
        assert_eq!(second, "abcdefgh_1");
        assert!(second.len() <= 10);
    }

    #[test]
    fn test_suffix_never_repeats_verbatim_name() {
        let mut gen = AliasGenerator::default();
        assert_eq!(gen.generate("a_1").unwrap(), "a_1");
        assert_eq!(gen.generate("a").unwrap(), "a");
        assert_eq!(gen.generate("a").unwrap(), "a_2");
    }

    #[test]
    fn test_exhausted_counter() {
        let mut gen = AliasGenerator::default();
        assert_eq!(gen.generate("x").unwrap(), "x");
        for _ in 2..MAX_REPEATS {
            gen.generate("x").unwrap();
        }
        // the base name plus suffixes _1 through _99998
        assert_eq!(gen.generate("x").unwrap(), "x_99998");
        assert!(matches!(gen.generate("x"), Err(CompileError::AliasExhausted(_))));
        assert!(matches!(gen.generate("x"), Err(CompileError::AliasExhausted(_))));
    }

    #[test]
    fn test_percentile_alias_only_truncates() {
        let gen = AliasGenerator::new(8);
        assert_eq!(gen.generate_for_percentile("rn_latency_ms"), "rn_laten");
        assert_eq!(gen.generate_for_percentile("rn_latency_ms"), "rn_laten");
    }
}
