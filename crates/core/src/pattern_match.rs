//! SQL LIKE pattern matching.
//!
//! Substring filters such as `name LIKE '%milk%'` are evaluated here:
//! - `%` matches zero or more characters
//! - `_` matches exactly one character
//!
//! Matching is **case-sensitive** and operates on Unicode scalar values.

use alloc::vec::Vec;

/// SQL LIKE pattern matching.
///
/// ```
/// use tarn_core::pattern_match::like;
/// assert!(like("buy milk", "%milk%"));
/// assert!(like("hello", "_ello"));
/// assert!(!like("hello", "world"));
/// ```
pub fn like(value: &str, pattern: &str) -> bool {
    let v: Vec<char> = value.chars().collect();
    let p: Vec<char> = pattern.chars().collect();

    // Greedy scan with a single backtrack point at the last `%`.
    let (mut vi, mut pi) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while vi < v.len() {
        if pi < p.len() && (p[pi] == '_' || (p[pi] != '%' && p[pi] == v[vi])) {
            vi += 1;
            pi += 1;
        } else if pi < p.len() && p[pi] == '%' {
            star = Some((pi, vi));
            pi += 1;
        } else if let Some((star_pi, star_vi)) = star {
            pi = star_pi + 1;
            vi = star_vi + 1;
            star = Some((star_pi, star_vi + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '%' {
        pi += 1;
    }
    pi == p.len()
}

/// Returns true if `pattern` has no wildcards, so LIKE degenerates to equality.
pub fn is_literal(pattern: &str) -> bool {
    !pattern.contains(|c: char| c == '%' || c == '_')
}
