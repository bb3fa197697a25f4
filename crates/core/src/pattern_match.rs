//! SQL LIKE matching.
//!
//! `%` matches zero or more characters, `_` matches exactly one. Matching is
//! case-sensitive and operates on Unicode scalar values.

use alloc::vec::Vec;

/// SQL LIKE pattern matching.
///
/// ```
/// use kvorm_core::pattern_match::like;
/// assert!(like("Book3_5", "Book3%"));
/// assert!(like("hello", "_ello"));
/// assert!(!like("hello", "world"));
/// ```
pub fn like(value: &str, pattern: &str) -> bool {
    let v: Vec<char> = value.chars().collect();
    let p: Vec<char> = pattern.chars().collect();

    let (mut vi, mut pi) = (0usize, 0usize);
    // Position of the last `%` seen and the value index it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;

    while vi < v.len() {
        if pi < p.len() && (p[pi] == '_' || (p[pi] != '%' && p[pi] == v[vi])) {
            vi += 1;
            pi += 1;
        } else if pi < p.len() && p[pi] == '%' {
            backtrack = Some((pi, vi));
            pi += 1;
        } else if let Some((star_pi, star_vi)) = backtrack {
            pi = star_pi + 1;
            vi = star_vi + 1;
            backtrack = Some((star_pi, star_vi + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == '%')
}
