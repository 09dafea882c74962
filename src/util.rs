//! Shared utility functions used across the codebase.

use std::collections::BTreeMap;

/// Parse a boolean flag value.
///
/// Recognises `1`, `true`, `yes`, `y`, `on` (case-insensitive) as `true`;
/// everything else maps to `false`.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

/// Return the value of `$HOME`, falling back to `/root`.
pub fn home_dir() -> String {
    std::env::var("HOME").unwrap_or_else(|_| "/root".to_string())
}

/// Parse per-category answer counts written as `angles=3,triangles=2`.
///
/// Repeated categories are summed. Empty segments are ignored.
pub fn parse_question_counts(input: &str) -> Result<BTreeMap<String, u64>, String> {
    let mut counts = BTreeMap::new();
    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (category, count) = part
            .split_once('=')
            .ok_or_else(|| format!("expected category=count, got '{}'", part))?;
        let category = category.trim();
        if category.is_empty() {
            return Err(format!("missing category in '{}'", part));
        }
        let count: u64 = count
            .trim()
            .parse()
            .map_err(|e| format!("invalid count in '{}': {}", part, e))?;
        *counts.entry(category.to_string()).or_insert(0) += count;
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_recognises_truthy_values() {
        for v in ["1", "true", "YES", " y ", "On"] {
            assert!(parse_bool(v), "{v}");
        }
        for v in ["0", "false", "no", "", "maybe"] {
            assert!(!parse_bool(v), "{v}");
        }
    }

    #[test]
    fn parse_question_counts_sums_categories() {
        let counts = parse_question_counts("angles=3, triangles=2,angles=1,").unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts["angles"], 4);
        assert_eq!(counts["triangles"], 2);

        assert!(parse_question_counts("").unwrap().is_empty());
    }

    #[test]
    fn parse_question_counts_rejects_garbage() {
        assert!(parse_question_counts("angles").is_err());
        assert!(parse_question_counts("=3").is_err());
        assert!(parse_question_counts("angles=-1").is_err());
    }
}
