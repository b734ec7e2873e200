//! Locale-aware amount normalization
//!
//! SMS bodies and provider payloads carry amounts in mixed European and
//! US formats ("1.250,50", "1,250.50", "1250.50"). When both separators are
//! present, the rightmost one is the decimal separator and the other one is
//! grouping. A lone comma is always decimal (locale default for the message
//! formats we parse).
//!
//! A lone dot is ambiguous: "1.000" can mean one or one thousand. The
//! [`DotPolicy`] decides; the default preserves the historical behavior of
//! parsing it as a decimal point.

/// How to read a token that contains only `.` separators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DotPolicy {
    /// Treat the dot as a decimal point ("1.000" -> 1.0)
    #[default]
    Strict,
    /// Treat dot-only tokens shaped like grouping ("1.000", "12.345.678")
    /// as thousands separators
    GroupingHeuristic,
}

/// Normalize a free-text numeric token into a decimal value.
///
/// Returns `None` when the token does not parse. Zero is a valid result
/// here; callers extracting transaction amounts should use
/// [`parse_reliable`] instead.
pub fn normalize_token(token: &str, policy: DotPolicy) -> Option<f64> {
    let token: String = token.chars().filter(|c| !c.is_whitespace()).collect();
    if token.is_empty() {
        return None;
    }

    let last_dot = token.rfind('.');
    let last_comma = token.rfind(',');

    let cleaned = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) => {
            // The separator appearing later is the decimal one
            if dot > comma {
                token.replace(',', "")
            } else {
                token.replace('.', "").replace(',', ".")
            }
        }
        (None, Some(_)) => token.replace(',', "."),
        (Some(_), None) => match policy {
            DotPolicy::Strict => token,
            DotPolicy::GroupingHeuristic => {
                if is_grouping_shaped(&token) {
                    token.replace('.', "")
                } else {
                    token
                }
            }
        },
        (None, None) => token,
    };

    cleaned.parse::<f64>().ok()
}

/// Normalize a token, treating parse failure and exact zero as "unreliable".
///
/// A zero amount almost always means the extraction captured the wrong
/// token; signalling it lets the caller fall back to a secondary path
/// instead of persisting a meaningless zero-amount transaction.
pub fn parse_reliable(token: &str, policy: DotPolicy) -> Option<f64> {
    match normalize_token(token, policy) {
        Some(value) if value != 0.0 => Some(value),
        _ => None,
    }
}

/// True for `1.000`, `12.345.678` etc. where every dot-delimited group
/// after the first has exactly three digits.
fn is_grouping_shaped(token: &str) -> bool {
    let unsigned = token.strip_prefix('-').unwrap_or(token);
    let mut groups = unsigned.split('.');
    let first = match groups.next() {
        Some(g) => g,
        None => return false,
    };
    if first.is_empty() || first.len() > 3 || !first.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let mut saw_group = false;
    for group in groups {
        if group.len() != 3 || !group.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
        saw_group = true;
    }
    saw_group
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_separators_european() {
        assert_eq!(normalize_token("1.250,50", DotPolicy::Strict), Some(1250.50));
    }

    #[test]
    fn test_mixed_separators_us() {
        assert_eq!(normalize_token("1,250.50", DotPolicy::Strict), Some(1250.50));
    }

    #[test]
    fn test_rightmost_separator_wins() {
        // Degenerate inputs still follow the rightmost-separator rule
        assert_eq!(
            normalize_token("1.234.567,89", DotPolicy::Strict),
            Some(1_234_567.89)
        );
        assert_eq!(
            normalize_token("1,234,567.89", DotPolicy::Strict),
            Some(1_234_567.89)
        );
    }

    #[test]
    fn test_comma_only_is_decimal() {
        assert_eq!(normalize_token("12,34", DotPolicy::Strict), Some(12.34));
        assert_eq!(normalize_token("1,00", DotPolicy::Strict), Some(1.00));
    }

    #[test]
    fn test_dot_only_strict_is_decimal() {
        // Documented ambiguity: strict policy reads "1.000" as one
        assert_eq!(normalize_token("1.000", DotPolicy::Strict), Some(1.0));
    }

    #[test]
    fn test_dot_only_grouping_heuristic() {
        assert_eq!(
            normalize_token("1.000", DotPolicy::GroupingHeuristic),
            Some(1000.0)
        );
        assert_eq!(
            normalize_token("12.345.678", DotPolicy::GroupingHeuristic),
            Some(12_345_678.0)
        );
        // Not grouping-shaped: stays decimal
        assert_eq!(
            normalize_token("1.5", DotPolicy::GroupingHeuristic),
            Some(1.5)
        );
        assert_eq!(
            normalize_token("1234.56", DotPolicy::GroupingHeuristic),
            Some(1234.56)
        );
    }

    #[test]
    fn test_whitespace_stripped() {
        assert_eq!(normalize_token(" 1 250,50 ", DotPolicy::Strict), Some(1250.50));
    }

    #[test]
    fn test_garbage_is_none() {
        assert_eq!(normalize_token("abc", DotPolicy::Strict), None);
        assert_eq!(normalize_token("", DotPolicy::Strict), None);
        assert_eq!(normalize_token("1,2,3.4.5", DotPolicy::Strict), None);
    }

    #[test]
    fn test_zero_is_unreliable() {
        assert_eq!(parse_reliable("0,00", DotPolicy::Strict), None);
        assert_eq!(parse_reliable("0.00", DotPolicy::Strict), None);
        assert_eq!(parse_reliable("0", DotPolicy::Strict), None);
        // But a zero balance token still normalizes
        assert_eq!(normalize_token("0,00", DotPolicy::Strict), Some(0.0));
    }

    #[test]
    fn test_reliable_passes_nonzero() {
        assert_eq!(parse_reliable("1,00", DotPolicy::Strict), Some(1.0));
    }
}
