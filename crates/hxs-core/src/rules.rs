//! Parsing of rule-list text: one `original replacement` pair per line.

use std::fmt;

use crate::domain::SwapRule;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// The line does not split into exactly two whitespace-separated fields.
    Format,
    /// A field is not a non-negative decimal integer.
    InvalidNumber,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Format => f.write_str("expected two numbers"),
            RejectReason::InvalidNumber => f.write_str("invalid number"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectedLine {
    /// 1-based line number within the submitted text.
    pub line: usize,
    pub reason: RejectReason,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedRules {
    pub accepted: Vec<SwapRule>,
    pub rejected: Vec<RejectedLine>,
}

/// Parse rule text. Never fails as a whole; bad lines are reported individually.
///
/// Blank or whitespace-only lines are skipped without being reported as
/// [`RejectReason::Format`], so a trailing newline or a spacer line between
/// groups of rules produces no warning. Line numbers still count them.
pub fn parse_rules(text: &str) -> ParsedRules {
    let mut out = ParsedRules::default();

    for (idx, raw) in text.lines().enumerate() {
        let fields: Vec<&str> = raw.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }

        let reason = match fields.as_slice() {
            [a, b] => match (parse_value(a), parse_value(b)) {
                (Some(original), Some(replacement)) => {
                    out.accepted.push(SwapRule::new(original, replacement));
                    continue;
                }
                _ => RejectReason::InvalidNumber,
            },
            _ => RejectReason::Format,
        };

        out.rejected.push(RejectedLine {
            line: idx + 1,
            reason,
        });
    }

    out
}

fn parse_value(s: &str) -> Option<u64> {
    let digits = s.strip_prefix('+').unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_two_rules() {
        let parsed = parse_rules("100 200\n300 400");
        assert_eq!(
            parsed.accepted,
            vec![SwapRule::new(100, 200), SwapRule::new(300, 400)]
        );
        assert!(parsed.rejected.is_empty());
    }

    #[test]
    fn rejects_non_numeric_field() {
        let parsed = parse_rules("abc 5");
        assert!(parsed.accepted.is_empty());
        assert_eq!(
            parsed.rejected,
            vec![RejectedLine {
                line: 1,
                reason: RejectReason::InvalidNumber
            }]
        );
        assert_eq!(parsed.rejected[0].reason.to_string(), "invalid number");
    }

    #[test]
    fn blank_and_whitespace_lines_are_silent() {
        let parsed = parse_rules("\n   \n1 2\n\t\n\n3 4\n");
        assert_eq!(parsed.accepted, vec![SwapRule::new(1, 2), SwapRule::new(3, 4)]);
        assert!(parsed.rejected.is_empty());

        let parsed = parse_rules("  \n\nbad\n");
        assert!(parsed.accepted.is_empty());
        assert_eq!(
            parsed.rejected,
            vec![RejectedLine {
                line: 3,
                reason: RejectReason::Format
            }]
        );
    }

    #[test]
    fn reports_line_numbers_and_keeps_good_lines() {
        let parsed = parse_rules("1 2\n3\n\n-4 5\r\n6\t7\n8 9 10");
        assert_eq!(
            parsed.accepted,
            vec![SwapRule::new(1, 2), SwapRule::new(6, 7)]
        );
        assert_eq!(
            parsed.rejected,
            vec![
                RejectedLine {
                    line: 2,
                    reason: RejectReason::Format
                },
                RejectedLine {
                    line: 4,
                    reason: RejectReason::InvalidNumber
                },
                RejectedLine {
                    line: 6,
                    reason: RejectReason::Format
                },
            ]
        );
    }

    #[test]
    fn keeps_duplicates_in_order() {
        let parsed = parse_rules("5 6\n5 6\n1 2");
        assert_eq!(parsed.accepted.len(), 3);
        assert_eq!(parsed.accepted[0], parsed.accepted[1]);
        assert_eq!(parsed.accepted[2], SwapRule::new(1, 2));
    }

    #[test]
    fn out_of_range_number_is_invalid() {
        let parsed = parse_rules("99999999999999999999999 1");
        assert_eq!(parsed.rejected[0].reason, RejectReason::InvalidNumber);
    }
}
