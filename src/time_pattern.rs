//! Wall-clock time patterns.
//!
//! A pattern has the form `HH:MM` where each digit may be replaced by the
//! wildcard `*`, or a whole field by a single `*`. Patterns form unions:
//! `time at 7:30 or 19:30` builds one pattern that matches either time.
//! The `WAIT` instruction blocks until the wall clock matches.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid time pattern \"{0}\"")]
pub struct PatternError(pub String);

/// One `HH:MM` term of a pattern.
#[derive(Debug, Clone, PartialEq)]
struct PatternTerm {
    hours: String,
    minutes: String,
}

impl PatternTerm {
    fn matches(&self, hour: u32, minute: u32) -> bool {
        field_matches(&self.hours, hour) && field_matches(&self.minutes, minute)
    }
}

/// A union of `HH:MM` glob terms.
#[derive(Debug, Clone, PartialEq)]
pub struct TimePattern {
    terms: Vec<PatternTerm>,
}

impl TimePattern {
    /// Parse a single `HH:MM` term.
    ///
    /// Hour field: `*`, one digit, two digits, or two characters mixing a
    /// digit and `*`. Minute field: the same minus the one-digit form.
    pub fn parse(text: &str) -> Result<TimePattern, PatternError> {
        let err = || PatternError(text.to_string());
        let (hours, minutes) = text.split_once(':').ok_or_else(err)?;
        if !field_valid(hours, true) || !field_valid(minutes, false) {
            return Err(err());
        }
        Ok(TimePattern {
            terms: vec![PatternTerm {
                hours: hours.to_string(),
                minutes: minutes.to_string(),
            }],
        })
    }

    /// Fold another pattern's terms into this one.
    pub fn union(&mut self, other: &TimePattern) {
        self.terms.extend(other.terms.iter().cloned());
    }

    /// True when any term matches the given wall-clock hour and minute.
    pub fn matches(&self, hour: u32, minute: u32) -> bool {
        self.terms.iter().any(|term| term.matches(hour, minute))
    }
}

fn field_valid(field: &str, allow_single_digit: bool) -> bool {
    let chars: Vec<char> = field.chars().collect();
    match chars.as_slice() {
        ['*'] => true,
        [c] => allow_single_digit && c.is_ascii_digit(),
        [a, b] => {
            (a.is_ascii_digit() || *a == '*')
                && (b.is_ascii_digit() || *b == '*')
                && !(*a == '*' && *b == '*')
        }
        _ => false,
    }
}

fn field_matches(pattern: &str, value: u32) -> bool {
    if pattern == "*" {
        return true;
    }
    if pattern.len() == 1 {
        return pattern.parse::<u32>() == Ok(value);
    }
    let text = format!("{:02}", value % 100);
    pattern
        .chars()
        .zip(text.chars())
        .all(|(p, c)| p == '*' || p == c)
}

impl fmt::Display for TimePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, " or ")?;
            }
            write!(f, "{}:{}", term.hours, term.minutes)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exact() {
        let pattern = TimePattern::parse("12:30").unwrap();
        assert!(pattern.matches(12, 30));
        assert!(!pattern.matches(12, 31));
        assert!(!pattern.matches(13, 30));
    }

    #[test]
    fn test_parse_wildcards() {
        let pattern = TimePattern::parse("*:00").unwrap();
        for hour in 0..24 {
            assert!(pattern.matches(hour, 0));
        }
        assert!(!pattern.matches(5, 1));

        let pattern = TimePattern::parse("1*:*5").unwrap();
        assert!(pattern.matches(12, 45));
        assert!(pattern.matches(19, 5));
        assert!(!pattern.matches(9, 45));
        assert!(!pattern.matches(12, 44));
    }

    #[test]
    fn test_single_digit_hour() {
        let pattern = TimePattern::parse("5:00").unwrap();
        assert!(pattern.matches(5, 0));
        assert!(!pattern.matches(15, 0));
    }

    #[test]
    fn test_rejects_bad_shapes() {
        for text in ["5", "5:", ":30", "125:00", "12:305", "12:3", "**:00", "ab:cd"] {
            assert!(TimePattern::parse(text).is_err(), "accepted {}", text);
        }
    }

    #[test]
    fn test_union() {
        let mut pattern = TimePattern::parse("7:30").unwrap();
        pattern.union(&TimePattern::parse("19:30").unwrap());
        assert!(pattern.matches(7, 30));
        assert!(pattern.matches(19, 30));
        assert!(!pattern.matches(12, 30));
        assert_eq!(pattern.to_string(), "7:30 or 19:30");
    }
}
