//! Validity checking for candidate values.
//!
//! A checker is a pure predicate over the canonical string form of a value.
//! It never mutates anything; callers consult it before committing.

use serde::{Deserialize, Serialize};

/// Ordering test applied against a numeric threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparatorType {
    Greater,
    GreaterOrEqual,
    Equal,
    LessOrEqual,
    Less,
}

impl ComparatorType {
    fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            ComparatorType::Greater => value > threshold,
            ComparatorType::GreaterOrEqual => value >= threshold,
            ComparatorType::Equal => value == threshold,
            ComparatorType::LessOrEqual => value <= threshold,
            ComparatorType::Less => value < threshold,
        }
    }
}

/// Predicate deciding whether a value may be committed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum ValidityChecker {
    /// Accepts everything.
    #[default]
    Unconfigured,

    /// Canonical string must equal one entry exactly.
    AllowList(Vec<String>),

    /// Numeric value must satisfy at least one `(op, threshold)` pair.
    RangeComparator(Vec<(ComparatorType, f64)>),
}

impl ValidityChecker {
    pub fn allow_list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ValidityChecker::AllowList(values.into_iter().map(Into::into).collect())
    }

    pub fn range<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (ComparatorType, f64)>,
    {
        ValidityChecker::RangeComparator(pairs.into_iter().collect())
    }

    /// Test one canonical string.
    ///
    /// Text that does not parse as a number fails a range comparator.
    pub fn is_valid(&self, candidate: &str) -> bool {
        match self {
            ValidityChecker::Unconfigured => true,
            ValidityChecker::AllowList(allowed) => allowed.iter().any(|a| a == candidate),
            ValidityChecker::RangeComparator(pairs) => match candidate.trim().parse::<f64>() {
                Ok(value) => pairs.iter().any(|(op, threshold)| op.holds(value, *threshold)),
                Err(_) => false,
            },
        }
    }

    /// Every unit must pass.
    pub fn all_valid<S: AsRef<str>>(&self, units: &[S]) -> bool {
        units.iter().all(|u| self.is_valid(u.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_accepts_anything() {
        let checker = ValidityChecker::default();
        assert!(checker.is_valid(""));
        assert!(checker.is_valid("anything"));
    }

    #[test]
    fn test_comparators() {
        assert!(ComparatorType::GreaterOrEqual.holds(10.0, 10.0));
        assert!(!ComparatorType::Less.holds(10.0, 10.0));
        assert!(ComparatorType::Equal.holds(3.0, 3.0));
        assert!(ComparatorType::LessOrEqual.holds(-1.0, 0.0));
    }

    #[test]
    fn test_range_rejects_text() {
        let checker = ValidityChecker::range([(ComparatorType::Greater, 0.0)]);
        assert!(!checker.is_valid("abc"));
    }
}
