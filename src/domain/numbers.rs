//! Canonical cache keys for unordered numeric input.
//!
//! A [`NumbersKey`] is the compact JSON array of the input values sorted in
//! ascending numeric order. Two inputs that are permutations of one another
//! share a key; inputs that differ in any value (under `f64` equality) do not.
//! Integral values below 2^53 in magnitude are written without a fractional
//! part, so `[3, 1, 2]` and `[1.0, 2.0, 3.0]` both become `[1,2,3]`.

use std::fmt;

use serde::Serialize;
use serde_json::{Number, Value};

use super::error::DomainError;

/// Largest magnitude at which every integer is exactly representable in `f64`.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct NumbersKey(String);

impl NumbersKey {
    /// Wrap a key read back from storage without re-deriving it.
    pub fn from_stored(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for NumbersKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sorted, normalized input together with its cache key.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalNumbers {
    values: Vec<f64>,
    key: NumbersKey,
}

impl CanonicalNumbers {
    pub fn new(numbers: &[f64]) -> Result<Self, DomainError> {
        if numbers.is_empty() {
            return Err(DomainError::validation("at least one number is required"));
        }

        let mut values = Vec::with_capacity(numbers.len());
        for (index, value) in numbers.iter().copied().enumerate() {
            if !value.is_finite() {
                return Err(DomainError::validation(format!(
                    "numbers[{index}] must be a finite number"
                )));
            }
            // -0.0 == 0.0, so both must land on the same key.
            values.push(if value == 0.0 { 0.0 } else { value });
        }
        values.sort_by(f64::total_cmp);

        let key = encode_key(&values)?;
        Ok(Self { values, key })
    }

    pub fn key(&self) -> &NumbersKey {
        &self.key
    }

    pub fn into_key(self) -> NumbersKey {
        self.key
    }

    /// Sequential sum in ascending order, so a given key always reproduces
    /// the same bits. Finite inputs can still overflow to infinity.
    pub fn sum(&self) -> f64 {
        self.values.iter().fold(0.0, |acc, value| acc + value)
    }
}

fn encode_key(sorted: &[f64]) -> Result<NumbersKey, DomainError> {
    let items = sorted
        .iter()
        .map(|value| json_number(*value).map(Value::Number))
        .collect::<Result<Vec<_>, _>>()?;

    serde_json::to_string(&items)
        .map(NumbersKey)
        .map_err(|err| DomainError::invariant(format!("failed to encode numbers key: {err}")))
}

fn json_number(value: f64) -> Result<Number, DomainError> {
    if value.fract() == 0.0 && value.abs() < MAX_EXACT_INTEGER {
        return Ok(Number::from(value as i64));
    }

    Number::from_f64(value)
        .ok_or_else(|| DomainError::invariant(format!("value `{value}` is not representable")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(numbers: &[f64]) -> String {
        CanonicalNumbers::new(numbers)
            .expect("valid input")
            .into_key()
            .into_inner()
    }

    #[test]
    fn permutations_share_a_key() {
        assert_eq!(key(&[1.0, 2.0, 3.0, 4.0, 5.0]), key(&[5.0, 4.0, 3.0, 2.0, 1.0]));
        assert_eq!(key(&[2.5, -1.0, 7.0]), key(&[7.0, 2.5, -1.0]));
    }

    #[test]
    fn key_is_compact_json_in_numeric_order() {
        assert_eq!(key(&[10.0, 9.0, 100.0]), "[9,10,100]");
        assert_eq!(key(&[-3.0, 4.0, -1.0]), "[-3,-1,4]");
        assert_eq!(key(&[3.0, 1.5, 2.5]), "[1.5,2.5,3]");
    }

    #[test]
    fn distinct_multisets_get_distinct_keys() {
        assert_ne!(key(&[1.0, 2.0]), key(&[1.0, 2.0, 2.0]));
        assert_ne!(key(&[1.0, 2.0]), key(&[1.0, 2.000_000_000_1]));
        assert_ne!(key(&[12.0]), key(&[1.0, 2.0]));
    }

    #[test]
    fn negative_zero_collapses_onto_zero() {
        assert_eq!(key(&[-0.0, 1.0]), key(&[0.0, 1.0]));
        assert_eq!(key(&[-0.0]), "[0]");
    }

    #[test]
    fn large_integers_keep_exact_float_representation() {
        let big = 1.0e20;
        assert_eq!(key(&[big]), "[1e+20]");
        assert_ne!(key(&[big]), key(&[big + 65_536.0]));
    }

    #[test]
    fn integer_form_stops_at_two_to_the_fifty_three() {
        assert_eq!(key(&[9_007_199_254_740_991.0]), "[9007199254740991]");
        assert_eq!(key(&[9_007_199_254_740_992.0]), "[9007199254740992.0]");
    }

    #[test]
    fn finite_inputs_may_sum_to_infinity() {
        let canonical = CanonicalNumbers::new(&[1.7e308, 1.7e308]).expect("finite input");
        assert_eq!(canonical.sum(), f64::INFINITY);
    }

    #[test]
    fn sums_follow_the_worked_examples() {
        let cases: [(&[f64], f64); 3] = [
            (&[1.0, 2.0, 3.0, 4.0, 5.0], 15.0),
            (&[-1.0, -2.0, -3.0, 4.0, 5.0], 3.0),
            (&[1.5, 2.5, 3.0], 7.0),
        ];
        for (input, expected) in cases {
            let canonical = CanonicalNumbers::new(input).expect("valid input");
            assert_eq!(canonical.sum(), expected, "input {input:?}");
        }
    }

    #[test]
    fn rejects_empty_and_non_finite_input() {
        assert!(matches!(
            CanonicalNumbers::new(&[]),
            Err(DomainError::Validation { .. })
        ));
        assert!(matches!(
            CanonicalNumbers::new(&[1.0, f64::NAN]),
            Err(DomainError::Validation { .. })
        ));
        assert!(matches!(
            CanonicalNumbers::new(&[f64::INFINITY]),
            Err(DomainError::Validation { .. })
        ));
    }
}
