//! Structural comparison of desired vs observed state.
//!
//! The comparator walks the desired mapping depth-first, pre-order, and stops
//! at the first divergence. Keys present only on the observed side are
//! ignored: the provider is allowed to report more than the user asked for.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::normalize::Normalizer;

/// Why a value diverged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceReason {
    /// Scalars differ after canonicalization.
    ValueMismatch,
    /// One side is a mapping, sequence or scalar and the other is not.
    TypeMismatch,
    /// Sequences have different lengths.
    LengthMismatch,
    /// A desired key is absent from the observed state.
    MissingKey,
}

impl fmt::Display for DivergenceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValueMismatch => write!(f, "value mismatch"),
            Self::TypeMismatch => write!(f, "type mismatch"),
            Self::LengthMismatch => write!(f, "length mismatch"),
            Self::MissingKey => write!(f, "missing key"),
        }
    }
}

/// The first point at which desired and observed state disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Divergence {
    /// Slash-separated path; `*` marks a list element.
    pub path: String,
    /// Why the values diverged.
    pub reason: DivergenceReason,
    /// Desired value at `path`.
    pub desired: Value,
    /// Observed value at `path` (`null` when missing).
    pub observed: Value,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {} -> {}",
            self.path, self.reason, self.observed, self.desired
        )
    }
}

/// How sequence elements are ordered before element-wise comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SortKey {
    /// Order by the value under this key.
    Field(String),
    /// Order by the element itself.
    Natural,
}

/// First-divergence comparator.
#[derive(Debug)]
pub struct Comparator<'a> {
    /// Normalizer supplying scalar canonicalization.
    normalizer: &'a Normalizer<'a>,
}

impl<'a> Comparator<'a> {
    /// Creates a comparator.
    #[must_use]
    pub const fn new(normalizer: &'a Normalizer<'a>) -> Self {
        Self { normalizer }
    }

    /// Compares `desired` against `observed`.
    ///
    /// Returns `None` when the observed state satisfies the desired state.
    #[must_use]
    pub fn compare(&self, desired: &Value, observed: &Value) -> Option<Divergence> {
        let mut path = Vec::new();
        self.compare_at(&mut path, desired, observed)
    }

    fn compare_at(&self, path: &mut Vec<String>, desired: &Value, observed: &Value) -> Option<Divergence> {
        match (desired, observed) {
            (Value::Null, _) => None,
            (Value::Object(d), Value::Object(o)) => {
                for (key, d_value) in d {
                    path.push(key.clone());
                    let found = match o.get(key) {
                        Some(o_value) => self.compare_at(path, d_value, o_value),
                        None if is_empty_container(d_value) || d_value.is_null() => None,
                        None => Some(divergence(path, DivergenceReason::MissingKey, d_value, &Value::Null)),
                    };
                    path.pop();
                    if found.is_some() {
                        return found;
                    }
                }
                None
            }
            (Value::Array(d), Value::Array(o)) => self.compare_sequences(path, desired, d, o, observed),
            (Value::Object(_) | Value::Array(_), Value::Null) if is_empty_container(desired) => None,
            (Value::Object(_) | Value::Array(_), _) | (_, Value::Object(_) | Value::Array(_)) => {
                Some(divergence(path, DivergenceReason::TypeMismatch, desired, observed))
            }
            _ => {
                let d_key = self.normalizer.scalar_key(path, desired);
                let o_key = self.normalizer.scalar_key(path, observed);
                if d_key == o_key {
                    None
                } else {
                    Some(divergence(path, DivergenceReason::ValueMismatch, desired, observed))
                }
            }
        }
    }

    fn compare_sequences(
        &self,
        path: &mut Vec<String>,
        desired: &Value,
        d: &[Value],
        o: &[Value],
        observed: &Value,
    ) -> Option<Divergence> {
        if d.len() != o.len() {
            return Some(divergence(path, DivergenceReason::LengthMismatch, desired, observed));
        }
        if d.is_empty() {
            return None;
        }

        let key = sort_key(&d[0], &o[0]);
        path.push("*".to_string());
        let d_sorted = self.sorted(path, d, &key);
        let o_sorted = self.sorted(path, o, &key);

        let found = d_sorted
            .iter()
            .zip(&o_sorted)
            .find_map(|(d_item, o_item)| self.compare_at(path, d_item, o_item));
        path.pop();
        found
    }

    /// Orders list elements by the same canonical key the comparison uses,
    /// so resource IDs differing only by case or a trailing `/` pair up.
    fn sorted<'v>(&self, element_path: &[String], items: &'v [Value], key: &SortKey) -> Vec<&'v Value> {
        let mut keyed: Vec<(Option<String>, &'v Value)> = items
            .iter()
            .map(|item| {
                let canonical = match key {
                    SortKey::Natural => self.normalizer.scalar_key(element_path, item),
                    SortKey::Field(field) => item.get(field).and_then(|value| {
                        let mut field_path = element_path.to_vec();
                        field_path.push(field.clone());
                        self.normalizer.scalar_key(&field_path, value)
                    }),
                };
                (canonical, item)
            })
            .collect();
        keyed.sort_by(|(ka, a), (kb, b)| ka.cmp(kb).then_with(|| compare_by_key(a, b, key)));
        keyed.into_iter().map(|(_, item)| item).collect()
    }
}

fn divergence(path: &[String], reason: DivergenceReason, desired: &Value, observed: &Value) -> Divergence {
    Divergence {
        path: format!("/{}", path.join("/")),
        reason,
        desired: desired.clone(),
        observed: observed.clone(),
    }
}

fn is_empty_container(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn sort_key(desired_first: &Value, observed_first: &Value) -> SortKey {
    let (Value::Object(d), Value::Object(o)) = (desired_first, observed_first) else {
        return SortKey::Natural;
    };
    for candidate in ["id", "name"] {
        if d.contains_key(candidate) && o.contains_key(candidate) {
            return SortKey::Field(candidate.to_string());
        }
    }
    o.keys()
        .next()
        .map_or(SortKey::Natural, |first| SortKey::Field(first.clone()))
}

fn compare_by_key(a: &Value, b: &Value, key: &SortKey) -> Ordering {
    match key {
        SortKey::Natural => natural_order(a, b),
        SortKey::Field(field) => natural_order(
            a.get(field).unwrap_or(&Value::Null),
            b.get(field).unwrap_or(&Value::Null),
        ),
    }
}

/// Total order over JSON values: null < bool < number < string < array < object.
/// Strings order case-insensitively so case-folded keys line up on both sides.
fn natural_order(a: &Value, b: &Value) -> Ordering {
    const fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(i, j)| natural_order(i, j))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(_), Value::Object(_)) => a.to_string().cmp(&b.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}
