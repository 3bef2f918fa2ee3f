use crate::error::{QueryError, Result};
use crate::schema::{FieldKind, FieldSource, FieldValue, Schema};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Caller-supplied filter value for one field, as it arrives in JSON or from flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Null,
    Number(f64),
    Text(String),
    List(Vec<FilterValue>),
}

impl FilterValue {
    fn describe(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Number(n) => format!("number {n}"),
            Self::Text(s) => format!("text '{s}'"),
            Self::List(items) => format!("list of {}", items.len()),
        }
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<u64> for FilterValue {
    fn from(value: u64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// Filters keyed by field name; all of them must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSet(BTreeMap<String, FilterValue>);

impl FilterSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FilterValue>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// `%` wildcard pattern compiled to an anchored regex. Case-sensitive.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self> {
        let body = source
            .split('%')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("(?s)^{body}$")).map_err(|source_err| {
            QueryError::Pattern {
                pattern: source.to_string(),
                source: source_err,
            }
        })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Number(f64),
    Text(String),
}

impl Scalar {
    fn matches(&self, value: FieldValue<'_>) -> bool {
        match (self, value) {
            (Self::Number(expected), FieldValue::Number(actual)) => *expected == actual,
            (Self::Text(expected), FieldValue::Text(actual)) => expected == actual,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(Scalar),
    /// Inclusive on both ends.
    Range { low: f64, high: f64 },
    In(Vec<Scalar>),
    Like(Pattern),
    /// Any of the patterns.
    AnyLike(Vec<Pattern>),
}

impl Predicate {
    /// An unset field (`None`) never matches.
    #[must_use]
    pub fn matches(&self, value: Option<FieldValue<'_>>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match self {
            Self::Eq(scalar) => scalar.matches(value),
            Self::Range { low, high } => match value {
                FieldValue::Number(n) => *low <= n && n <= *high,
                FieldValue::Text(_) => false,
            },
            Self::In(scalars) => scalars.iter().any(|s| s.matches(value)),
            Self::Like(pattern) => match value {
                FieldValue::Text(text) => pattern.is_match(text),
                FieldValue::Number(_) => false,
            },
            Self::AnyLike(patterns) => match value {
                FieldValue::Text(text) => patterns.iter().any(|p| p.is_match(text)),
                FieldValue::Number(_) => false,
            },
        }
    }
}

/// Word-list predicate for vectors: exact set membership, or an OR of `%` patterns.
pub fn word_predicate(words: &[String], exact: bool) -> Result<Option<Predicate>> {
    if words.is_empty() {
        return Ok(None);
    }
    if exact {
        return Ok(Some(Predicate::In(
            words.iter().cloned().map(Scalar::Text).collect(),
        )));
    }
    let patterns = words
        .iter()
        .map(|w| Pattern::new(w))
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(Predicate::AnyLike(patterns)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldPredicate {
    pub field: String,
    pub predicate: Predicate,
}

/// Conjunction of field predicates, compiled against a record schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    clauses: Vec<FieldPredicate>,
}

impl Query {
    /// Compile `filters` for records of `schema`. Null and empty-list values are dropped.
    pub fn compile(schema: &Schema, filters: &FilterSet) -> Result<Self> {
        let mut clauses = Vec::new();
        for (field, value) in filters.iter() {
            let kind = schema
                .kind_of(field)
                .ok_or_else(|| QueryError::UnknownField {
                    record: schema.record,
                    field: field.to_string(),
                })?;
            if let Some(predicate) = compile_value(field, kind, value)? {
                clauses.push(FieldPredicate {
                    field: field.to_string(),
                    predicate,
                });
            }
        }
        log::debug!(
            "compiled {} {} filter clause(s)",
            clauses.len(),
            schema.record
        );
        Ok(Self { clauses })
    }

    /// Add a clause built outside of a [`FilterSet`], e.g. a word list.
    pub fn push(&mut self, field: impl Into<String>, predicate: Predicate) {
        self.clauses.push(FieldPredicate {
            field: field.into(),
            predicate,
        });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[FieldPredicate] {
        &self.clauses
    }

    pub fn matches<R: FieldSource>(&self, record: &R) -> bool {
        self.clauses
            .iter()
            .all(|clause| clause.predicate.matches(record.field(&clause.field)))
    }
}

fn mismatch(field: &str, kind: FieldKind, value: &FilterValue) -> QueryError {
    QueryError::TypeMismatch {
        field: field.to_string(),
        expected: kind.describe(),
        found: value.describe(),
    }
}

fn compile_value(field: &str, kind: FieldKind, value: &FilterValue) -> Result<Option<Predicate>> {
    match value {
        FilterValue::Null => Ok(None),
        FilterValue::List(items) if items.is_empty() => Ok(None),
        FilterValue::List(items) if kind.is_numeric() => {
            let numbers = items
                .iter()
                .map(|item| number(field, kind, item))
                .collect::<Result<Vec<_>>>()?;
            // A pair is always a range, never a two-element set.
            if let [low, high] = numbers[..] {
                return Ok(Some(Predicate::Range { low, high }));
            }
            Ok(Some(Predicate::In(
                numbers.into_iter().map(Scalar::Number).collect(),
            )))
        }
        FilterValue::List(items) => {
            let texts = items
                .iter()
                .map(|item| match item {
                    FilterValue::Text(text) => Ok(text.as_str()),
                    other => Err(mismatch(field, kind, other)),
                })
                .collect::<Result<Vec<_>>>()?;
            if texts.iter().any(|t| t.contains('%')) {
                let patterns = texts
                    .into_iter()
                    .map(Pattern::new)
                    .collect::<Result<Vec<_>>>()?;
                return Ok(Some(Predicate::AnyLike(patterns)));
            }
            Ok(Some(Predicate::In(
                texts
                    .into_iter()
                    .map(|t| Scalar::Text(t.to_string()))
                    .collect(),
            )))
        }
        scalar if kind.is_numeric() => Ok(Some(Predicate::Eq(Scalar::Number(number(
            field, kind, scalar,
        )?)))),
        FilterValue::Text(text) if text.contains('%') => {
            Ok(Some(Predicate::Like(Pattern::new(text)?)))
        }
        FilterValue::Text(text) => Ok(Some(Predicate::Eq(Scalar::Text(text.clone())))),
        other => Err(mismatch(field, kind, other)),
    }
}

fn number(field: &str, kind: FieldKind, value: &FilterValue) -> Result<f64> {
    match value {
        FilterValue::Number(n) => Ok(*n),
        FilterValue::Text(text) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .ok_or_else(|| mismatch(field, kind, value)),
        other => Err(mismatch(field, kind, other)),
    }
}
