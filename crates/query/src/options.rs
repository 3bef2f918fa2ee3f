use crate::error::{QueryError, Result};
use crate::schema::{FieldSource, FieldValue, Schema};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    /// `field`, `field~asc` or `field~desc`.
    pub fn parse(token: &str) -> Result<Self> {
        let token = token.trim();
        let (field, descending) = match token.split_once('~') {
            None => (token, false),
            Some((field, "desc")) => (field, true),
            Some((field, "asc")) => (field, false),
            Some(_) => return Err(QueryError::InvalidSortToken(token.to_string())),
        };
        if field.is_empty() {
            return Err(QueryError::InvalidSortToken(token.to_string()));
        }
        Ok(Self {
            field: field.to_string(),
            descending,
        })
    }
}

/// Ordered sort keys; ties always fall back to ascending id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<SortKey>,
}

impl SortSpec {
    /// Parse sort tokens for `schema`; no tokens means `[word]`.
    pub fn parse(schema: &Schema, tokens: &[String]) -> Result<Self> {
        let keys = if tokens.is_empty() {
            vec![SortKey {
                field: "word".to_string(),
                descending: false,
            }]
        } else {
            tokens
                .iter()
                .map(|t| SortKey::parse(t))
                .collect::<Result<Vec<_>>>()?
        };
        for key in &keys {
            if schema.kind_of(&key.field).is_none() {
                return Err(QueryError::UnknownSortField {
                    record: schema.record,
                    field: key.field.clone(),
                });
            }
        }
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn compare<R: FieldSource>(&self, a: &R, b: &R) -> Ordering {
        for key in &self.keys {
            let ordering = compare_values(a.field(&key.field), b.field(&key.field));
            let ordering = if key.descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.record_id().cmp(&b.record_id())
    }

    pub fn sort<R: FieldSource>(&self, records: &mut [R]) {
        records.sort_by(|a, b| self.compare(a, b));
    }
}

// Unset values sort before set ones.
fn compare_values(a: Option<FieldValue<'_>>, b: Option<FieldValue<'_>>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(FieldValue::Number(x)), Some(FieldValue::Number(y))) => x.total_cmp(&y),
        (Some(FieldValue::Text(x)), Some(FieldValue::Text(y))) => x.cmp(y),
        (Some(FieldValue::Number(_)), Some(FieldValue::Text(_))) => Ordering::Less,
        (Some(FieldValue::Text(_)), Some(FieldValue::Number(_))) => Ordering::Greater,
    }
}

/// Zero-based page window. `page` is ignored unless `page_size` is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

impl Page {
    pub fn apply<T>(&self, records: Vec<T>) -> Vec<T> {
        let Some(size) = self.page_size else {
            return records;
        };
        let size = usize::try_from(size).unwrap_or(usize::MAX);
        let offset = usize::try_from(self.page.unwrap_or(0))
            .unwrap_or(usize::MAX)
            .saturating_mul(size);
        records.into_iter().skip(offset).take(size).collect()
    }
}

/// Listing options for vector reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u64>,
    /// Word lists match exactly instead of as `%` patterns.
    #[serde(default)]
    pub exact: bool,
}

impl ListOptions {
    #[must_use]
    pub fn page(&self) -> Page {
        Page {
            page: self.page,
            page_size: self.page_size,
        }
    }

    #[must_use]
    pub fn exact(mut self, exact: bool) -> Self {
        self.exact = exact;
        self
    }

    #[must_use]
    pub fn paged(mut self, page: u64, page_size: u64) -> Self {
        self.page = Some(page);
        self.page_size = Some(page_size);
        self
    }

    #[must_use]
    pub fn sorted_by(mut self, tokens: &[&str]) -> Self {
        self.sort = tokens.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Sort then page `records` in memory.
    pub fn apply<R: FieldSource>(&self, mut records: Vec<R>) -> Result<Vec<R>> {
        let spec = SortSpec::parse(&R::SCHEMA, &self.sort)?;
        spec.sort(&mut records);
        Ok(self.page().apply(records))
    }
}
