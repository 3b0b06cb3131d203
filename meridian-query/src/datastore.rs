//! The seam between compiled queries and a concrete datastore.
//!
//! A backend implements [`Datastore`]: count matching rows, and open a
//! chunked cursor over them. Rows come back as [`Record`] values holding
//! typed scalars, geometries and (prefetched) nested records. The cursor
//! is the only place a request suspends on I/O besides writing the
//! response body.

use crate::predicate::CompiledQuery;
use async_trait::async_trait;
use meridian_core::error::Result;
use meridian_core::values::ScalarValue;
use meridian_core::Geometry;
use std::collections::HashMap;

/// One field value inside a row.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(ScalarValue),
    Geometry(Geometry),
    /// A bounded nested relation.
    Record(Record),
    /// An unbounded relation or array.
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Scalar(ScalarValue::Null))
    }

    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            FieldValue::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_geometry(&self) -> Option<&Geometry> {
        match self {
            FieldValue::Geometry(geometry) => Some(geometry),
            _ => None,
        }
    }
}

/// A row from the datastore, addressable by dotted data-source paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: HashMap<String, FieldValue>,
    /// Pre-rendered text values (geometry serialization annotations).
    annotations: HashMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: FieldValue) -> &mut Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Walk a dotted path (`city.region`). A missing field reads as null.
    /// Crossing an unbounded relation fans out over its entries.
    pub fn resolve_path<'a>(&'a self, path: &str) -> Vec<&'a FieldValue> {
        let mut current: Vec<&Record> = vec![self];
        let mut segments = path.split('.').peekable();
        let mut results: Vec<&FieldValue> = Vec::new();

        while let Some(segment) = segments.next() {
            let last = segments.peek().is_none();
            let mut next: Vec<&Record> = Vec::new();
            for record in &current {
                let Some(value) = record.fields.get(segment) else {
                    continue;
                };
                if last {
                    match value {
                        FieldValue::List(items) => results.extend(items.iter()),
                        other => results.push(other),
                    }
                } else {
                    match value {
                        FieldValue::Record(nested) => next.push(nested),
                        FieldValue::List(items) => {
                            next.extend(items.iter().filter_map(|item| match item {
                                FieldValue::Record(nested) => Some(nested),
                                _ => None,
                            }));
                        }
                        _ => {}
                    }
                }
            }
            current = next;
        }
        results
    }

    /// The first scalar at a path, null when absent.
    pub fn scalar_at(&self, path: &str) -> ScalarValue {
        self.resolve_path(path)
            .into_iter()
            .find_map(FieldValue::as_scalar)
            .cloned()
            .unwrap_or(ScalarValue::Null)
    }

    /// The first geometry at a path.
    pub fn geometry_at(&self, path: &str) -> Option<&Geometry> {
        self.resolve_path(path)
            .into_iter()
            .find_map(FieldValue::as_geometry)
    }

    pub fn set_annotation(&mut self, name: impl Into<String>, value: String) {
        self.annotations.insert(name.into(), value);
    }

    pub fn annotation(&self, name: &str) -> Option<&str> {
        self.annotations.get(name).map(String::as_str)
    }
}

/// A server-side cursor delivering rows in chunks.
#[async_trait]
pub trait FeatureCursor: Send {
    /// The next chunk of rows, or `None` when exhausted.
    async fn next_chunk(&mut self) -> Result<Option<Vec<Record>>>;
}

/// A queryable collection store.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Full cardinality of the query, ignoring pagination.
    async fn count(&self, collection: &str, query: &CompiledQuery) -> Result<u64>;

    /// Open a cursor over the query results. `start`/`limit` implement
    /// pagination; `chunk_size` tunes how many rows each pull returns,
    /// with prefetched relations attached per chunk.
    async fn open_cursor(
        &self,
        collection: &str,
        query: &CompiledQuery,
        start: u64,
        limit: Option<u64>,
        chunk_size: usize,
    ) -> Result<Box<dyn FeatureCursor>>;
}
