//! Materialized query results
//!
//! A [`Table`] is the concatenation of every record batch a query
//! produced, in arrival order, under one shared schema. It is a pure
//! output value: immutable and caller-owned.

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;

use crate::error::ClientError;
use crate::Result;

/// Fully materialized result of one query
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl Table {
    /// Build a table, enforcing that every batch carries `schema`
    pub fn try_new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<Self> {
        for batch in &batches {
            if batch.schema().fields() != schema.fields() {
                return Err(ClientError::stream(format!(
                    "batch schema {:?} does not match result schema {:?}",
                    batch.schema().fields(),
                    schema.fields()
                )));
            }
        }
        Ok(Self { schema, batches })
    }

    /// An empty result with a known schema
    pub fn empty(schema: SchemaRef) -> Self {
        Self {
            schema,
            batches: Vec::new(),
        }
    }

    /// Schema shared by all batches
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// The batches in arrival order
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Consume the table, returning its batches
    pub fn into_batches(self) -> Vec<RecordBatch> {
        self.batches
    }

    /// Total row count across all batches
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    /// Number of batches
    pub fn num_batches(&self) -> usize {
        self.batches.len()
    }

    /// Number of columns
    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    /// True when the table holds no rows
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }
}
