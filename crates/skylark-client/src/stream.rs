//! Result batch streaming
//!
//! Wraps a Flight `DoGet` response so batches can be pulled one at a
//! time. The stream is lazy, finite, and non-restartable: each
//! [`BatchStream::next_batch`] call advances the network read cursor, and
//! dropping the value releases the underlying gRPC stream whether or not
//! it was fully consumed.

use std::time::Duration;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use arrow_flight::decode::FlightRecordBatchStream;
use arrow_flight::error::FlightError;
use arrow_flight::FlightData;
use futures::{StreamExt, TryStreamExt};
use tokio::time::Instant;
use tonic::Streaming;

use crate::error::ClientError;
use crate::Result;

/// Lazy stream of result batches for one ticket
pub struct BatchStream {
    inner: FlightRecordBatchStream,
    deadline: Option<(Instant, Duration)>,
}

impl BatchStream {
    pub(crate) fn new(
        stream: Streaming<FlightData>,
        deadline: Option<(Instant, Duration)>,
    ) -> Self {
        let mapped = stream.map_err(FlightError::from);
        Self {
            inner: FlightRecordBatchStream::new_from_flight_data(mapped),
            deadline,
        }
    }

    /// Schema announced by the stream, available once the first message
    /// has been read
    pub fn schema(&self) -> Option<SchemaRef> {
        self.inner.schema().cloned()
    }

    /// Pull the next batch, or `None` once the stream is exhausted
    pub async fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        let item = match self.deadline {
            Some((at, limit)) => tokio::time::timeout_at(at, self.inner.next())
                .await
                .map_err(|_| ClientError::Cancelled(limit))?,
            None => self.inner.next().await,
        };

        match item {
            Some(Ok(batch)) => Ok(Some(batch)),
            Some(Err(err)) => Err(err.into()),
            None => Ok(None),
        }
    }

    /// Read the stream to completion, returning the announced schema and
    /// all batches in arrival order
    pub async fn drain(mut self) -> Result<(SchemaRef, Vec<RecordBatch>)> {
        let mut batches = Vec::new();
        while let Some(batch) = self.next_batch().await? {
            batches.push(batch);
        }

        let schema = self
            .schema()
            .ok_or_else(|| ClientError::stream("stream ended before a schema message"))?;
        Ok((schema, batches))
    }
}
