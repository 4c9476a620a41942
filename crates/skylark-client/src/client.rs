//! FlightSQL client for remote query execution
//!
//! Connects to a Flight endpoint and executes SQL either by encoding the
//! statement verbatim as a ticket (single `DoGet`) or through the planned
//! two-phase path (`GetFlightInfo`, then one `DoGet` per endpoint the
//! server listed, in order).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use arrow::datatypes::SchemaRef;
use arrow_flight::flight_service_client::FlightServiceClient;
use arrow_flight::sql::{CommandStatementQuery, ProstMessageExt};
use arrow_flight::{FlightDescriptor, FlightEndpoint, FlightInfo, HandshakeRequest, Ticket};
use futures::stream;
use prost::Message;
use tokio::time::Instant;
use tonic::transport::Channel;
use tracing::{debug, info};

use crate::config::{ClientConfig, QueryMode};
use crate::error::ClientError;
use crate::stream::BatchStream;
use crate::table::Table;
use crate::tls;
use crate::Result;

/// Location scheme a server uses to tell the client to fetch over the
/// connection that produced the FlightInfo.
const REUSE_CONNECTION_SCHEME: &str = "arrow-flight-reuse-connection";

type Deadline = Option<(Instant, Duration)>;

/// FlightSQL client for a single endpoint
///
/// The client is reusable across sequential queries but takes `&mut self`
/// per operation: one owner drives one operation at a time.
pub struct QueryClient {
    inner: FlightServiceClient<Channel>,
    config: ClientConfig,
}

impl QueryClient {
    /// Connect to the configured endpoint
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        info!("connecting to flight endpoint {}", config.url());

        let channel = tls::connect(&config).await?;

        Ok(Self {
            inner: FlightServiceClient::new(channel),
            config,
        })
    }

    /// The configuration this client was built with
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Execute `sql` using the configured [`QueryMode`]
    pub async fn execute(&mut self, sql: impl Into<String>) -> Result<Table> {
        match self.config.mode {
            QueryMode::DirectTicket => self.execute_direct(sql).await,
            QueryMode::PlannedQuery => self.execute_planned(sql).await,
        }
    }

    /// Single-phase path: the SQL text is the ticket payload
    pub async fn execute_direct(&mut self, sql: impl Into<String>) -> Result<Table> {
        let sql = sql.into();
        info!("executing direct query: {}", sql);

        let deadline = self.deadline();
        let stream = self.open_stream(Ticket::new(sql), None, deadline).await?;
        let (schema, batches) = stream.drain().await?;

        debug!("received {} batches", batches.len());
        Table::try_new(schema, batches)
    }

    /// Two-phase path: plan with `GetFlightInfo`, then fetch every listed
    /// endpoint sequentially, preserving the server's order
    pub async fn execute_planned(&mut self, sql: impl Into<String>) -> Result<Table> {
        let sql = sql.into();
        info!("executing planned query: {}", sql);

        let deadline = self.deadline();
        let query_info = self.flight_info(&sql, deadline).await?;
        let declared = decode_info_schema(&query_info)?;

        let mut schema = declared;
        let mut batches = Vec::new();
        for endpoint in &query_info.endpoint {
            let ticket = endpoint
                .ticket
                .clone()
                .ok_or_else(|| ClientError::stream("flight endpoint is missing a ticket"))?;

            let stream = self
                .open_stream(ticket, location_of(endpoint), deadline)
                .await?;
            let (endpoint_schema, endpoint_batches) = stream.drain().await?;

            let schema = schema.get_or_insert(endpoint_schema.clone());
            if endpoint_schema.fields() != schema.fields() {
                return Err(ClientError::stream(format!(
                    "endpoint schema {:?} does not match result schema {:?}",
                    endpoint_schema.fields(),
                    schema.fields()
                )));
            }
            batches.extend(endpoint_batches);
        }

        let schema =
            schema.ok_or_else(|| ClientError::stream("server returned no schema for query"))?;
        debug!(
            "received {} batches from {} endpoints",
            batches.len(),
            query_info.endpoint.len()
        );
        Table::try_new(schema, batches)
    }

    /// Fetch the result schema for `sql` without fetching any data
    pub async fn schema(&mut self, sql: impl Into<String>) -> Result<SchemaRef> {
        let sql = sql.into();
        let deadline = self.deadline();
        let query_info = self.flight_info(&sql, deadline).await?;

        decode_info_schema(&query_info)?
            .ok_or_else(|| ClientError::stream("server returned no schema for query"))
    }

    /// Open the batch stream for a ticket without draining it
    ///
    /// Dropping the returned stream releases the underlying gRPC stream
    /// even when it was only partially consumed.
    pub async fn fetch(&mut self, ticket: Ticket) -> Result<BatchStream> {
        let deadline = self.deadline();
        self.open_stream(ticket, None, deadline).await
    }

    /// Perform the Flight handshake (no authentication payload)
    pub async fn handshake(&mut self) -> Result<()> {
        let request = HandshakeRequest {
            protocol_version: 0,
            payload: Default::default(),
        };

        let response = self
            .inner
            .handshake(stream::once(async { request }))
            .await
            .map_err(|status| ClientError::Connection(status.to_string()))?;

        let mut stream = response.into_inner();
        while stream
            .message()
            .await
            .map_err(|status| ClientError::Connection(status.to_string()))?
            .is_some()
        {}

        debug!("handshake completed");
        Ok(())
    }

    fn deadline(&self) -> Deadline {
        self.config
            .query_deadline
            .map(|limit| (Instant::now() + limit, limit))
    }

    async fn flight_info(&mut self, sql: &str, deadline: Deadline) -> Result<FlightInfo> {
        let cmd = CommandStatementQuery {
            query: sql.to_string(),
            transaction_id: None,
        };
        let descriptor = FlightDescriptor::new_cmd(cmd.as_any().encode_to_vec());

        let response = with_deadline(deadline, self.inner.get_flight_info(descriptor)).await?;
        Ok(response.into_inner())
    }

    async fn open_stream(
        &mut self,
        ticket: Ticket,
        location: Option<String>,
        deadline: Deadline,
    ) -> Result<BatchStream> {
        let response = match location {
            None => with_deadline(deadline, self.inner.do_get(ticket)).await?,
            Some(uri) => {
                debug!("fetching from endpoint location {}", uri);
                let channel = tls::connect_to(&self.config, &uri).await?;
                let mut remote = FlightServiceClient::new(channel);
                with_deadline(deadline, remote.do_get(ticket)).await?
            }
        };

        Ok(BatchStream::new(response.into_inner(), deadline))
    }
}

/// Await an RPC under the query deadline, mapping server rejection to a
/// query error and an elapsed deadline to cancellation.
async fn with_deadline<T>(
    deadline: Deadline,
    fut: impl Future<Output = std::result::Result<T, tonic::Status>>,
) -> Result<T> {
    match deadline {
        Some((at, limit)) => tokio::time::timeout_at(at, fut)
            .await
            .map_err(|_| ClientError::Cancelled(limit))?
            .map_err(ClientError::from),
        None => fut.await.map_err(ClientError::from),
    }
}

/// Schema declared in a FlightInfo, if the server sent one
fn decode_info_schema(info: &FlightInfo) -> Result<Option<SchemaRef>> {
    if info.schema.is_empty() {
        return Ok(None);
    }
    let schema = info.clone().try_decode_schema()?;
    Ok(Some(Arc::new(schema)))
}

/// First usable fetch location of an endpoint, or `None` when the server
/// wants the original connection reused
fn location_of(endpoint: &FlightEndpoint) -> Option<String> {
    let uri = &endpoint.location.first()?.uri;
    if uri.is_empty() || uri.starts_with(REUSE_CONNECTION_SCHEME) {
        None
    } else {
        Some(uri.clone())
    }
}
