//! In-process Flight server serving canned results for client tests.
//!
//! Queries are registered up front with the batches each endpoint should
//! serve; `get_flight_info` answers the planned path and `do_get` serves
//! both paths. Failure modes (mid-stream errors, stalled streams) are
//! registered per query.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use arrow_flight::encode::FlightDataEncoderBuilder;
use arrow_flight::flight_service_server::{FlightService, FlightServiceServer};
use arrow_flight::sql::{Any, CommandStatementQuery};
use arrow_flight::{
    Action, ActionType, Criteria, Empty, FlightData, FlightDescriptor, FlightInfo,
    HandshakeRequest, HandshakeResponse, PollInfo, PutResult, SchemaResult, Ticket,
};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use parking_lot::RwLock;
use prost::Message;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Identity, Server, ServerTlsConfig};
use tonic::{Request, Response, Status, Streaming};

/// What `do_get` does for one endpoint's ticket
#[derive(Clone)]
enum Serving {
    /// Stream the batches to completion
    Batches(Vec<RecordBatch>),
    /// Stream the batches, then fail with a transport error
    FailAfter(Vec<RecordBatch>),
    /// Send the schema, then stall until the client gives up
    Stall,
}

#[derive(Clone)]
struct CannedQuery {
    schema: SchemaRef,
    endpoints: Vec<Serving>,
    advertise_reuse: bool,
}

/// Flight service with per-query canned results
#[derive(Clone, Default)]
pub struct MockFlightServer {
    queries: Arc<RwLock<HashMap<String, CannedQuery>>>,
}

impl MockFlightServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a query served from a single endpoint
    pub fn register(&self, sql: &str, schema: SchemaRef, batches: Vec<RecordBatch>) {
        self.register_endpoints(sql, schema, vec![batches]);
    }

    /// Register a query split across several endpoints, in served order
    pub fn register_endpoints(
        &self,
        sql: &str,
        schema: SchemaRef,
        endpoints: Vec<Vec<RecordBatch>>,
    ) {
        let canned = CannedQuery {
            schema,
            endpoints: endpoints.into_iter().map(Serving::Batches).collect(),
            advertise_reuse: false,
        };
        self.queries.write().insert(sql.to_string(), canned);
    }

    /// Like `register_endpoints`, but each endpoint advertises the
    /// reuse-connection location
    pub fn register_with_reuse_location(
        &self,
        sql: &str,
        schema: SchemaRef,
        endpoints: Vec<Vec<RecordBatch>>,
    ) {
        let canned = CannedQuery {
            schema,
            endpoints: endpoints.into_iter().map(Serving::Batches).collect(),
            advertise_reuse: true,
        };
        self.queries.write().insert(sql.to_string(), canned);
    }

    /// Register a query whose stream fails after `good` batches
    pub fn register_mid_stream_failure(
        &self,
        sql: &str,
        schema: SchemaRef,
        good: Vec<RecordBatch>,
    ) {
        let canned = CannedQuery {
            schema,
            endpoints: vec![Serving::FailAfter(good)],
            advertise_reuse: false,
        };
        self.queries.write().insert(sql.to_string(), canned);
    }

    /// Register a query whose stream never produces a batch
    pub fn register_stalled(&self, sql: &str, schema: SchemaRef) {
        let canned = CannedQuery {
            schema,
            endpoints: vec![Serving::Stall],
            advertise_reuse: false,
        };
        self.queries.write().insert(sql.to_string(), canned);
    }

    /// Serve on an OS-assigned localhost port
    pub async fn serve(self) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            Server::builder()
                .add_service(FlightServiceServer::new(self))
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await
                .ok();
        });

        addr
    }

    /// Serve over TLS with the given PEM identity
    pub async fn serve_tls(self, cert_pem: &str, key_pem: &str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let identity = Identity::from_pem(cert_pem, key_pem);

        tokio::spawn(async move {
            Server::builder()
                .tls_config(ServerTlsConfig::new().identity(identity))
                .unwrap()
                .add_service(FlightServiceServer::new(self))
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await
                .ok();
        });

        addr
    }

    fn lookup(&self, sql: &str) -> Result<CannedQuery, Status> {
        self.queries
            .read()
            .get(sql)
            .cloned()
            .ok_or_else(|| Status::not_found(format!("unknown query: {sql}")))
    }
}

/// SQL carried by a command descriptor: a packed `CommandStatementQuery`
/// or raw UTF-8 text
fn decode_statement(descriptor: &FlightDescriptor) -> Result<String, Status> {
    if let Ok(any) = Any::decode(&*descriptor.cmd) {
        if let Ok(Some(cmd)) = any.unpack::<CommandStatementQuery>() {
            return Ok(cmd.query);
        }
    }
    if !descriptor.cmd.is_empty() {
        return Ok(String::from_utf8_lossy(&descriptor.cmd).to_string());
    }
    Err(Status::invalid_argument("no query provided"))
}

/// Ticket payloads are `#<endpoint-index>#<sql>` for the planned path and
/// raw SQL (endpoint 0) for the direct path
fn parse_ticket(ticket: &Ticket) -> (String, usize) {
    let text = String::from_utf8_lossy(&ticket.ticket).to_string();
    if let Some(rest) = text.strip_prefix('#') {
        if let Some((idx, sql)) = rest.split_once('#') {
            if let Ok(idx) = idx.parse::<usize>() {
                return (sql.to_string(), idx);
            }
        }
    }
    (text, 0)
}

fn endpoint_ticket(sql: &str, idx: usize) -> Ticket {
    Ticket::new(format!("#{idx}#{sql}"))
}

#[tonic::async_trait]
impl FlightService for MockFlightServer {
    type HandshakeStream = BoxStream<'static, Result<HandshakeResponse, Status>>;
    type ListFlightsStream = BoxStream<'static, Result<FlightInfo, Status>>;
    type DoGetStream = BoxStream<'static, Result<FlightData, Status>>;
    type DoPutStream = BoxStream<'static, Result<PutResult, Status>>;
    type DoActionStream = BoxStream<'static, Result<arrow_flight::Result, Status>>;
    type ListActionsStream = BoxStream<'static, Result<ActionType, Status>>;
    type DoExchangeStream = BoxStream<'static, Result<FlightData, Status>>;

    async fn handshake(
        &self,
        _request: Request<Streaming<HandshakeRequest>>,
    ) -> Result<Response<Self::HandshakeStream>, Status> {
        let response = HandshakeResponse {
            protocol_version: 0,
            payload: Default::default(),
        };
        let stream = stream::once(async { Ok(response) }).boxed();
        Ok(Response::new(stream))
    }

    async fn list_flights(
        &self,
        _request: Request<Criteria>,
    ) -> Result<Response<Self::ListFlightsStream>, Status> {
        Err(Status::unimplemented("list_flights is not served"))
    }

    async fn get_flight_info(
        &self,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<FlightInfo>, Status> {
        let descriptor = request.into_inner();
        let sql = decode_statement(&descriptor)?;
        let canned = self.lookup(&sql)?;

        let mut info = FlightInfo::new()
            .with_descriptor(descriptor)
            .try_with_schema(&canned.schema)
            .map_err(|e| Status::internal(e.to_string()))?;

        for idx in 0..canned.endpoints.len() {
            let mut endpoint =
                arrow_flight::FlightEndpoint::new().with_ticket(endpoint_ticket(&sql, idx));
            if canned.advertise_reuse {
                endpoint = endpoint.with_location("arrow-flight-reuse-connection://?");
            }
            info = info.with_endpoint(endpoint);
        }

        Ok(Response::new(info))
    }

    async fn poll_flight_info(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> Result<Response<PollInfo>, Status> {
        Err(Status::unimplemented("poll_flight_info is not served"))
    }

    async fn get_schema(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> Result<Response<SchemaResult>, Status> {
        Err(Status::unimplemented("get_schema is not served"))
    }

    async fn do_get(
        &self,
        request: Request<Ticket>,
    ) -> Result<Response<Self::DoGetStream>, Status> {
        let (sql, idx) = parse_ticket(&request.into_inner());
        let canned = self.lookup(&sql)?;
        let serving = canned
            .endpoints
            .get(idx)
            .cloned()
            .ok_or_else(|| Status::not_found(format!("no endpoint {idx} for query: {sql}")))?;
        let schema = canned.schema.clone();

        match serving {
            Serving::Batches(batches) => {
                let stream = FlightDataEncoderBuilder::new()
                    .with_schema(schema)
                    .build(stream::iter(batches.into_iter().map(Ok)))
                    .map_err(|e| Status::internal(e.to_string()));
                Ok(Response::new(stream.boxed()))
            }
            Serving::FailAfter(batches) => {
                let frames: Vec<FlightData> = FlightDataEncoderBuilder::new()
                    .with_schema(schema)
                    .build(stream::iter(batches.into_iter().map(Ok)))
                    .try_collect()
                    .await
                    .map_err(|e| Status::internal(e.to_string()))?;
                let stream = stream::iter(frames.into_iter().map(Ok))
                    .chain(stream::once(async {
                        Err(Status::unavailable("stream interrupted"))
                    }));
                Ok(Response::new(stream.boxed()))
            }
            Serving::Stall => {
                let no_batches: Vec<arrow_flight::error::Result<RecordBatch>> = Vec::new();
                let frames: Vec<FlightData> = FlightDataEncoderBuilder::new()
                    .with_schema(schema)
                    .build(stream::iter(no_batches))
                    .try_collect()
                    .await
                    .map_err(|e| Status::internal(e.to_string()))?;
                let stream = stream::iter(frames.into_iter().map(Ok))
                    .chain(stream::once(async {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Err(Status::deadline_exceeded("stalled stream woke up"))
                    }));
                Ok(Response::new(stream.boxed()))
            }
        }
    }

    async fn do_put(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> Result<Response<Self::DoPutStream>, Status> {
        Err(Status::unimplemented("do_put is not served"))
    }

    async fn do_action(
        &self,
        _request: Request<Action>,
    ) -> Result<Response<Self::DoActionStream>, Status> {
        Err(Status::unimplemented("do_action is not served"))
    }

    async fn list_actions(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::ListActionsStream>, Status> {
        Err(Status::unimplemented("list_actions is not served"))
    }

    async fn do_exchange(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> Result<Response<Self::DoExchangeStream>, Status> {
        Err(Status::unimplemented("do_exchange is not served"))
    }
}
