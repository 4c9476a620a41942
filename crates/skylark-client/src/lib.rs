//! FlightSQL query client
//!
//! Executes SQL statements against a Flight-compatible server and
//! materializes the streamed columnar results into a [`Table`].
//!
//! Two submission paths are supported, selected by [`QueryMode`]:
//!
//! - **Direct ticket**: the SQL text is encoded verbatim as a ticket and
//!   fetched with a single `DoGet` call.
//! - **Planned query**: a FlightSQL `CommandStatementQuery` is planned
//!   with `GetFlightInfo`, then every endpoint the server listed is
//!   fetched sequentially and the results concatenated in order.
//!
//! The client is synchronous in spirit: each operation is one future the
//! caller drives to completion, with no background tasks and no retries.
//! Failures surface as typed [`ClientError`]s and partial results are
//! never returned.
//!
//! # Example
//!
//! ```ignore
//! use skylark_client::{ClientConfig, QueryClient, QueryMode};
//!
//! let config = ClientConfig::new("localhost", 32010).with_mode(QueryMode::PlannedQuery);
//! let mut client = QueryClient::connect(config).await?;
//! let table = client.execute("SELECT 1 AS a").await?;
//! println!("{} rows", table.num_rows());
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod stream;
pub mod table;
mod tls;

pub use arrow_flight::Ticket;
pub use client::QueryClient;
pub use config::{ClientConfig, QueryMode, TlsSettings};
pub use error::ClientError;
pub use stream::BatchStream;
pub use table::Table;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
