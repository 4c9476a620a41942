use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod output;

use skylark_client::{ClientConfig, QueryClient, QueryMode, TlsSettings};

#[derive(Parser)]
#[command(name = "skylark")]
#[command(author, version, about = "Skylark - FlightSQL command-line client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args)]
struct ConnectionArgs {
    /// Server host
    #[arg(short = 'H', long, default_value = "localhost")]
    host: String,

    /// Server port
    #[arg(short, long, default_value = "32010")]
    port: u16,

    /// Enable TLS
    #[arg(long)]
    tls: bool,

    /// Skip server certificate verification
    #[arg(long, requires = "tls")]
    insecure: bool,

    /// PEM CA certificate used for TLS verification
    #[arg(long, requires = "tls")]
    ca_cert: Option<String>,

    /// Override the domain used for SNI and certificate validation
    #[arg(long, requires = "tls")]
    tls_domain: Option<String>,

    /// Per-query deadline in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Connection configuration file (JSON); flags for host/port/TLS are
    /// ignored when set
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl ConnectionArgs {
    fn to_config(&self, mode: QueryMode) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                serde_json::from_str(&contents)?
            }
            None => ClientConfig::new(&self.host, self.port).with_tls(TlsSettings {
                enabled: self.tls,
                ca_cert_path: self.ca_cert.clone(),
                domain_override: self.tls_domain.clone(),
                danger_accept_invalid_certs: self.insecure,
            }),
        };

        config = config.with_mode(mode);
        if let Some(secs) = self.timeout {
            config = config.with_query_deadline(Duration::from_secs(secs));
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a SQL statement and print the result
    Query {
        #[command(flatten)]
        conn: ConnectionArgs,

        /// SQL statement to execute
        #[arg(short, long)]
        sql: String,

        /// Submission mode (direct, planned)
        #[arg(short, long, default_value = "direct")]
        mode: String,

        /// Output format (table, json, csv)
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Fetch the result schema for a SQL statement without fetching data
    Schema {
        #[command(flatten)]
        conn: ConnectionArgs,

        /// SQL statement to plan
        #[arg(short, long)]
        sql: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Query {
            conn,
            sql,
            mode,
            output,
        } => run_query(&conn, &sql, &mode, &output).await?,
        Commands::Schema { conn, sql } => show_schema(&conn, &sql).await?,
    }

    Ok(())
}

async fn run_query(conn: &ConnectionArgs, sql: &str, mode: &str, output: &str) -> Result<()> {
    let mode = parse_mode(mode)?;
    let config = conn.to_config(mode)?;

    println!("{} Connecting to {}...", "→".bright_blue(), config.url());
    let mut client = QueryClient::connect(config).await?;

    let start = Instant::now();
    let table = client.execute(sql).await?;
    let elapsed = start.elapsed();

    match output {
        "table" => output::print_table(&table)?,
        "json" => output::print_json(&table)?,
        "csv" => output::print_csv(&table)?,
        other => anyhow::bail!("Unsupported output format: {}", other),
    }

    println!(
        "{} {} rows in {:.2}ms",
        "✓".bright_green(),
        table.num_rows(),
        elapsed.as_secs_f64() * 1000.0
    );

    Ok(())
}

async fn show_schema(conn: &ConnectionArgs, sql: &str) -> Result<()> {
    let config = conn.to_config(QueryMode::PlannedQuery)?;

    println!("{} Connecting to {}...", "→".bright_blue(), config.url());
    let mut client = QueryClient::connect(config).await?;

    let schema = client.schema(sql).await?;

    println!("{}", "Result schema:".bright_yellow());
    for field in schema.fields() {
        let nullable = if field.is_nullable() { " (nullable)" } else { "" };
        println!(
            "  {} : {:?}{}",
            field.name().bright_cyan(),
            field.data_type(),
            nullable
        );
    }

    Ok(())
}

fn parse_mode(mode: &str) -> Result<QueryMode> {
    match mode {
        "direct" => Ok(QueryMode::DirectTicket),
        "planned" => Ok(QueryMode::PlannedQuery),
        other => anyhow::bail!("Unsupported query mode: {} (use direct or planned)", other),
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        "skylark_cli=debug,skylark_client=debug"
    } else {
        "skylark_cli=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
