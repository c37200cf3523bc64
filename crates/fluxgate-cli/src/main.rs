//! fluxgate CLI
//!
//! A command-line front end over the fluxgate client.
//!
//! ## Usage
//!
//! ```bash
//! # Wait up to 5 units (50 probes) for the server
//! fluxgate --host tsdb.local ping --timeout 5
//!
//! # Database admin
//! fluxgate create-db metrics
//! fluxgate list-dbs
//!
//! # Write one field (value typed as bool, 42i integer, float, else string)
//! fluxgate write metrics cpu load 0.75 --tag host=a1
//!
//! # Read it back
//! fluxgate read metrics cpu load
//! fluxgate dump metrics cpu '*'
//!
//! # Connection settings from a YAML file
//! fluxgate --config fluxgate.yml list-dbs
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fluxgate_client::{ClientConfig, FluxClient};
use fluxgate_core::FieldValue;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fluxgate")]
#[command(author, version, about = "Talk to an InfluxDB-compatible time series server")]
struct Cli {
    /// YAML connection settings; command line flags override them
    #[arg(short, long, global = true, env = "FLUXGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Server host
    #[arg(long, global = true, env = "FLUXGATE_HOST")]
    host: Option<String>,

    /// Server HTTP port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// User name
    #[arg(short, long, global = true, env = "FLUXGATE_USER")]
    user: Option<String>,

    /// Password
    #[arg(short, long, global = true, env = "FLUXGATE_PASSWORD")]
    password: Option<String>,

    /// Log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait until the server reports a version
    Ping {
        /// Probe budget in units of `probe.attempts_per_unit` attempts (10 by default)
        #[arg(short, long, default_value = "1")]
        timeout: u32,
    },

    /// Create a database (no error if it exists)
    CreateDb { name: String },

    /// Drop a database
    DropDb { name: String },

    /// List databases
    ListDbs,

    /// Check whether a database exists
    Exists { name: String },

    /// Write a single field, stamped with the current time
    Write {
        database: String,
        measurement: String,
        field: String,
        value: String,

        /// Tag as key=value (repeatable)
        #[arg(short, long = "tag", value_parser = parse_tag)]
        tags: Vec<(String, String)>,
    },

    /// Read one column as time -> value
    Read {
        database: String,
        measurement: String,
        column: String,
    },

    /// List the columns of a measurement
    Tags { database: String, measurement: String },

    /// Print a measurement as a table
    Dump {
        database: String,
        measurement: String,
        #[arg(default_value = "*")]
        column: String,
    },
}

impl Cli {
    fn client_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => ClientConfig::default(),
        };

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(user) = &self.user {
            config.username = user.clone();
        }
        if let Some(password) = &self.password {
            config.password = password.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    let config = cli.client_config()?;
    info!("Using server {}", config.base_url());
    let client = FluxClient::connect(config).context("Failed to create client")?;

    let outcome = run(&client, cli.command).await;
    client.close().await?;
    outcome
}

async fn run(client: &FluxClient, command: Commands) -> Result<()> {
    match command {
        Commands::Ping { timeout } => {
            if !client.ping(timeout).await? {
                let probes = timeout.saturating_mul(client.config().probe.attempts_per_unit);
                bail!("Server not ready after {} probes", probes);
            }
            println!("ready ({})", client.version().await?);
        }
        Commands::CreateDb { name } => {
            if !client.create_database(&name).await? {
                bail!("Database {} missing after create", name);
            }
            println!("created {}", name);
        }
        Commands::DropDb { name } => {
            client.drop_database(&name).await?;
            println!("dropped {}", name);
        }
        Commands::ListDbs => {
            for name in client.list_databases().await? {
                println!("{}", name);
            }
        }
        Commands::Exists { name } => {
            println!("{}", client.database_exists(&name).await?);
        }
        Commands::Write {
            database,
            measurement,
            field,
            value,
            tags,
        } => {
            let point = client.new_point_with_tags(measurement, tags);
            let ts = client.write(&database, &point, &field, parse_field_value(&value))?;
            client.flush().await?;

            let stats = client.stats();
            if stats.failed_batches > 0 {
                bail!("Write to {} was rejected by the server", database);
            }
            println!("wrote {}={} at {}", field, value, ts);
        }
        Commands::Read {
            database,
            measurement,
            column,
        } => {
            for (time, value) in client.read(&database, &measurement, &column).await? {
                println!("{}\t{}", time, value);
            }
        }
        Commands::Tags {
            database,
            measurement,
        } => {
            for column in client.read_tags(&database, &measurement).await? {
                println!("{}", column);
            }
        }
        Commands::Dump {
            database,
            measurement,
            column,
        } => {
            print!("{}", client.dump(&database, &measurement, &column).await?);
        }
    }
    Ok(())
}

fn parse_tag(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

/// Type a command line value: bool, then `42i` integer, then float, else string
fn parse_field_value(s: &str) -> FieldValue {
    if let Ok(b) = s.parse::<bool>() {
        return FieldValue::Boolean(b);
    }
    if let Some(i) = s.strip_suffix('i').and_then(|n| n.parse::<i64>().ok()) {
        return FieldValue::Integer(i);
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() => FieldValue::Float(f),
        _ => FieldValue::String(s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field_value() {
        assert_eq!(parse_field_value("true"), FieldValue::Boolean(true));
        assert_eq!(parse_field_value("42i"), FieldValue::Integer(42));
        assert_eq!(parse_field_value("-3i"), FieldValue::Integer(-3));
        assert_eq!(parse_field_value("0.75"), FieldValue::Float(0.75));
        assert_eq!(parse_field_value("42"), FieldValue::Float(42.0));
        assert_eq!(parse_field_value("hi"), FieldValue::String("hi".into()));
        assert_eq!(parse_field_value("NaN"), FieldValue::String("NaN".into()));
    }

    #[test]
    fn test_parse_tag() {
        assert_eq!(parse_tag("host=a1"), Ok(("host".into(), "a1".into())));
        assert_eq!(parse_tag("path=a=b"), Ok(("path".into(), "a=b".into())));
        assert!(parse_tag("host").is_err());
        assert!(parse_tag("=a1").is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from([
            "fluxgate", "--host", "db1", "--port", "9000", "-u", "admin", "list-dbs",
        ]);
        let config = cli.client_config().unwrap();
        assert_eq!(config.base_url(), "http://db1:9000");
        assert_eq!(config.username, "admin");
        assert_eq!(config.password, "root");
    }

    #[test]
    fn test_write_command_parses_tags() {
        let cli = Cli::parse_from([
            "fluxgate", "write", "metrics", "cpu", "load", "0.5", "-t", "host=a1", "-t", "dc=east",
        ]);
        match cli.command {
            Commands::Write { tags, .. } => {
                assert_eq!(tags, vec![("host".into(), "a1".into()), ("dc".into(), "east".into())]);
            }
            _ => panic!("expected write"),
        }
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
