//! Chronicle CLI - inspect clusters and streams from the command line

use anyhow::{bail, Context};
use chronicle_client::{
    Client, EventData, ExpectedRevision, ReadStreamOptions, StreamPosition,
};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chronicle")]
#[command(about = "Chronicle - cluster-aware event store client")]
#[command(version)]
struct Cli {
    /// Connection string, e.g. chronicle://node1:2113,node2:2113?tls=false
    #[arg(
        short,
        long,
        global = true,
        env = "CHRONICLE_CONNECTION",
        default_value = "chronicle://localhost:2113?tls=false"
    )]
    connection: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show cluster membership as seen by the selected node
    Gossip,

    /// Append one event to a stream
    Append {
        /// Stream name
        stream: String,

        /// Event type
        #[arg(short = 't', long)]
        event_type: String,

        /// Event payload (JSON unless --binary)
        data: String,

        /// Store the payload as opaque bytes
        #[arg(long)]
        binary: bool,

        /// Expected revision: any, no-stream, exists or a number
        #[arg(short, long, default_value = "any")]
        expected: String,
    },

    /// Read events from a stream
    Read {
        /// Stream name
        stream: String,

        /// Start position: start, end or a revision number
        #[arg(short, long, default_value = "start")]
        from: String,

        /// Read backwards
        #[arg(short, long)]
        backwards: bool,

        /// Maximum events to read
        #[arg(short, long, default_value = "100")]
        max: u64,

        /// Route the read to the leader only
        #[arg(long)]
        leader: bool,
    },
}

fn parse_expected(value: &str) -> anyhow::Result<ExpectedRevision> {
    Ok(match value.to_ascii_lowercase().as_str() {
        "any" => ExpectedRevision::Any,
        "no-stream" => ExpectedRevision::NoStream,
        "exists" => ExpectedRevision::StreamExists,
        n => ExpectedRevision::Exact(
            n.parse()
                .with_context(|| format!("invalid expected revision '{}'", value))?,
        ),
    })
}

fn parse_position(value: &str) -> anyhow::Result<StreamPosition> {
    Ok(match value.to_ascii_lowercase().as_str() {
        "start" => StreamPosition::Start,
        "end" => StreamPosition::End,
        n => StreamPosition::Revision(
            n.parse()
                .with_context(|| format!("invalid start position '{}'", value))?,
        ),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let client = Client::from_connection_string(&cli.connection)
        .with_context(|| format!("invalid connection string '{}'", cli.connection))?;
    debug!("Connecting with {:?}", client.settings());

    match cli.command {
        Commands::Gossip => {
            let topology = client.cluster_info().await?;
            if topology.is_empty() {
                println!("No members reported");
            }
            for member in topology.members() {
                println!(
                    "{:<32} {:<20} alive={:<5} last_seen={}",
                    member.endpoint.to_string(),
                    format!("{:?}", member.state),
                    member.is_alive,
                    member.last_seen
                );
            }
        }

        Commands::Append {
            stream,
            event_type,
            data,
            binary,
            expected,
        } => {
            let expected = parse_expected(&expected)?;
            let event = if binary {
                EventData::binary(event_type, data.into_bytes())
            } else {
                let payload: serde_json::Value =
                    serde_json::from_str(&data).context("payload is not valid JSON")?;
                EventData::json(event_type, &payload)?
            };
            let id = event.id;

            let result = client
                .append_to_stream(&stream, expected, vec![event])
                .await?;
            println!(
                "✓ Appended {} to '{}' (revision {})",
                id, stream, result.next_expected_revision
            );
            if let Some(position) = result.position {
                println!("  Position: {}/{}", position.commit, position.prepare);
            }
        }

        Commands::Read {
            stream,
            from,
            backwards,
            max,
            leader,
        } => {
            if max == 0 {
                bail!("--max must be at least 1");
            }
            let mut options = ReadStreamOptions::default()
                .position(parse_position(&from)?)
                .max_count(max)
                .requires_leader(leader);
            if backwards {
                options = options.backwards();
            }

            let events = client.read_stream(&stream, options).await?;
            if events.is_empty() {
                println!("No events in '{}'", stream);
            }
            for resolved in &events {
                let Some(event) = resolved.get_event() else {
                    continue;
                };
                let body = if event.is_json() {
                    String::from_utf8_lossy(&event.data).into_owned()
                } else {
                    format!("<{} bytes>", event.data.len())
                };
                println!(
                    "{:>6}  {:<24} {}  {}",
                    event.revision, event.event_type, event.id, body
                );
            }
        }
    }

    client.shutdown();
    Ok(())
}
