//! paperbotctl - Command line client for the PaperBot gateway
//!
//! Checks gateway health, fetches JSON resources, and follows long-running
//! workflow streams as normalized events.

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde_json::{Value, json};

use paperbot::client::GatewayClient;
use paperbot_protocol::{EventKind, NormalizedSseEvent};

const DEFAULT_SERVER_URL: &str = "http://localhost:3000";

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "Error: {err:?}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[tokio::main]
async fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let client = GatewayClient::new(&cli.server);

    match cli.command {
        Command::Status => handle_status(&client, cli.json).await,
        Command::Get { path } => handle_get(&client, &path, cli.json).await,
        Command::Stream {
            path,
            body,
            workflow,
        } => {
            let body = body
                .as_deref()
                .map(serde_json::from_str::<Value>)
                .transpose()
                .context("parsing --body as JSON")?;
            handle_stream(&client, &path, body.as_ref(), &workflow, cli.json).await
        }
        Command::Search {
            queries,
            max_results,
        } => {
            let body = json!({"queries": queries, "max_results": max_results});
            handle_stream(
                &client,
                "/api/research/paperscool/search",
                Some(&body),
                "topic_search",
                cli.json,
            )
            .await
        }
        Command::Daily { queries, body } => {
            let body = match body.as_deref() {
                Some(raw) => serde_json::from_str(raw).context("parsing --body as JSON")?,
                None if queries.is_empty() => json!({}),
                None => json!({"queries": queries}),
            };
            handle_stream(
                &client,
                "/api/research/paperscool/daily",
                Some(&body),
                "daily_report",
                cli.json,
            )
            .await
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "paperbotctl",
    author,
    version,
    about = "Command line client for the PaperBot gateway."
)]
struct Cli {
    /// Gateway URL
    #[arg(long, short = 's', default_value = DEFAULT_SERVER_URL, env = "PAPERBOT_SERVER_URL")]
    server: String,

    /// Output machine-readable JSON (one event per line when streaming)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check gateway health
    Status,

    /// GET a gateway path and print the JSON body
    Get {
        /// Path including the /api prefix, e.g. /api/research/tracks
        path: String,
    },

    /// Follow a workflow stream
    Stream {
        /// Path including the /api prefix
        path: String,
        /// JSON request body; sends a POST when given, otherwise a GET
        #[arg(long)]
        body: Option<String>,
        /// Workflow name used when events do not carry one
        #[arg(long, default_value = "stream")]
        workflow: String,
    },

    /// Run a topic search and follow its progress
    Search {
        /// Search queries
        #[arg(required = true)]
        queries: Vec<String>,
        /// Maximum results per query
        #[arg(long = "max", short = 'n', default_value = "20")]
        max_results: u32,
    },

    /// Build the daily report and follow its progress
    Daily {
        /// Topic query to include (repeatable)
        #[arg(long = "query", short = 'q')]
        queries: Vec<String>,
        /// Full JSON request body; overrides --query
        #[arg(long, conflicts_with = "queries")]
        body: Option<String>,
    },
}

async fn handle_status(client: &GatewayClient, json: bool) -> Result<()> {
    let response = client.get("/api/health").await?;

    if response.status().is_success() {
        let health: Value = response.json().await.context("decoding health response")?;
        if json {
            println!(
                "{}",
                json!({"status": "ok", "server": client.base_url(), "version": health["version"]})
            );
        } else {
            println!(
                "Gateway is running at {} (version {})",
                client.base_url(),
                health["version"].as_str().unwrap_or("unknown")
            );
        }
    } else if json {
        println!(
            "{}",
            json!({"status": "error", "code": response.status().as_u16()})
        );
    } else {
        println!("Gateway returned error: {}", response.status());
    }
    Ok(())
}

async fn handle_get(client: &GatewayClient, path: &str, json: bool) -> Result<()> {
    let response = client.get(path).await?;
    let status = response.status();
    let body = response.text().await.context("reading response body")?;

    if !status.is_success() {
        anyhow::bail!("Request failed ({}): {}", status, body);
    }

    if json {
        println!("{}", body);
    } else {
        match serde_json::from_str::<Value>(&body) {
            Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            Err(_) => println!("{}", body),
        }
    }
    Ok(())
}

async fn handle_stream(
    client: &GatewayClient,
    path: &str,
    body: Option<&Value>,
    workflow: &str,
    json: bool,
) -> Result<()> {
    let mut events = client.stream_events(path, body, workflow).await?;
    let mut stdout = io::stdout();

    while let Some(event) = events.next().await {
        let event = event.context("reading event stream")?;
        if json {
            writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
        } else {
            writeln!(stdout, "{}", render_event(&event))?;
        }
        stdout.flush()?;

        if event.is_terminal() {
            break;
        }
    }
    Ok(())
}

/// One human-readable line per event.
fn render_event(event: &NormalizedSseEvent) -> String {
    let mut line = format!("[{}] {}", event.envelope.workflow, event.event);
    if let Some(phase) = &event.envelope.phase {
        line.push_str(&format!(" ({phase})"));
    }
    if event.envelope.event != event.event.as_str() {
        line.push_str(&format!(" {}", event.envelope.event));
    }

    match (&event.message, event.event) {
        (Some(message), _) => {
            line.push_str(": ");
            line.push_str(message);
        }
        (None, EventKind::Result) if !event.data.is_null() => {
            line.push_str(": ");
            line.push_str(&event.data.to_string());
        }
        _ => {}
    }
    line
}
