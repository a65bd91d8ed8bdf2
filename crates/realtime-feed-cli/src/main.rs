//! realtime-feed command-line tool
//!
//! Replays newline-delimited JSON frames through a change feed subscription
//! and prints the normalized change events as JSON lines.

use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use realtime_feed_client::{
    start_dispatcher, ChangeFeedClient, ClientConfig, Frame, LocalTransport, ReplyStatus,
    Channel, SubscriptionState,
};
use realtime_feed_proto::{ChangeEvent, EventFilter, DEFAULT_TOPIC_PREFIX};

/// realtime-feed frame replay
#[derive(Parser, Debug)]
#[command(name = "realtime-feed")]
#[command(version, about = "Replay row-change frames through a change feed subscription")]
pub struct Args {
    /// Schema to subscribe to
    #[arg(short, long, default_value = "public")]
    pub schema: String,

    /// Table to subscribe to ('*' for every table of the schema)
    #[arg(short, long, default_value = "*")]
    pub table: String,

    /// Event to listen for (INSERT, UPDATE, DELETE or '*')
    #[arg(short, long, default_value = "*")]
    pub event: EventFilter,

    /// Topic prefix
    #[arg(long, default_value = DEFAULT_TOPIC_PREFIX)]
    pub prefix: String,

    /// Column types to leave unconverted (repeatable)
    #[arg(long = "skip-type")]
    pub skip_types: Vec<String>,

    /// Read frames from file instead of stdin
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Acknowledge the join before reading frames
    #[arg(long)]
    pub auto_join: bool,

    /// Frame buffer size
    #[arg(long, default_value_t = 256)]
    pub buffer: usize,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "realtime_feed=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::new(&args.prefix).with_skip_types(args.skip_types.clone());
    let transport = LocalTransport::new();

    let channel = ChangeFeedClient::with_config(&transport, &config, &args.schema, &args.table)
        .on(args.event, print_event)
        .subscribe_with(|status, error| match status {
            SubscriptionState::SubscriptionError => {
                tracing::warn!(status = %status, error = ?error, "subscription status")
            }
            _ => tracing::info!(status = %status, "subscription status"),
        });
    let topic = channel.topic().to_string();

    tracing::info!(topic = %topic, event = %args.event, "listening");

    if args.auto_join {
        transport.reply(&topic, ReplyStatus::Ok, None);
    }

    let (handle, task) = start_dispatcher(transport.clone(), args.buffer);

    let reader: Box<dyn AsyncBufRead + Unpin> = match &args.input {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let mut lines = reader.lines();
    let mut line_no = 0usize;
    let mut skipped = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        match parse_line(&line) {
            None => {}
            Some(Ok(frame)) => handle.send(frame).await?,
            Some(Err(e)) => {
                skipped += 1;
                tracing::warn!(line = line_no, error = %e, "skipping malformed frame");
            }
        }
    }

    drop(handle);
    let applied = task.await?;

    tracing::info!(lines = line_no, applied, skipped, "replay finished");
    Ok(())
}

/// Parse one input line. Blank lines and `#` comments yield `None`.
fn parse_line(line: &str) -> Option<Result<Frame, realtime_feed_client::Error>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(Frame::from_json(line))
}

fn print_event(event: ChangeEvent) {
    match serde_json::to_string(&event) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!(error = %e, "failed to encode change event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::try_parse_from(["realtime-feed"]).unwrap();
        assert_eq!(args.schema, "public");
        assert_eq!(args.table, "*");
        assert_eq!(args.event, EventFilter::All);
        assert_eq!(args.prefix, DEFAULT_TOPIC_PREFIX);
        assert!(!args.auto_join);
    }

    #[test]
    fn test_args_parsing() {
        let args = Args::try_parse_from([
            "realtime-feed",
            "--table",
            "todos",
            "--event",
            "delete",
            "--skip-type",
            "int8",
            "--skip-type",
            "jsonb",
            "--auto-join",
        ])
        .unwrap();
        assert_eq!(args.table, "todos");
        assert_eq!(args.event, EventFilter::Delete);
        assert_eq!(args.skip_types, vec!["int8", "jsonb"]);
        assert!(args.auto_join);
    }

    #[test]
    fn test_parse_line() {
        assert!(parse_line("").is_none());
        assert!(parse_line("   # comment").is_none());
        assert!(matches!(
            parse_line(r#"{"kind":"close","topic":"realtime:public"}"#),
            Some(Ok(Frame::Close { .. }))
        ));
        assert!(matches!(parse_line("{oops"), Some(Err(_))));
    }
}
