use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use serde_json::{json, Value};

use governance_console::upstream::client::encode_segment;

#[derive(Parser)]
#[command(name = "console-cli")]
#[command(about = "Command-line client for a running governance console", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8888")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the console is up
    Health,
    /// List governance policies
    Policies,
    /// List governance bundles
    Bundles,
    /// List platform users
    Users,
    /// Set or clear the assignee of a bundle stage
    Assign {
        #[arg(long)]
        bundle: String,
        #[arg(long)]
        stage: String,
        /// User id; omit to clear the assignee
        #[arg(long)]
        assignee: Option<String>,
    },
    /// Follow the progress stream of a model registration
    Watch {
        request_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{}/_stcore/health", base)).send().await?;
            println!("{}", res.status());
        }
        Commands::Policies => {
            let res = client.get(format!("{}/api/policies", base)).send().await?;
            print_response(res).await?;
        }
        Commands::Bundles => {
            let res = client.get(format!("{}/api/bundles", base)).send().await?;
            print_response(res).await?;
        }
        Commands::Users => {
            let res = client.get(format!("{}/api/users", base)).send().await?;
            print_response(res).await?;
        }
        Commands::Assign {
            bundle,
            stage,
            assignee,
        } => {
            let res = client
                .put(format!(
                    "{}/api/bundles/{}/stages/{}/assignee",
                    base,
                    encode_segment(&bundle),
                    encode_segment(&stage)
                ))
                .json(&json!({ "assigneeId": assignee }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Watch { request_id } => {
            let res = client
                .get(format!(
                    "{}/register-progress/{}",
                    base,
                    encode_segment(&request_id)
                ))
                .send()
                .await?;
            watch(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: console returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

/// Print `data:` lines of an SSE stream until the server closes it.
async fn watch(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let mut stream = res.bytes_stream();
    let mut buffer = Vec::new();

    while let Some(chunk) = stream.next().await {
        buffer.extend_from_slice(&chunk?);
        while let Some(line) = next_line(&mut buffer) {
            if let Some(data) = line.trim_end().strip_prefix("data:") {
                match serde_json::from_str::<Value>(data.trim()) {
                    Ok(event) => println!(
                        "[{:>3}] {:<10} {}",
                        event["progress"].as_u64().map(|p| p.to_string()).unwrap_or_default(),
                        event["step"].as_str().unwrap_or("-"),
                        event["message"].as_str().unwrap_or_default()
                    ),
                    Err(_) => println!("{}", data.trim()),
                }
            }
        }
    }
    println!("stream closed");
    Ok(())
}

/// Take one complete line off the front of `buffer`, decoded as UTF-8.
///
/// Bytes after the last newline stay buffered, so a character split across
/// chunks is decoded whole once the rest arrives.
fn next_line(buffer: &mut Vec<u8>) -> Option<String> {
    let end = buffer.iter().position(|&b| b == b'\n')?;
    let line: Vec<u8> = buffer.drain(..=end).collect();
    Some(String::from_utf8_lossy(&line).into_owned())
}
