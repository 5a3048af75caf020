use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use endpoint_discovery::eds::{DiscoveryRequest, DiscoveryResponse};
use endpoint_discovery::http::STREAM_ENDPOINTS_PATH;

#[derive(Parser)]
#[command(name = "edsctl")]
#[command(about = "Management CLI for the endpoint discovery server", long_about = None)]
struct Cli {
    /// Admin listener
    #[arg(short, long, default_value = "http://127.0.0.1:9093")]
    admin: String,

    /// Discovery listener
    #[arg(short, long, default_value = "ws://127.0.0.1:15010")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Server version, cluster count and debug flag
    Status,
    /// Dump every cluster record with its watchers
    Dump,
    /// Recompute all clusters and push to every watcher
    Push,
    /// Toggle verbose protocol logging
    Debug {
        #[arg(value_parser = ["on", "off"])]
        state: String,
    },
    /// Subscribe to clusters and print every response
    Watch {
        #[arg(long, default_value = "edsctl")]
        node: String,
        #[arg(required = true)]
        clusters: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let edsz = format!("{}/debug/edsz", cli.admin);

    match cli.command {
        Commands::Status => {
            let res = client.get(format!("{}/debug/status", cli.admin)).send().await?;
            print_response(res).await?;
        }
        Commands::Dump => {
            print_response(client.get(&edsz).send().await?).await?;
        }
        Commands::Push => {
            let res = client.get(&edsz).query(&[("push", "1")]).send().await?;
            print_response(res).await?;
        }
        Commands::Debug { state } => {
            let flag = if state == "on" { "1" } else { "0" };
            let res = client.get(&edsz).query(&[("debug", flag)]).send().await?;
            print_response(res).await?;
        }
        Commands::Watch { node, clusters } => watch(&cli.server, &node, clusters).await?,
    }

    Ok(())
}

async fn watch(
    server: &str,
    node: &str,
    clusters: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let url = format!("{}{}", server, STREAM_ENDPOINTS_PATH);
    let (socket, _) = connect_async(url.as_str()).await?;
    let (mut sink, mut stream) = socket.split();

    let names: Vec<&str> = clusters.iter().map(String::as_str).collect();
    let request = DiscoveryRequest::subscribe(node, &names);
    sink.send(Message::Text(serde_json::to_string(&request)?.into()))
        .await?;

    while let Some(frame) = stream.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let response: DiscoveryResponse = serde_json::from_str(text.as_str())?;
        println!("version {} nonce {}", response.version_info, response.nonce);
        for assignment in response.assignments()? {
            println!("{}", serde_json::to_string_pretty(&assignment)?);
        }

        let ack = request.ack(&response);
        sink.send(Message::Text(serde_json::to_string(&ack)?.into()))
            .await?;
    }
    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: admin endpoint returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
