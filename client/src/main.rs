use clap::{Parser, Subcommand};
use client::network::QueryClient;
use shared::Request;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Minequery address to query
    #[arg(short = 's', long, default_value = "127.0.0.1:25566")]
    server: String,

    /// Seconds to wait for a response
    #[arg(short = 't', long, default_value = "5")]
    timeout: u64,

    /// Print the response exactly as received
    #[arg(short = 'r', long)]
    raw: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plain-text status (QUERY)
    Status,
    /// JSON status (QUERY_JSON)
    Json,
    /// Permission groups of a player (QUERY_RANKS:<player>)
    Ranks { player: String },
    /// Send an arbitrary request line
    Send { line: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    let args = Args::parse();
    let client = QueryClient::new(args.server.as_str(), Duration::from_secs(args.timeout));

    let line = match &args.command {
        Command::Status => Request::Query.to_string(),
        Command::Json => Request::QueryJson.to_string(),
        Command::Ranks { player } => Request::QueryRanks {
            player: player.clone(),
        }
        .to_string(),
        Command::Send { line } => line.clone(),
    };

    if args.raw {
        print!("{}", client.send_line(&line).await?);
        return Ok(());
    }

    match &args.command {
        Command::Status => {
            let status = client.status().await?;
            println!("Server port: {}", status.server_port);
            println!("Players:     {}/{}", status.player_count, status.max_players);
            println!("Online:      {}", status.player_list.join(", "));
        }
        Command::Json => {
            let status = client.status_json().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Ranks { player } => {
            let ranks = client.ranks(player).await?;
            println!("{} primary group: {}", player, ranks.primary);
            println!("Other groups: {}", ranks.others.join(", "));
        }
        Command::Send { .. } => {
            let response = client.send_line(&line).await?;
            if response.is_empty() {
                println!("(no response)");
            } else {
                print!("{}", response);
            }
        }
    }

    Ok(())
}
