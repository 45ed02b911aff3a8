use clap::Parser;
use log::{error, info, warn};
use server::admin::AdminCommand;
use server::config::{BindAddress, ServerProperties};
use server::host::InMemoryHost;
use server::service::QueryService;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Command line arguments. Anything given here overrides server.properties.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Properties file to read server-ip, server-port, minequery-port and max-players from
    #[clap(long, default_value = "server.properties")]
    properties: PathBuf,
    /// Address to bind the query listener to ("any" for all interfaces)
    #[clap(short = 'H', long)]
    bind: Option<String>,
    /// Port the query listener binds to
    #[clap(short, long)]
    port: Option<u16>,
    /// Game server port reported to clients
    #[clap(long)]
    server_port: Option<u16>,
    /// Maximum player count reported to clients
    #[clap(long)]
    max_players: Option<u32>,
    /// Player to list as online (repeatable)
    #[clap(long = "player")]
    players: Vec<String>,
    /// Permission groups as player=primary,other,... (repeatable)
    #[clap(long = "group", value_parser = parse_group_spec)]
    groups: Vec<(String, Vec<String>)>,
    /// Seconds a client may take to send its request line (0 disables)
    #[clap(long, default_value = "10")]
    read_timeout: u64,
    /// Longest accepted request line in bytes
    #[clap(long, default_value = "256")]
    max_line_length: usize,
    /// Maximum concurrent connection handlers
    #[clap(long, default_value = "256")]
    max_connections: usize,
    /// Start with debug logging of requests and connection errors
    #[clap(long, default_value = "true", action = clap::ArgAction::Set)]
    debug: bool,
}

fn parse_group_spec(spec: &str) -> Result<(String, Vec<String>), String> {
    let (player, groups) = spec
        .split_once('=')
        .ok_or_else(|| format!("expected player=group,... but got {:?}", spec))?;

    let groups: Vec<String> = groups
        .split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect();

    if player.trim().is_empty() || groups.is_empty() {
        return Err(format!("expected player=group,... but got {:?}", spec));
    }
    Ok((player.trim().to_string(), groups))
}

/// Main-method of the application.
/// Loads configuration, starts the query service and reads console commands
/// until stopped.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let properties = ServerProperties::load_or_default(&args.properties)?;

    let mut config = properties
        .listener_config()
        .with_max_line_length(args.max_line_length)
        .with_max_connections(args.max_connections);
    if let Some(bind) = &args.bind {
        config.bind_address = bind.parse::<BindAddress>()?;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config = if args.read_timeout == 0 {
        config.without_read_timeout()
    } else {
        config.with_read_timeout(Duration::from_secs(args.read_timeout))
    };

    let host = InMemoryHost::new(
        args.server_port.unwrap_or(properties.server_port),
        args.max_players.unwrap_or(properties.max_players),
    )
    .with_players(args.players.iter().cloned());
    for (player, groups) in &args.groups {
        host.set_groups(player.as_str(), groups[0].as_str(), groups.clone());
    }

    let mut service = QueryService::new(config, Arc::new(host), args.debug);

    // A failed start is already logged; keep the console up so the port can
    // be changed and the listener reloaded
    if service.start().await.is_err() {
        warn!("Minequery is not listening. Use \"minequery port <n>\" and \"minequery reload\".");
    }

    let mut console = BufReader::new(tokio::io::stdin()).lines();
    let mut console_open = true;

    loop {
        tokio::select! {
            line = console.next_line(), if console_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match AdminCommand::parse(&line) {
                    Ok(AdminCommand::Stop) => break,
                    Ok(command) => match command.execute(&mut service).await {
                        Ok(reply) => info!("{}", reply),
                        Err(e) => error!("{}", e),
                    },
                    Err(e) => warn!("{}", e),
                },
                Ok(None) => {
                    info!("Console closed, running until Ctrl+C");
                    console_open = false;
                }
                Err(e) => {
                    error!("Failed to read console: {}", e);
                    console_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down gracefully...");
                break;
            }
        }
    }

    service.stop().await;
    Ok(())
}
