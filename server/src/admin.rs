//! Console commands for operating the query service
//!
//! Lines typed on the server console are parsed into an [`AdminCommand`] and
//! executed against the running [`QueryService`]:
//!
//! ```text
//! minequery port <n>      set the port used by the next reload
//! minequery port          show the configured port
//! minequery toggledebug   flip debug logging
//! minequery reload        rebind the listener
//! minequery status        show listener state
//! players                 list online players
//! players add <name>      mark a player online
//! players remove <name>   mark a player offline
//! stop                    shut the server down
//! ```

use crate::error::AdminError;
use crate::host::{HostState, InMemoryHost};
use crate::service::QueryService;
use log::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    SetPort(u16),
    ShowPort,
    ToggleDebug,
    Reload,
    Status,
    ListPlayers,
    AddPlayer(String),
    RemovePlayer(String),
    Stop,
}

impl AdminCommand {
    /// Parses one console line. Keywords are case-insensitive.
    pub fn parse(line: &str) -> Result<AdminCommand, AdminError> {
        let args: Vec<&str> = line.split_whitespace().collect();
        let lower: Vec<String> = args.iter().map(|a| a.to_ascii_lowercase()).collect();
        let lower: Vec<&str> = lower.iter().map(String::as_str).collect();

        match lower.as_slice() {
            ["minequery", "port", _] => args[2]
                .parse()
                .map(AdminCommand::SetPort)
                .map_err(|_| AdminError::InvalidPort(args[2].to_string())),
            ["minequery", "port"] => Ok(AdminCommand::ShowPort),
            ["minequery", "toggledebug"] => Ok(AdminCommand::ToggleDebug),
            ["minequery", "reload"] => Ok(AdminCommand::Reload),
            ["minequery", "status"] => Ok(AdminCommand::Status),
            ["minequery", ..] => Err(AdminError::Usage(
                "minequery <port [n] | toggledebug | reload | status>",
            )),
            ["players"] => Ok(AdminCommand::ListPlayers),
            ["players", "add", _] => Ok(AdminCommand::AddPlayer(args[2].to_string())),
            ["players", "remove", _] => Ok(AdminCommand::RemovePlayer(args[2].to_string())),
            ["players", ..] => Err(AdminError::Usage("players [add <name> | remove <name>]")),
            ["stop"] | ["exit"] => Ok(AdminCommand::Stop),
            _ => Err(AdminError::UnknownCommand(line.trim().to_string())),
        }
    }

    /// Runs the command and returns the reply for the console.
    ///
    /// [`AdminCommand::Stop`] is left to the caller; here it only
    /// acknowledges.
    pub async fn execute(
        &self,
        service: &mut QueryService<InMemoryHost>,
    ) -> Result<String, AdminError> {
        let reply = match self {
            AdminCommand::SetPort(port) => {
                service.set_port(*port);
                format!(
                    "Minequery port set to {}. Reload required for changes to take effect.",
                    port
                )
            }
            AdminCommand::ShowPort => format!("Minequery is listening on port {}", service.port()),
            AdminCommand::ToggleDebug => format!("Debug set to {}", service.toggle_debug()),
            AdminCommand::Reload => {
                info!("Reloading Minequery...");
                let addr = service.reload().await?;
                format!("Done reloading! Listening on {}", addr)
            }
            AdminCommand::Status => match service.local_addr() {
                Some(addr) => format!(
                    "Minequery is running on {} (debug {})",
                    addr,
                    service.is_debugging()
                ),
                None => format!(
                    "Minequery is stopped (configured port {})",
                    service.port()
                ),
            },
            AdminCommand::ListPlayers => {
                let snapshot = service.host().snapshot();
                format!(
                    "{}/{} players online: [{}]",
                    snapshot.player_count(),
                    snapshot.max_players,
                    snapshot.online_players.join(", ")
                )
            }
            AdminCommand::AddPlayer(name) => {
                if service.host().add_player(name.as_str()) {
                    format!("{} is now online", name)
                } else {
                    format!("{} is already online", name)
                }
            }
            AdminCommand::RemovePlayer(name) => {
                if service.host().remove_player(name) {
                    format!("{} is now offline", name)
                } else {
                    format!("{} is not online", name)
                }
            }
            AdminCommand::Stop => "Stopping server...".to_string(),
        };
        Ok(reply)
    }
}
