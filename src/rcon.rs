//! Command channel to the game server.
//!
//! All interaction with the live server goes through an external rcon binary
//! that speaks the wire protocol; we exec it once per command and read its
//! stdout. [`CommandChannel`] is the seam the monitor depends on, so tests
//! (and any future transport) can substitute a scripted implementation.

use crate::error::{CommandError, CommandResult};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::warn;

/// One connected player, as reported by the server.
///
/// Only the count matters to the monitor today; the identity fields are
/// parsed and exposed for consumers such as status displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Display name.
    pub name: String,
    /// Server-assigned numeric player id.
    pub player_uid: u64,
    /// Platform account id (e.g. a Steam id).
    pub account_id: u64,
}

/// Commands executable against the live server.
///
/// All provided methods route through [`run_command`](Self::run_command);
/// implementations only supply transport. Every failure is a connectivity
/// failure from the monitor's point of view.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Execute a raw command and return its text output.
    async fn run_command(&self, command: &str) -> CommandResult<String>;

    /// Fetch the server header / version banner.
    async fn get_info(&self) -> CommandResult<String> {
        self.run_command("info").await
    }

    /// Fetch the current player list.
    async fn get_players(&self) -> CommandResult<Vec<Player>> {
        let output = self.run_command("showplayers").await?;
        Ok(parse_players(&output))
    }

    /// Request a world save.
    async fn save(&self) -> CommandResult<()> {
        self.run_command("save").await.map(|_| ())
    }

    /// Broadcast a message to all connected players.
    async fn broadcast(&self, message: &str) -> CommandResult<()> {
        self.run_command(&format!("broadcast {message}"))
            .await
            .map(|_| ())
    }

    /// Ask the server to shut down after `grace_secs`, tagged with `reason`.
    async fn shutdown(&self, grace_secs: u32, reason: &str) -> CommandResult<()> {
        self.run_command(&format!("shutdown {grace_secs} {reason}"))
            .await
            .map(|_| ())
    }
}

/// Parse `showplayers` output: a header line followed by one
/// `name,playeruid,steamid` line per player.
///
/// Malformed lines are skipped with a warning rather than failing the poll;
/// a single garbled row must not make the whole server look empty or
/// offline.
pub fn parse_players(output: &str) -> Vec<Player> {
    output
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match parse_player_line(line) {
            Some(player) => Some(player),
            None => {
                warn!(line, "Skipping malformed player row");
                None
            }
        })
        .collect()
}

fn parse_player_line(line: &str) -> Option<Player> {
    let mut fields = line.rsplitn(3, ',');
    let account_id = fields.next()?.trim().parse().ok()?;
    let player_uid = fields.next()?.trim().parse().ok()?;
    let name = fields.next()?.to_string();
    Some(Player {
        name,
        player_uid,
        account_id,
    })
}

/// Production channel: spawns the configured rcon binary per command.
pub struct RconProcess {
    path: PathBuf,
}

impl RconProcess {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl CommandChannel for RconProcess {
    async fn run_command(&self, command: &str) -> CommandResult<String> {
        let output = tokio::process::Command::new(&self.path)
            .arg(command)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() {
                String::from_utf8_lossy(&output.stdout).into_owned()
            } else {
                stderr.into_owned()
            };
            return Err(CommandError::Failed {
                output: detail,
                code: output.status.code().unwrap_or(-1),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
