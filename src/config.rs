use anyhow::{Result, anyhow};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::credential_store;

pub const PASSWORD_ENV: &str = "MAILSWITCH_PASSWORD";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Append log output here instead of stderr.
    pub log_file: Option<PathBuf>,
    pub mailbox: MailboxConfig,
    pub commands: CommandConfig,
    #[serde(default)]
    pub poll: PollConfig,
    pub switch: SwitchConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MailboxConfig {
    pub host: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    pub username: String,
    /// Falls back to the keyring, then `MAILSWITCH_PASSWORD`.
    pub password: Option<String>,
    #[serde(default = "default_folder")]
    pub folder: String,
    #[serde(default = "default_holding_folder")]
    pub holding_folder: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CommandConfig {
    /// Mail from this address activates the switch.
    pub notification_sender: String,
    #[serde(default = "default_placeholder_subject")]
    pub placeholder_subject: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PollConfig {
    pub interval_secs: u64,
    pub renew_minutes: u64,
    /// Unread mail already sitting in the folder that should not count as new.
    pub new_mail_offset: u32,
    pub max_backoff_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SwitchConfig {
    pub address: String,
    pub run_minutes: u64,
    pub run_budget_minutes: Option<u64>,
    pub marker_path: PathBuf,
}

fn default_imap_port() -> u16 {
    993
}

fn default_folder() -> String {
    "INBOX".to_string()
}

fn default_holding_folder() -> String {
    "Commands".to_string()
}

fn default_placeholder_subject() -> String {
    "camera".to_string()
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            renew_minutes: 10,
            new_mail_offset: 0,
            max_backoff_secs: 300,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

impl SwitchConfig {
    pub fn run_duration(&self) -> Duration {
        Duration::from_secs(self.run_minutes * 60)
    }

    /// Longest the switch may stay on before a forced stop; defaults to the run duration.
    pub fn run_budget(&self) -> Duration {
        Duration::from_secs(self.run_budget_minutes.unwrap_or(self.run_minutes) * 60)
    }
}

impl Config {
    pub fn sample() -> Self {
        Self {
            log_file: None,
            mailbox: MailboxConfig {
                host: "imap.gmail.com".to_string(),
                port: default_imap_port(),
                username: "you@example.com".to_string(),
                password: None,
                folder: default_folder(),
                holding_folder: default_holding_folder(),
            },
            commands: CommandConfig {
                notification_sender: "notification@myq.com".to_string(),
                placeholder_subject: default_placeholder_subject(),
            },
            poll: PollConfig::default(),
            switch: SwitchConfig {
                address: "192.168.0.18".to_string(),
                run_minutes: 5,
                run_budget_minutes: None,
                marker_path: PathBuf::from("on.status"),
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll.interval_secs == 0 {
            return Err(anyhow!("poll.interval_secs must be at least 1"));
        }
        if self.switch.run_minutes == 0 {
            return Err(anyhow!("switch.run_minutes must be at least 1"));
        }
        if self.commands.notification_sender.trim().is_empty() {
            return Err(anyhow!("commands.notification_sender is empty"));
        }
        Ok(())
    }

    /// Password from the file, else the keyring, else the environment.
    pub fn resolve_password(&self) -> Result<String> {
        if let Some(p) = &self.mailbox.password {
            return Ok(p.clone());
        }
        match credential_store::load_password(&self.mailbox.username) {
            Ok(Some(p)) => return Ok(p),
            Ok(None) => {}
            Err(e) => warn!("keyring unavailable: {e}"),
        }
        std::env::var(PASSWORD_ENV).map_err(|_| {
            anyhow!(
                "no password for {}: set mailbox.password, run `set-password`, or export {}",
                self.mailbox.username,
                PASSWORD_ENV
            )
        })
    }
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow!("no config dir available"))?
        .join("mailswitch"))
}

pub fn config_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("config.toml");
    Ok(p)
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_path()?,
    };
    if !path.exists() {
        // create a template config for users to edit
        let tom = toml::to_string_pretty(&Config::sample())?;
        fs::write(&path, tom)?;
        return Err(anyhow!(
            "Created template config at {} - edit it and run again",
            path.display()
        ));
    }
    let s = fs::read_to_string(&path)?;
    parse_config(&s)
}

pub fn parse_config(s: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(s)?;
    cfg.validate()?;
    Ok(cfg)
}
