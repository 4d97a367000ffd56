use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use mailswitch::auth::credential_store;
use mailswitch::config::{Config, load_config};
use mailswitch::daemon::{MailPoller, run_daemon};
use mailswitch::mail::Mailbox;
use mailswitch::mail::imap_client::ImapMailbox;
use mailswitch::switch::controller::{StartOutcome, SwitchController};
use mailswitch::switch::marker::{SwitchMarker, SwitchState};
use mailswitch::switch::wemo::WemoDriver;

const DEVICE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "mailswitch")]
#[command(about = "Drive a timed switch from command mail", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/mailswitch/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the mailbox forever (the default)
    Daemon,

    /// Run one activation in the foreground and wait for it to finish
    SwitchOn,

    /// Turn the switch off now and clear the marker
    SwitchOff,

    /// Print whether the marker says the switch is on
    Status,

    /// Store the mailbox password in the keyring
    SetPassword {
        #[arg(long)]
        username: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.cmd.unwrap_or(Command::Daemon) {
        Command::SetPassword { username } => set_password(&username),
        cmd => {
            let cfg = load_config(cli.config.as_deref())
                .map_err(|e| anyhow!("Configuration error: {e}"))?;
            init_logging(cfg.log_file.as_deref())?;
            let controller = Arc::new(build_controller(&cfg)?);
            run(cmd, &cfg, controller)
        }
    }
}

fn run(cmd: Command, cfg: &Config, controller: Arc<SwitchController>) -> Result<()> {
    match cmd {
        Command::Daemon => {
            let password = cfg.resolve_password()?;
            let mut mailbox = ImapMailbox::new(&cfg.mailbox, password);
            if let Err(e) = mailbox.login() {
                warn!("initial login failed, will retry: {e}");
            }
            let poller =
                MailPoller::from_config(cfg, mailbox, Arc::clone(&controller), SystemTime::now());
            info!("Running mailswitch...");
            run_daemon(poller, controller)
        }

        Command::SwitchOn => {
            if controller.start()? == StartOutcome::Started {
                controller.wait();
            }
            Ok(())
        }

        Command::SwitchOff => {
            controller.stop()?;
            Ok(())
        }

        Command::Status => {
            match controller.state()? {
                SwitchState::Off => println!("off"),
                SwitchState::On { since } => {
                    let on_for = SystemTime::now().duration_since(since).unwrap_or_default();
                    println!("on for {}s", on_for.as_secs());
                }
            }
            Ok(())
        }

        Command::SetPassword { username } => set_password(&username),
    }
}

fn set_password(username: &str) -> Result<()> {
    eprintln!("Paste mailbox password (end with Ctrl-D):");
    let mut secret = String::new();
    std::io::Read::read_to_string(&mut std::io::stdin(), &mut secret)?;
    credential_store::save_password(username, secret.trim())?;
    println!("Saved password for {}", username);
    Ok(())
}

fn build_controller(cfg: &Config) -> Result<SwitchController> {
    let driver = WemoDriver::new(cfg.switch.address.clone(), DEVICE_TIMEOUT)?;
    Ok(SwitchController::new(
        Arc::new(driver),
        SwitchMarker::new(&cfg.switch.marker_path),
        cfg.switch.run_duration(),
    ))
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}
