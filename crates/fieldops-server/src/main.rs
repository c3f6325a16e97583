//! `FieldOps` operator CLI
//!
//! Drives the auth and asset services against a local database. Codes are
//! printed instead of sent by SMS.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use fieldops_core::SystemClock;
use fieldops_core::config::{self, Config};
use fieldops_core::tracing_init::init_tracing;
use fieldops_server::assets::ReviewAction;
use fieldops_server::storage::{FieldDatabase, Machine, Role, User};
use fieldops_server::{AssetService, AuthService, Directory};

#[derive(Parser, Debug)]
#[command(name = "fieldops")]
#[command(version, about = "FieldOps operator CLI - logins, sessions and machine review")]
struct Cli {
    /// Explicit config file (JSON).
    #[arg(long, env = "FIELDOPS_CONFIG")]
    config: Option<PathBuf>,

    /// Path to SQLite database file.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the first admin account
    BootstrapAdmin {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
    },
    /// Issue a login code and print it
    RequestOtp {
        #[arg(long)]
        phone: String,
        /// Refuse unless the account has this role (e.g. WARDEN)
        #[arg(long)]
        role: Option<Role>,
    },
    /// Exchange a login code for a session token
    VerifyOtp {
        #[arg(long)]
        phone: String,
        #[arg(long)]
        code: String,
    },
    /// Show the user a session token belongs to
    Whoami {
        #[arg(long, env = "FIELDOPS_TOKEN")]
        token: String,
    },
    /// List serial claims waiting for review (admin)
    PendingClaims {
        #[arg(long, env = "FIELDOPS_TOKEN")]
        token: String,
    },
    /// Approve or reject a serial claim (admin)
    Review {
        #[arg(long, env = "FIELDOPS_TOKEN")]
        token: String,
        /// Machine ID
        machine: String,
        decision: Decision,
        /// Serial to approve instead of the claimed one
        #[arg(long)]
        serial: Option<String>,
        /// Rejection reason
        #[arg(long)]
        reason: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Decision {
    Approve,
    Reject,
}

struct Services {
    auth: AuthService,
    assets: AssetService,
    directory: Directory,
}

impl Services {
    fn new(db: &FieldDatabase, config: &Config) -> Self {
        let clock = Arc::new(SystemClock);
        Self {
            auth: AuthService::new(db.clone(), clock.clone(), config.auth.clone()),
            assets: AssetService::new(db.clone(), clock.clone(), config.registry.clone()),
            directory: Directory::new(db.clone(), clock),
        }
    }

    async fn session_user(&self, token: &str) -> anyhow::Result<User> {
        let header = format!("Bearer {token}");
        Ok(self.auth.require_user(Some(&header)).await?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(path) = cli.db_path.clone() {
        config.server.database_path = Some(path);
    }
    if cli.log_json {
        config.server.log_json = true;
    }

    init_tracing(&config.server.log_level, config.server.log_json);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting fieldops");

    let db_path = match config.server.database_path.clone() {
        Some(path) => path,
        None => config::database_path().context("Cannot determine database path")?,
    };
    info!(path = %db_path.display(), "Opening field database");
    let db = FieldDatabase::open(&db_path).await?;

    let services = Services::new(&db, &config);
    run(&services, cli.command, cli.json).await
}

async fn run(services: &Services, command: Command, json: bool) -> anyhow::Result<()> {
    let mut out = io::stdout();
    match command {
        Command::BootstrapAdmin { name, phone } => {
            let admin = services.directory.bootstrap_admin(&name, &phone).await?;
            write_user(&mut out, &admin, json)?;
        }
        Command::RequestOtp { phone, role } => {
            let issued = services.auth.request_otp(&phone, role).await?;
            if json {
                let value = serde_json::json!({
                    "code": issued.code,
                    "expires_at": issued.expires_at,
                });
                writeln!(out, "{value}")?;
            } else {
                writeln!(out, "Code: {}", issued.code)?;
                writeln!(out, "Expires at: {}", issued.expires_at)?;
            }
        }
        Command::VerifyOtp { phone, code } => {
            let session = services.auth.verify_otp(&phone, &code).await?;
            if json {
                let value = serde_json::json!({
                    "token": session.token,
                    "expires_at": session.expires_at,
                    "user": session.user,
                });
                writeln!(out, "{value}")?;
            } else {
                writeln!(out, "Token: {}", session.token)?;
                writeln!(out, "Expires at: {}", session.expires_at)?;
                write_user(&mut out, &session.user, false)?;
            }
        }
        Command::Whoami { token } => {
            let user = services.session_user(&token).await?;
            write_user(&mut out, &user, json)?;
        }
        Command::PendingClaims { token } => {
            let admin = services.session_user(&token).await?;
            let claims = services.assets.list_pending_claims(&admin).await?;
            write_machines(&mut out, &claims, json)?;
        }
        Command::Review {
            token,
            machine,
            decision,
            serial,
            reason,
        } => {
            let admin = services.session_user(&token).await?;
            let action = match decision {
                Decision::Approve => ReviewAction::Approve {
                    approved_serial: serial,
                },
                Decision::Reject => ReviewAction::Reject { reason },
            };
            let reviewed = services
                .assets
                .review_claim(&admin, &machine, action)
                .await?;
            write_machines(&mut out, std::slice::from_ref(&reviewed), json)?;
        }
    }
    Ok(())
}

fn write_user(out: &mut impl Write, user: &User, json: bool) -> anyhow::Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string(user)?)?;
        return Ok(());
    }
    writeln!(out, "User:   {}", user.id)?;
    writeln!(out, "Name:   {}", user.full_name)?;
    writeln!(out, "Phone:  {}", user.phone)?;
    writeln!(out, "Role:   {}", user.role)?;
    writeln!(out, "Active: {}", user.is_active)?;
    Ok(())
}

fn write_machines(out: &mut impl Write, machines: &[Machine], json: bool) -> anyhow::Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(machines)?)?;
        return Ok(());
    }
    if machines.is_empty() {
        writeln!(out, "No machines found.")?;
        return Ok(());
    }
    writeln!(
        out,
        "{:<36}  {:<20}  {:<10}  {:<16}  CLAIMED",
        "ID", "TEMP CODE", "STATUS", "SERIAL"
    )?;
    for m in machines {
        writeln!(
            out,
            "{:<36}  {:<20}  {:<10}  {:<16}  {}",
            m.id,
            m.temp_code.as_deref().unwrap_or("-"),
            m.serial_status.as_deref().unwrap_or("UNCLAIMED"),
            m.serial_number.as_deref().unwrap_or("-"),
            m.claimed_serial.as_deref().unwrap_or("-"),
        )?;
    }
    writeln!(out, "\n{} machine(s)", machines.len())?;
    Ok(())
}
