use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod export;

#[zbus::proxy(
    interface = "org.rollcall.RollCall1",
    default_service = "org.rollcall.RollCall1",
    default_path = "/org/rollcall/RollCall1"
)]
trait RollCall {
    async fn get_status(&self) -> zbus::Result<String>;
    async fn list_identities(&self) -> zbus::Result<String>;
    async fn get_identity(&self, id: i64) -> zbus::Result<String>;
    async fn delete_identity(&self, roll: &str) -> zbus::Result<String>;
    async fn get_attendance(&self, scope: &str) -> zbus::Result<String>;
    async fn clear_attendance(&self, scope: &str) -> zbus::Result<String>;
    async fn get_daily_stats(&self) -> zbus::Result<String>;
    async fn start_session(&self) -> zbus::Result<String>;
    async fn stop_session(&self) -> zbus::Result<String>;
    async fn enroll(&self, name: &str, roll: &str) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance CLI")]
struct Cli {
    /// Talk to a daemon on the session bus (also ROLLCALL_SESSION_BUS=1)
    #[arg(long, global = true)]
    session_bus: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon and session status
    Status,
    /// List registered identities
    List,
    /// Show one identity
    Show {
        /// Identity id
        id: i64,
    },
    /// Delete an identity and its attendance records
    Delete {
        /// Roll number to delete
        roll: String,
    },
    /// Register a new identity from camera samples
    Enroll {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        roll: String,
    },
    /// Show attendance records (today unless --all)
    Attendance {
        #[arg(long)]
        all: bool,
    },
    /// Clear attendance records (today unless --all)
    Clear {
        #[arg(long)]
        all: bool,
    },
    /// Show today's attendance rate and the last seven days
    Stats,
    /// Start the recognition session
    Start,
    /// Stop the recognition session
    Stop,
    /// Export attendance records to CSV
    Export {
        /// Output file
        #[arg(short, long)]
        out: PathBuf,
        #[arg(long)]
        all: bool,
    },
}

fn scope(all: bool) -> &'static str {
    if all {
        "all"
    } else {
        "today"
    }
}

/// Re-indent a JSON reply for the terminal.
fn pretty(reply: &str) -> Result<String> {
    let value: serde_json::Value =
        serde_json::from_str(reply).context("daemon returned invalid JSON")?;
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Turn a D-Bus method error into `Kind: message`.
fn describe(err: zbus::Error) -> anyhow::Error {
    match err {
        zbus::Error::MethodError(name, message, _) => {
            let kind = name.as_str().rsplit('.').next().unwrap_or("Error").to_string();
            anyhow::anyhow!("{kind}: {}", message.unwrap_or_default())
        }
        other => anyhow::Error::new(other).context("failed to reach rollcalld"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let session_bus = cli.session_bus
        || std::env::var("ROLLCALL_SESSION_BUS").is_ok_and(|v| v == "1");
    let connection = if session_bus {
        zbus::Connection::session().await
    } else {
        zbus::Connection::system().await
    }
    .context("failed to connect to D-Bus")?;
    let proxy = RollCallProxy::new(&connection).await?;

    match cli.command {
        Commands::Status => {
            let reply = proxy.get_status().await.map_err(describe)?;
            println!("{}", pretty(&reply)?);
        }
        Commands::List => {
            let reply = proxy.list_identities().await.map_err(describe)?;
            println!("{}", pretty(&reply)?);
        }
        Commands::Show { id } => {
            let reply = proxy.get_identity(id).await.map_err(describe)?;
            println!("{}", pretty(&reply)?);
        }
        Commands::Delete { roll } => {
            proxy.delete_identity(&roll).await.map_err(describe)?;
            println!("Deleted {roll}");
        }
        Commands::Enroll { name, roll } => {
            println!("Enrolling {name} ({roll}); look at the camera...");
            let reply = proxy.enroll(&name, &roll).await.map_err(describe)?;
            println!("{}", pretty(&reply)?);
        }
        Commands::Attendance { all } => {
            let reply = proxy.get_attendance(scope(all)).await.map_err(describe)?;
            println!("{}", pretty(&reply)?);
        }
        Commands::Clear { all } => {
            let reply = proxy.clear_attendance(scope(all)).await.map_err(describe)?;
            println!("{}", pretty(&reply)?);
        }
        Commands::Stats => {
            let reply = proxy.get_daily_stats().await.map_err(describe)?;
            println!("{}", pretty(&reply)?);
        }
        Commands::Start => {
            proxy.start_session().await.map_err(describe)?;
            println!("Recognition started");
        }
        Commands::Stop => {
            let reply = proxy.stop_session().await.map_err(describe)?;
            println!("{}", pretty(&reply)?);
        }
        Commands::Export { out, all } => {
            let reply = proxy.get_attendance(scope(all)).await.map_err(describe)?;
            let rows: Vec<export::AttendanceRow> =
                serde_json::from_str(&reply).context("daemon returned invalid attendance")?;
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            export::write_csv(file, &rows)?;
            println!("Exported {} records to {}", rows.len(), out.display());
        }
    }

    Ok(())
}
