use anyhow::Result;
use rollcall_core::{Clock, SystemClock};
use rollcall_store::Store;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod control;
mod dbus_interface;
mod hardware;
mod oracle;
mod session;

use config::Config;
use control::Control;
use dbus_interface::{RollCallService, BUS_NAME, OBJECT_PATH};
use hardware::Hardware;
use session::{SessionController, SessionError, SessionSettings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(
        camera = %config.camera_device,
        db = %config.db_path.display(),
        oracle = %config.oracle_command,
        signal_port = %config.signal_port,
        "rollcalld starting"
    );

    let store = Store::open(&config.db_path)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let session = SessionController::new(
        Hardware::from_config(&config),
        store.clone(),
        Arc::clone(&clock),
        SessionSettings::from(&config),
    );
    let control = Arc::new(Control::new(session, store, clock));

    let builder = if config.session_bus {
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };
    let _connection = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, RollCallService::new(Arc::clone(&control)))?
        .build()
        .await?;

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    // Release the camera and link before exit.
    tokio::task::spawn_blocking(move || match control.session().stop() {
        Ok(()) | Err(SessionError::NotRunning) => {}
        Err(err) => tracing::warn!(error = %err, "failed to stop session on shutdown"),
    })
    .await?;

    Ok(())
}
