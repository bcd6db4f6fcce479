use serde_json::Value;
use std::sync::Arc;
use zbus::interface;

use crate::control::{Control, ControlError};
use crate::hardware::Hardware;

pub const BUS_NAME: &str = "org.rollcall.RollCall1";
pub const OBJECT_PATH: &str = "/org/rollcall/RollCall1";

/// D-Bus interface for the attendance daemon.
///
/// Bus name: org.rollcall.RollCall1
/// Object path: /org/rollcall/RollCall1
///
/// Every method returns a JSON document. Store and session calls block, so
/// they run on tokio's blocking pool.
pub struct RollCallService {
    control: Arc<Control<Hardware>>,
}

impl RollCallService {
    pub fn new(control: Arc<Control<Hardware>>) -> Self {
        Self { control }
    }

    async fn run<F>(&self, op: F) -> Result<String, ControlError>
    where
        F: FnOnce(&Control<Hardware>) -> Result<Value, ControlError> + Send + 'static,
    {
        let control = Arc::clone(&self.control);
        let value = tokio::task::spawn_blocking(move || op(&control))
            .await
            .map_err(|e| ControlError::Internal(format!("control task failed: {e}")))??;
        Ok(value.to_string())
    }
}

#[interface(name = "org.rollcall.RollCall1")]
impl RollCallService {
    async fn get_status(&self) -> Result<String, ControlError> {
        self.run(|c| c.status()).await
    }

    async fn list_identities(&self) -> Result<String, ControlError> {
        self.run(|c| c.list_identities()).await
    }

    async fn get_identity(&self, id: i64) -> Result<String, ControlError> {
        self.run(move |c| c.get_identity(id)).await
    }

    async fn delete_identity(&self, roll: String) -> Result<String, ControlError> {
        tracing::info!(%roll, "delete_identity requested");
        self.run(move |c| c.delete_identity(&roll)).await
    }

    async fn get_attendance(&self, scope: String) -> Result<String, ControlError> {
        self.run(move |c| c.attendance(&scope)).await
    }

    async fn clear_attendance(&self, scope: String) -> Result<String, ControlError> {
        tracing::info!(%scope, "clear_attendance requested");
        self.run(move |c| c.clear_attendance(&scope)).await
    }

    async fn get_daily_stats(&self) -> Result<String, ControlError> {
        self.run(|c| c.daily_stats()).await
    }

    async fn start_session(&self) -> Result<String, ControlError> {
        tracing::info!("start_session requested");
        self.run(|c| c.start_session()).await
    }

    async fn stop_session(&self) -> Result<String, ControlError> {
        tracing::info!("stop_session requested");
        self.run(|c| c.stop_session()).await
    }

    /// Capture samples from the camera and register a new identity.
    async fn enroll(&self, name: String, roll: String) -> Result<String, ControlError> {
        tracing::info!(%name, %roll, "enroll requested");
        self.run(move |c| c.enroll(&name, &roll)).await
    }
}
