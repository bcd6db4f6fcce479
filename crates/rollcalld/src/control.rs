//! Synchronous control operations behind the D-Bus surface.
//!
//! Every operation returns a JSON document or a [`ControlError`] whose D-Bus
//! name is the stable error kind.

use rollcall_core::{format_timestamp, Clock};
use rollcall_store::{AttendanceScope, Store, StoreError};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::session::{SessionController, SessionDevices, SessionError};

#[derive(Debug, zbus::DBusError)]
#[zbus(prefix = "org.rollcall.RollCall1.Error")]
pub enum ControlError {
    #[zbus(error)]
    ZBus(zbus::Error),
    AlreadyRunning(String),
    NotRunning(String),
    EmptyGallery(String),
    SourceUnavailable(String),
    OracleUnavailable(String),
    DuplicateRoll(String),
    InsufficientSamples(String),
    InvalidArgument(String),
    NotFound(String),
    Storage(String),
    Internal(String),
}

impl From<SessionError> for ControlError {
    fn from(err: SessionError) -> Self {
        let message = err.to_string();
        match err {
            SessionError::AlreadyRunning => ControlError::AlreadyRunning(message),
            SessionError::NotRunning => ControlError::NotRunning(message),
            SessionError::EmptyGallery => ControlError::EmptyGallery(message),
            SessionError::SourceUnavailable(_) => ControlError::SourceUnavailable(message),
            SessionError::OracleUnavailable(_) => ControlError::OracleUnavailable(message),
            SessionError::DuplicateRoll(_) => ControlError::DuplicateRoll(message),
            SessionError::InsufficientSamples { .. } => ControlError::InsufficientSamples(message),
            SessionError::InvalidArgument(_) => ControlError::InvalidArgument(message),
            SessionError::Storage(_) => ControlError::Storage(message),
            SessionError::Spawn(_) => ControlError::Internal(message),
        }
    }
}

impl From<StoreError> for ControlError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateRoll(_) => ControlError::DuplicateRoll(err.to_string()),
            StoreError::UnknownIdentity(_) => ControlError::NotFound(err.to_string()),
            other => ControlError::Storage(other.to_string()),
        }
    }
}

pub struct Control<D> {
    session: SessionController<D>,
    store: Store,
    clock: Arc<dyn Clock>,
}

impl<D: SessionDevices> Control<D> {
    pub fn new(session: SessionController<D>, store: Store, clock: Arc<dyn Clock>) -> Self {
        Self {
            session,
            store,
            clock,
        }
    }

    pub fn session(&self) -> &SessionController<D> {
        &self.session
    }

    pub fn status(&self) -> Result<Value, ControlError> {
        let now = self.clock.now();
        let snapshot = self.session.snapshot();
        Ok(json!({
            "running": snapshot.running,
            "phase": snapshot.phase,
            "lastExit": snapshot.last_exit,
            "signalLinkConnected": snapshot.signal_link_connected,
            "totalIdentities": self.store.identity_count()?,
            "presentToday": self.store.present_today(now)?,
            "timestamp": format_timestamp(now),
        }))
    }

    pub fn list_identities(&self) -> Result<Value, ControlError> {
        Ok(json!(self.store.list_identities()?))
    }

    pub fn get_identity(&self, id: i64) -> Result<Value, ControlError> {
        match self.store.get_identity(id)? {
            Some(identity) => Ok(json!(identity)),
            None => Err(ControlError::NotFound(format!("no identity with id {id}"))),
        }
    }

    pub fn delete_identity(&self, roll: &str) -> Result<Value, ControlError> {
        if self.store.delete_identity(roll)? {
            Ok(json!({ "deleted": roll }))
        } else {
            Err(ControlError::NotFound(format!("no identity with roll number {roll}")))
        }
    }

    pub fn attendance(&self, scope: &str) -> Result<Value, ControlError> {
        let scope = parse_scope(scope)?;
        Ok(json!(self.store.attendance(scope, self.clock.now())?))
    }

    pub fn clear_attendance(&self, scope: &str) -> Result<Value, ControlError> {
        let scope = parse_scope(scope)?;
        let cleared = self.store.clear_attendance(scope, self.clock.now())?;
        Ok(json!({ "cleared": cleared }))
    }

    pub fn daily_stats(&self) -> Result<Value, ControlError> {
        Ok(json!(self.store.daily_stats(self.clock.now())?))
    }

    pub fn start_session(&self) -> Result<Value, ControlError> {
        self.session.start()?;
        self.status()
    }

    pub fn stop_session(&self) -> Result<Value, ControlError> {
        self.session.stop()?;
        self.status()
    }

    pub fn enroll(&self, name: &str, roll: &str) -> Result<Value, ControlError> {
        let id = self.session.enroll(name, roll)?;
        Ok(json!({ "id": id, "name": name.trim(), "roll": roll.trim() }))
    }
}

fn parse_scope(raw: &str) -> Result<AttendanceScope, ControlError> {
    raw.parse().map_err(ControlError::InvalidArgument)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionSettings;
    use chrono::NaiveDateTime;
    use rollcall_core::{parse_timestamp, Encoding, FaceOracle, OracleError, SignalLink};
    use rollcall_hw::{CameraError, FrameSource};
    use std::time::Duration;
    use zbus::DBusError;

    struct FixedClock(NaiveDateTime);

    impl Clock for FixedClock {
        fn now(&self) -> NaiveDateTime {
            self.0
        }
    }

    struct NoDevices;

    impl SessionDevices for NoDevices {
        fn open_source(&self) -> Result<Box<dyn FrameSource + Send>, CameraError> {
            Err(CameraError::DeviceNotFound("/dev/video0".into()))
        }

        fn open_oracle(&self) -> Result<Box<dyn FaceOracle + Send>, OracleError> {
            Err(OracleError::Unavailable("not installed".into()))
        }

        fn open_link(&self) -> Option<Box<dyn SignalLink + Send>> {
            None
        }
    }

    fn settings() -> SessionSettings {
        SessionSettings {
            tolerance: 0.5,
            cooldown_secs: 600,
            frame_stride: 5,
            scale_factor: 0.25,
            match_interval: Duration::from_secs(3),
            loop_sleep: Duration::from_millis(100),
            stop_grace: Duration::from_secs(1),
            enroll_samples: 15,
            enroll_min_samples: 5,
            enroll_interval: Duration::ZERO,
        }
    }

    fn control() -> (Control<NoDevices>, Store) {
        let store = Store::open_in_memory().unwrap();
        let clock: Arc<dyn Clock> =
            Arc::new(FixedClock(parse_timestamp("2026-03-02 12:00:00").unwrap()));
        let session =
            SessionController::new(NoDevices, store.clone(), Arc::clone(&clock), settings());
        (Control::new(session, store.clone(), clock), store)
    }

    fn seed(store: &Store) -> i64 {
        let at = parse_timestamp("2026-03-01 08:00:00").unwrap();
        let id = store
            .add_identity("Ada", "R001", &Encoding::new(vec![0.0, 1.0]), at)
            .unwrap();
        store
            .insert_mark(id, parse_timestamp("2026-03-02 09:00:00").unwrap())
            .unwrap();
        id
    }

    #[test]
    fn test_status_document() {
        let (control, store) = control();
        seed(&store);

        let status = control.status().unwrap();
        assert_eq!(status["running"], false);
        assert_eq!(status["phase"], "idle");
        assert!(status["lastExit"].is_null());
        assert_eq!(status["signalLinkConnected"], false);
        assert_eq!(status["totalIdentities"], 1);
        assert_eq!(status["presentToday"], 1);
        assert_eq!(status["timestamp"], "2026-03-02 12:00:00");
    }

    #[test]
    fn test_identity_queries() {
        let (control, store) = control();
        let id = seed(&store);

        let list = control.list_identities().unwrap();
        assert_eq!(list, json!([{ "id": id, "name": "Ada", "roll": "R001" }]));
        assert_eq!(control.get_identity(id).unwrap()["roll"], "R001");
        assert!(matches!(control.get_identity(id + 1), Err(ControlError::NotFound(_))));
    }

    #[test]
    fn test_delete_identity() {
        let (control, store) = control();
        seed(&store);

        control.delete_identity("R001").unwrap();
        assert!(matches!(control.delete_identity("R001"), Err(ControlError::NotFound(_))));
        assert_eq!(control.attendance("all").unwrap(), json!([]));
    }

    #[test]
    fn test_attendance_scope() {
        let (control, store) = control();
        seed(&store);

        let today = control.attendance("today").unwrap();
        assert_eq!(today[0]["timestamp"], "2026-03-02 09:00:00");
        assert!(matches!(control.attendance("yesterday"), Err(ControlError::InvalidArgument(_))));
        assert_eq!(control.clear_attendance("all").unwrap()["cleared"], 1);
    }

    #[test]
    fn test_daily_stats_document() {
        let (control, store) = control();
        seed(&store);

        let stats = control.daily_stats().unwrap();
        assert_eq!(stats["rate"], 100.0);
        assert_eq!(stats["last7days"].as_array().unwrap().len(), 7);
    }

    #[test]
    fn test_start_errors_map_to_kinds() {
        let (control, store) = control();
        let err = control.start_session().unwrap_err();
        assert_eq!(err.name().as_str(), "org.rollcall.RollCall1.Error.EmptyGallery");

        seed(&store);
        let err = control.start_session().unwrap_err();
        assert_eq!(err.name().as_str(), "org.rollcall.RollCall1.Error.SourceUnavailable");

        let err = control.stop_session().unwrap_err();
        assert_eq!(err.name().as_str(), "org.rollcall.RollCall1.Error.NotRunning");
    }

    #[test]
    fn test_enroll_error_kinds() {
        let (control, store) = control();
        seed(&store);
        assert!(matches!(control.enroll("Bo", "R001"), Err(ControlError::DuplicateRoll(_))));
        assert!(matches!(control.enroll("Bo", "R002"), Err(ControlError::SourceUnavailable(_))));
        assert_eq!(control.status().unwrap()["phase"], "idle");
    }
}
