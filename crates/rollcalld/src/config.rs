use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Command line of the external matching oracle.
    pub oracle_command: String,
    /// Longest wait for one oracle reply before the child is killed.
    pub oracle_timeout: Duration,
    /// Serial port of the indicator device.
    pub signal_port: String,
    pub signal_baud: u32,
    /// Wait after opening the serial port; the device resets on open.
    pub signal_settle: Duration,
    /// Maximum encoding distance for a candidate match.
    pub tolerance: f32,
    /// Minimum seconds between two accepted marks of the same identity.
    pub cooldown_secs: i64,
    /// Every Nth captured frame is eligible for matching.
    pub frame_stride: u64,
    /// Minimum wall-clock interval between two match cycles.
    pub match_interval: Duration,
    /// Fixed sleep at the end of each loop iteration.
    pub loop_sleep: Duration,
    /// Downscale factor applied to match frames.
    pub scale_factor: f32,
    /// How long `stop()` waits for the worker to exit.
    pub stop_grace: Duration,
    /// Encodings captured per enrollment.
    pub enroll_samples: usize,
    /// Fewest accepted encodings for an enrollment to succeed.
    pub enroll_min_samples: usize,
    /// Serve on the session bus instead of the system bus.
    pub session_bus: bool,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        Self {
            camera_device: env_string("ROLLCALL_CAMERA_DEVICE", "/dev/video0"),
            db_path,
            oracle_command: env_string("ROLLCALL_ORACLE_COMMAND", "rollcall-oracle"),
            oracle_timeout: Duration::from_secs(env_parse("ROLLCALL_ORACLE_TIMEOUT_SECS", 10)),
            signal_port: env_string("ROLLCALL_SIGNAL_PORT", "/dev/ttyACM0"),
            signal_baud: env_parse("ROLLCALL_SIGNAL_BAUD", rollcall_hw::DEFAULT_BAUD),
            signal_settle: Duration::from_millis(env_parse("ROLLCALL_SIGNAL_SETTLE_MS", 2000)),
            tolerance: env_parse("ROLLCALL_TOLERANCE", rollcall_core::DEFAULT_TOLERANCE),
            cooldown_secs: env_parse("ROLLCALL_COOLDOWN_SECS", rollcall_core::DEFAULT_COOLDOWN_SECS),
            frame_stride: env_parse("ROLLCALL_FRAME_STRIDE", rollcall_hw::DEFAULT_FRAME_STRIDE),
            match_interval: Duration::from_secs(env_parse("ROLLCALL_MATCH_INTERVAL_SECS", 3)),
            loop_sleep: Duration::from_millis(env_parse("ROLLCALL_LOOP_SLEEP_MS", 100)),
            scale_factor: env_parse("ROLLCALL_SCALE_FACTOR", rollcall_hw::DEFAULT_SCALE_FACTOR),
            stop_grace: Duration::from_secs(env_parse("ROLLCALL_STOP_GRACE_SECS", 5)),
            enroll_samples: env_parse("ROLLCALL_ENROLL_SAMPLES", 15),
            enroll_min_samples: env_parse("ROLLCALL_ENROLL_MIN_SAMPLES", 5),
            session_bus: std::env::var("ROLLCALL_SESSION_BUS")
                .map(|v| v == "1")
                .unwrap_or(false),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
