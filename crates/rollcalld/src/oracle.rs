//! Child-process adapter for the external matching oracle.
//!
//! Per frame the daemon writes one JSON header line `{"width":W,"height":H}`
//! followed by `W*H*3` raw RGB bytes, then reads one JSON reply line
//! `{"faces":[{"box":{..},"encoding":[..]}]}`.
//!
//! The child's pipes are serviced by two helper threads so a stalled oracle
//! can only cost one reply timeout. After a timeout the child is killed and
//! every later call fails fast.

use rollcall_core::{DetectedFace, FaceOracle, OracleError};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct FrameHeader {
    width: u32,
    height: u32,
}

#[derive(Deserialize)]
struct OracleReply {
    faces: Vec<DetectedFace>,
}

pub struct ProcessOracle {
    child: Child,
    /// `None` once the child has been killed.
    requests: Option<Sender<Vec<u8>>>,
    replies: Receiver<io::Result<String>>,
    reply_timeout: Duration,
}

impl ProcessOracle {
    /// Spawn from a whitespace-separated command line.
    pub fn from_command_line(command_line: &str) -> Result<Self, OracleError> {
        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| OracleError::Unavailable("empty oracle command".into()))?;
        let args: Vec<&str> = parts.collect();
        Self::spawn(program, &args)
    }

    pub fn spawn(program: &str, args: &[&str]) -> Result<Self, OracleError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| OracleError::Unavailable(format!("{program}: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| OracleError::Unavailable("oracle stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| OracleError::Unavailable("oracle stdout not captured".into()))?;

        let (request_tx, request_rx) = mpsc::channel::<Vec<u8>>();
        std::thread::Builder::new()
            .name("rollcall-oracle-in".into())
            .spawn(move || {
                for payload in request_rx {
                    if let Err(err) = stdin.write_all(&payload).and_then(|()| stdin.flush()) {
                        tracing::debug!(error = %err, "oracle stdin closed");
                        break;
                    }
                }
            })
            .map_err(OracleError::Io)?;

        let (reply_tx, reply_rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("rollcall-oracle-out".into())
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    if reply_tx.send(line).is_err() {
                        break;
                    }
                }
            })
            .map_err(OracleError::Io)?;

        tracing::info!(program, pid = child.id(), "matching oracle started");
        Ok(Self {
            child,
            requests: Some(request_tx),
            replies: reply_rx,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        })
    }

    /// Longest wait for one reply before the child is declared hung.
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    fn kill(&mut self) {
        self.requests = None;
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl FaceOracle for ProcessOracle {
    fn analyze(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<DetectedFace>, OracleError> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() != expected {
            return Err(OracleError::Protocol(format!(
                "frame is {} bytes, expected {expected}",
                rgb.len()
            )));
        }
        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| OracleError::Unavailable("oracle was stopped after a timeout".into()))?;

        let header = serde_json::to_string(&FrameHeader { width, height })
            .map_err(|e| OracleError::Protocol(e.to_string()))?;
        let mut payload = Vec::with_capacity(header.len() + 1 + rgb.len());
        payload.extend_from_slice(header.as_bytes());
        payload.push(b'\n');
        payload.extend_from_slice(rgb);
        requests
            .send(payload)
            .map_err(|_| OracleError::Unavailable("oracle closed its input".into()))?;

        let line = match self.replies.recv_timeout(self.reply_timeout) {
            Ok(line) => line?,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    pid = self.child.id(),
                    timeout_ms = self.reply_timeout.as_millis() as u64,
                    "matching oracle did not reply; killing it"
                );
                self.kill();
                return Err(OracleError::Unavailable(format!(
                    "no reply within {:?}",
                    self.reply_timeout
                )));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(OracleError::Unavailable("oracle closed its output".into()));
            }
        };

        let reply: OracleReply = serde_json::from_str(line.trim_end())
            .map_err(|e| OracleError::Protocol(format!("bad reply: {e}")))?;
        Ok(reply.faces)
    }
}

impl Drop for ProcessOracle {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str =
        r#"{"faces":[{"box":{"x":1,"y":2,"width":3,"height":4},"encoding":[0.5,0.25]}]}"#;

    fn echo_oracle() -> ProcessOracle {
        // Consumes the header line and a 2x4 RGB frame, answers one face.
        let script = format!("while read -r header; do head -c 24 >/dev/null; echo '{REPLY}'; done");
        ProcessOracle::spawn("sh", &["-c", &script]).unwrap()
    }

    #[test]
    fn test_round_trip_with_child() {
        let mut oracle = echo_oracle();
        for _ in 0..2 {
            let faces = oracle.analyze(&[0u8; 24], 2, 4).unwrap();
            assert_eq!(faces.len(), 1);
            assert_eq!(faces[0].encoding.values, vec![0.5, 0.25]);
            assert_eq!(faces[0].bbox.height, 4.0);
        }
    }

    #[test]
    fn test_frame_size_mismatch() {
        let mut oracle = echo_oracle();
        let result = oracle.analyze(&[0u8; 10], 2, 4);
        assert!(matches!(result, Err(OracleError::Protocol(_))));
    }

    #[test]
    fn test_exited_child_is_an_error() {
        let mut oracle = ProcessOracle::spawn("sh", &["-c", "exit 0"]).unwrap();
        assert!(oracle.analyze(&[0u8; 24], 2, 4).is_err());
    }

    #[test]
    fn test_stalled_child_times_out() {
        // Swallows frames and never answers.
        let mut oracle = ProcessOracle::spawn("sh", &["-c", "cat >/dev/null"])
            .unwrap()
            .with_reply_timeout(Duration::from_millis(200));

        let started = std::time::Instant::now();
        let result = oracle.analyze(&[0u8; 24], 2, 4);
        assert!(matches!(result, Err(OracleError::Unavailable(_))));
        assert!(started.elapsed() < Duration::from_secs(3));

        // The child is gone; later calls fail without waiting.
        let started = std::time::Instant::now();
        assert!(oracle.analyze(&[0u8; 24], 2, 4).is_err());
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_missing_program() {
        let result = ProcessOracle::from_command_line("/nonexistent/rollcall-oracle --fast");
        assert!(matches!(result, Err(OracleError::Unavailable(_))));
    }

    #[test]
    fn test_empty_command_line() {
        assert!(matches!(
            ProcessOracle::from_command_line("   "),
            Err(OracleError::Unavailable(_))
        ));
    }
}
