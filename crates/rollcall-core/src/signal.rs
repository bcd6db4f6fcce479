//! Indicator signal policy and the link abstraction it writes through.

use std::io;

/// One of the two indicator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// A new attendance mark was recorded.
    Positive,
    /// The face was not recognised.
    Negative,
}

impl Signal {
    /// Newline-terminated wire token.
    pub fn token(self) -> &'static [u8] {
        match self {
            Signal::Positive => b"G\n",
            Signal::Negative => b"R\n",
        }
    }

    /// Which signal, if any, an evaluated face produces.
    ///
    /// Known-but-not-marked faces are silent.
    pub fn for_outcome(identity_id: Option<i64>, marked: bool) -> Option<Signal> {
        match (identity_id, marked) {
            (Some(_), true) => Some(Signal::Positive),
            (Some(_), false) => None,
            (None, _) => Some(Signal::Negative),
        }
    }
}

/// Point-to-point link to the indicator device. No acknowledgement is read.
pub trait SignalLink {
    /// Single write attempt; must not block indefinitely.
    fn write_token(&mut self, token: &[u8]) -> io::Result<()>;

    fn is_connected(&self) -> bool;
}

/// Best-effort emitter: delivery failures are logged, never propagated.
#[derive(Default)]
pub struct SignalEmitter {
    link: Option<Box<dyn SignalLink + Send>>,
}

impl SignalEmitter {
    pub fn new(link: Option<Box<dyn SignalLink + Send>>) -> Self {
        Self { link }
    }

    pub fn is_connected(&self) -> bool {
        self.link.as_ref().is_some_and(|l| l.is_connected())
    }

    /// Emit the signal for one evaluated face. Returns the signal chosen,
    /// whether or not it was delivered.
    pub fn on_outcome(&mut self, identity_id: Option<i64>, marked: bool) -> Option<Signal> {
        let signal = Signal::for_outcome(identity_id, marked)?;

        match self.link.as_mut() {
            Some(link) => {
                if let Err(err) = link.write_token(signal.token()) {
                    tracing::warn!(?signal, error = %err, "signal write failed");
                }
            }
            None => tracing::debug!(?signal, "no signal link; dropping signal"),
        }

        Some(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingLink {
        written: Arc<Mutex<Vec<Vec<u8>>>>,
        fail: bool,
    }

    impl SignalLink for RecordingLink {
        fn write_token(&mut self, token: &[u8]) -> io::Result<()> {
            self.written.lock().unwrap().push(token.to_vec());
            if self.fail {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
            } else {
                Ok(())
            }
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    fn emitter(fail: bool) -> (SignalEmitter, Arc<Mutex<Vec<Vec<u8>>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let link = RecordingLink { written: Arc::clone(&written), fail };
        (SignalEmitter::new(Some(Box::new(link))), written)
    }

    #[test]
    fn test_policy_table() {
        assert_eq!(Signal::for_outcome(Some(1), true), Some(Signal::Positive));
        assert_eq!(Signal::for_outcome(Some(1), false), None);
        assert_eq!(Signal::for_outcome(None, false), Some(Signal::Negative));
    }

    #[test]
    fn test_tokens() {
        assert_eq!(Signal::Positive.token(), b"G\n");
        assert_eq!(Signal::Negative.token(), b"R\n");
    }

    #[test]
    fn test_emitter_writes_one_token_per_face() {
        let (mut emitter, written) = emitter(false);
        emitter.on_outcome(Some(1), true);
        emitter.on_outcome(Some(1), false);
        emitter.on_outcome(None, false);

        let written = written.lock().unwrap();
        assert_eq!(*written, vec![b"G\n".to_vec(), b"R\n".to_vec()]);
    }

    #[test]
    fn test_emitter_write_failure_is_swallowed() {
        let (mut emitter, written) = emitter(true);
        assert_eq!(emitter.on_outcome(None, false), Some(Signal::Negative));
        // Exactly one attempt, no retry.
        assert_eq!(written.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_emitter_without_link() {
        let mut emitter = SignalEmitter::default();
        assert!(!emitter.is_connected());
        assert_eq!(emitter.on_outcome(Some(4), true), Some(Signal::Positive));
    }
}
