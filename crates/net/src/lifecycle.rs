//! Connection lifecycle state machine
//!
//! `Idle -> Connecting -> Open -> Closed`, with `Closed -> Connecting` as the
//! only cycle. Pure bookkeeping: the connection task owns the clock and the
//! transport and reports what happened here.

use std::time::Duration;

use crate::backoff::BackoffPolicy;
use crate::protocol::CloseCode;

/// Connection phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionPhase {
    Idle = 0,
    Connecting = 1,
    Open = 2,
    Closed = 3,
}

impl ConnectionPhase {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ConnectionPhase::Connecting,
            2 => ConnectionPhase::Open,
            3 => ConnectionPhase::Closed,
            _ => ConnectionPhase::Idle,
        }
    }
}

/// Why the machine stopped in `Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// Peer or local side closed with the normal-closure code
    NormalClosure,
    /// `disconnect()` was called
    Terminated,
    /// Retry budget used up
    Exhausted,
}

/// What to do after a close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Retry { delay: Duration, attempt: u32 },
    Halt(HaltReason),
}

#[derive(Debug, Clone)]
pub struct Lifecycle {
    phase: ConnectionPhase,
    attempts: u32,
    terminated: bool,
    policy: BackoffPolicy,
}

impl Lifecycle {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            phase: ConnectionPhase::Idle,
            attempts: 0,
            terminated: false,
            policy,
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Start a dial. Returns the phase to revert to if the dial cannot even
    /// be attempted, or `None` when a connection is already in progress.
    pub fn begin_connect(&mut self) -> Option<ConnectionPhase> {
        match self.phase {
            ConnectionPhase::Connecting | ConnectionPhase::Open => None,
            previous => {
                self.phase = ConnectionPhase::Connecting;
                self.terminated = false;
                Some(previous)
            }
        }
    }

    pub fn opened(&mut self) {
        self.phase = ConnectionPhase::Open;
        self.attempts = 0;
    }

    /// The dial was refused before reaching the network
    pub fn open_failed(&mut self, previous: ConnectionPhase) {
        self.phase = previous;
    }

    /// The connection (or a dial) ended with `code`
    pub fn closed(&mut self, code: CloseCode) -> CloseOutcome {
        self.phase = ConnectionPhase::Closed;

        if self.terminated {
            return CloseOutcome::Halt(HaltReason::Terminated);
        }
        if code.is_normal() {
            return CloseOutcome::Halt(HaltReason::NormalClosure);
        }
        if !self.policy.allows_retry(self.attempts) {
            return CloseOutcome::Halt(HaltReason::Exhausted);
        }

        let delay = self.policy.delay_for(self.attempts);
        self.attempts += 1;
        CloseOutcome::Retry {
            delay,
            attempt: self.attempts,
        }
    }

    /// Intentional close; no retry until the next explicit connect
    pub fn terminate(&mut self) {
        self.terminated = true;
        self.phase = ConnectionPhase::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lifecycle() -> Lifecycle {
        Lifecycle::new(BackoffPolicy::default())
    }

    #[test]
    fn test_connect_is_idempotent() {
        let mut lc = lifecycle();
        assert_eq!(lc.begin_connect(), Some(ConnectionPhase::Idle));
        assert_eq!(lc.begin_connect(), None);
        lc.opened();
        assert_eq!(lc.begin_connect(), None);
        assert_eq!(lc.phase(), ConnectionPhase::Open);
    }

    #[test]
    fn test_open_failure_reverts() {
        let mut lc = lifecycle();
        let previous = lc.begin_connect().unwrap();
        lc.open_failed(previous);
        assert_eq!(lc.phase(), ConnectionPhase::Idle);
        assert_eq!(lc.attempts(), 0);
    }

    #[test]
    fn test_abnormal_closes_back_off_then_halt() {
        let mut lc = lifecycle();
        lc.begin_connect();
        lc.opened();

        let mut delays = Vec::new();
        loop {
            match lc.closed(CloseCode::ABNORMAL) {
                CloseOutcome::Retry { delay, attempt } => {
                    assert_eq!(attempt as usize, delays.len() + 1);
                    delays.push(delay.as_millis());
                    assert_eq!(lc.begin_connect(), Some(ConnectionPhase::Closed));
                }
                CloseOutcome::Halt(reason) => {
                    assert_eq!(reason, HaltReason::Exhausted);
                    break;
                }
            }
        }

        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
        assert_eq!(lc.attempts(), 5);
        assert_eq!(lc.phase(), ConnectionPhase::Closed);
    }

    #[test]
    fn test_open_resets_streak() {
        let mut lc = lifecycle();
        lc.begin_connect();
        lc.opened();
        lc.closed(CloseCode::ABNORMAL);
        lc.begin_connect();
        lc.closed(CloseCode::ABNORMAL);
        assert_eq!(lc.attempts(), 2);

        lc.begin_connect();
        lc.opened();
        assert_eq!(lc.attempts(), 0);
        assert_eq!(
            lc.closed(CloseCode::ABNORMAL),
            CloseOutcome::Retry {
                delay: Duration::from_millis(1000),
                attempt: 1
            }
        );
    }

    #[test]
    fn test_normal_close_halts() {
        let mut lc = lifecycle();
        lc.begin_connect();
        lc.opened();
        assert_eq!(
            lc.closed(CloseCode::NORMAL),
            CloseOutcome::Halt(HaltReason::NormalClosure)
        );
        assert_eq!(lc.attempts(), 0);
    }

    #[test]
    fn test_terminated_ignores_late_abnormal_close() {
        let mut lc = lifecycle();
        lc.begin_connect();
        lc.opened();
        lc.terminate();
        assert_eq!(
            lc.closed(CloseCode::ABNORMAL),
            CloseOutcome::Halt(HaltReason::Terminated)
        );

        // An explicit connect starts over
        assert_eq!(lc.begin_connect(), Some(ConnectionPhase::Closed));
        lc.opened();
        assert!(matches!(
            lc.closed(CloseCode::ABNORMAL),
            CloseOutcome::Retry { attempt: 1, .. }
        ));
    }
}
