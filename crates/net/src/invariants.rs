//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible connection states during
//! development. These checks are compiled out in release builds.

use crate::lifecycle::{ConnectionPhase, Lifecycle};

/// Validate the lifecycle against the resources the connection task holds
pub fn assert_connection_invariants(
    lifecycle: &Lifecycle,
    heartbeat_running: bool,
    transport_present: bool,
) {
    let open = lifecycle.phase() == ConnectionPhase::Open;

    // Heartbeat runs exactly while the connection is open
    debug_assert_eq!(
        heartbeat_running,
        open,
        "heartbeat running = {} in phase {:?}",
        heartbeat_running,
        lifecycle.phase()
    );

    // A transport is only held while open
    debug_assert_eq!(
        transport_present,
        open,
        "transport present = {} in phase {:?}",
        transport_present,
        lifecycle.phase()
    );

    debug_assert!(
        lifecycle.attempts() <= lifecycle.policy().max_attempts,
        "reconnect attempts {} exceed max {}",
        lifecycle.attempts(),
        lifecycle.policy().max_attempts
    );
}
