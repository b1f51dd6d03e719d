//! Pure connection state machine.

use std::time::Duration;

use surface_sync_core::types::ConnectionState;

/// What the driver should do after the live channel closes or fails to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Wait, then attempt the live channel again.
    Reconnect(Duration),
    /// Give up on the live channel and poll from now on.
    Degrade,
}

#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    failures: u32,
    threshold: u32,
    reconnect_delay: Duration,
}

impl ConnectionMachine {
    pub fn new(threshold: u32, reconnect_delay: Duration) -> Self {
        Self {
            state: ConnectionState::Connecting,
            failures: 0,
            threshold,
            reconnect_delay,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failures since the last successful open.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn on_open(&mut self) {
        if self.state == ConnectionState::DegradedPolling {
            return;
        }
        self.state = ConnectionState::Live;
        self.failures = 0;
    }

    /// Record a close or failed open. Degraded polling is terminal.
    pub fn on_closed(&mut self) -> Transition {
        if self.state == ConnectionState::DegradedPolling {
            return Transition::Degrade;
        }

        self.failures += 1;
        if self.failures >= self.threshold {
            self.state = ConnectionState::DegradedPolling;
            Transition::Degrade
        } else {
            self.state = ConnectionState::Connecting;
            Transition::Reconnect(self.reconnect_delay)
        }
    }
}
