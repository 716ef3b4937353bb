//! Coordination between blocked executions and human decisions.
//!
//! [`hil::HilCoordinator`] handles human-in-the-loop tasks and
//! [`gate::PermissionGate`] handles tool confirmations. Both are built on the
//! generic [`pending::PendingRegistry`]. [`Coordination`] bundles the two so a
//! single clone can be handed to the executor and the front end.

pub mod classify;
pub mod gate;
pub mod hil;
pub mod pending;
pub mod types;
pub mod watcher;

use std::time::Duration;

pub use gate::{GateDecision, PermissionGate};
pub use hil::{HilCoordinator, HilOutcome};

use crate::config::AppConfig;

#[derive(Clone)]
pub struct Coordination {
    pub hil: HilCoordinator,
    pub gate: PermissionGate,
}

impl Coordination {
    pub fn new(default_auto: bool, poll_interval: Duration, confirm_timeout: Duration) -> Self {
        Self {
            hil: HilCoordinator::new(poll_interval),
            gate: PermissionGate::new(default_auto, poll_interval, confirm_timeout),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.auto_mode,
            Duration::from_millis(config.poll_interval_ms),
            Duration::from_secs(config.confirm_timeout_secs),
        )
    }
}
