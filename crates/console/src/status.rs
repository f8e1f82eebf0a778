use std::fmt;

use turret_protocol::{GimbalHealth, StatusSnapshot};

/// A telemetry value as last reported by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Reading<T> {
    Known(T),
    #[default]
    Unknown,
}

impl<T> Reading<T> {
    pub fn known(&self) -> Option<&T> {
        match self {
            Reading::Known(v) => Some(v),
            Reading::Unknown => None,
        }
    }
}

impl<T> From<Option<T>> for Reading<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Reading::Known(v),
            None => Reading::Unknown,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Reading<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Known(v) => v.fmt(f),
            Reading::Unknown => f.write_str("unknown"),
        }
    }
}

/// Derived telemetry shown alongside the video.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Telemetry {
    pub pan: Reading<f64>,
    pub tilt: Reading<f64>,
    pub cpu_temp: Reading<f64>,
    pub gimbal_cpu_temp: Reading<f64>,
    pub laser: Reading<bool>,
    pub sensor1: Reading<bool>,
    pub sensor2: Reading<bool>,
    pub health: GimbalHealth,
    pub viewers: Reading<u32>,
}

/// Folds status broadcasts into telemetry and the gating flags the mode
/// machine consults. Holds no control state of its own.
#[derive(Debug, Default)]
pub struct StatusReconciler {
    telemetry: Telemetry,
}

impl StatusReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace telemetry with `snapshot`. Fields the snapshot lacks become
    /// `Unknown`; viewer count is only touched when the snapshot carries one.
    pub fn apply(&mut self, snapshot: &StatusSnapshot) {
        let viewers = match snapshot.viewers {
            Some(count) => Reading::Known(count),
            None => self.telemetry.viewers,
        };
        self.telemetry = Telemetry {
            pan: snapshot.pan.into(),
            tilt: snapshot.tilt.into(),
            cpu_temp: snapshot.cpu_temp.into(),
            gimbal_cpu_temp: snapshot.gimbal_cpu_temp.into(),
            laser: snapshot.laser.into(),
            sensor1: snapshot.sensor1.into(),
            sensor2: snapshot.sensor2.into(),
            health: snapshot.health.unwrap_or(GimbalHealth::Unknown),
            viewers,
        };
    }

    pub fn set_viewers(&mut self, count: u32) {
        self.telemetry.viewers = Reading::Known(count);
    }

    /// Forget everything, e.g. after the control channel drops.
    pub fn reset(&mut self) {
        self.telemetry = Telemetry::default();
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn health(&self) -> GimbalHealth {
        self.telemetry.health
    }

    /// Homing finished and the gimbal answers.
    pub fn ready(&self) -> bool {
        self.telemetry.health.is_ready()
    }

    /// Autonomous tracking may be requested unless the gimbal is faulted or
    /// its condition is unknown.
    pub fn tracking_allowed(&self) -> bool {
        !self.telemetry.health.is_fault()
    }
}
