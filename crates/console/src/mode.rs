//! Control-mode mirror and controller arbitration.
//!
//! The server owns the turret's mode and the controller identity. This machine
//! only turns operator intent into requests and re-derives everything it
//! displays from the latest broadcast. Requests it has sent are remembered
//! only long enough to notice when a broadcast contradicts them.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};
use turret_protocol::{ClientMessage, ConnectionId, ControlMode, GimbalHealth};

use crate::mapper::NativePoint;

/// Local refusal of an operator action. Nothing is sent when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Refusal {
    #[error("another console holds control")]
    NotController,
    #[error("autonomous tracking unavailable while gimbal is {0}")]
    TrackingUnavailable(GimbalHealth),
    #[error("unknown detection model '{0}'")]
    UnknownModel(String),
    #[error("position is outside the video surface")]
    OutsideSurface,
    #[error("video interaction is disabled until the stream recovers")]
    VideoDisabled,
    #[error("control channel is not connected")]
    Offline,
}

/// Something the operator should know about after an authoritative update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeEvent {
    ControlGained,
    ControlLost { controller: Option<ConnectionId> },
    ModeChanged {
        mode: ControlMode,
        target: Option<String>,
    },
    /// A broadcast arrived that does not reflect the last request.
    RequestNotApplied {
        requested: ControlMode,
        actual: ControlMode,
    },
}

/// Result of feeding an authoritative message into the machine.
#[derive(Debug, Default, PartialEq)]
pub struct Update {
    pub outbound: Vec<ClientMessage>,
    pub events: Vec<ModeEvent>,
}

#[derive(Debug)]
pub struct ModeMachine {
    own_id: Option<ConnectionId>,
    controller: Option<ConnectionId>,
    /// False until the first controller announcement after connect
    control_known: bool,
    mode: ControlMode,
    target: Option<String>,
    selected_target: String,
    /// Modes requested and not yet seen in a broadcast, oldest first
    pending: VecDeque<ControlMode>,
    follow_engaged: bool,
    exit_armed_at: Option<Instant>,
    exit_confirm: Duration,
}

impl ModeMachine {
    pub fn new(default_target: impl Into<String>, exit_confirm: Duration) -> Self {
        Self {
            own_id: None,
            controller: None,
            control_known: false,
            mode: ControlMode::Manual,
            target: None,
            selected_target: default_target.into(),
            pending: VecDeque::new(),
            follow_engaged: false,
            exit_armed_at: None,
            exit_confirm,
        }
    }

    /// A (re)connected control channel announced our identity. Everything
    /// learned on the previous connection is void.
    pub fn connected(&mut self, id: ConnectionId) {
        self.invalidate();
        self.own_id = Some(id);
    }

    pub fn disconnected(&mut self) {
        self.invalidate();
        self.own_id = None;
    }

    fn invalidate(&mut self) {
        self.controller = None;
        self.control_known = false;
        self.mode = ControlMode::Manual;
        self.target = None;
        self.pending.clear();
        self.follow_engaged = false;
        self.exit_armed_at = None;
    }

    pub fn has_control(&self) -> bool {
        self.control_known && self.own_id.is_some() && self.controller == self.own_id
    }

    pub fn own_id(&self) -> Option<&ConnectionId> {
        self.own_id.as_ref()
    }

    pub fn controller(&self) -> Option<&ConnectionId> {
        self.controller.as_ref()
    }

    /// Authoritative mode from the latest broadcast.
    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    /// Authoritative tracking target from the latest broadcast.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn selected_target(&self) -> &str {
        &self.selected_target
    }

    pub fn follow_engaged(&self) -> bool {
        self.follow_engaged
    }

    pub fn exit_armed(&self, now: Instant) -> bool {
        self.exit_armed_at
            .is_some_and(|at| now.saturating_duration_since(at) <= self.exit_confirm)
    }

    pub fn axis_allowed(&self) -> bool {
        self.has_control()
    }

    /// Pointer frames stream only while we control a turret in follow mode.
    pub fn follow_frames_allowed(&self) -> bool {
        self.has_control() && self.mode == ControlMode::CursorFollow
    }

    /// Ask for cursor-follow. When the turret is not ready a Manual request
    /// goes first to clear whatever mode is stuck.
    pub fn request_follow(&mut self, ready: bool) -> Vec<ClientMessage> {
        let mut out = Vec::with_capacity(2);
        if !ready {
            out.push(self.request(ControlMode::Manual));
        }
        out.push(self.request(ControlMode::CursorFollow));
        self.follow_engaged = true;
        self.exit_armed_at = None;
        out
    }

    pub fn request_tracking(&mut self, health: GimbalHealth) -> Result<Vec<ClientMessage>, Refusal> {
        if health.is_fault() {
            return Err(Refusal::TrackingUnavailable(health));
        }
        Ok(vec![self.request(ControlMode::AutonomousTracking)])
    }

    pub fn request_manual(&mut self) -> Vec<ClientMessage> {
        self.exit_armed_at = None;
        vec![self.request(ControlMode::Manual)]
    }

    fn request(&mut self, mode: ControlMode) -> ClientMessage {
        self.pending.push_back(mode);
        let target = match mode {
            ControlMode::AutonomousTracking => Some(self.selected_target.clone()),
            _ => None,
        };
        debug!(%mode, ?target, "Requesting control mode");
        ClientMessage::SetControlMode { mode, target }
    }

    /// Choose the class autonomous tracking should follow.
    pub fn select_target(&mut self, target: impl Into<String>) -> Vec<ClientMessage> {
        let target = target.into();
        self.selected_target = target.clone();
        vec![ClientMessage::SetTrackingTarget { target }]
    }

    /// A click on the video surface, already mapped to native coordinates.
    pub fn click(&mut self, point: NativePoint, now: Instant) -> Vec<ClientMessage> {
        let aim = ClientMessage::ClickTarget {
            x: point.x,
            y: point.y,
        };
        match self.mode {
            ControlMode::Manual => vec![aim],
            ControlMode::CursorFollow => {
                self.follow_engaged = false;
                vec![self.request(ControlMode::Manual), aim]
            }
            ControlMode::AutonomousTracking => {
                if self.exit_armed(now) {
                    self.exit_armed_at = None;
                    vec![self.request(ControlMode::Manual), aim]
                } else {
                    debug!("Click during tracking, exit armed");
                    self.exit_armed_at = Some(now);
                    Vec::new()
                }
            }
        }
    }

    /// Authoritative mode announced in answer to a mode change. Settles the
    /// pending requests it matches and reports the ones it contradicts.
    pub fn apply_mode(&mut self, mode: ControlMode, target: Option<String>) -> Update {
        let mut update = Update::default();

        if let Some(pos) = self.pending.iter().position(|m| *m == mode) {
            self.pending.drain(..=pos);
        } else if let Some(requested) = self.pending.back().copied() {
            info!(%requested, actual = %mode, "Mode request not applied");
            self.pending.clear();
            update.events.push(ModeEvent::RequestNotApplied {
                requested,
                actual: mode,
            });
        }

        self.mirror(mode, target, &mut update);
        update
    }

    /// Mode carried by a periodic snapshot. Snapshots may predate the last
    /// request, so pending requests are left for the next mode broadcast.
    pub fn observe_mode(&mut self, mode: ControlMode, target: Option<String>) -> Update {
        let mut update = Update::default();
        self.mirror(mode, target, &mut update);
        update
    }

    fn mirror(&mut self, mode: ControlMode, target: Option<String>, update: &mut Update) {
        if mode != ControlMode::CursorFollow && self.pending.is_empty() {
            self.follow_engaged = false;
        }
        if mode != ControlMode::AutonomousTracking {
            self.exit_armed_at = None;
        }

        let changed = mode != self.mode || target != self.target;
        self.mode = mode;
        if let Some(t) = &target {
            self.selected_target = t.clone();
        }
        self.target = target;
        if changed {
            update.events.push(ModeEvent::ModeChanged {
                mode,
                target: self.target.clone(),
            });
        }
    }

    /// Authoritative target without a mode.
    pub fn apply_target(&mut self, target: String) {
        self.selected_target = target.clone();
        self.target = Some(target);
    }

    /// Authoritative controller identity. `None` means nobody holds control.
    pub fn announce_controller(&mut self, controller: Option<ConnectionId>) -> Update {
        let had = self.has_control();
        self.controller = controller;
        self.control_known = true;
        let has = self.has_control();

        let mut update = Update::default();
        if had && !has {
            info!(controller = ?self.controller, "Control lost");
            self.exit_armed_at = None;
            if self.follow_engaged || self.mode == ControlMode::CursorFollow {
                self.follow_engaged = false;
                update.outbound.push(self.request(ControlMode::Manual));
            }
            update.events.push(ModeEvent::ControlLost {
                controller: self.controller.clone(),
            });
        } else if !had && has {
            info!("Control gained");
            update.events.push(ModeEvent::ControlGained);
        }
        update
    }
}
