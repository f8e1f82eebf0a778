//! Operator session: the single owner of all console state.
//!
//! Inputs arrive as method calls (operator actions, server messages, media
//! events, clock ticks). Outputs are collected in an outbox of intents for
//! the control channel and a list of notices for the operator; the caller
//! drains both after every event.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};
use turret_protocol::{
    Axis, ClientMessage, ConnectionId, ConsoleConfig, ControlMode, GimbalHealth, ServerMessage,
};

use crate::mapper::{self, JoystickAngles, NativeFrame, NativePoint, SurfaceRect};
use crate::media::{CycleReason, MediaEvent, MediaState};
use crate::mode::{ModeEvent, ModeMachine, Refusal, Update};
use crate::status::{Reading, StatusReconciler, Telemetry};
use crate::throttle::Throttle;

/// Throttled input channels. Each has its own interval budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Axis(Axis),
    Joystick,
    Follow,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Sample {
    Angle(i32),
    Angles(JoystickAngles),
    Point(NativePoint),
}

/// Operator-facing notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    ControlGained,
    ControlLost { controller: Option<ConnectionId> },
    ModeChanged {
        mode: ControlMode,
        target: Option<String>,
    },
    RequestNotApplied {
        requested: ControlMode,
        actual: ControlMode,
    },
    ExitArmed,
    TargetChanged(String),
    Fired,
    ActuatorBusy,
    ActuatorReply(String),
    HomeReply {
        status: String,
        error: Option<String>,
    },
    Disconnected,
    Reconnecting,
    VideoConnected,
    VideoFailed,
}

impl Notice {
    /// Persistent notices stay until the condition clears; the rest dismiss
    /// themselves.
    pub fn is_persistent(&self) -> bool {
        matches!(self, Notice::VideoFailed)
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::ControlGained => f.write_str("you have control"),
            Notice::ControlLost { controller: Some(c) } => write!(f, "control passed to {c}"),
            Notice::ControlLost { controller: None } => f.write_str("control released"),
            Notice::ModeChanged {
                mode,
                target: Some(t),
            } => write!(f, "mode: {mode} ({t})"),
            Notice::ModeChanged { mode, target: None } => write!(f, "mode: {mode}"),
            Notice::RequestNotApplied { requested, actual } => {
                write!(f, "{requested} was not applied, turret is in {actual}")
            }
            Notice::ExitArmed => f.write_str("click again to leave tracking"),
            Notice::TargetChanged(t) => write!(f, "tracking target: {t}"),
            Notice::Fired => f.write_str("fired"),
            Notice::ActuatorBusy => f.write_str("water gun busy"),
            Notice::ActuatorReply(r) => write!(f, "actuator: {r}"),
            Notice::HomeReply {
                status,
                error: Some(e),
            } => write!(f, "homing {status}: {e}"),
            Notice::HomeReply { status, error: None } => write!(f, "homing {status}"),
            Notice::Disconnected => f.write_str("control channel disconnected"),
            Notice::Reconnecting => f.write_str("video stalled, reconnecting"),
            Notice::VideoConnected => f.write_str("video connected"),
            Notice::VideoFailed => f.write_str("video unavailable"),
        }
    }
}

/// Snapshot of everything the operator sees.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub connected: bool,
    pub own_id: Option<ConnectionId>,
    pub controller: Option<ConnectionId>,
    pub has_control: bool,
    pub mode: ControlMode,
    pub target: Option<String>,
    pub selected_target: String,
    pub follow_engaged: bool,
    pub ready: bool,
    pub tracking_allowed: bool,
    pub axis_enabled: bool,
    pub video: MediaState,
    pub video_interactive: bool,
    pub telemetry: Telemetry,
}

impl fmt::Display for SessionView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = &self.telemetry;
        writeln!(
            f,
            "link: {}  id: {}  controller: {}{}",
            if self.connected { "up" } else { "down" },
            self.own_id.as_ref().map_or("-", |id| id.as_str()),
            self.controller.as_ref().map_or("none", |id| id.as_str()),
            if self.has_control { " (you)" } else { "" },
        )?;
        writeln!(
            f,
            "mode: {}  target: {}  selected: {}",
            self.mode,
            self.target.as_deref().unwrap_or("-"),
            self.selected_target,
        )?;
        writeln!(
            f,
            "gimbal: {}  pan: {}  tilt: {}  laser: {}",
            t.health, t.pan, t.tilt, t.laser
        )?;
        writeln!(
            f,
            "cpu: {}  gimbal cpu: {}  sensors: {}/{}  viewers: {}",
            t.cpu_temp, t.gimbal_cpu_temp, t.sensor1, t.sensor2, t.viewers
        )?;
        write!(
            f,
            "video: {:?}{}",
            self.video,
            if self.video_interactive { "" } else { " (interaction disabled)" }
        )
    }
}

pub struct OperatorSession {
    native: NativeFrame,
    joystick_range: f64,
    models: Vec<String>,
    mode: ModeMachine,
    status: StatusReconciler,
    throttle: Throttle<Channel, Sample>,
    connected: bool,
    surface: Option<SurfaceRect>,
    visible: bool,
    media: MediaState,
    video_interactive: bool,
    outbox: Vec<ClientMessage>,
    notices: Vec<Notice>,
}

impl OperatorSession {
    pub fn new(config: &ConsoleConfig) -> Self {
        Self {
            native: NativeFrame {
                width: config.video.native_width,
                height: config.video.native_height,
            },
            joystick_range: config.video.joystick_range,
            models: config.tracking.models.clone(),
            mode: ModeMachine::new(
                config.tracking.default_target.clone(),
                Duration::from_millis(config.timing.exit_confirm_ms),
            ),
            status: StatusReconciler::new(),
            throttle: Throttle::new(Duration::from_millis(config.timing.throttle_ms)),
            connected: false,
            surface: None,
            visible: true,
            media: MediaState::Idle,
            video_interactive: false,
            outbox: Vec::new(),
            notices: Vec::new(),
        }
    }

    pub fn take_outbox(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.outbox)
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            connected: self.connected,
            own_id: self.mode.own_id().cloned(),
            controller: self.mode.controller().cloned(),
            has_control: self.mode.has_control(),
            mode: self.mode.mode(),
            target: self.mode.target().map(str::to_string),
            selected_target: self.mode.selected_target().to_string(),
            follow_engaged: self.mode.follow_engaged(),
            ready: self.status.ready(),
            tracking_allowed: self.status.tracking_allowed(),
            axis_enabled: self.mode.axis_allowed(),
            video: self.media,
            video_interactive: self.video_interactive,
            telemetry: self.status.telemetry().clone(),
        }
    }

    // Control channel

    /// The control channel (re)connected and the server assigned `id`.
    /// Anything queued for the old connection is dropped.
    pub fn on_connected(&mut self, id: ConnectionId) {
        info!(%id, "Control channel identity assigned");
        self.connected = true;
        self.mode.connected(id);
        self.status.reset();
        self.throttle.clear();
        self.outbox.clear();
    }

    pub fn on_disconnected(&mut self) {
        if self.connected {
            self.notices.push(Notice::Disconnected);
        }
        self.connected = false;
        self.mode.disconnected();
        self.status.reset();
        self.throttle.clear();
        self.outbox.clear();
    }

    pub fn on_server_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Hello { id } => self.on_connected(id),
            ServerMessage::StatusUpdate(snapshot) => {
                self.status.apply(&snapshot);
                if let Some(mode) = snapshot.mode {
                    let update = self.mode.observe_mode(mode, snapshot.target.clone());
                    self.absorb(update);
                } else if let Some(target) = snapshot.target.clone() {
                    self.mode.apply_target(target);
                }
                if let Some(controller) = snapshot.controller {
                    let update = self.mode.announce_controller(Some(controller));
                    self.absorb(update);
                }
            }
            ServerMessage::ModeStatus {
                mode,
                target,
                controller,
            } => {
                let update = self.mode.apply_mode(mode, target);
                self.absorb(update);
                if let Some(controller) = controller {
                    let update = self.mode.announce_controller(Some(controller));
                    self.absorb(update);
                }
            }
            ServerMessage::ControllerChanged { controller } => {
                let update = self.mode.announce_controller(controller);
                self.absorb(update);
            }
            ServerMessage::TargetChanged { target } => {
                self.mode.apply_target(target.clone());
                self.notices.push(Notice::TargetChanged(target));
            }
            ServerMessage::ViewerCount { count } => self.status.set_viewers(count),
            ServerMessage::ActuatorAck { result } => {
                let notice = match result.as_str() {
                    "fired" => Notice::Fired,
                    "busy" => Notice::ActuatorBusy,
                    _ => Notice::ActuatorReply(result),
                };
                self.notices.push(notice);
            }
            ServerMessage::HomeAck { status, remote } => {
                let error = remote.and_then(|r| r.error);
                if let Some(error) = &error {
                    warn!(%status, %error, "Homing reported an error");
                }
                self.notices.push(Notice::HomeReply { status, error });
            }
        }
    }

    fn absorb(&mut self, update: Update) {
        self.outbox.extend(update.outbound);
        for event in update.events {
            let notice = match event {
                ModeEvent::ControlGained => Notice::ControlGained,
                ModeEvent::ControlLost { controller } => {
                    self.throttle.clear();
                    Notice::ControlLost { controller }
                }
                ModeEvent::ModeChanged { mode, target } => Notice::ModeChanged { mode, target },
                ModeEvent::RequestNotApplied { requested, actual } => {
                    Notice::RequestNotApplied { requested, actual }
                }
            };
            self.notices.push(notice);
        }
    }

    // Video surface

    pub fn set_layout(&mut self, rect: SurfaceRect) {
        self.surface = Some(rect);
    }

    /// Returns true when a hidden surface became visible again.
    pub fn set_visible(&mut self, visible: bool) -> bool {
        let regained = visible && !self.visible;
        self.visible = visible;
        regained
    }

    fn map_point(&self, x: f64, y: f64) -> Option<NativePoint> {
        let rect = self.surface?;
        mapper::map_to_native(x, y, rect, self.native)
    }

    /// Click on the video surface at screen position (`x`, `y`).
    pub fn on_click(&mut self, x: f64, y: f64, now: Instant) -> Result<(), Refusal> {
        self.require_connected()?;
        if !self.video_interactive {
            return Err(Refusal::VideoDisabled);
        }
        let point = self.map_point(x, y).ok_or(Refusal::OutsideSurface)?;
        let out = self.mode.click(point, now);
        if out.is_empty() && self.mode.exit_armed(now) {
            self.notices.push(Notice::ExitArmed);
        }
        if !out.is_empty() {
            self.throttle.reset(Channel::Follow);
        }
        self.outbox.extend(out);
        Ok(())
    }

    /// Pointer hovering over the video surface. Streams aim points while
    /// this console drives the turret in follow mode; otherwise ignored.
    pub fn on_pointer_move(&mut self, x: f64, y: f64, now: Instant) {
        if !self.connected || !self.video_interactive || !self.mode.follow_frames_allowed() {
            return;
        }
        let Some(point) = self.map_point(x, y) else {
            self.throttle.discard_pending(Channel::Follow);
            return;
        };
        if let Some(sample) = self.throttle.offer(Channel::Follow, Sample::Point(point), now) {
            self.emit(Channel::Follow, sample);
        }
    }

    pub fn on_pointer_leave(&mut self) {
        self.throttle.discard_pending(Channel::Follow);
    }

    // Manual axes

    /// Slider moved to `value` degrees.
    pub fn on_axis_input(&mut self, axis: Axis, value: f64, now: Instant) -> Result<(), Refusal> {
        self.require_control()?;
        let sample = Sample::Angle(value.round() as i32);
        if let Some(sample) = self.throttle.offer(Channel::Axis(axis), sample, now) {
            self.emit(Channel::Axis(axis), sample);
        }
        Ok(())
    }

    /// Joystick pad dragged to offset (`dx`, `dy`) from its center.
    pub fn on_joystick(&mut self, dx: f64, dy: f64, radius: f64, now: Instant) -> Result<(), Refusal> {
        self.require_control()?;
        let angles = mapper::joystick_to_angles(dx, dy, radius, self.joystick_range);
        if let Some(sample) = self.throttle.offer(Channel::Joystick, Sample::Angles(angles), now) {
            self.emit(Channel::Joystick, sample);
        }
        Ok(())
    }

    /// Flush throttled values whose interval has elapsed.
    pub fn tick(&mut self, now: Instant) {
        if !self.connected {
            return;
        }
        for (channel, sample) in self.throttle.poll(now) {
            let allowed = match channel {
                Channel::Follow => self.mode.follow_frames_allowed(),
                Channel::Axis(_) | Channel::Joystick => self.mode.axis_allowed(),
            };
            if allowed {
                self.emit(channel, sample);
            } else {
                debug!(?channel, "Dropping throttled input after gating changed");
            }
        }
    }

    fn emit(&mut self, channel: Channel, sample: Sample) {
        match (channel, sample) {
            (Channel::Axis(axis), Sample::Angle(value)) => {
                self.outbox.push(ClientMessage::SetAxisPosition {
                    axis,
                    value: value as f64,
                });
            }
            (_, Sample::Angles(angles)) => {
                self.outbox.push(ClientMessage::SetAxisPosition {
                    axis: Axis::Pan,
                    value: angles.pan as f64,
                });
                self.outbox.push(ClientMessage::SetAxisPosition {
                    axis: Axis::Tilt,
                    value: angles.tilt as f64,
                });
            }
            (_, Sample::Point(point)) => {
                self.outbox.push(ClientMessage::ClickTarget {
                    x: point.x,
                    y: point.y,
                });
            }
            (channel, sample) => {
                debug!(?channel, ?sample, "Sample does not belong to channel");
            }
        }
    }

    // Modes

    pub fn request_follow(&mut self) -> Result<(), Refusal> {
        self.require_connected()?;
        let out = self.mode.request_follow(self.status.ready());
        self.throttle.reset(Channel::Follow);
        self.outbox.extend(out);
        Ok(())
    }

    /// Follow button: engage follow, or drop back to manual if already on.
    pub fn toggle_follow(&mut self) -> Result<(), Refusal> {
        if self.mode.mode() == ControlMode::CursorFollow || self.mode.follow_engaged() {
            self.request_manual()
        } else {
            self.request_follow()
        }
    }

    pub fn request_tracking(&mut self) -> Result<(), Refusal> {
        self.require_connected()?;
        let out = self.mode.request_tracking(self.status.health())?;
        self.outbox.extend(out);
        Ok(())
    }

    pub fn request_manual(&mut self) -> Result<(), Refusal> {
        self.require_connected()?;
        let out = self.mode.request_manual();
        self.outbox.extend(out);
        Ok(())
    }

    pub fn select_target(&mut self, target: &str) -> Result<(), Refusal> {
        self.require_connected()?;
        let out = self.mode.select_target(target);
        self.outbox.extend(out);
        Ok(())
    }

    // Actuators

    pub fn toggle_laser(&mut self) -> Result<(), Refusal> {
        self.require_control()?;
        self.outbox.push(ClientMessage::ToggleLaser);
        Ok(())
    }

    pub fn fire(&mut self) -> Result<(), Refusal> {
        self.require_control()?;
        self.outbox.push(ClientMessage::Fire);
        Ok(())
    }

    pub fn request_home(&mut self) -> Result<(), Refusal> {
        self.require_control()?;
        self.outbox.push(ClientMessage::RequestHome);
        Ok(())
    }

    pub fn change_model(&mut self, model: &str) -> Result<(), Refusal> {
        self.require_connected()?;
        if !self.models.iter().any(|m| m == model) {
            return Err(Refusal::UnknownModel(model.to_string()));
        }
        self.outbox.push(ClientMessage::ChangeModel {
            model: model.to_string(),
        });
        Ok(())
    }

    fn require_connected(&self) -> Result<(), Refusal> {
        if self.connected {
            Ok(())
        } else {
            Err(Refusal::Offline)
        }
    }

    fn require_control(&self) -> Result<(), Refusal> {
        self.require_connected()?;
        if self.mode.axis_allowed() {
            Ok(())
        } else {
            Err(Refusal::NotController)
        }
    }

    // Media

    pub fn on_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::CycleStarted { reason } => {
                self.media = MediaState::Negotiating;
                if reason == CycleReason::Stall {
                    self.notices.push(Notice::Reconnecting);
                }
            }
            MediaEvent::AttemptFailed { attempt, error } => {
                debug!(attempt, %error, "Media attempt failed");
            }
            MediaEvent::Connected => {
                self.media = MediaState::Connected;
                self.video_interactive = true;
                self.notices.push(Notice::VideoConnected);
            }
            MediaEvent::Failed => {
                self.media = MediaState::Failed;
                self.video_interactive = false;
                self.throttle.discard_pending(Channel::Follow);
                self.notices.push(Notice::VideoFailed);
            }
        }
    }

    pub fn health(&self) -> GimbalHealth {
        self.status.health()
    }

    pub fn viewers(&self) -> Reading<u32> {
        self.status.telemetry().viewers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turret_protocol::StatusSnapshot;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn manual() -> ClientMessage {
        ClientMessage::SetControlMode {
            mode: ControlMode::Manual,
            target: None,
        }
    }

    /// Connected, controlling, healthy, with a 960x540 surface at the origin
    /// and video playing.
    fn live_session() -> OperatorSession {
        let mut s = OperatorSession::new(&ConsoleConfig::default());
        s.on_server_message(ServerMessage::Hello {
            id: ConnectionId::new("me"),
        });
        s.on_server_message(ServerMessage::StatusUpdate(StatusSnapshot {
            health: Some(GimbalHealth::Ready),
            controller: Some(ConnectionId::new("me")),
            mode: Some(ControlMode::Manual),
            ..Default::default()
        }));
        s.set_layout(SurfaceRect::new(0.0, 0.0, 960.0, 540.0));
        s.on_media_event(MediaEvent::Connected);
        s.take_outbox();
        s.take_notices();
        s
    }

    fn broadcast_mode(s: &mut OperatorSession, mode: ControlMode, target: Option<&str>) {
        s.on_server_message(ServerMessage::ModeStatus {
            mode,
            target: target.map(str::to_string),
            controller: None,
        });
    }

    #[test]
    fn tracking_person_round_trip() {
        let mut s = live_session();
        s.select_target("person").unwrap();
        s.request_tracking().unwrap();
        assert_eq!(
            s.take_outbox(),
            vec![
                ClientMessage::SetTrackingTarget {
                    target: "person".to_string()
                },
                ClientMessage::SetControlMode {
                    mode: ControlMode::AutonomousTracking,
                    target: Some("person".to_string())
                }
            ]
        );
        broadcast_mode(&mut s, ControlMode::AutonomousTracking, Some("person"));
        let view = s.view();
        assert_eq!(view.mode, ControlMode::AutonomousTracking);
        assert_eq!(view.selected_target, "person");
        assert_eq!(view.target.as_deref(), Some("person"));
    }

    #[test]
    fn controller_change_away_from_follow_sends_one_manual() {
        let mut s = live_session();
        s.request_follow().unwrap();
        broadcast_mode(&mut s, ControlMode::CursorFollow, None);
        s.take_outbox();

        s.on_server_message(ServerMessage::ControllerChanged {
            controller: Some(ConnectionId::new("other")),
        });
        assert_eq!(s.take_outbox(), vec![manual()]);
        assert!(s.take_notices().contains(&Notice::ControlLost {
            controller: Some(ConnectionId::new("other"))
        }));
        assert!(!s.view().axis_enabled);

        s.on_server_message(ServerMessage::ControllerChanged {
            controller: Some(ConnectionId::new("other")),
        });
        assert!(s.take_outbox().is_empty());
    }

    #[test]
    fn tracking_click_debounce_through_session() {
        let mut s = live_session();
        broadcast_mode(&mut s, ControlMode::AutonomousTracking, Some("person"));
        let t0 = Instant::now();

        s.on_click(480.0, 270.0, t0).unwrap();
        assert!(s.take_outbox().is_empty());
        assert!(s.take_notices().contains(&Notice::ExitArmed));

        s.on_click(480.0, 270.0, t0 + ms(800)).unwrap();
        assert_eq!(
            s.take_outbox(),
            vec![manual(), ClientMessage::ClickTarget { x: 960, y: 540 }]
        );
    }

    #[test]
    fn displayed_mode_tracks_latest_broadcast() {
        let mut s = live_session();
        s.request_follow().unwrap();
        assert_eq!(s.view().mode, ControlMode::Manual);

        for mode in [
            ControlMode::AutonomousTracking,
            ControlMode::Manual,
            ControlMode::CursorFollow,
        ] {
            s.on_server_message(ServerMessage::StatusUpdate(StatusSnapshot {
                mode: Some(mode),
                ..Default::default()
            }));
            assert_eq!(s.view().mode, mode);
        }
    }

    #[test]
    fn tracking_refused_while_faulted() {
        let mut s = live_session();
        s.on_server_message(ServerMessage::StatusUpdate(StatusSnapshot {
            health: Some(GimbalHealth::GimbalNotFound),
            ..Default::default()
        }));
        assert_eq!(
            s.request_tracking(),
            Err(Refusal::TrackingUnavailable(GimbalHealth::GimbalNotFound))
        );
        assert!(s.take_outbox().is_empty());
    }

    #[test]
    fn axis_input_is_throttled_and_flushed() {
        let mut s = live_session();
        let t0 = Instant::now();
        s.on_axis_input(Axis::Pan, 10.2, t0).unwrap();
        s.on_axis_input(Axis::Pan, 11.0, t0 + ms(10)).unwrap();
        s.on_axis_input(Axis::Pan, 12.0, t0 + ms(20)).unwrap();
        assert_eq!(
            s.take_outbox(),
            vec![ClientMessage::SetAxisPosition {
                axis: Axis::Pan,
                value: 10.0
            }]
        );
        s.tick(t0 + ms(50));
        assert_eq!(
            s.take_outbox(),
            vec![ClientMessage::SetAxisPosition {
                axis: Axis::Pan,
                value: 12.0
            }]
        );
    }

    #[test]
    fn axis_input_requires_control() {
        let mut s = live_session();
        s.on_server_message(ServerMessage::ControllerChanged { controller: None });
        assert_eq!(
            s.on_axis_input(Axis::Tilt, 5.0, Instant::now()),
            Err(Refusal::NotController)
        );
        assert_eq!(s.fire(), Err(Refusal::NotController));
        assert!(s.take_outbox().is_empty());
    }

    #[test]
    fn pending_axis_value_dropped_after_control_loss() {
        let mut s = live_session();
        let t0 = Instant::now();
        s.on_axis_input(Axis::Pan, 1.0, t0).unwrap();
        s.on_axis_input(Axis::Pan, 2.0, t0 + ms(5)).unwrap();
        s.take_outbox();
        s.on_server_message(ServerMessage::ControllerChanged {
            controller: Some(ConnectionId::new("other")),
        });
        s.tick(t0 + ms(100));
        assert!(s.take_outbox().is_empty());
    }

    #[test]
    fn follow_stream_only_in_authoritative_follow() {
        let mut s = live_session();
        let t0 = Instant::now();
        s.request_follow().unwrap();
        s.take_outbox();

        // Requested but not confirmed
        s.on_pointer_move(100.0, 100.0, t0);
        assert!(s.take_outbox().is_empty());

        broadcast_mode(&mut s, ControlMode::CursorFollow, None);
        s.on_pointer_move(100.0, 100.0, t0 + ms(1));
        assert_eq!(
            s.take_outbox(),
            vec![ClientMessage::ClickTarget { x: 200, y: 200 }]
        );

        // Held, then discarded when the pointer leaves
        s.on_pointer_move(120.0, 100.0, t0 + ms(10));
        s.on_pointer_leave();
        s.tick(t0 + ms(100));
        assert!(s.take_outbox().is_empty());
    }

    #[test]
    fn joystick_sends_both_axes() {
        let mut s = live_session();
        s.on_joystick(25.0, 0.0, 50.0, Instant::now()).unwrap();
        assert_eq!(
            s.take_outbox(),
            vec![
                ClientMessage::SetAxisPosition {
                    axis: Axis::Pan,
                    value: 90.0
                },
                ClientMessage::SetAxisPosition {
                    axis: Axis::Tilt,
                    value: 0.0
                }
            ]
        );
    }

    #[test]
    fn reconnect_discards_stale_intents() {
        let mut s = live_session();
        s.fire().unwrap();
        s.on_server_message(ServerMessage::Hello {
            id: ConnectionId::new("me-2"),
        });
        assert!(s.take_outbox().is_empty());
        assert!(!s.view().has_control);
    }

    #[test]
    fn offline_actions_are_refused() {
        let mut s = live_session();
        s.on_disconnected();
        assert!(s.take_notices().contains(&Notice::Disconnected));
        assert_eq!(s.request_manual(), Err(Refusal::Offline));
        assert_eq!(s.toggle_laser(), Err(Refusal::Offline));
    }

    #[test]
    fn video_failure_disables_clicks() {
        let mut s = live_session();
        s.on_media_event(MediaEvent::Failed);
        let notices = s.take_notices();
        assert_eq!(notices, vec![Notice::VideoFailed]);
        assert!(notices[0].is_persistent());
        assert_eq!(
            s.on_click(10.0, 10.0, Instant::now()),
            Err(Refusal::VideoDisabled)
        );

        s.on_media_event(MediaEvent::Connected);
        s.on_click(10.0, 10.0, Instant::now()).unwrap();
        assert_eq!(s.take_outbox().len(), 1);
    }

    #[test]
    fn click_outside_surface_refused() {
        let mut s = live_session();
        assert_eq!(
            s.on_click(2000.0, 10.0, Instant::now()),
            Err(Refusal::OutsideSurface)
        );
    }

    #[test]
    fn model_must_be_configured() {
        let mut s = live_session();
        assert_eq!(
            s.change_model("resnet"),
            Err(Refusal::UnknownModel("resnet".to_string()))
        );
        s.change_model("yolov8n").unwrap();
        assert_eq!(
            s.take_outbox(),
            vec![ClientMessage::ChangeModel {
                model: "yolov8n".to_string()
            }]
        );
    }

    #[test]
    fn actuator_and_home_replies_become_notices() {
        let mut s = live_session();
        s.on_server_message(ServerMessage::ActuatorAck {
            result: "busy".to_string(),
        });
        s.on_server_message(ServerMessage::HomeAck {
            status: "error".to_string(),
            remote: Some(turret_protocol::RemoteReply {
                status: None,
                error: Some("Gimbal not ready for move command".to_string()),
            }),
        });
        assert_eq!(
            s.take_notices(),
            vec![
                Notice::ActuatorBusy,
                Notice::HomeReply {
                    status: "error".to_string(),
                    error: Some("Gimbal not ready for move command".to_string())
                }
            ]
        );
    }

    #[test]
    fn stall_cycle_shows_transient_notice() {
        let mut s = live_session();
        s.on_media_event(MediaEvent::CycleStarted {
            reason: CycleReason::Stall,
        });
        let notices = s.take_notices();
        assert_eq!(notices, vec![Notice::Reconnecting]);
        assert!(!notices[0].is_persistent());
        assert_eq!(s.view().video, MediaState::Negotiating);
    }

    #[test]
    fn view_renders_unknown_telemetry() {
        let s = OperatorSession::new(&ConsoleConfig::default());
        let text = s.view().to_string();
        assert!(text.contains("pan: unknown"));
        assert!(text.contains("link: down"));
    }

    #[test]
    fn stale_snapshot_between_request_and_echo() {
        let mut s = live_session();
        s.request_follow().unwrap();

        s.on_server_message(ServerMessage::StatusUpdate(StatusSnapshot {
            mode: Some(ControlMode::Manual),
            ..Default::default()
        }));
        assert!(
            !s.take_notices()
                .iter()
                .any(|n| matches!(n, Notice::RequestNotApplied { .. }))
        );

        broadcast_mode(&mut s, ControlMode::CursorFollow, None);
        s.take_outbox();
        s.on_server_message(ServerMessage::ControllerChanged {
            controller: Some(ConnectionId::new("other")),
        });
        assert_eq!(s.take_outbox(), vec![manual()]);
    }

    #[test]
    fn visibility_regained_only_after_hidden() {
        let mut s = live_session();
        assert!(!s.set_visible(true));
        assert!(!s.set_visible(false));
        assert!(s.set_visible(true));
        assert!(!s.set_visible(true));
    }
}
