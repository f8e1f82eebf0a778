use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Connection identifier assigned by the server when a control channel opens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error returned when a textual name does not match any variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}' (expected one of: {expected})")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// Turret-wide control mode. Exactly one is active; clients only mirror it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    #[default]
    #[serde(alias = "idle")]
    Manual,
    #[serde(rename = "follow")]
    CursorFollow,
    #[serde(rename = "tracking")]
    AutonomousTracking,
}

impl ControlMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlMode::Manual => "manual",
            ControlMode::CursorFollow => "follow",
            ControlMode::AutonomousTracking => "tracking",
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlMode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" | "idle" => Ok(ControlMode::Manual),
            "follow" => Ok(ControlMode::CursorFollow),
            "tracking" => Ok(ControlMode::AutonomousTracking),
            other => Err(UnknownVariant {
                kind: "control mode",
                value: other.to_string(),
                expected: "manual, follow, tracking",
            }),
        }
    }
}

/// Motor axis. Motor 1 pans, motor 2 tilts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Pan,
    Tilt,
}

impl Axis {
    pub const ALL: [Axis; 2] = [Axis::Pan, Axis::Tilt];

    pub fn as_str(self) -> &'static str {
        match self {
            Axis::Pan => "pan",
            Axis::Tilt => "tilt",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Axis {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pan" | "1" => Ok(Axis::Pan),
            "tilt" | "2" => Ok(Axis::Tilt),
            other => Err(UnknownVariant {
                kind: "axis",
                value: other.to_string(),
                expected: "pan (1), tilt (2)",
            }),
        }
    }
}

/// Gimbal health / homing condition as reported by the server.
/// Unrecognized values decode as `Unknown`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GimbalHealth {
    Ready,
    Homing,
    HomingError,
    GimbalNotFound,
    #[default]
    #[serde(other)]
    Unknown,
}

impl GimbalHealth {
    pub fn as_str(self) -> &'static str {
        match self {
            GimbalHealth::Ready => "ready",
            GimbalHealth::Homing => "homing",
            GimbalHealth::HomingError => "homing_error",
            GimbalHealth::GimbalNotFound => "gimbal_not_found",
            GimbalHealth::Unknown => "unknown",
        }
    }

    pub fn is_ready(self) -> bool {
        self == GimbalHealth::Ready
    }

    /// Error or unknown conditions. Autonomous tracking is refused while set.
    pub fn is_fault(self) -> bool {
        matches!(
            self,
            GimbalHealth::HomingError | GimbalHealth::GimbalNotFound | GimbalHealth::Unknown
        )
    }
}

impl fmt::Display for GimbalHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intents sent from the console to the turret server over the control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Absolute axis position in degrees
    SetAxisPosition { axis: Axis, value: f64 },
    SetControlMode {
        mode: ControlMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
    SetTrackingTarget { target: String },
    ToggleLaser,
    /// Fire the water gun
    Fire,
    RequestHome,
    /// Switch the server-side detection model
    ChangeModel { model: String },
    /// Aim at a point in turret-native pixel coordinates
    ClickTarget { x: u32, y: u32 },
}

/// Periodic status broadcast. Every field is optional: a missing field means
/// the server did not report it this time, not that it kept its old value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusSnapshot {
    /// Pan angle in degrees
    #[serde(rename = "motor1", skip_serializing_if = "Option::is_none")]
    pub pan: Option<f64>,
    /// Tilt angle in degrees
    #[serde(rename = "motor2", skip_serializing_if = "Option::is_none")]
    pub tilt: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_temp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gimbal_cpu_temp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub laser: Option<bool>,
    #[serde(rename = "gimbal_state", skip_serializing_if = "Option::is_none")]
    pub health: Option<GimbalHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor1: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor2: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<ConnectionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ControlMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewers: Option<u32>,
}

/// Reply relayed from the remote gimbal link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Broadcasts and replies from the turret server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First message on every connection: this client's identity
    Hello { id: ConnectionId },
    StatusUpdate(StatusSnapshot),
    ModeStatus {
        mode: ControlMode,
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        controller: Option<ConnectionId>,
    },
    /// Result of a fire request: "fired" or "busy"
    ActuatorAck { result: String },
    HomeAck {
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        remote: Option<RemoteReply>,
    },
    TargetChanged { target: String },
    /// `None` means nobody holds control
    ControllerChanged {
        #[serde(default)]
        controller: Option<ConnectionId>,
    },
    ViewerCount { count: u32 },
}

/// Session description exchanged with the signaling endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: SdpKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SdpKind {
    Offer,
    Answer,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            kind: SdpKind::Offer,
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            kind: SdpKind::Answer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_control_mode_uses_wire_names() {
        let msg = ClientMessage::SetControlMode {
            mode: ControlMode::AutonomousTracking,
            target: Some("person".to_string()),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"set_control_mode""#));
        assert!(json.contains(r#""mode":"tracking""#));
        assert!(json.contains(r#""target":"person""#));

        let manual = ClientMessage::SetControlMode {
            mode: ControlMode::Manual,
            target: None,
        };
        let json = serde_json::to_string(&manual).unwrap();
        assert!(json.contains(r#""mode":"manual""#));
        // Target is omitted, not null
        assert!(!json.contains("target"));
    }

    #[test]
    fn client_intents_compact_format() {
        let json = serde_json::to_string(&ClientMessage::SetAxisPosition {
            axis: Axis::Tilt,
            value: -12.0,
        })
        .unwrap();
        assert!(json.contains(r#""type":"set_axis_position""#));
        assert!(json.contains(r#""axis":"tilt""#));

        let json = serde_json::to_string(&ClientMessage::ClickTarget { x: 960, y: 540 }).unwrap();
        assert!(json.contains(r#""type":"click_target""#));
        assert!(json.contains(r#""x":960"#));

        let json = serde_json::to_string(&ClientMessage::ToggleLaser).unwrap();
        assert_eq!(json, r#"{"type":"toggle_laser"}"#);

        let json = serde_json::to_string(&ClientMessage::Fire).unwrap();
        assert_eq!(json, r#"{"type":"fire"}"#);

        let json = serde_json::to_string(&ClientMessage::RequestHome).unwrap();
        assert_eq!(json, r#"{"type":"request_home"}"#);

        let json = serde_json::to_string(&ClientMessage::ChangeModel {
            model: "yolov8n".to_string(),
        })
        .unwrap();
        assert!(json.contains(r#""type":"change_model""#));
        assert!(json.contains(r#""model":"yolov8n""#));
    }

    #[test]
    fn status_update_from_server_format() {
        let server_json = r#"{
            "type": "status_update",
            "motor1": 12.5,
            "motor2": -3.25,
            "cpu_temp": 61.2,
            "gimbal_cpu_temp": 48.0,
            "laser": true,
            "gimbal_state": "homing_error",
            "sensor1": false,
            "sensor2": true,
            "controller": "abc123"
        }"#;
        let msg: ServerMessage = serde_json::from_str(server_json).unwrap();
        match msg {
            ServerMessage::StatusUpdate(snapshot) => {
                assert_eq!(snapshot.pan, Some(12.5));
                assert_eq!(snapshot.tilt, Some(-3.25));
                assert_eq!(snapshot.health, Some(GimbalHealth::HomingError));
                assert_eq!(snapshot.sensor2, Some(true));
                assert_eq!(snapshot.controller, Some(ConnectionId::new("abc123")));
                assert!(snapshot.mode.is_none());
                assert!(snapshot.viewers.is_none());
            }
            _ => panic!("Expected StatusUpdate"),
        }
    }

    #[test]
    fn status_update_missing_fields_are_none() {
        let msg: ServerMessage = serde_json::from_str(r#"{"type":"status_update"}"#).unwrap();
        assert_eq!(msg, ServerMessage::StatusUpdate(StatusSnapshot::default()));
    }

    #[test]
    fn unrecognized_health_decodes_as_unknown() {
        let snapshot: StatusSnapshot =
            serde_json::from_str(r#"{"gimbal_state":"on_fire"}"#).unwrap();
        assert_eq!(snapshot.health, Some(GimbalHealth::Unknown));
    }

    #[test]
    fn health_fault_classification() {
        assert!(!GimbalHealth::Ready.is_fault());
        assert!(!GimbalHealth::Homing.is_fault());
        assert!(GimbalHealth::HomingError.is_fault());
        assert!(GimbalHealth::GimbalNotFound.is_fault());
        assert!(GimbalHealth::Unknown.is_fault());
        assert!(GimbalHealth::Ready.is_ready());
        assert!(!GimbalHealth::Homing.is_ready());
    }

    #[test]
    fn mode_status_and_controller_changed() {
        let msg: ServerMessage = serde_json::from_str(
            r#"{"type":"mode_status","mode":"tracking","target":"person","controller":"c1"}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::ModeStatus {
                mode,
                target,
                controller,
            } => {
                assert_eq!(mode, ControlMode::AutonomousTracking);
                assert_eq!(target.as_deref(), Some("person"));
                assert_eq!(controller, Some(ConnectionId::new("c1")));
            }
            _ => panic!("Expected ModeStatus"),
        }

        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"controller_changed","controller":null}"#).unwrap();
        assert_eq!(msg, ServerMessage::ControllerChanged { controller: None });
    }

    #[test]
    fn home_ack_with_nested_remote_error() {
        let msg: ServerMessage = serde_json::from_str(
            r#"{"type":"home_ack","status":"error","remote":{"error":"Gimbal not ready for move command"}}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::HomeAck { status, remote } => {
                assert_eq!(status, "error");
                let remote = remote.expect("remote reply");
                assert_eq!(
                    remote.error.as_deref(),
                    Some("Gimbal not ready for move command")
                );
                assert!(remote.status.is_none());
            }
            _ => panic!("Expected HomeAck"),
        }
    }

    #[test]
    fn hello_carries_identity() {
        let msg: ServerMessage = serde_json::from_str(r#"{"type":"hello","id":"sid-42"}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Hello {
                id: ConnectionId::new("sid-42")
            }
        );
    }

    #[test]
    fn session_description_type_field() {
        let offer = SessionDescription::offer("v=0\r\n");
        let json = serde_json::to_string(&offer).unwrap();
        assert!(json.contains(r#""type":"offer""#));

        let answer: SessionDescription =
            serde_json::from_str(r#"{"sdp":"v=0\r\nanswer","type":"answer"}"#).unwrap();
        assert_eq!(answer.kind, SdpKind::Answer);
    }

    #[test]
    fn names_parse_from_operator_text() {
        assert_eq!("follow".parse::<ControlMode>(), Ok(ControlMode::CursorFollow));
        assert_eq!("idle".parse::<ControlMode>(), Ok(ControlMode::Manual));
        assert_eq!("2".parse::<Axis>(), Ok(Axis::Tilt));
        let err = "roll".parse::<Axis>().unwrap_err();
        assert!(err.to_string().contains("roll"));
    }

    #[test]
    fn idle_mode_decodes_as_manual() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"status_update","motor1":1.0,"mode":"idle"}"#)
                .unwrap();
        let ServerMessage::StatusUpdate(snapshot) = msg else {
            panic!("expected status_update, got {msg:?}");
        };
        assert_eq!(snapshot.mode, Some(ControlMode::Manual));
        assert_eq!(snapshot.pan, Some(1.0));
    }
}
