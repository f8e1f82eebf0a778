use serde::{Deserialize, Serialize};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub ice: IceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Control channel WebSocket URL
    #[serde(default = "default_control_url")]
    pub control_url: String,
    /// Media signaling endpoint (offer in, answer out)
    #[serde(default = "default_signaling_url")]
    pub signaling_url: String,
    /// PEM certificate to pin for wss:// and https:// connections
    pub tls_cert: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Turret-native frame width in pixels
    #[serde(default = "default_native_width")]
    pub native_width: u32,
    /// Turret-native frame height in pixels
    #[serde(default = "default_native_height")]
    pub native_height: u32,
    /// Joystick range in degrees (output spans -range..range)
    #[serde(default = "default_joystick_range")]
    pub joystick_range: f64,
}

/// Intervals and bounds for input throttling and media recovery.
/// All durations are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Minimum spacing between commands on one input channel
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    /// Window for the second click that exits autonomous tracking
    #[serde(default = "default_exit_confirm_ms")]
    pub exit_confirm_ms: u64,
    /// Delay between failed negotiation attempts
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Wall-clock ceiling for one retry cycle
    #[serde(default = "default_retry_ceiling_ms")]
    pub retry_ceiling_ms: u64,
    /// Per-attempt timeout (signaling round-trip plus first frame)
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    /// Stall watchdog sampling interval
    #[serde(default = "default_watchdog_interval_ms")]
    pub watchdog_interval_ms: u64,
    /// Consecutive identical playback samples beyond which the stream is stalled
    #[serde(default = "default_stall_samples")]
    pub stall_samples: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Target label selected at startup
    #[serde(default = "default_target")]
    pub default_target: String,
    /// Labels offered for autonomous tracking
    #[serde(default = "default_targets")]
    pub targets: Vec<String>,
    /// Detection models the server can switch between
    #[serde(default = "default_models")]
    pub models: Vec<String>,
}

/// ICE/TURN server configuration for WebRTC NAT traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceConfig {
    /// STUN server URLs (default: Google's public STUN servers)
    #[serde(default = "default_stun_urls")]
    pub stun_urls: Vec<String>,
    /// TURN server URLs (e.g., "turn:turn.example.com:3478")
    #[serde(default)]
    pub turn_urls: Vec<String>,
    pub turn_username: Option<String>,
    pub turn_credential: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            control_url: default_control_url(),
            signaling_url: default_signaling_url(),
            tls_cert: None,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            native_width: default_native_width(),
            native_height: default_native_height(),
            joystick_range: default_joystick_range(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            throttle_ms: default_throttle_ms(),
            exit_confirm_ms: default_exit_confirm_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            retry_ceiling_ms: default_retry_ceiling_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            watchdog_interval_ms: default_watchdog_interval_ms(),
            stall_samples: default_stall_samples(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            default_target: default_target(),
            targets: default_targets(),
            models: default_models(),
        }
    }
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            stun_urls: default_stun_urls(),
            turn_urls: Vec::new(),
            turn_username: None,
            turn_credential: None,
        }
    }
}

impl ConsoleConfig {
    /// Validate the configuration, returning a list of issues found.
    ///
    /// Issues are prefixed with "ERROR:" (fatal, console should not start) or
    /// "WARNING:" (advisory, console can start but the config is likely wrong).
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        // --- Endpoints ---
        let control = &self.server.control_url;
        if !control.starts_with("ws://") && !control.starts_with("wss://") {
            issues.push(format!(
                "ERROR: server.control_url '{}' must start with 'ws://' or 'wss://'.",
                control
            ));
        }
        let signaling = &self.server.signaling_url;
        if !signaling.starts_with("http://") && !signaling.starts_with("https://") {
            issues.push(format!(
                "ERROR: server.signaling_url '{}' must start with 'http://' or 'https://'.",
                signaling
            ));
        }
        if let Some(cert) = &self.server.tls_cert
            && !std::path::Path::new(cert).exists()
        {
            issues.push(format!(
                "WARNING: server.tls_cert '{}' does not exist. \
                 Falling back to system roots only.",
                cert
            ));
        }

        // --- Native resolution ---
        if self.video.native_width == 0 || self.video.native_height == 0 {
            issues.push(format!(
                "ERROR: video native resolution must be non-zero, got {}x{}.",
                self.video.native_width, self.video.native_height
            ));
        }
        if !(self.video.joystick_range > 0.0 && self.video.joystick_range <= 360.0) {
            issues.push(format!(
                "ERROR: video.joystick_range must be in (0, 360], got {}.",
                self.video.joystick_range
            ));
        }

        // --- Timing ---
        if self.timing.throttle_ms == 0 {
            issues.push("ERROR: timing.throttle_ms must be >= 1.".to_string());
        } else if self.timing.throttle_ms > 1000 {
            issues.push(format!(
                "WARNING: timing.throttle_ms is {} ms. Follow mode will feel sluggish \
                 above a few hundred milliseconds.",
                self.timing.throttle_ms
            ));
        }
        if self.timing.watchdog_interval_ms == 0 {
            issues.push("ERROR: timing.watchdog_interval_ms must be >= 1.".to_string());
        }
        if self.timing.stall_samples == 0 {
            issues.push("ERROR: timing.stall_samples must be >= 1.".to_string());
        }
        if self.timing.retry_backoff_ms == 0 {
            issues.push(
                "WARNING: timing.retry_backoff_ms is 0. Failed negotiations will retry \
                 in a tight loop until the ceiling."
                    .to_string(),
            );
        }
        if self.timing.retry_ceiling_ms < self.timing.retry_backoff_ms {
            issues.push(format!(
                "ERROR: timing.retry_ceiling_ms ({}) must be at least timing.retry_backoff_ms ({}).",
                self.timing.retry_ceiling_ms, self.timing.retry_backoff_ms
            ));
        }
        if self.timing.attempt_timeout_ms == 0 {
            issues.push("ERROR: timing.attempt_timeout_ms must be >= 1.".to_string());
        }

        // --- Tracking ---
        if self.tracking.default_target.trim().is_empty() {
            issues.push("ERROR: tracking.default_target must not be empty.".to_string());
        } else if !self.tracking.targets.is_empty()
            && !self.tracking.targets.contains(&self.tracking.default_target)
        {
            issues.push(format!(
                "WARNING: tracking.default_target '{}' is not listed in tracking.targets.",
                self.tracking.default_target
            ));
        }
        if self.tracking.models.iter().any(|m| m.trim().is_empty()) {
            issues.push(
                "WARNING: tracking.models contains an empty string. This entry will never match."
                    .to_string(),
            );
        }

        // --- STUN URLs ---
        for url in &self.ice.stun_urls {
            if !url.starts_with("stun:") && !url.starts_with("stuns:") {
                issues.push(format!(
                    "ERROR: STUN URL '{}' must start with 'stun:' or 'stuns:'. \
                     Example: stun:stun.l.google.com:19302",
                    url
                ));
            }
        }

        // --- TURN URLs ---
        for url in &self.ice.turn_urls {
            if !url.starts_with("turn:") && !url.starts_with("turns:") {
                issues.push(format!(
                    "ERROR: TURN URL '{}' must start with 'turn:' or 'turns:'. \
                     Example: turn:turn.example.com:3478",
                    url
                ));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

fn default_control_url() -> String {
    "ws://127.0.0.1:5000/control".to_string()
}
fn default_signaling_url() -> String {
    "http://127.0.0.1:8080/offer".to_string()
}
fn default_native_width() -> u32 {
    1920
}
fn default_native_height() -> u32 {
    1080
}
fn default_joystick_range() -> f64 {
    180.0
}
fn default_throttle_ms() -> u64 {
    50
}
fn default_exit_confirm_ms() -> u64 {
    1500
}
fn default_retry_backoff_ms() -> u64 {
    1000
}
fn default_retry_ceiling_ms() -> u64 {
    10_000
}
fn default_attempt_timeout_ms() -> u64 {
    5000
}
fn default_watchdog_interval_ms() -> u64 {
    1500
}
fn default_stall_samples() -> u32 {
    3
}
fn default_target() -> String {
    "person".to_string()
}
fn default_targets() -> Vec<String> {
    vec!["person".to_string(), "cat".to_string(), "dog".to_string()]
}
fn default_models() -> Vec<String> {
    vec!["mobilenet_ssd".to_string(), "yolov8n".to_string()]
}
fn default_stun_urls() -> Vec<String> {
    vec![
        "stun:stun.l.google.com:19302".to_string(),
        "stun:stun1.l.google.com:19302".to_string(),
    ]
}
