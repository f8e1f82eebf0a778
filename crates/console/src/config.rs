use std::path::Path;

use anyhow::{Context, Result};
use turret_protocol::ConsoleConfig;

use crate::cli::Args;

/// Load configuration from a TOML file at the given path.
/// If the file doesn't exist, returns default configuration.
pub fn load_config(path: &Path) -> Result<ConsoleConfig> {
    if !path.exists() {
        tracing::warn!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        return Ok(ConsoleConfig::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: ConsoleConfig =
        toml::from_str(&contents).with_context(|| "Failed to parse config TOML")?;

    tracing::info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Command-line values win over the file.
pub fn apply_overrides(config: &mut ConsoleConfig, args: &Args) {
    if let Some(url) = &args.server_url {
        config.server.control_url = url.clone();
    }
    if let Some(url) = &args.signaling_url {
        config.server.signaling_url = url.clone();
    }
    if let Some(cert) = &args.tls_cert_path {
        config.server.tls_cert = Some(cert.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let config = load_config(Path::new("/nonexistent/turret.toml")).unwrap();
        assert_eq!(config.timing.throttle_ms, 50);
        assert_eq!(config.tracking.default_target, "person");
    }

    #[test]
    fn file_is_parsed() {
        let path = std::env::temp_dir().join(format!("turret-config-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[server]\ncontrol_url = \"wss://turret.local/control\"\n\n[video]\nnative_width = 1280\n",
        )
        .unwrap();
        let result = load_config(&path);
        std::fs::remove_file(&path).ok();

        let config = result.unwrap();
        assert_eq!(config.server.control_url, "wss://turret.local/control");
        assert_eq!(config.video.native_width, 1280);
        assert_eq!(config.video.native_height, 1080);
    }

    #[test]
    fn bad_toml_is_an_error() {
        let path = std::env::temp_dir().join(format!("turret-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[server\n").unwrap();
        let result = load_config(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }

    #[test]
    fn cli_overrides_file_values() {
        let mut config = ConsoleConfig::default();
        let args = Args {
            config_path: "unused".to_string(),
            server_url: Some("ws://10.0.0.2:5000/control".to_string()),
            signaling_url: None,
            tls_cert_path: Some("/etc/turret/cert.pem".to_string()),
        };
        apply_overrides(&mut config, &args);
        assert_eq!(config.server.control_url, "ws://10.0.0.2:5000/control");
        assert_eq!(config.server.signaling_url, "http://127.0.0.1:8080/offer");
        assert_eq!(config.server.tls_cert.as_deref(), Some("/etc/turret/cert.pem"));
    }
}
