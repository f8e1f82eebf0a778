use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use turret_console::control::{ControlChannel, ControlEvent};
use turret_console::media::{MediaCommand, MediaDriver, MediaEvent, MediaTiming};
use turret_console::mode::Refusal;
use turret_console::operator::{self, OperatorCommand};
use turret_console::peer::WebRtcPeerFactory;
use turret_console::session::OperatorSession;
use turret_console::signaling::HttpSignaling;
use turret_console::{cli, config, tls};
use turret_protocol::ClientMessage;

/// Channels between the console task and the I/O tasks.
struct ConsoleIo {
    control: mpsc::Receiver<ControlEvent>,
    intents: mpsc::Sender<ClientMessage>,
    media: mpsc::Receiver<MediaEvent>,
    media_commands: mpsc::Sender<MediaCommand>,
    operator: mpsc::Receiver<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Install rustls crypto provider
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }

    let args = cli::parse_args()?;

    // Load configuration
    let mut config = config::load_config(Path::new(&args.config_path))?;
    config::apply_overrides(&mut config, &args);

    // Validate configuration semantics
    if let Err(issues) = config.validate() {
        let has_errors = issues.iter().any(|i| i.starts_with("ERROR:"));
        for issue in &issues {
            if issue.starts_with("ERROR:") {
                error!("{}", issue);
            } else {
                warn!("{}", issue);
            }
        }
        if has_errors {
            error!(
                "Configuration has {} issue(s). Fix the ERROR(s) above and restart.",
                issues.len()
            );
            std::process::exit(1);
        }
    }

    let tls = tls::client_config(config.server.tls_cert.as_deref())?;

    // Control channel
    let (intent_tx, intent_rx) = mpsc::channel(64);
    let (control_tx, control_rx) = mpsc::channel(64);
    let control = ControlChannel::new(config.server.control_url.clone(), Arc::clone(&tls));
    let control_task = tokio::spawn(control.run(intent_rx, control_tx));

    // Media session
    let (media_cmd_tx, media_cmd_rx) = mpsc::channel(8);
    let (media_ev_tx, media_ev_rx) = mpsc::channel(32);
    let driver = MediaDriver::new(
        WebRtcPeerFactory::new(&config.ice),
        HttpSignaling::new(config.server.signaling_url.clone(), tls),
        MediaTiming::from_config(&config.timing),
        media_cmd_rx,
        media_ev_tx,
    );
    let media_task = tokio::spawn(driver.run());

    // Operator input
    let (operator_tx, operator_rx) = mpsc::channel(64);
    spawn_stdin_reader(operator_tx);

    let session = OperatorSession::new(&config);
    let io = ConsoleIo {
        control: control_rx,
        intents: intent_tx,
        media: media_ev_rx,
        media_commands: media_cmd_tx,
        operator: operator_rx,
    };
    let flush_every = Duration::from_millis(config.timing.throttle_ms);

    info!(
        control = %config.server.control_url,
        signaling = %config.server.signaling_url,
        "Turret console started (type 'help' for commands)"
    );

    // Set up SIGTERM handler
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = run_console(session, io, flush_every) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
    }

    // Console channels are gone; give the tasks a moment to close cleanly
    let grace = Duration::from_secs(2);
    if tokio::time::timeout(grace, media_task).await.is_err() {
        warn!("Media driver did not stop in time");
    }
    if tokio::time::timeout(grace, control_task).await.is_err() {
        warn!("Control channel did not stop in time");
    }

    info!("Console shutdown complete");
    Ok(())
}

fn spawn_stdin_reader(tx: mpsc::Sender<String>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read operator input: {e}");
                    break;
                }
            }
        }
    });
}

/// The single owner of session state. Every event runs to completion, then
/// whatever it produced is dispatched.
async fn run_console(mut session: OperatorSession, mut io: ConsoleIo, flush_every: Duration) {
    let mut flush = tokio::time::interval(flush_every);
    flush.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut operator_open = true;

    loop {
        tokio::select! {
            event = io.control.recv() => match event {
                Some(ControlEvent::Message(msg)) => session.on_server_message(msg),
                Some(ControlEvent::Disconnected) => session.on_disconnected(),
                None => {
                    warn!("Control channel task ended");
                    break;
                }
            },
            event = io.media.recv() => match event {
                Some(event) => session.on_media_event(event),
                None => {
                    warn!("Media driver ended");
                    break;
                }
            },
            line = io.operator.recv(), if operator_open => match line {
                Some(line) => {
                    if !handle_line(&mut session, &line, &io.media_commands) {
                        info!("Operator quit");
                        break;
                    }
                }
                None => {
                    info!("Operator input closed, running until interrupted");
                    operator_open = false;
                }
            },
            _ = flush.tick() => session.tick(Instant::now()),
        }

        dispatch(&mut session, &io.intents);
    }
}

fn dispatch(session: &mut OperatorSession, intents: &mpsc::Sender<ClientMessage>) {
    for intent in session.take_outbox() {
        match intents.try_send(intent) {
            Ok(()) => {}
            Err(TrySendError::Full(intent)) => {
                warn!(?intent, "Control channel backed up, dropping intent");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Control channel gone, dropping intent");
            }
        }
    }
    for notice in session.take_notices() {
        if notice.is_persistent() {
            error!(%notice, "Operator notice");
        } else {
            info!(%notice, "Operator notice");
        }
    }
}

/// Returns false when the operator asked to quit.
fn handle_line(
    session: &mut OperatorSession,
    line: &str,
    media_commands: &mpsc::Sender<MediaCommand>,
) -> bool {
    let command = match operator::parse_line(line) {
        Ok(Some(command)) => command,
        Ok(None) => return true,
        Err(e) => {
            warn!("{e}");
            return true;
        }
    };

    let now = Instant::now();
    let result: Result<(), Refusal> = match command {
        OperatorCommand::Click { x, y } => session.on_click(x, y, now),
        OperatorCommand::PointerMove { x, y } => {
            session.on_pointer_move(x, y, now);
            Ok(())
        }
        OperatorCommand::PointerLeave => {
            session.on_pointer_leave();
            Ok(())
        }
        OperatorCommand::Axis { axis, value } => session.on_axis_input(axis, value, now),
        OperatorCommand::Joystick { dx, dy, radius } => session.on_joystick(dx, dy, radius, now),
        OperatorCommand::ToggleFollow => session.toggle_follow(),
        OperatorCommand::Track => session.request_tracking(),
        OperatorCommand::Manual => session.request_manual(),
        OperatorCommand::Target(target) => session.select_target(&target),
        OperatorCommand::Laser => session.toggle_laser(),
        OperatorCommand::Fire => session.fire(),
        OperatorCommand::Home => session.request_home(),
        OperatorCommand::Model(model) => session.change_model(&model),
        OperatorCommand::Layout(rect) => {
            session.set_layout(rect);
            Ok(())
        }
        OperatorCommand::Visible => {
            if session.set_visible(true)
                && media_commands
                    .try_send(MediaCommand::VisibilityRegained)
                    .is_err()
            {
                debug!("Media driver busy, visibility trigger dropped");
            }
            Ok(())
        }
        OperatorCommand::Hidden => {
            session.set_visible(false);
            Ok(())
        }
        OperatorCommand::Status => {
            println!("{}", session.view());
            Ok(())
        }
        OperatorCommand::Help => {
            println!("{}", operator::HELP);
            Ok(())
        }
        OperatorCommand::Quit => return false,
    };

    if let Err(refusal) = result {
        info!(%refusal, "Refused");
    }
    true
}
