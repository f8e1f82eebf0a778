//! Inbound video session: negotiation, bounded retry and stall recovery.
//!
//! [`MediaSession`] is the clock-driven state machine. It performs no I/O and
//! is fed instants by its caller. [`MediaDriver`] runs it against real (or
//! fake) peers and a signaling endpoint.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, warn};
use turret_protocol::{SdpKind, SessionDescription, TimingConfig};

use crate::signaling::SignalingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaState {
    Idle,
    Negotiating,
    Connected,
    /// The last cycle hit its ceiling. Only an external trigger starts another.
    Failed,
}

/// Why a negotiation cycle began.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleReason {
    Start,
    Stall,
    Visibility,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    CycleStarted { reason: CycleReason },
    AttemptFailed { attempt: u32, error: String },
    Connected,
    /// Cycle ceiling exceeded. Sent at most once per cycle.
    Failed,
}

/// External triggers for the media driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCommand {
    /// The operator brought the console back to the foreground.
    VisibilityRegained,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaTiming {
    pub backoff: Duration,
    pub ceiling: Duration,
    pub attempt_timeout: Duration,
    pub watchdog_interval: Duration,
    pub stall_samples: u32,
}

impl MediaTiming {
    pub fn from_config(timing: &TimingConfig) -> Self {
        Self {
            backoff: Duration::from_millis(timing.retry_backoff_ms),
            ceiling: Duration::from_millis(timing.retry_ceiling_ms),
            attempt_timeout: Duration::from_millis(timing.attempt_timeout_ms),
            watchdog_interval: Duration::from_millis(timing.watchdog_interval_ms),
            stall_samples: timing.stall_samples,
        }
    }
}

impl Default for MediaTiming {
    fn default() -> Self {
        Self::from_config(&TimingConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Retry { at: Instant },
    /// `report` is false if this cycle's failure was already surfaced.
    Failed { report: bool },
}

#[derive(Debug)]
pub struct MediaSession {
    timing: MediaTiming,
    state: MediaState,
    in_flight: bool,
    cycle_started: Option<Instant>,
    attempts: u32,
    failure_reported: bool,
    last_position: Option<u64>,
    unchanged: u32,
}

impl MediaSession {
    pub fn new(timing: MediaTiming) -> Self {
        Self {
            timing,
            state: MediaState::Idle,
            in_flight: false,
            cycle_started: None,
            attempts: 0,
            failure_reported: false,
            last_position: None,
            unchanged: 0,
        }
    }

    pub fn state(&self) -> MediaState {
        self.state
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Start a retry cycle. Returns false (and changes nothing) if one is
    /// already running.
    pub fn begin_cycle(&mut self, now: Instant) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        self.state = MediaState::Negotiating;
        self.cycle_started = Some(now);
        self.attempts = 0;
        self.failure_reported = false;
        self.last_position = None;
        self.unchanged = 0;
        true
    }

    /// Hard end of the current cycle.
    pub fn deadline(&self) -> Option<Instant> {
        self.cycle_started.map(|at| at + self.timing.ceiling)
    }

    /// Cut-off for an attempt starting at `now`: its own timeout, but never
    /// past the cycle ceiling.
    pub fn attempt_deadline(&self, now: Instant) -> Instant {
        let own = now + self.timing.attempt_timeout;
        match self.deadline() {
            Some(ceiling) => own.min(ceiling),
            None => own,
        }
    }

    pub fn on_attempt_failed(&mut self, now: Instant) -> AttemptOutcome {
        self.attempts += 1;
        let next = now + self.timing.backoff;
        match self.deadline() {
            Some(ceiling) if next < ceiling => AttemptOutcome::Retry { at: next },
            _ => AttemptOutcome::Failed {
                report: self.fail(),
            },
        }
    }

    /// End the cycle as failed. Returns true the first time per cycle.
    pub fn fail(&mut self) -> bool {
        self.state = MediaState::Failed;
        self.in_flight = false;
        let first = !self.failure_reported;
        self.failure_reported = true;
        first
    }

    pub fn on_connected(&mut self) {
        self.state = MediaState::Connected;
        self.in_flight = false;
        self.last_position = None;
        self.unchanged = 0;
    }

    /// Feed one watchdog sample of the playback clock. Returns true when more
    /// than `stall_samples` consecutive samples read the same position; the
    /// caller must then start a new cycle.
    pub fn on_watchdog_sample(&mut self, position: u64, ready: bool) -> bool {
        if self.state != MediaState::Connected || self.in_flight {
            return false;
        }
        if !ready {
            self.last_position = None;
            self.unchanged = 0;
            return false;
        }
        if self.last_position == Some(position) {
            self.unchanged += 1;
        } else {
            self.last_position = Some(position);
            self.unchanged = 0;
        }
        // `unchanged` counts repeats after the first reading of a position
        if self.unchanged >= self.timing.stall_samples {
            warn!(position, samples = self.unchanged, "Video stalled");
            self.unchanged = 0;
            return true;
        }
        false
    }

    /// A foregrounded console retries unless video is already playing.
    pub fn wants_cycle_on_visibility(&self) -> bool {
        !self.in_flight && self.state != MediaState::Connected
    }
}

/// A receive-only peer connection for one negotiation attempt.
pub trait MediaPeer: Send {
    fn create_offer(&mut self) -> impl Future<Output = anyhow::Result<SessionDescription>> + Send;

    fn apply_answer(
        &mut self,
        answer: SessionDescription,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Resolves once the first video frame has arrived.
    fn first_frame(&mut self) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Monotonic playback clock (frames received so far).
    fn playback_position(&self) -> u64;

    /// Whether the stream claims to be playing.
    fn is_ready(&self) -> bool;

    fn stop_tracks(&mut self) -> impl Future<Output = ()> + Send;

    fn close(self) -> impl Future<Output = ()> + Send;
}

pub trait PeerFactory: Send {
    type Peer: MediaPeer;

    fn create(&mut self) -> impl Future<Output = anyhow::Result<Self::Peer>> + Send;
}

/// Offer/answer exchange with the signaling endpoint.
pub trait Signaling: Send + Sync {
    fn exchange(
        &self,
        offer: SessionDescription,
    ) -> impl Future<Output = Result<SessionDescription, SignalingError>> + Send;
}

async fn negotiate<P: MediaPeer, S: Signaling>(peer: &mut P, signaling: &S) -> anyhow::Result<()> {
    let offer = peer.create_offer().await?;
    let answer = signaling.exchange(offer).await?;
    if answer.kind != SdpKind::Answer {
        anyhow::bail!("signaling endpoint returned {:?} instead of an answer", answer.kind);
    }
    peer.apply_answer(answer).await?;
    peer.first_frame().await?;
    Ok(())
}

/// Owns the current peer and drives [`MediaSession`] in real time.
pub struct MediaDriver<F: PeerFactory, S: Signaling> {
    factory: F,
    signaling: S,
    session: MediaSession,
    timing: MediaTiming,
    peer: Option<F::Peer>,
    commands: mpsc::Receiver<MediaCommand>,
    events: mpsc::Sender<MediaEvent>,
}

impl<F: PeerFactory, S: Signaling> MediaDriver<F, S> {
    pub fn new(
        factory: F,
        signaling: S,
        timing: MediaTiming,
        commands: mpsc::Receiver<MediaCommand>,
        events: mpsc::Sender<MediaEvent>,
    ) -> Self {
        Self {
            factory,
            signaling,
            session: MediaSession::new(timing),
            timing,
            peer: None,
            commands,
            events,
        }
    }

    /// Run until the command channel closes.
    pub async fn run(mut self) {
        let mut reason = Some(CycleReason::Start);
        let mut watchdog = self.new_watchdog();

        loop {
            if let Some(r) = reason.take() {
                if !self.run_cycle(r).await {
                    break;
                }
                watchdog = self.new_watchdog();
            }

            tokio::select! {
                _ = watchdog.tick() => {
                    if let Some(peer) = &self.peer
                        && self.session.on_watchdog_sample(peer.playback_position(), peer.is_ready())
                    {
                        reason = Some(CycleReason::Stall);
                    }
                }
                cmd = self.commands.recv() => match cmd {
                    Some(MediaCommand::VisibilityRegained) => {
                        if self.session.wants_cycle_on_visibility() {
                            reason = Some(CycleReason::Visibility);
                        } else {
                            debug!(state = ?self.session.state(), "Visibility regained, video unaffected");
                        }
                    }
                    None => break,
                },
            }
        }

        self.teardown().await;
        info!("Media driver stopped");
    }

    fn new_watchdog(&self) -> tokio::time::Interval {
        let period = self.timing.watchdog_interval;
        let mut watchdog = tokio::time::interval_at(Instant::now() + period, period);
        watchdog.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        watchdog
    }

    /// One retry cycle. Returns false if the command channel closed meanwhile.
    async fn run_cycle(&mut self, reason: CycleReason) -> bool {
        if !self.session.begin_cycle(Instant::now()) {
            debug!(?reason, "Media cycle already in flight");
            return true;
        }
        info!(?reason, "Starting media negotiation");
        self.emit(MediaEvent::CycleStarted { reason }).await;

        loop {
            // The previous peer must be fully gone before a new one exists
            self.teardown().await;

            let attempt = self.session.attempts() + 1;
            let deadline = self.session.attempt_deadline(Instant::now());
            let outcome = {
                let Self {
                    factory,
                    signaling,
                    peer,
                    commands,
                    ..
                } = &mut *self;
                let negotiation = timeout_at(deadline, async {
                    let fresh = factory.create().await?;
                    negotiate(peer.insert(fresh), signaling).await
                });
                tokio::pin!(negotiation);
                loop {
                    tokio::select! {
                        result = &mut negotiation => break Some(result),
                        cmd = commands.recv() => match cmd {
                            Some(cmd) => debug!(?cmd, "Media cycle in flight, trigger ignored"),
                            None => break None,
                        },
                    }
                }
            };

            let error = match outcome {
                None => return false,
                Some(Ok(Ok(()))) => {
                    info!(attempt, "Video connected");
                    self.session.on_connected();
                    self.emit(MediaEvent::Connected).await;
                    return true;
                }
                Some(Ok(Err(e))) => format!("{e:#}"),
                Some(Err(_)) => "attempt timed out".to_string(),
            };
            warn!(attempt, %error, "Media negotiation attempt failed");
            self.emit(MediaEvent::AttemptFailed { attempt, error }).await;

            match self.session.on_attempt_failed(Instant::now()) {
                AttemptOutcome::Retry { at } => {
                    if !self.backoff(at).await {
                        return false;
                    }
                }
                AttemptOutcome::Failed { report } => {
                    self.teardown().await;
                    if report {
                        error!(
                            attempts = self.session.attempts(),
                            "Video unavailable, giving up until the next trigger"
                        );
                        self.emit(MediaEvent::Failed).await;
                    }
                    return true;
                }
            }
        }
    }

    /// Sleep until `until`, swallowing triggers. False if commands closed.
    async fn backoff(&mut self, until: Instant) -> bool {
        let sleep = tokio::time::sleep_until(until);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => debug!(?cmd, "Media retry pending, trigger ignored"),
                    None => return false,
                },
            }
        }
    }

    async fn teardown(&mut self) {
        if let Some(mut peer) = self.peer.take() {
            peer.stop_tracks().await;
            peer.close().await;
        }
    }

    async fn emit(&self, event: MediaEvent) {
        if self.events.send(event).await.is_err() {
            debug!("Media event receiver gone");
        }
    }
}
