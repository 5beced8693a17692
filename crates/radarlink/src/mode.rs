//! Mode controller: decides whether the display is fed by the simulator or
//! by the hardware link.
//!
//! The controller is a single task. It owns the simulator, the link session
//! and the only path into the display state, so the two sources can never
//! feed the display at the same time. Callers talk to it through a cloneable
//! [`ModeHandle`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{Config, LinkConfig};
use crate::decoder::FrameDecoder;
use crate::display::{Event, Mode, SharedDisplay};
use crate::error::{Error, Result};
use crate::link::{run_read_loop, LinkExit, LinkHandle, LinkOpener};
use crate::relay::Relay;
use crate::sample::Sample;
use crate::simulation::Simulator;

/// Samples buffered between the read loop and the controller.
const LIVE_QUEUE: usize = 64;
const COMMAND_QUEUE: usize = 8;

enum Command {
    Connect(oneshot::Sender<Result<Mode>>),
    Disconnect(oneshot::Sender<Mode>),
}

/// An open link and the worker reading it.
struct Session {
    samples: mpsc::Receiver<Sample>,
    handle: LinkHandle,
    worker: JoinHandle<LinkExit>,
}

/// The controller task. Construct it with [`ModeController::spawn`].
pub struct ModeController {
    opener: Arc<dyn LinkOpener>,
    link: LinkConfig,
    simulator: Simulator,
    tick: Duration,
    relay: Relay,
    display: SharedDisplay,
    mode_tx: watch::Sender<Mode>,
    session: Option<Session>,
}

impl std::fmt::Debug for ModeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModeController")
            .field("link", &self.opener.name())
            .field("mode", &self.mode())
            .field("live", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

impl ModeController {
    /// Start the controller in simulation mode.
    ///
    /// The task runs until every [`ModeHandle`] is dropped; it then closes
    /// any open link and exits.
    #[must_use]
    pub fn spawn(
        opener: Arc<dyn LinkOpener>,
        config: &Config,
        relay: Relay,
        display: SharedDisplay,
    ) -> (ModeHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE);
        let (mode_tx, mode_rx) = watch::channel(Mode::Simulating);
        display.apply(Event::ModeChanged(Mode::Simulating));

        let controller = Self {
            opener,
            link: config.link.clone(),
            simulator: Simulator::new(config.simulation.clone()),
            tick: config.tick_interval(),
            relay,
            display: display.clone(),
            mode_tx,
            session: None,
        };
        let task = tokio::spawn(controller.run(commands_rx));

        let handle = ModeHandle {
            commands: commands_tx,
            mode: mode_rx,
            display,
        };
        (handle, task)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(link = %self.opener.name(), "mode controller started in simulation");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Connect(reply)) => {
                        let outcome = self.connect().await;
                        let _ = reply.send(outcome);
                    }
                    Some(Command::Disconnect(reply)) => {
                        self.disconnect().await;
                        let _ = reply.send(self.mode());
                    }
                    None => break,
                },
                _ = ticker.tick(), if self.session.is_none() => self.simulate_tick(),
                sample = next_live(&mut self.session), if self.session.is_some() => match sample {
                    Some(sample) => self.live_sample(sample),
                    None => self.link_ended().await,
                },
            }
        }

        self.close_session().await;
        debug!("mode controller stopped");
    }

    fn mode(&self) -> Mode {
        *self.mode_tx.borrow()
    }

    fn set_mode(&self, mode: Mode) {
        self.display.apply(Event::ModeChanged(mode));
        self.mode_tx.send_replace(mode);
    }

    fn simulate_tick(&mut self) {
        for event in self.simulator.tick(Utc::now()) {
            self.display.apply(event);
        }
    }

    fn live_sample(&self, sample: Sample) {
        self.relay.dispatch(&sample);
        self.display.apply(Event::SampleArrived(sample));
    }

    async fn connect(&mut self) -> Result<Mode> {
        if self.session.is_some() {
            return Ok(Mode::Live);
        }

        self.display.apply(Event::ConnectRequested);
        self.mode_tx.send_replace(Mode::Connecting);
        info!(link = %self.opener.name(), "connecting to link");

        let reader = match self.opener.open().await {
            Ok(reader) => reader,
            Err(e) => {
                warn!("link open failed, staying in simulation: {e}");
                self.set_mode(Mode::Simulating);
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::channel(LIVE_QUEUE);
        let handle = LinkHandle::new();
        let decoder = FrameDecoder::new(&self.link);
        let worker_handle = handle.clone();
        let worker =
            tokio::task::spawn_blocking(move || run_read_loop(reader, decoder, &tx, &worker_handle));

        self.session = Some(Session {
            samples: rx,
            handle,
            worker,
        });
        self.set_mode(Mode::Live);
        info!("live decoding started");
        Ok(Mode::Live)
    }

    async fn disconnect(&mut self) {
        if self.close_session().await {
            info!("link closed on request, resuming simulation");
        }
        self.display.apply(Event::DisconnectRequested);
        self.mode_tx.send_replace(Mode::Simulating);
    }

    /// The read loop finished without being asked to.
    async fn link_ended(&mut self) {
        if let Some(session) = self.session.take() {
            match session.worker.await {
                Ok(LinkExit::Failed(e)) => warn!("link lost, falling back to simulation: {e}"),
                Ok(exit) => warn!(?exit, "link ended, falling back to simulation"),
                Err(e) => warn!("link worker failed, falling back to simulation: {e}"),
            }
        }
        self.set_mode(Mode::Simulating);
    }

    /// Stop the read loop if one is running. Returns whether one was.
    async fn close_session(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        session.handle.stop();
        drop(session.samples);
        match session.worker.await {
            Ok(exit) => debug!(?exit, "read loop finished"),
            Err(e) => warn!("link worker failed: {e}"),
        }
        true
    }
}

async fn next_live(session: &mut Option<Session>) -> Option<Sample> {
    match session {
        Some(session) => session.samples.recv().await,
        None => std::future::pending().await,
    }
}

/// Cloneable handle to a running [`ModeController`].
#[derive(Debug, Clone)]
pub struct ModeHandle {
    commands: mpsc::Sender<Command>,
    mode: watch::Receiver<Mode>,
    display: SharedDisplay,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect(_) => write!(f, "Connect"),
            Self::Disconnect(_) => write!(f, "Disconnect"),
        }
    }
}

impl ModeHandle {
    /// Open the hardware link and switch to live decoding.
    ///
    /// Connecting while already live is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the link error if the link cannot be opened; the controller
    /// stays in simulation. Returns [`Error::ControllerGone`] if the
    /// controller has stopped.
    pub async fn connect(&self) -> Result<Mode> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Connect(tx))
            .await
            .map_err(|_| Error::ControllerGone)?;
        rx.await.map_err(|_| Error::ControllerGone)?
    }

    /// Close the link, if open, and resume simulation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ControllerGone`] if the controller has stopped.
    pub async fn disconnect(&self) -> Result<Mode> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Disconnect(tx))
            .await
            .map_err(|_| Error::ControllerGone)?;
        rx.await.map_err(|_| Error::ControllerGone)
    }

    /// Current mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        *self.mode.borrow()
    }

    /// Wait until the controller reaches `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ControllerGone`] if the controller stops first.
    pub async fn wait_for(&self, mode: Mode) -> Result<()> {
        let mut rx = self.mode.clone();
        rx.wait_for(|m| *m == mode)
            .await
            .map(|_| ())
            .map_err(|_| Error::ControllerGone)
    }

    /// Display state fed by the controller.
    #[must_use]
    pub fn display(&self) -> &SharedDisplay {
        &self.display
    }
}
