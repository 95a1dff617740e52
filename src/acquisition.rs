// src/acquisition.rs
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};

use crate::config::ScopeConfig;
use crate::drivers::frame::{FrameLayout, FrameParser, FramingPolicy};
use crate::drivers::smoothing::UnitConversion;
use crate::drivers::serial::SerialLink;
use crate::drivers::source::{CommandSink, LineSource, SimulatedLink};
use crate::drivers::{TelemetryError, WindowStore};
use crate::recorder::LineLog;
use crate::types::{AcquisitionEvent, ConnectionMode, ControlCommand, LinkState};

// Counters shared with the acquisition thread
#[derive(Default)]
struct Counters {
    lines_read: AtomicU64,
    samples_accepted: AtomicU64,
    malformed_frames: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AcquisitionStats {
    pub lines_read: u64,
    pub samples_accepted: u64,
    pub malformed_frames: u64,
}

enum LoopExit {
    Stopped,
    Faulted(TelemetryError),
}

/// Everything the read loop owns. Moved into the thread on `start` and handed
/// back by `join` on `stop`, so a restart reuses the same link.
struct Worker<R> {
    reader: R,
    parser: FrameParser,
    conversion: UnitConversion,
    store: Arc<WindowStore>,
    counters: Arc<Counters>,
    events: Option<Sender<AcquisitionEvent>>,
    line_log: Option<LineLog>,
}

impl<R: LineSource> Worker<R> {
    fn notify(&self, event: AcquisitionEvent) {
        if let Some(tx) = &self.events {
            tx.send(event).ok();
        }
    }

    fn run(mut self, running: &AtomicBool, faulted: &AtomicBool) -> (Self, LoopExit) {
        debug!("acquisition loop entered");
        while running.load(Ordering::Acquire) {
            match self.reader.read_line() {
                Ok(None) => continue,
                Ok(Some(line)) => self.handle_line(&line),
                Err(e) => {
                    error!("link fault, acquisition stopped: {e}");
                    faulted.store(true, Ordering::Release);
                    running.store(false, Ordering::Release);
                    self.notify(AcquisitionEvent::LinkLost(e.to_string()));
                    return (self, LoopExit::Faulted(e));
                }
            }
        }
        debug!("acquisition loop exited");
        (self, LoopExit::Stopped)
    }

    fn handle_line(&mut self, line: &str) {
        self.counters.lines_read.fetch_add(1, Ordering::Relaxed);
        if let Some(log) = &mut self.line_log {
            log.record(line);
        }
        let outcome = self.parser.feed_line(line);
        for err in outcome.rejected {
            self.counters.malformed_frames.fetch_add(1, Ordering::Relaxed);
            self.notify(AcquisitionEvent::MalformedFrame {
                line: line.to_owned(),
                error: err,
            });
        }
        for sample in outcome.samples {
            let conversion = &self.conversion;
            let converted = sample.map_values(|ch, v| conversion.convert_channel(ch, v));
            match self.store.append(&converted) {
                Ok(()) => {
                    self.counters.samples_accepted.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => warn!("sample not stored: {e}"),
            }
        }
    }
}

struct Session<R, W> {
    writer: W,
    idle: Option<Worker<R>>,
    thread: Option<JoinHandle<(Worker<R>, LoopExit)>>,
}

/// Drives one link through Connected -> Streaming -> Connected, feeding the
/// shared [`WindowStore`] from a background thread.
pub struct AcquisitionController<R: LineSource + 'static, W: CommandSink> {
    layout: FrameLayout,
    framing: FramingPolicy,
    conversion: UnitConversion,
    log_path: Option<PathBuf>,
    store: Arc<WindowStore>,
    counters: Arc<Counters>,
    running: Arc<AtomicBool>,
    faulted: Arc<AtomicBool>,
    events: Option<Sender<AcquisitionEvent>>,
    session: Option<Session<R, W>>,
}

impl<R: LineSource + 'static, W: CommandSink> AcquisitionController<R, W> {
    pub fn new(config: &ScopeConfig, store: Arc<WindowStore>) -> Result<Self, TelemetryError> {
        config.validate()?;
        let layout = config.layout();
        if store.num_channels() != layout.num_channels() {
            return Err(TelemetryError::ChannelMismatch {
                expected: layout.num_channels(),
                actual: store.num_channels(),
            });
        }
        Ok(Self {
            layout,
            framing: config.framing,
            conversion: config.unit_conversion(),
            log_path: config.log_path.clone(),
            store,
            counters: Arc::new(Counters::default()),
            running: Arc::new(AtomicBool::new(false)),
            faulted: Arc::new(AtomicBool::new(false)),
            events: None,
            session: None,
        })
    }

    pub fn with_events(mut self, tx: Sender<AcquisitionEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn store(&self) -> &Arc<WindowStore> {
        &self.store
    }

    pub fn stats(&self) -> AcquisitionStats {
        AcquisitionStats {
            lines_read: self.counters.lines_read.load(Ordering::Relaxed),
            samples_accepted: self.counters.samples_accepted.load(Ordering::Relaxed),
            malformed_frames: self.counters.malformed_frames.load(Ordering::Relaxed),
        }
    }

    pub fn state(&self) -> LinkState {
        match &self.session {
            None => LinkState::Disconnected,
            Some(_) if self.faulted.load(Ordering::Acquire) => LinkState::Disconnected,
            Some(session) if session.thread.is_some() => LinkState::Streaming,
            Some(_) => LinkState::Connected,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == LinkState::Streaming
    }

    fn notify(&self, event: AcquisitionEvent) {
        if let Some(tx) = &self.events {
            tx.send(event).ok();
        }
    }

    /// Takes ownership of an opened link. A new connection starts from an empty window.
    pub fn connect(&mut self, reader: R, writer: W) -> Result<(), TelemetryError> {
        if self.session.is_some() {
            self.disconnect();
        }
        let line_log = match &self.log_path {
            Some(path) => Some(LineLog::open(path)?),
            None => None,
        };
        self.store.clear();
        self.faulted.store(false, Ordering::Release);
        let worker = Worker {
            reader,
            parser: FrameParser::new(self.layout, self.framing),
            conversion: self.conversion.clone(),
            store: Arc::clone(&self.store),
            counters: Arc::clone(&self.counters),
            events: self.events.clone(),
            line_log,
        };
        self.session = Some(Session {
            writer,
            idle: Some(worker),
            thread: None,
        });
        info!("link connected");
        Ok(())
    }

    /// Sends `start` and launches the read loop. Returns `Ok(false)` without
    /// side effects when not connected or already running.
    pub fn start(&mut self) -> Result<bool, TelemetryError> {
        self.poll();
        let Some(session) = self.session.as_mut() else {
            warn!("start ignored: not connected");
            return Ok(false);
        };
        if session.thread.is_some() {
            warn!("start ignored: already running");
            return Ok(false);
        }
        let Some(mut worker) = session.idle.take() else {
            warn!("start ignored: link has no reader");
            return Ok(false);
        };
        if let Err(e) = session.writer.send_command(ControlCommand::Start) {
            session.idle = Some(worker);
            return Err(e);
        }
        worker.parser.reset();
        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let faulted = Arc::clone(&self.faulted);
        session.thread = Some(thread::spawn(move || worker.run(&running, &faulted)));
        info!("acquisition started");
        self.notify(AcquisitionEvent::Started);
        Ok(true)
    }

    /// Sends `stop`, clears the running flag and joins the read loop. The loop
    /// notices within one read timeout.
    pub fn stop(&mut self) -> Result<bool, TelemetryError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(false);
        };
        let Some(handle) = session.thread.take() else {
            debug!("stop ignored: not running");
            return Ok(false);
        };
        let sent = session.writer.send_command(ControlCommand::Stop);
        self.running.store(false, Ordering::Release);
        let exit = match handle.join() {
            Ok((worker, exit)) => {
                session.idle = Some(worker);
                exit
            }
            Err(_) => LoopExit::Faulted(
                io::Error::new(io::ErrorKind::Other, "acquisition thread panicked").into(),
            ),
        };
        if let LoopExit::Faulted(e) = exit {
            self.drop_session();
            return Err(e);
        }
        info!("acquisition stopped");
        self.notify(AcquisitionEvent::Stopped);
        sent.map(|()| true)
    }

    /// Reaps a loop that ended on its own after a link fault; the link is then
    /// treated as disconnected.
    pub fn poll(&mut self) -> LinkState {
        let finished = self
            .session
            .as_ref()
            .and_then(|s| s.thread.as_ref())
            .is_some_and(|h| h.is_finished());
        if finished {
            if let Err(e) = self.stop() {
                warn!("link dropped: {e}");
            }
        }
        self.state()
    }

    pub fn disconnect(&mut self) {
        if self.session.is_none() {
            return;
        }
        if let Err(e) = self.stop() {
            warn!("error while stopping for disconnect: {e}");
        }
        self.drop_session();
    }

    fn drop_session(&mut self) {
        if self.session.take().is_some() {
            self.running.store(false, Ordering::Release);
            info!("link disconnected");
        }
    }
}

impl<R: LineSource + 'static, W: CommandSink> Drop for AcquisitionController<R, W> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Controller over whichever link kind was picked at runtime.
pub type DynController = AcquisitionController<Box<dyn LineSource>, Box<dyn CommandSink>>;

/// Opens the read and command halves of a link for `mode`.
///
/// The serial port opens with the idle timeout (stale input is flushed), then
/// switches to the short streaming timeout so `stop` is noticed quickly.
pub fn open_link(
    config: &ScopeConfig,
    mode: ConnectionMode,
) -> Result<(Box<dyn LineSource>, Box<dyn CommandSink>), TelemetryError> {
    match mode {
        ConnectionMode::Simulation => {
            let (link, commander) = SimulatedLink::new(
                config.layout(),
                config.sample_interval(),
                config.stream_timeout(),
            );
            let link = link.with_split_frames(config.framing == FramingPolicy::TokenAccumulating);
            info!("simulated device ready");
            Ok((Box::new(link), Box::new(commander)))
        }
        ConnectionMode::Hardware => {
            let mut link =
                SerialLink::open(&config.port_name, config.baud_rate, config.open_timeout())?;
            link.set_timeout(config.stream_timeout())?;
            let commander = link.commander()?;
            Ok((Box::new(link), Box::new(commander)))
        }
    }
}
