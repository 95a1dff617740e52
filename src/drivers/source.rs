use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use rand::Rng;
use crate::drivers::frame::FrameLayout;
use crate::drivers::TelemetryError;
use crate::types::ControlCommand;
/// Read half of a telemetry link.
pub trait LineSource: Send {
    /// Blocks for at most the link's read timeout. `Ok(None)` means nothing
    /// arrived in time, which is not an error.
    fn read_line(&mut self) -> Result<Option<String>, TelemetryError>;
}
/// Write half of a telemetry link. Commands are fire-and-forget.
pub trait CommandSink: Send {
    fn send_command(&mut self, command: ControlCommand) -> Result<(), TelemetryError>;
}
impl<T: LineSource + ?Sized> LineSource for Box<T> {
    fn read_line(&mut self) -> Result<Option<String>, TelemetryError> {
        (**self).read_line()
    }
}
impl<T: CommandSink + ?Sized> CommandSink for Box<T> {
    fn send_command(&mut self, command: ControlCommand) -> Result<(), TelemetryError> {
        (**self).send_command(command)
    }
}
// ---------------------------------------------------------------------------
// Scripted device: deterministic playback for tests.
// ---------------------------------------------------------------------------
#[derive(Clone, Debug)]
pub enum ScriptedRead {
    Line(String),
    Fault(io::ErrorKind),
}
#[derive(Default)]
struct ScriptState {
    pending: VecDeque<ScriptedRead>,
    commands: Vec<ControlCommand>,
    streaming: bool,
}
/// Test-side handle for feeding a scripted device and inspecting what it was sent.
#[derive(Clone)]
pub struct ScriptHandle {
    state: Arc<Mutex<ScriptState>>,
}
impl ScriptHandle {
    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
    pub fn push_line(&self, line: impl Into<String>) {
        self.lock().pending.push_back(ScriptedRead::Line(line.into()));
    }
    pub fn push_fault(&self, kind: io::ErrorKind) {
        self.lock().pending.push_back(ScriptedRead::Fault(kind));
    }
    pub fn commands(&self) -> Vec<ControlCommand> {
        self.lock().commands.clone()
    }
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }
    pub fn is_streaming(&self) -> bool {
        self.lock().streaming
    }
}
/// Replays queued lines, but only while the device has been told to stream.
pub struct ScriptedLink {
    state: Arc<Mutex<ScriptState>>,
    idle: Duration,
}
pub struct ScriptedCommander {
    state: Arc<Mutex<ScriptState>>,
}
/// Builds a scripted device. `idle` is how long an empty read blocks.
pub fn scripted_link(idle: Duration) -> (ScriptedLink, ScriptedCommander, ScriptHandle) {
    let state = Arc::new(Mutex::new(ScriptState::default()));
    (
        ScriptedLink {
            state: Arc::clone(&state),
            idle,
        },
        ScriptedCommander {
            state: Arc::clone(&state),
        },
        ScriptHandle { state },
    )
}
impl LineSource for ScriptedLink {
    fn read_line(&mut self) -> Result<Option<String>, TelemetryError> {
        let next = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.streaming {
                state.pending.pop_front()
            } else {
                None
            }
        };
        match next {
            Some(ScriptedRead::Line(line)) => Ok(Some(line)),
            Some(ScriptedRead::Fault(kind)) => {
                Err(io::Error::new(kind, "scripted link fault").into())
            }
            None => {
                thread::sleep(self.idle);
                Ok(None)
            }
        }
    }
}
impl CommandSink for ScriptedCommander {
    fn send_command(&mut self, command: ControlCommand) -> Result<(), TelemetryError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.commands.push(command);
        state.streaming = command == ControlCommand::Start;
        Ok(())
    }
}
// ---------------------------------------------------------------------------
// Simulated device: synthetic bio-impedance telemetry without hardware.
// ---------------------------------------------------------------------------
/// Emits ASCII frames at a fixed interval once it receives `start`.
pub struct SimulatedLink {
    streaming: Arc<AtomicBool>,
    layout: FrameLayout,
    interval: Duration,
    idle: Duration,
    next_due: Instant,
    counter: u64,
    split_frames: bool,
    carry: Option<String>,
}
pub struct SimulatedCommander {
    streaming: Arc<AtomicBool>,
}
impl SimulatedLink {
    pub fn new(layout: FrameLayout, interval: Duration, idle: Duration) -> (Self, SimulatedCommander) {
        let streaming = Arc::new(AtomicBool::new(false));
        let link = Self {
            streaming: Arc::clone(&streaming),
            layout,
            interval,
            idle,
            next_due: Instant::now(),
            counter: 0,
            split_frames: false,
            carry: None,
        };
        (link, SimulatedCommander { streaming })
    }
    /// Occasionally break a frame across two lines, like a real UART read boundary.
    pub fn with_split_frames(mut self, split: bool) -> Self {
        self.split_frames = split;
        self
    }
    fn synth_tokens(&mut self) -> Vec<String> {
        let mut rng = rand::thread_rng();
        let t = self.counter as f64 * self.interval.as_secs_f64();
        let mut tokens = Vec::with_capacity(self.layout.tokens_per_frame);
        if self.layout.leading_index {
            tokens.push(self.counter.to_string());
        }
        for ch in 0..self.layout.num_channels() {
            let base = 8_000.0 + 1_500.0 * ch as f64;
            let wave = 400.0 * (t * (0.5 + 0.25 * ch as f64) * std::f64::consts::TAU).sin();
            let noise: f64 = rng.gen_range(-60.0..60.0);
            tokens.push(format!("{:.3}", base + wave + noise));
        }
        self.counter += 1;
        tokens
    }
}
impl LineSource for SimulatedLink {
    fn read_line(&mut self) -> Result<Option<String>, TelemetryError> {
        if !self.streaming.load(Ordering::Acquire) {
            self.carry = None;
            thread::sleep(self.idle);
            self.next_due = Instant::now();
            return Ok(None);
        }
        if let Some(rest) = self.carry.take() {
            return Ok(Some(rest));
        }
        let now = Instant::now();
        if now < self.next_due {
            let wait = self.next_due - now;
            if wait > self.idle {
                thread::sleep(self.idle);
                return Ok(None);
            }
            thread::sleep(wait);
        }
        self.next_due += self.interval;
        let tokens = self.synth_tokens();
        if self.split_frames && tokens.len() > 1 && rand::thread_rng().gen_bool(0.1) {
            let cut = rand::thread_rng().gen_range(1..tokens.len());
            self.carry = Some(tokens[cut..].join(" "));
            return Ok(Some(tokens[..cut].join(" ")));
        }
        Ok(Some(tokens.join(" ")))
    }
}
impl CommandSink for SimulatedCommander {
    fn send_command(&mut self, command: ControlCommand) -> Result<(), TelemetryError> {
        self.streaming
            .store(command == ControlCommand::Start, Ordering::Release);
        Ok(())
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::frame::{FrameParser, FramingPolicy};
    #[test]
    fn scripted_link_waits_for_start() {
        let (mut link, mut commander, handle) = scripted_link(Duration::from_millis(1));
        handle.push_line("1 2 3");
        assert_eq!(link.read_line().unwrap(), None);
        commander.send_command(ControlCommand::Start).unwrap();
        assert_eq!(link.read_line().unwrap(), Some("1 2 3".to_string()));
        handle.push_fault(io::ErrorKind::BrokenPipe);
        assert!(matches!(link.read_line(), Err(TelemetryError::LinkIo(_))));
        commander.send_command(ControlCommand::Stop).unwrap();
        assert_eq!(
            handle.commands(),
            vec![ControlCommand::Start, ControlCommand::Stop]
        );
        assert!(!handle.is_streaming());
    }
    #[test]
    fn simulated_frames_parse() {
        let layout = FrameLayout::new(4, false);
        let (link, mut commander) =
            SimulatedLink::new(layout, Duration::from_millis(1), Duration::from_millis(5));
        let mut link = link.with_split_frames(true);
        let mut parser = FrameParser::new(layout, FramingPolicy::TokenAccumulating);
        assert_eq!(link.read_line().unwrap(), None);
        commander.send_command(ControlCommand::Start).unwrap();
        let mut samples = Vec::new();
        for _ in 0..200 {
            if let Some(line) = link.read_line().unwrap() {
                let outcome = parser.feed_line(&line);
                assert!(outcome.rejected.is_empty());
                samples.extend(outcome.samples);
            }
        }
        assert!(samples.len() >= 100);
        assert!(samples.iter().all(|s| s.num_channels() == 4));
    }
}
