use std::io::{self, Read, Write};
use std::time::Duration;
use log::{debug, info, trace, warn};
use serialport::{ClearBuffer, SerialPort};
use crate::drivers::source::{CommandSink, LineSource};
use crate::drivers::TelemetryError;
use crate::types::ControlCommand;
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
const MAX_LINE_BYTES: usize = 1024;
/// Splits a byte stream into text lines, carrying partial lines across reads.
pub struct LineAssembler {
    pending: Vec<u8>,
    max_line: usize,
}
impl LineAssembler {
    pub fn new(max_line: usize) -> Self {
        Self {
            pending: Vec::with_capacity(max_line.min(256)),
            max_line,
        }
    }
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
    pub fn clear(&mut self) {
        self.pending.clear();
    }
    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        if self.pending.len() > self.max_line && !self.pending.contains(&b'\n') {
            warn!(
                "dropping {} buffered bytes without a line terminator",
                self.pending.len()
            );
            self.pending.clear();
        }
    }
    /// Next complete line with the terminator and surrounding whitespace removed.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let pos = self.pending.iter().position(|&b| b == b'\n')?;
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                return Some(line);
            }
        }
    }
}
/// A named serial port carrying line-oriented ASCII telemetry.
pub struct SerialLink {
    port_name: String,
    port: Option<Box<dyn SerialPort>>,
    assembler: LineAssembler,
    chunk: Vec<u8>,
}
impl SerialLink {
    /// Opens `port_name` and discards anything left in the OS buffers.
    pub fn open(port_name: &str, baud_rate: u32, timeout: Duration) -> Result<Self, TelemetryError> {
        let unavailable = |reason: String| TelemetryError::LinkUnavailable {
            port: port_name.to_string(),
            reason,
        };
        let port = serialport::new(port_name, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|e| unavailable(e.to_string()))?;
        port.clear(ClearBuffer::All)
            .map_err(|e| unavailable(format!("failed to flush stale buffers: {e}")))?;
        info!("opened {port_name} @ {baud_rate} baud");
        Ok(Self {
            port_name: port_name.to_string(),
            port: Some(port),
            assembler: LineAssembler::new(MAX_LINE_BYTES),
            chunk: vec![0u8; 256],
        })
    }
    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>, TelemetryError> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial link is closed").into())
    }
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<(), TelemetryError> {
        self.port_mut()?
            .set_timeout(timeout)
            .map_err(|e| TelemetryError::LinkIo(e.into()))
    }
    /// Independent handle on the same port for sending control commands while
    /// this link is busy reading on another thread.
    pub fn commander(&self) -> Result<SerialCommander, TelemetryError> {
        let port = self
            .port
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial link is closed"))?;
        let clone = port
            .try_clone()
            .map_err(|e| TelemetryError::LinkIo(e.into()))?;
        Ok(SerialCommander {
            port_name: self.port_name.clone(),
            port: clone,
        })
    }
    /// Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.port.take().is_some() {
            info!("closed {}", self.port_name);
        }
        self.assembler.clear();
    }
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), TelemetryError> {
        let port = self.port_mut()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }
    /// Performs at most one port read, so a stream that never sends `\n`
    /// still returns `Ok(None)` within the read timeout. Partial lines stay
    /// buffered for the next call.
    pub fn read_line(&mut self) -> Result<Option<String>, TelemetryError> {
        if let Some(line) = self.take_line() {
            return Ok(Some(line));
        }
        let Some(port) = self.port.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "serial link is closed").into());
        };
        loop {
            match port.read(&mut self.chunk) {
                Ok(0) => return Ok(None),
                Ok(n) => {
                    self.assembler.push(&self.chunk[..n]);
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(self.take_line())
    }
    fn take_line(&mut self) -> Option<String> {
        let line = self.assembler.next_line()?;
        trace!("rx {line:?}");
        Some(line)
    }
}
impl LineSource for SerialLink {
    fn read_line(&mut self) -> Result<Option<String>, TelemetryError> {
        SerialLink::read_line(self)
    }
}
impl CommandSink for SerialLink {
    fn send_command(&mut self, command: ControlCommand) -> Result<(), TelemetryError> {
        self.send(&command.wire_bytes())
    }
}
pub struct SerialCommander {
    port_name: String,
    port: Box<dyn SerialPort>,
}
impl CommandSink for SerialCommander {
    fn send_command(&mut self, command: ControlCommand) -> Result<(), TelemetryError> {
        debug!("tx {:?} -> {}", command.as_str(), self.port_name);
        self.port.write_all(&command.wire_bytes())?;
        self.port.flush()?;
        Ok(())
    }
}
/// Names of serial ports the OS currently reports.
pub fn available_ports() -> Result<Vec<String>, TelemetryError> {
    let ports = serialport::available_ports().map_err(|e| TelemetryError::LinkIo(e.into()))?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn splits_crlf_lines() {
        let mut asm = LineAssembler::new(64);
        asm.push(b"1 2 3\r\n4 5 6\r\n");
        assert_eq!(asm.next_line().as_deref(), Some("1 2 3"));
        assert_eq!(asm.next_line().as_deref(), Some("4 5 6"));
        assert_eq!(asm.next_line(), None);
    }
    #[test]
    fn carries_partial_line_between_reads() {
        let mut asm = LineAssembler::new(64);
        asm.push(b"0.1 2.");
        assert_eq!(asm.next_line(), None);
        assert_eq!(asm.pending_len(), 6);
        asm.push(b"2 3.3\n\r\n");
        assert_eq!(asm.next_line().as_deref(), Some("0.1 2.2 3.3"));
        assert_eq!(asm.next_line(), None);
        assert_eq!(asm.pending_len(), 0);
    }
    #[test]
    fn drops_oversized_garbage() {
        let mut asm = LineAssembler::new(8);
        asm.push(&[b'9'; 9]);
        assert_eq!(asm.pending_len(), 0);
        asm.push(&[0xFF, b' ', b'1', b'\n']);
        assert_eq!(asm.next_line().as_deref(), Some("\u{FFFD} 1"));
    }
    #[test]
    fn control_commands_are_crlf_terminated() {
        assert_eq!(ControlCommand::Start.wire_bytes(), b"start\r\n".to_vec());
        assert_eq!(ControlCommand::Stop.wire_bytes(), b"stop\r\n".to_vec());
    }
    #[test]
    fn opening_missing_port_is_unavailable() {
        let err = SerialLink::open(
            "/dev/serial-scope-does-not-exist",
            DEFAULT_BAUD_RATE,
            Duration::from_millis(100),
        )
        .err()
        .unwrap();
        assert!(matches!(err, TelemetryError::LinkUnavailable { .. }));
    }
    #[cfg(unix)]
    mod pty {
        use super::*;
        use serialport::TTYPort;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
        use std::thread;
        // Allocating pty pairs from parallel tests is not reliable.
        static PTY_LOCK: Mutex<()> = Mutex::new(());
        fn pty_pair() -> (MutexGuard<'static, ()>, TTYPort, TTYPort, String) {
            let guard = PTY_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
            let (master, slave) = TTYPort::pair().unwrap();
            let name = slave.name().unwrap();
            (guard, master, slave, name)
        }
        #[test]
        fn unterminated_stream_still_returns_within_timeout() {
            let (_guard, mut master, _slave, name) = pty_pair();
            let link = SerialLink::open(&name, DEFAULT_BAUD_RATE, Duration::from_millis(50)).unwrap();
            let writing = Arc::new(AtomicBool::new(true));
            let writer = {
                let writing = Arc::clone(&writing);
                thread::spawn(move || {
                    // CR-only terminator: the assembler never sees a complete line.
                    while writing.load(Ordering::Acquire) {
                        if master.write_all(b"1 2 3 4\r").is_err() {
                            break;
                        }
                        thread::sleep(Duration::from_millis(2));
                    }
                    master
                })
            };
            let (tx, rx) = mpsc::channel();
            let reader = thread::spawn(move || {
                let mut link = link;
                for _ in 0..5 {
                    tx.send(link.read_line().map(|line| line.is_some())).ok();
                }
                link
            });
            for _ in 0..5 {
                let got = rx
                    .recv_timeout(Duration::from_secs(2))
                    .expect("read_line blocked on a stream without newlines");
                assert!(!got.unwrap());
            }
            writing.store(false, Ordering::Release);
            reader.join().unwrap();
            writer.join().unwrap();
        }
        #[test]
        fn line_split_across_reads_is_reassembled() {
            let (_guard, mut master, _slave, name) = pty_pair();
            let mut link = SerialLink::open(&name, DEFAULT_BAUD_RATE, Duration::from_millis(50)).unwrap();
            master.write_all(b"0.1 2.").unwrap();
            assert_eq!(link.read_line().unwrap(), None);
            master.write_all(b"2 3.3\r\n").unwrap();
            let deadline = std::time::Instant::now() + Duration::from_secs(2);
            let mut line = None;
            while line.is_none() && std::time::Instant::now() < deadline {
                line = link.read_line().unwrap();
            }
            assert_eq!(line.as_deref(), Some("0.1 2.2 3.3"));
        }
        #[test]
        fn stale_input_is_flushed_on_open() {
            let (_guard, mut master, _slave, name) = pty_pair();
            master.write_all(b"9 9 9 9\n").unwrap();
            thread::sleep(Duration::from_millis(100));
            let mut link = SerialLink::open(&name, DEFAULT_BAUD_RATE, Duration::from_millis(50)).unwrap();
            master.write_all(b"1 2 3 4\n").unwrap();
            let deadline = std::time::Instant::now() + Duration::from_secs(2);
            let mut first = None;
            while first.is_none() && std::time::Instant::now() < deadline {
                first = link.read_line().unwrap();
            }
            assert_eq!(first.as_deref(), Some("1 2 3 4"));
        }
        #[test]
        fn close_is_idempotent() {
            let (_guard, _master, _slave, name) = pty_pair();
            let mut link = SerialLink::open(&name, DEFAULT_BAUD_RATE, Duration::from_millis(50)).unwrap();
            link.close();
            link.close();
            match link.read_line() {
                Err(TelemetryError::LinkIo(e)) => assert_eq!(e.kind(), io::ErrorKind::NotConnected),
                other => panic!("expected NotConnected, got {other:?}"),
            }
            assert!(matches!(
                link.send_command(ControlCommand::Stop),
                Err(TelemetryError::LinkIo(_))
            ));
            assert!(link.commander().is_err());
        }
    }
}
