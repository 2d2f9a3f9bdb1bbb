// src/link.rs - Serial link lifecycle management
//
// One background task owns the port: it polls for the device every second
// while disconnected, and while connected it splits incoming bytes into lines
// and drains the outbound command queue. All observable output goes through a
// LinkEvent channel so state mutation stays out of the I/O task.

use serial2_tokio::SerialPort;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// How often to retry opening the port while disconnected. No backoff, no
/// giving up: printers get power-cycled mid-session all the time.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(1);

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkState {
    Closed = 0,
    Opening = 1,
    Open = 2,
}

impl LinkState {
    fn from_u8(value: u8) -> LinkState {
        match value {
            2 => LinkState::Open,
            1 => LinkState::Opening,
            _ => LinkState::Closed,
        }
    }
}

/// Messages the link task emits toward the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Opened,
    Closed,
    Line(String),
}

/// Owns the serial connection lifecycle and the line-delimited read pipeline.
pub struct LinkManager {
    path: String,
    baud: u32,
    state: Arc<AtomicU8>,
    command_tx: mpsc::UnboundedSender<String>,
    command_rx: Option<mpsc::UnboundedReceiver<String>>,
    shutdown_tx: broadcast::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl LinkManager {
    pub fn new(path: &str, baud: u32) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            path: path.to_string(),
            baud,
            state: Arc::new(AtomicU8::new(LinkState::Closed as u8)),
            command_tx,
            command_rx: Some(command_rx),
            shutdown_tx,
            task: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud
    }

    pub fn state(&self) -> LinkState {
        LinkState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_open(&self) -> bool {
        self.state() == LinkState::Open
    }

    /// Queue a command for transmission, newline-terminated by the writer.
    ///
    /// Fire-and-forget: while the link is not open the command is dropped
    /// rather than held for later, since a stale temperature command firing
    /// after a reconnect could be dangerous. Returns whether it was queued.
    pub fn write(&self, command: &str) -> bool {
        if !self.is_open() {
            tracing::debug!("link {} not open, dropping command: {}", self.path, command);
            return false;
        }
        if self.command_tx.send(command.to_string()).is_err() {
            tracing::debug!("link task gone, dropping command: {}", command);
            return false;
        }
        true
    }

    /// Start the connection task. `greeting` is sent on every successful
    /// open (the dialect's telemetry-enable command, when it has one).
    pub fn start(&mut self, greeting: Option<String>, event_tx: mpsc::UnboundedSender<LinkEvent>) {
        let Some(command_rx) = self.command_rx.take() else {
            return;
        };
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.task = Some(tokio::spawn(run_link(
            self.path.clone(),
            self.baud,
            self.state.clone(),
            command_rx,
            shutdown_rx,
            event_tx,
            greeting,
        )));
    }

    /// Stop the connection task and close the port.
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.state.store(LinkState::Closed as u8, Ordering::SeqCst);
    }
}

async fn run_link(
    path: String,
    baud: u32,
    state: Arc<AtomicU8>,
    mut command_rx: mpsc::UnboundedReceiver<String>,
    mut shutdown_rx: broadcast::Receiver<()>,
    event_tx: mpsc::UnboundedSender<LinkEvent>,
    greeting: Option<String>,
) {
    loop {
        state.store(LinkState::Opening as u8, Ordering::SeqCst);
        let port = match SerialPort::open(&path, baud) {
            Ok(port) => port,
            Err(e) => {
                state.store(LinkState::Closed as u8, Ordering::SeqCst);
                tracing::debug!("attempt to open {} failed: {}", path, e);
                tokio::select! {
                    _ = sleep(RECONNECT_INTERVAL) => continue,
                    _ = shutdown_rx.recv() => return,
                }
            }
        };

        // Firmware boot banners and whatever else accumulated while we were
        // away must not reach the parser.
        if let Err(e) = port.discard_buffers() {
            tracing::debug!("failed to discard stale input on {}: {}", path, e);
        }
        // Commands that slipped into the queue while disconnected are stale.
        while command_rx.try_recv().is_ok() {}

        state.store(LinkState::Open as u8, Ordering::SeqCst);
        tracing::info!("serial link {} open at {} baud", path, baud);
        let _ = event_tx.send(LinkEvent::Opened);

        let mut session_ok = true;
        if let Some(ref command) = greeting {
            session_ok = write_line(&port, command).await;
        }

        let mut lines = LineBuffer::new();
        let mut read_buf = [0u8; 1024];
        let mut shutting_down = false;

        while session_ok {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    shutting_down = true;
                    break;
                }
                command = command_rx.recv() => {
                    match command {
                        Some(command) => {
                            if !write_line(&port, &command).await {
                                break;
                            }
                        }
                        // All senders dropped: the controller is gone.
                        None => {
                            shutting_down = true;
                            break;
                        }
                    }
                }
                result = port.read(&mut read_buf) => {
                    match result {
                        Ok(0) => {
                            tracing::info!("serial link {} closed by device", path);
                            break;
                        }
                        Ok(n) => {
                            for line in lines.push(&read_buf[..n]) {
                                tracing::debug!("serial RX: {}", line);
                                let _ = event_tx.send(LinkEvent::Line(line));
                            }
                        }
                        Err(e) => {
                            tracing::warn!("serial read error on {}: {}", path, e);
                            break;
                        }
                    }
                }
            }
        }

        state.store(LinkState::Closed as u8, Ordering::SeqCst);
        let _ = event_tx.send(LinkEvent::Closed);
        drop(port);

        if shutting_down {
            return;
        }
        tracing::info!("serial link {} disconnected, retrying", path);
        tokio::select! {
            _ = sleep(RECONNECT_INTERVAL) => {}
            _ = shutdown_rx.recv() => return,
        }
    }
}

async fn write_line(port: &SerialPort, command: &str) -> bool {
    let framed = format!("{}\n", command);
    tracing::debug!("serial TX: {}", command);
    match port.write(framed.as_bytes()).await {
        Ok(n) if n == framed.len() => true,
        Ok(n) => {
            tracing::warn!("partial serial write: {} of {} bytes", n, framed.len());
            false
        }
        Err(e) => {
            tracing::warn!("serial write error: {}", e);
            false
        }
    }
}

/// Accumulates raw bytes and yields complete `\n`-terminated lines, with the
/// delimiter and any trailing `\r` stripped. Partial lines stay buffered.
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            raw.pop();
            if raw.last() == Some(&b'\r') {
                raw.pop();
            }
            let line = String::from_utf8_lossy(&raw).into_owned();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}
