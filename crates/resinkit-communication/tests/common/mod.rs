//! Scripted in-memory printer for driving the controller without hardware

#![allow(dead_code)]

use parking_lot::Mutex;
use resinkit_communication::{ChituController, ControllerConfig, LinkOpener, LinkParams, SerialLink};
use resinkit_core::{
    ConnectionError, ListenerRegistry, PrintStatus, PrinterListener, PrinterState, Result,
};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Default)]
struct MockState {
    replies: HashMap<String, String>,
    queued: HashMap<String, VecDeque<String>>,
    written: Vec<String>,
    events: Vec<String>,
    read_delay: Duration,
    io_failure: bool,
    open_failure: bool,
    opens: usize,
    open: bool,
}

/// Printer double shared between the test and the links it hands out
#[derive(Clone, Default)]
pub struct MockPrinter {
    state: Arc<Mutex<MockState>>,
}

impl MockPrinter {
    /// A printer that answers the connect handshake with `ok`
    pub fn new() -> Self {
        let printer = Self::default();
        for word in ["M4002", "M21", "M115"] {
            printer.reply(word, "ok");
        }
        printer
    }

    /// Answer every command whose first word is `word` with `response`
    pub fn reply(&self, word: &str, response: &str) {
        self.state
            .lock()
            .replies
            .insert(word.to_string(), response.to_string());
    }

    /// Answer the next command with first word `word` once with `response`
    pub fn queue(&self, word: &str, response: &str) {
        self.state
            .lock()
            .queued
            .entry(word.to_string())
            .or_default()
            .push_back(response.to_string());
    }

    /// Stop answering `word`
    pub fn silence(&self, word: &str) {
        let mut state = self.state.lock();
        state.replies.remove(word);
        state.queued.remove(word);
    }

    pub fn set_read_delay(&self, delay: Duration) {
        self.state.lock().read_delay = delay;
    }

    pub fn set_io_failure(&self, failing: bool) {
        self.state.lock().io_failure = failing;
    }

    pub fn set_open_failure(&self, failing: bool) {
        self.state.lock().open_failure = failing;
    }

    /// Lines written so far
    pub fn written(&self) -> Vec<String> {
        self.state.lock().written.clone()
    }

    /// Number of written lines whose first word is `word`
    pub fn count(&self, word: &str) -> usize {
        self.state
            .lock()
            .written
            .iter()
            .filter(|line| line.split_whitespace().next() == Some(word))
            .count()
    }

    /// `write:<cmd>` / `read:<cmd>` trace in wire order
    pub fn events(&self) -> Vec<String> {
        self.state.lock().events.clone()
    }

    pub fn clear_trace(&self) {
        let mut state = self.state.lock();
        state.written.clear();
        state.events.clear();
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    pub fn opens(&self) -> usize {
        self.state.lock().opens
    }

    pub fn opener(&self) -> Box<dyn LinkOpener> {
        Box::new(MockOpener {
            state: self.state.clone(),
        })
    }
}

struct MockOpener {
    state: Arc<Mutex<MockState>>,
}

impl LinkOpener for MockOpener {
    fn open(&self, params: &LinkParams) -> Result<Box<dyn SerialLink>> {
        let mut state = self.state.lock();
        if state.open_failure {
            return Err(ConnectionError::PortNotFound {
                port: params.port.clone(),
            }
            .into());
        }
        state.opens += 1;
        state.open = true;
        Ok(Box::new(MockLink {
            state: self.state.clone(),
            open: true,
            pending: None,
        }))
    }
}

struct MockLink {
    state: Arc<Mutex<MockState>>,
    open: bool,
    pending: Option<(String, Option<String>)>,
}

impl SerialLink for MockLink {
    fn is_open(&self) -> bool {
        self.open
    }

    fn reset_buffers(&mut self) -> io::Result<()> {
        if self.state.lock().io_failure {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        self.pending = None;
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut state = self.state.lock();
        if !self.open || state.io_failure {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }

        let command = line.trim().to_string();
        let word = command.split_whitespace().next().unwrap_or("").to_string();
        let queued = state.queued.get_mut(&word).and_then(|queue| queue.pop_front());
        let reply = queued.or_else(|| state.replies.get(&word).cloned());

        state.events.push(format!("write:{}", command));
        state.written.push(command.clone());
        self.pending = Some((command, reply));
        Ok(())
    }

    fn read_until_terminator(&mut self, deadline: Instant) -> io::Result<String> {
        let (delay, failing) = {
            let state = self.state.lock();
            (state.read_delay, state.io_failure)
        };
        if failing {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }

        let (command, reply) = self.pending.take().unwrap_or_default();
        let response = match reply {
            Some(reply) => {
                thread::sleep(delay);
                format!("{}\n", reply)
            }
            None => {
                thread::sleep(deadline.saturating_duration_since(Instant::now()));
                String::new()
            }
        };

        self.state.lock().events.push(format!("read:{}", command));
        Ok(response)
    }

    fn close(&mut self) {
        self.open = false;
        self.state.lock().open = false;
    }
}

/// Listener recording every hook call as a short string
#[derive(Default)]
pub struct RecordingListener {
    calls: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn has(&self, call: &str) -> bool {
        self.calls.lock().iter().any(|c| c == call)
    }

    fn record(&self, call: String) -> anyhow::Result<()> {
        self.calls.lock().push(call);
        Ok(())
    }
}

impl PrinterListener for RecordingListener {
    fn name(&self) -> &str {
        "recorder"
    }

    fn on_printer_connected(
        &self,
        firmware_version: &str,
        _port: &str,
        _baud_rate: u32,
    ) -> anyhow::Result<()> {
        self.record(format!("connected:{}", firmware_version))
    }

    fn on_printer_disconnected(&self) -> anyhow::Result<()> {
        self.record("disconnected".to_string())
    }

    fn on_print_started(&self, filename: &str) -> anyhow::Result<()> {
        self.record(format!("started:{}", filename))
    }

    fn on_print_paused(&self, filename: &str) -> anyhow::Result<()> {
        self.record(format!("paused:{}", filename))
    }

    fn on_print_resumed(&self, filename: &str) -> anyhow::Result<()> {
        self.record(format!("resumed:{}", filename))
    }

    fn on_print_finished(
        &self,
        filename: &str,
        previous_state: PrinterState,
    ) -> anyhow::Result<()> {
        self.record(format!("finished:{}:{}", filename, previous_state))
    }

    fn on_status_update(
        &self,
        status: &PrintStatus,
        _z_position: f64,
        _selected_file: &str,
    ) -> anyhow::Result<()> {
        self.record(format!("status:{}:{:.1}", status.state, status.progress_percent))
    }
}

/// Configuration with no settle delays and short timeouts.
/// The poll interval is long so tests drive refreshes by hand.
pub fn test_config() -> ControllerConfig {
    ControllerConfig {
        port: "/dev/mock0".to_string(),
        timeout: Duration::from_millis(100),
        poll_interval: Duration::from_secs(60),
        poll_error_backoff: Duration::from_secs(60),
        poller_join_timeout: Duration::from_secs(1),
        settle_delay: Duration::ZERO,
        port_release_delay: Duration::ZERO,
        storage_init_delay: Duration::ZERO,
        ..ControllerConfig::default()
    }
}

/// A controller wired to `printer` with a recording listener attached
pub fn controller_with(
    printer: &MockPrinter,
    config: ControllerConfig,
) -> (Arc<ChituController>, Arc<RecordingListener>) {
    let listeners = Arc::new(ListenerRegistry::new());
    let recorder = Arc::new(RecordingListener::default());
    listeners.register(recorder.clone());
    let controller = Arc::new(ChituController::new(config, printer.opener(), listeners));
    (controller, recorder)
}

/// Poll `condition` for up to two seconds
pub fn wait_for(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}
