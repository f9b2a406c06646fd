//! Chitu Controller Implementation
//!
//! Owns the serial link, serializes every command/response exchange, routes
//! responses through the [`ChituResponseParser`] into the
//! [`PrinterStateMachine`], and notifies listeners about lifecycle changes.
//!
//! The link mutex is the command lock: a command is written and its response
//! read while the lock is held, so two exchanges never interleave on the
//! wire. Job operations are the trust boundary; they log failures and
//! report them as `false` instead of returning errors.

use super::commands::{self, is_slow_command};
use super::response_parser::{
    is_acknowledged, is_file_opened, parse_protocol_version, ChituResponseParser, ParsedResponse,
    ResponseUpdate,
};
use super::state::{PrinterStateMachine, StateChange};
use crate::communication::{LinkOpener, LinkParams, SerialLink, SerialPortOpener};
use crate::firmware::status_poller::{PollTarget, PollerConfig, StatusPoller};
use parking_lot::{Mutex, RwLock};
use resinkit_core::{
    ConnectionError, Error, ListenerHandle, ListenerRegistry, PrintStatus, PrinterEvent,
    PrinterListener, PrinterSnapshot, PrinterState, Result,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Controller configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Serial device
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Response timeout for ordinary commands
    pub timeout: Duration,
    /// Firmware version assumed until the board reports one
    pub firmware_version: String,
    /// Liveness command sent on connect
    pub hello_command: String,
    /// Command whose reply carries byte progress
    pub progress_poll_command: String,
    /// Command that starts printing a file
    pub start_print_command: String,
    /// Timeout multiplier for storage commands
    pub slow_command_timeout_factor: u32,
    /// Status poll interval
    pub poll_interval: Duration,
    /// Delay after a failed poll
    pub poll_error_backoff: Duration,
    /// Upper bound on waiting for the poller during disconnect
    pub poller_join_timeout: Duration,
    /// Wait after opening the port
    pub settle_delay: Duration,
    /// Wait before reopening a port
    pub port_release_delay: Duration,
    /// Wait after storage init
    pub storage_init_delay: Duration,
    /// Feed rate for relative Z moves
    pub move_feed_rate: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            port: "/dev/serial0".to_string(),
            baud_rate: 115200,
            timeout: Duration::from_secs(5),
            firmware_version: "V4.13".to_string(),
            hello_command: "M4002".to_string(),
            progress_poll_command: "M4000".to_string(),
            start_print_command: "M6030".to_string(),
            slow_command_timeout_factor: 3,
            poll_interval: Duration::from_secs(3),
            poll_error_backoff: Duration::from_secs(5),
            poller_join_timeout: Duration::from_secs(5),
            settle_delay: Duration::from_secs(2),
            port_release_delay: Duration::from_secs(1),
            storage_init_delay: Duration::from_secs(1),
            move_feed_rate: 600,
        }
    }
}

impl ControllerConfig {
    fn link_params(&self) -> LinkParams {
        LinkParams {
            port: self.port.clone(),
            baud_rate: self.baud_rate,
            timeout: self.timeout,
            settle_delay: self.settle_delay,
        }
    }

    fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: self.poll_interval,
            error_backoff: self.poll_error_backoff,
        }
    }
}

/// Driver for a Chitu-based resin printer
pub struct ChituController {
    config: ControllerConfig,
    opener: Box<dyn LinkOpener>,
    /// Command lock and link in one
    link: Mutex<Option<Box<dyn SerialLink>>>,
    parser: ChituResponseParser,
    machine: RwLock<PrinterStateMachine>,
    listeners: Arc<ListenerRegistry>,
    poller: Mutex<Option<StatusPoller>>,
}

impl ChituController {
    /// Create a controller that opens links with `opener`
    pub fn new(
        config: ControllerConfig,
        opener: Box<dyn LinkOpener>,
        listeners: Arc<ListenerRegistry>,
    ) -> Self {
        Self {
            parser: ChituResponseParser::new(config.progress_poll_command.clone()),
            machine: RwLock::new(PrinterStateMachine::new(config.firmware_version.clone())),
            link: Mutex::new(None),
            poller: Mutex::new(None),
            opener,
            listeners,
            config,
        }
    }

    /// Create a controller talking to a real serial port
    pub fn with_serial_port(config: ControllerConfig, listeners: Arc<ListenerRegistry>) -> Self {
        Self::new(config, Box::new(SerialPortOpener), listeners)
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Registry that receives this controller's events
    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    /// Register a listener for printer events
    pub fn register_listener(&self, listener: Arc<dyn PrinterListener>) -> ListenerHandle {
        self.listeners.register(listener)
    }

    // ---------------------------------------------------------------------
    // Connection lifecycle
    // ---------------------------------------------------------------------

    /// Open the link, handshake, and start the status poller.
    ///
    /// A link that is still open is closed first. Returns false on any
    /// failure, leaving the controller disconnected.
    pub fn connect(self: &Arc<Self>) -> bool {
        tracing::info!(
            "Connecting to printer on {} at {} baud",
            self.config.port,
            self.config.baud_rate
        );

        self.stop_poller();
        if let Some(mut stale) = self.link.lock().take() {
            stale.close();
        }
        self.machine.write().mark_disconnected();
        if !self.config.port_release_delay.is_zero() {
            thread::sleep(self.config.port_release_delay);
        }

        let mut link = match self.opener.open(&self.config.link_params()) {
            Ok(link) => link,
            Err(e) => {
                tracing::error!("Failed to connect to printer: {}", e);
                return false;
            }
        };
        if let Err(e) = link.reset_buffers() {
            tracing::error!("Failed to reset serial buffers: {}", e);
            link.close();
            return false;
        }
        *self.link.lock() = Some(link);

        match self.execute(&self.config.hello_command) {
            Ok(response) if !response.is_empty() => {
                tracing::debug!("Hello response: {}", response);
            }
            Ok(_) => {
                tracing::error!(
                    "No response to {} from printer on {}",
                    self.config.hello_command,
                    self.config.port
                );
                self.close_link();
                return false;
            }
            Err(e) => {
                tracing::error!("Handshake failed: {}", e);
                self.close_link();
                return false;
            }
        }

        self.machine.write().mark_connected();

        if let Err(e) = self.execute(commands::INIT_STORAGE) {
            tracing::warn!("Storage initialization failed: {}", e);
        }
        if !self.config.storage_init_delay.is_zero() {
            thread::sleep(self.config.storage_init_delay);
        }

        match self.execute(commands::FIRMWARE_INFO) {
            Ok(response) => {
                if let Some(version) = parse_protocol_version(&response) {
                    self.machine.write().set_firmware_version(version);
                }
            }
            Err(e) => tracing::debug!("Firmware query failed: {}", e),
        }

        self.start_poller();

        let firmware_version = self.machine.read().firmware_version().to_string();
        tracing::info!(
            "Connected to printer on {}, firmware {}",
            self.config.port,
            firmware_version
        );
        self.listeners.dispatch(&PrinterEvent::Connected {
            firmware_version,
            port: self.config.port.clone(),
            baud_rate: self.config.baud_rate,
        });
        true
    }

    /// Stop the poller, close the link, and notify listeners.
    ///
    /// Waits at most the poller join timeout. Does nothing when already
    /// disconnected.
    pub fn disconnect(&self) {
        self.stop_poller();

        let closed = match self.link.lock().take() {
            Some(mut link) => {
                link.close();
                true
            }
            None => false,
        };
        let was_connected = self.machine.write().mark_disconnected();

        if closed || was_connected {
            tracing::info!("Disconnected from printer");
            self.listeners.dispatch(&PrinterEvent::Disconnected);
        }
    }

    /// Connect if needed and report the firmware version, or why not
    pub fn ensure_connected(self: &Arc<Self>) -> (bool, String) {
        if !self.is_connected() && !self.connect() {
            return (false, "Failed to connect to printer".to_string());
        }
        match self.firmware_version() {
            Ok(version) => (true, version),
            Err(e) => (false, e.to_string()),
        }
    }

    /// True once the handshake succeeded and until disconnect
    pub fn is_connected(&self) -> bool {
        self.machine.read().is_connected()
    }

    fn close_link(&self) {
        if let Some(mut link) = self.link.lock().take() {
            link.close();
        }
        self.machine.write().mark_disconnected();
    }

    fn start_poller(self: &Arc<Self>) {
        let mut slot = self.poller.lock();
        if slot.as_ref().is_some_and(|poller| poller.is_running()) {
            return;
        }
        match StatusPoller::spawn(Arc::downgrade(self), self.config.poller_config()) {
            Ok(poller) => *slot = Some(poller),
            Err(e) => tracing::error!("Failed to start status poller: {}", e),
        }
    }

    fn stop_poller(&self) {
        let Some(poller) = self.poller.lock().take() else {
            return;
        };
        if !poller.stop(self.config.poller_join_timeout) {
            tracing::warn!(
                "Status poller did not stop within {:?}; detaching it",
                self.config.poller_join_timeout
            );
        }
    }

    // ---------------------------------------------------------------------
    // Command exchange
    // ---------------------------------------------------------------------

    /// Send one command and return its normalized response.
    ///
    /// An unanswered command yields an empty string, not an error. Errors
    /// mean the link is missing or an I/O operation failed.
    pub fn execute(&self, command: &str) -> Result<String> {
        self.execute_with_timeout(command, None)
    }

    /// Like [`execute`](Self::execute) with an explicit response timeout
    pub fn execute_with_timeout(&self, command: &str, timeout: Option<Duration>) -> Result<String> {
        Ok(self.exchange(command, timeout)?.text)
    }

    /// Write a command without waiting for a response
    pub fn send_only(&self, command: &str) -> Result<()> {
        let command = command.trim();
        let mut guard = self.link.lock();
        let link = open_link(&mut guard)?;
        link.reset_buffers().map_err(ConnectionError::communication)?;
        link.write_line(command).map_err(|e| {
            tracing::error!("Failed to send {}: {}", command, e);
            ConnectionError::communication(e)
        })?;
        tracing::debug!("Sent without response: {}", command);
        Ok(())
    }

    /// Run commands back to back under one hold of the command lock.
    ///
    /// Every command is attempted even when an earlier one went
    /// unanswered; an I/O error aborts the rest.
    pub fn execute_sequence(&self, sequence: &[String]) -> Result<Vec<String>> {
        let raw: Vec<(String, String)> = {
            let mut guard = self.link.lock();
            let link = open_link(&mut guard)?;
            sequence
                .iter()
                .map(|command| {
                    let command = command.trim();
                    let timeout = self.timeout_for(command);
                    transfer(link.as_mut(), command, timeout)
                        .map(|response| (command.to_string(), response))
                })
                .collect::<Result<_>>()?
        };

        Ok(raw
            .iter()
            .map(|(command, response)| self.absorb(command, response).text)
            .collect())
    }

    fn exchange(&self, command: &str, timeout: Option<Duration>) -> Result<ParsedResponse> {
        let command = command.trim();
        let timeout = timeout.unwrap_or_else(|| self.timeout_for(command));

        let raw = {
            let mut guard = self.link.lock();
            let link = open_link(&mut guard)?;
            transfer(link.as_mut(), command, timeout)?
        };

        Ok(self.absorb(command, &raw))
    }

    /// Parse a raw response and apply what it says to the printer state
    fn absorb(&self, command: &str, raw: &str) -> ParsedResponse {
        let firmware_version = self.machine.read().firmware_version().to_string();
        let parsed = self.parser.process(raw, command, &firmware_version);
        tracing::debug!("Command: {} -> Response: {}", command, parsed.text);

        if !parsed.updates.is_empty() {
            let changes: Vec<StateChange> = {
                let mut machine = self.machine.write();
                parsed
                    .updates
                    .iter()
                    .filter_map(|update| machine.apply_update(update))
                    .collect()
            };
            self.announce_changes(&changes);
        }

        parsed
    }

    fn announce_changes(&self, changes: &[StateChange]) {
        for change in changes {
            tracing::info!("Printer state {} -> {}", change.from, change.to);
            if change.finished_job() {
                let filename = self.machine.read().selected_file().to_string();
                self.listeners.dispatch(&PrinterEvent::PrintFinished {
                    filename,
                    previous_state: change.from,
                });
            }
        }
    }

    fn timeout_for(&self, command: &str) -> Duration {
        if is_slow_command(command, &self.config.start_print_command) {
            self.config.timeout * self.config.slow_command_timeout_factor
        } else {
            self.config.timeout
        }
    }

    // ---------------------------------------------------------------------
    // Job operations
    // ---------------------------------------------------------------------

    /// Open `filename` on the printer storage
    pub fn select_file(&self, filename: &str) -> bool {
        outcome("select file", self.try_select_file(filename))
    }

    fn try_select_file(&self, filename: &str) -> Result<bool> {
        tracing::info!("Selecting file: {}", filename);

        self.execute(commands::INIT_STORAGE)?;
        if !self.config.storage_init_delay.is_zero() {
            thread::sleep(self.config.storage_init_delay);
        }

        let response = self.execute(&commands::select_file(filename))?;
        if is_file_opened(&response) {
            self.machine.write().set_selected_file(filename);
            tracing::info!("File selected: {}", filename);
            Ok(true)
        } else {
            tracing::warn!("File selection failed: {}", response);
            Ok(false)
        }
    }

    /// Start printing; selects `filename` first when given
    pub fn start_printing(&self, filename: Option<&str>) -> bool {
        if let Some(filename) = filename {
            if !self.select_file(filename) {
                return false;
            }
        }
        outcome("start print", self.try_start_printing())
    }

    fn try_start_printing(&self) -> Result<bool> {
        let selected = self.machine.read().selected_file().to_string();
        if selected.is_empty() {
            tracing::error!("No file selected for printing");
            return Ok(false);
        }

        tracing::info!("Starting print: {}", selected);
        let response = self.execute(&commands::start_print(
            &self.config.start_print_command,
            &selected,
        ))?;
        if !is_acknowledged(&response) {
            tracing::warn!("Print start failed: {}", response);
            return Ok(false);
        }

        self.machine.write().begin_job();
        tracing::info!("Print started: {}", selected);
        self.listeners
            .dispatch(&PrinterEvent::PrintStarted(selected));
        Ok(true)
    }

    /// Pause the running job
    pub fn pause_printing(&self) -> bool {
        outcome(
            "pause print",
            self.job_command(commands::PAUSE, PrinterState::Paused, PrinterEvent::PrintPaused),
        )
    }

    /// Resume the paused job
    pub fn resume_printing(&self) -> bool {
        outcome(
            "resume print",
            self.job_command(commands::RESUME, PrinterState::Printing, PrinterEvent::PrintResumed),
        )
    }

    fn job_command(
        &self,
        command: &str,
        next: PrinterState,
        event: fn(String) -> PrinterEvent,
    ) -> Result<bool> {
        let response = self.execute(command)?;
        if !is_acknowledged(&response) {
            tracing::warn!("{} not acknowledged: {}", command, response);
            return Ok(false);
        }

        let filename = {
            let mut machine = self.machine.write();
            machine.set_state(next);
            machine.selected_file().to_string()
        };
        tracing::info!("Printer state now {} ({})", next, filename);
        self.listeners.dispatch(&event(filename));
        Ok(true)
    }

    /// Stop the job and forget the selected file
    pub fn stop_printing(&self) -> bool {
        outcome("stop print", self.try_stop_printing())
    }

    fn try_stop_printing(&self) -> Result<bool> {
        let response = self.execute(commands::STOP)?;
        if !is_acknowledged(&response) {
            tracing::warn!("Print stop failed: {}", response);
            return Ok(false);
        }

        let (filename, previous_state) = self.machine.write().end_job();
        tracing::info!("Print stopped: {}", filename);
        self.listeners.dispatch(&PrinterEvent::PrintFinished {
            filename,
            previous_state,
        });
        Ok(true)
    }

    /// Home the Z axis
    pub fn home_axis(&self) -> bool {
        outcome(
            "home axis",
            self.execute(commands::HOME_Z)
                .map(|response| is_acknowledged(&response)),
        )
    }

    /// Move Z by `distance` millimetres relative to the current position
    ///
    /// Succeeds only if every command of the move was acknowledged. The
    /// switch back to absolute positioning is always sent.
    pub fn move_relative(&self, distance: f64) -> bool {
        let sequence = commands::relative_z_move(distance, self.config.move_feed_rate);
        outcome(
            "relative move",
            self.execute_sequence(&sequence)
                .map(|responses| responses.iter().all(|response| is_acknowledged(response))),
        )
    }

    /// Reboot the board; does not wait for a reply
    pub fn reboot(&self) -> bool {
        outcome("reboot", self.send_only(commands::REBOOT).map(|()| true))
    }

    /// Stop whatever the board is doing and reinitialize its storage
    pub fn recover_storage(&self) -> bool {
        tracing::info!("Recovering printer storage");

        if !self.stop_printing() {
            tracing::debug!("Stop during recovery was not acknowledged");
        }
        if !self.config.storage_init_delay.is_zero() {
            thread::sleep(self.config.storage_init_delay);
        }

        outcome(
            "storage recovery",
            self.execute(commands::INIT_STORAGE)
                .map(|response| is_acknowledged(&response)),
        )
    }

    // ---------------------------------------------------------------------
    // Status
    // ---------------------------------------------------------------------

    /// Query progress and notify listeners with the result
    ///
    /// Uses the progress poll first and falls back to the storage status
    /// query when the poll carried no byte progress.
    pub fn refresh_status(&self) -> Result<PrintStatus> {
        let poll = self.exchange(&self.config.progress_poll_command, None)?;
        let had_progress = poll
            .updates
            .iter()
            .any(|update| matches!(update, ResponseUpdate::Progress(_)));
        if !had_progress {
            self.exchange(commands::STORAGE_STATUS, None)?;
        }

        let snapshot = self.snapshot();
        self.listeners.dispatch(&PrinterEvent::StatusUpdate {
            status: snapshot.print_status.clone(),
            z_position: snapshot.z_position,
            selected_file: snapshot.selected_file,
        });
        Ok(snapshot.print_status)
    }

    /// Current job status
    ///
    /// `Unknown` while disconnected; `Error` when the refresh failed.
    pub fn print_status(&self) -> PrintStatus {
        if !self.is_connected() {
            self.machine.write().set_state(PrinterState::Unknown);
            return PrintStatus::with_state(PrinterState::Unknown);
        }

        match self.refresh_status() {
            Ok(status) => status,
            Err(e) => {
                tracing::error!("Error getting print status: {}", e);
                self.machine.write().set_state(PrinterState::Error);
                PrintStatus::with_state(PrinterState::Error)
            }
        }
    }

    /// Query the Z height; the last known value on failure
    pub fn query_position(&self) -> f64 {
        if let Err(e) = self.execute(commands::REPORT_POSITION) {
            tracing::debug!("Position query failed: {}", e);
        }
        self.machine.read().z_position()
    }

    /// Firmware version of the connected printer
    pub fn firmware_version(&self) -> Result<String> {
        if !self.is_connected() {
            return Err(ConnectionError::NotConnected.into());
        }
        Ok(self.machine.read().firmware_version().to_string())
    }

    pub fn state(&self) -> PrinterState {
        self.machine.read().state()
    }

    pub fn selected_file(&self) -> String {
        self.machine.read().selected_file().to_string()
    }

    pub fn z_position(&self) -> f64 {
        self.machine.read().z_position()
    }

    /// Copy of everything the controller knows
    pub fn snapshot(&self) -> PrinterSnapshot {
        self.machine.read().snapshot()
    }
}

impl PollTarget for ChituController {
    fn is_connected(&self) -> bool {
        ChituController::is_connected(self)
    }

    fn should_poll(&self) -> bool {
        matches!(self.state(), PrinterState::Printing)
    }

    fn poll(&self) -> Result<()> {
        if let Err(e) = self.refresh_status() {
            self.machine.write().set_state(PrinterState::Error);
            return Err(e);
        }
        Ok(())
    }
}

fn open_link<'a>(
    guard: &'a mut Option<Box<dyn SerialLink>>,
) -> Result<&'a mut Box<dyn SerialLink>> {
    guard
        .as_mut()
        .filter(|link| link.is_open())
        .ok_or_else(|| Error::from(ConnectionError::NotConnected))
}

/// One write/read round trip on a link the caller holds exclusively
fn transfer(link: &mut dyn SerialLink, command: &str, timeout: Duration) -> Result<String> {
    link.reset_buffers().map_err(ConnectionError::communication)?;
    link.write_line(command).map_err(|e| {
        tracing::error!("Failed to send {}: {}", command, e);
        ConnectionError::communication(e)
    })?;
    let response = link
        .read_until_terminator(Instant::now() + timeout)
        .map_err(|e| {
            tracing::error!("Failed to read response to {}: {}", command, e);
            ConnectionError::communication(e)
        })?;
    if response.is_empty() {
        tracing::debug!("No response to {} within {:?}", command, timeout);
    }
    Ok(response)
}

/// Convert an operation result into the boolean job-operation outcome
fn outcome(operation: &str, result: Result<bool>) -> bool {
    match result {
        Ok(done) => done,
        Err(e) => {
            tracing::error!("Error during {}: {}", operation, e);
            false
        }
    }
}
