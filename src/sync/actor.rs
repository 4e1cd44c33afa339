//! Synchronizer - actor owning the device link and the program store
//!
//! One task, one inbound frame queue, one command channel. All model
//! mutation happens here, so no locks are needed anywhere in the core.
//! Outbound traffic follows a one-command-in-flight discipline with a
//! response timeout and bounded retries; user edits issued while a
//! command is unacknowledged are queued and coalesced per parameter.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info, trace, warn};

use super::commands::{Direction, StatusEvent, SubscriberFn, SyncCommand, SyncState};
use super::handle::SyncHandle;
use crate::ampfile;
use crate::config::SyncConfig;
use crate::midi::{ConnectError, SysexPort};
use crate::params::{SectionId, VoxMode};
use crate::program::{decode_name, encode_name, NAME_LEN};
use crate::protocol::VtxMessage;
use crate::store::{BankKind, DataError, ProgramStore, AMPFX_SLOTS, FACTORY_PROGRAMS, USER_BANKS};

/// Corrupt frames tolerated within the rolling window before giving up.
const PROTOCOL_ERROR_LIMIT: usize = 3;
const PROTOCOL_ERROR_WINDOW: Duration = Duration::from_secs(10);

/// Select deadline used when nothing is in flight.
const IDLE_TICK: Duration = Duration::from_secs(3600);

struct InFlight {
    message: VtxMessage,
    deadline: Instant,
    attempts: u32,
}

/// The device synchronizer actor. Interact with it through
/// [`SyncHandle`]; see [`Synchronizer::spawn`].
pub struct Synchronizer {
    state: SyncState,
    store: ProgramStore,
    port: Box<dyn SysexPort>,

    command_rx: mpsc::UnboundedReceiver<SyncCommand>,
    frame_rx: mpsc::Receiver<Vec<u8>>,
    frames_open: bool,

    subscribers: Vec<SubscriberFn>,

    /// Outbound queue behind the one in-flight slot
    pending: VecDeque<VtxMessage>,
    in_flight: Option<InFlight>,
    last_sent_name: &'static str,
    /// Name of the last request or upload the device answered; late
    /// error frames are attributed to this, not to whatever
    /// fire-and-forget message went out afterwards.
    last_request_name: &'static str,

    /// Directory holding the `<name>.json` files of the local cache
    programs_dir: Option<PathBuf>,

    timeout: Duration,
    retries: u32,
    fetch_factory: bool,

    /// Device mode and selected slot, as last reported
    mode: VoxMode,
    slot: u8,

    /// Timestamps of recent corrupt frames
    protocol_errors: VecDeque<Instant>,
}

impl Synchronizer {
    /// Spawn the actor and return a handle to it. The frame receiver is
    /// the transport's inbound queue; the port is the outbound seam.
    pub fn spawn(
        port: Box<dyn SysexPort>,
        frame_rx: mpsc::Receiver<Vec<u8>>,
        config: SyncConfig,
        programs_dir: Option<PathBuf>,
    ) -> SyncHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let mut store = ProgramStore::new();
        if let Some(dir) = &programs_dir {
            load_local_programs(dir, &mut store);
        }

        let actor = Synchronizer {
            state: SyncState::Disconnected,
            store,
            port,
            command_rx: cmd_rx,
            frame_rx,
            frames_open: true,
            subscribers: Vec::new(),
            pending: VecDeque::new(),
            in_flight: None,
            last_sent_name: "",
            last_request_name: "",
            programs_dir,
            timeout: Duration::from_millis(config.response_timeout_ms),
            retries: config.retries,
            fetch_factory: config.fetch_factory,
            mode: VoxMode::User,
            slot: 0,
            protocol_errors: VecDeque::new(),
        };

        tokio::spawn(actor.run());
        info!("Synchronizer spawned");

        SyncHandle::new(cmd_tx)
    }

    async fn run(mut self) {
        debug!("Synchronizer run loop started");

        loop {
            let deadline = self
                .in_flight
                .as_ref()
                .map(|f| f.deadline)
                .unwrap_or_else(|| Instant::now() + IDLE_TICK);

            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        None | Some(SyncCommand::Shutdown) => break,
                        Some(cmd) => self.handle_command(cmd).await,
                    }
                }
                frame = self.frame_rx.recv(), if self.frames_open => {
                    match frame {
                        Some(frame) => self.handle_frame(&frame).await,
                        None => self.frames_open = false,
                    }
                }
                _ = sleep_until(deadline), if self.in_flight.is_some() => {
                    self.handle_timeout().await;
                }
            }
        }

        self.port.close();
        info!("Synchronizer run loop terminated");
    }

    async fn handle_command(&mut self, cmd: SyncCommand) {
        trace!(?cmd, "Processing command");
        match cmd {
            SyncCommand::Connect => self.handle_connect().await,
            SyncCommand::Disconnect => self.handle_disconnect(),
            SyncCommand::Reset => {
                if self.state == SyncState::Error {
                    self.handle_disconnect();
                }
            }
            // Shutdown breaks the run loop before reaching here
            SyncCommand::Shutdown => {}

            SyncCommand::SetParameter {
                section,
                index,
                value,
            } => {
                if self.session_active() {
                    self.handle_set_parameter(section, index, value).await;
                } else {
                    warn!(%section, index, state = %self.state, "Edit dropped, no active session");
                }
            }
            SyncCommand::SetProgramName { name } => {
                if self.session_active() {
                    self.handle_set_program_name(&name).await;
                } else {
                    warn!(state = %self.state, "Name edit dropped, no active session");
                }
            }
            SyncCommand::SetMode { mode, slot } => {
                if !self.session_active() {
                    warn!(state = %self.state, "Mode change dropped, no active session");
                    return;
                }
                self.mode = mode;
                self.slot = slot;
                self.enqueue(VtxMessage::ModeChange { mode, slot }).await;
                self.enqueue(VtxMessage::CurrentProgramRequest).await;
            }
            SyncCommand::LoadCurrentProgram => {
                if self.session_active() {
                    self.enqueue(VtxMessage::CurrentProgramRequest).await;
                }
            }
            SyncCommand::SetCurrentProgram { mut program } => {
                if !self.session_active() {
                    warn!(state = %self.state, "Program upload dropped, no active session");
                    return;
                }
                program.clamp_all();
                self.store.set_current(program.clone());
                self.notify(&StatusEvent::ProgramChanged);
                self.enqueue(VtxMessage::CurrentProgramDump(program)).await;
            }
            SyncCommand::SaveCurrentProgramToDevice { slot } => {
                if !self.session_active() {
                    warn!(state = %self.state, "Program save dropped, no active session");
                } else if (slot as usize) < USER_BANKS {
                    self.enqueue(VtxMessage::ProgramWriteRequest { slot }).await;
                } else {
                    warn!(slot, "Save target slot out of range, ignored");
                }
            }

            SyncCommand::WriteProgramToBank {
                slot,
                program,
                response,
            } => {
                let result = if self.session_active() {
                    self.store.write_bank(BankKind::User, slot, program.clone())
                } else {
                    Err(DataError::NoSession)
                };
                if result.is_ok() {
                    self.enqueue(VtxMessage::ProgramDump {
                        mode: VoxMode::User,
                        slot,
                        program,
                    })
                    .await;
                }
                let _ = response.send(result);
            }
            SyncCommand::ReadProgramFromBank {
                kind,
                slot,
                response,
            } => {
                let result = self.store.read_bank(kind, slot).cloned();
                let _ = response.send(result);
            }
            SyncCommand::WriteAmpFx {
                slot,
                ampfx,
                response,
            } => {
                let result = if self.session_active() {
                    self.store.set_ampfx(slot, ampfx.clone())
                } else {
                    Err(DataError::NoSession)
                };
                if result.is_ok() {
                    self.enqueue(VtxMessage::AmpFxDump { slot, ampfx }).await;
                }
                let _ = response.send(result);
            }
            SyncCommand::CacheLocalProgram {
                name,
                overwrite,
                response,
            } => {
                let result = self.store.cache_local(&name, overwrite);
                if result.is_ok() {
                    self.persist_local(&name);
                }
                let _ = response.send(result);
            }
            SyncCommand::GetCurrentProgram { response } => {
                let _ = response.send(self.store.current().clone());
            }
            SyncCommand::GetStoreSnapshot { response } => {
                let _ = response.send(self.store.clone());
            }
            SyncCommand::GetState { response } => {
                let _ = response.send(self.state);
            }
            SyncCommand::Subscribe { listener, response } => {
                self.subscribers.push(listener);
                let id = self.subscribers.len() - 1;
                let _ = response.send(id);
                debug!(subscriber_id = id, "Added subscriber");
            }
        }
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Outbound traffic is only legal while querying or synced. Edits
    /// arriving in any other state are dropped so a stray UI event can
    /// never push a resting machine into the error state.
    fn session_active(&self) -> bool {
        matches!(self.state, SyncState::Querying | SyncState::Synced)
    }

    /// Mirror a freshly cached local program to `<programs_dir>/<name>.json`.
    fn persist_local(&self, name: &str) {
        let Some(dir) = &self.programs_dir else {
            return;
        };
        let Ok(program) = self.store.local(name) else {
            return;
        };
        let path = dir.join(format!("{name}.json"));
        match ampfile::export_program(&path, program) {
            Ok(()) => debug!(path = %path.display(), "Saved local program"),
            Err(err) => warn!(%err, name, "Local program not saved to disk"),
        }
    }

    async fn handle_connect(&mut self) {
        if matches!(
            self.state,
            SyncState::Connecting | SyncState::Querying | SyncState::Synced
        ) {
            debug!(state = %self.state, "Connect ignored");
            return;
        }

        self.set_state(SyncState::Connecting);
        match self.port.open() {
            Ok(()) => {
                self.protocol_errors.clear();
                self.set_state(SyncState::Querying);
                self.build_query_plan();
                self.pump().await;
            }
            Err(err) => {
                warn!(%err, "Connect failed");
                let status = match err {
                    ConnectError::AbsentDevice { .. } => StatusEvent::AbsentDevice,
                    ConnectError::InputNotConnected => StatusEvent::NotConnected(Direction::Input),
                    ConnectError::OutputNotConnected => {
                        StatusEvent::NotConnected(Direction::Output)
                    }
                    _ => StatusEvent::CommunicationFailure,
                };
                self.notify(&status);
                self.set_state(SyncState::Disconnected);
            }
        }
    }

    /// Flush the outbound queue, drop the in-flight command and close the
    /// transport. Inbound frames still sitting in the queue are discarded
    /// by [`Self::handle_frame`] once the state is `Disconnected`.
    fn handle_disconnect(&mut self) {
        let flushed = self.pending.len() + self.in_flight.is_some() as usize;
        if flushed > 0 {
            debug!(flushed, "Flushing pending outbound commands");
        }
        self.pending.clear();
        self.in_flight = None;
        self.port.close();
        self.set_state(SyncState::Disconnected);
    }

    /// The initial snapshot pull: mode, all user banks, optionally the
    /// factory presets, the AmpFx slots, and finally the edit buffer.
    /// The closing CurrentProgramDump flips the state to Synced.
    fn build_query_plan(&mut self) {
        self.pending.push_back(VtxMessage::ModeRequest);
        for slot in 0..USER_BANKS as u8 {
            self.pending.push_back(VtxMessage::ProgramRequest {
                mode: VoxMode::User,
                slot,
            });
        }
        if self.fetch_factory {
            for slot in 0..FACTORY_PROGRAMS as u8 {
                self.pending.push_back(VtxMessage::ProgramRequest {
                    mode: VoxMode::Preset,
                    slot,
                });
            }
        }
        for slot in 0..AMPFX_SLOTS as u8 {
            self.pending.push_back(VtxMessage::AmpFxRequest { slot });
        }
        self.pending.push_back(VtxMessage::CurrentProgramRequest);
    }

    // ---------------------------------------------------------------------
    // Outbound path
    // ---------------------------------------------------------------------

    async fn handle_set_parameter(&mut self, section: SectionId, index: u8, value: u16) {
        // clamp user edits up front; the range tables are authoritative
        let value = match self.store.current().spec_for(section, index) {
            Some(spec) => spec.clamp(value),
            None => value,
        };

        if !self.store.current_mut().set_value(section, index, value) {
            warn!(%section, index, "Edit for invalid parameter address dropped");
            return;
        }

        self.enqueue(VtxMessage::ParameterChange {
            section,
            index,
            value,
        })
        .await;
    }

    /// The name travels as one ParameterChange per character cell.
    async fn handle_set_program_name(&mut self, name: &str) {
        let cells = encode_name(name);
        self.store.current_mut().name = decode_name(&cells);
        for index in 0..NAME_LEN as u8 {
            self.enqueue(VtxMessage::ParameterChange {
                section: SectionId::ProgramName,
                index,
                value: cells[index as usize] as u16,
            })
            .await;
        }
    }

    /// Queue a message behind the in-flight slot. A queued edit for the
    /// same parameter is overwritten in place (last value wins), which
    /// keeps per-parameter write order without flooding the device.
    async fn enqueue(&mut self, msg: VtxMessage) {
        if let VtxMessage::ParameterChange {
            section,
            index,
            value,
        } = &msg
        {
            for queued in self.pending.iter_mut() {
                if let VtxMessage::ParameterChange {
                    section: qs,
                    index: qi,
                    value: qv,
                } = queued
                {
                    if qs == section && qi == index {
                        *qv = *value;
                        return;
                    }
                }
            }
        }
        self.pending.push_back(msg);
        self.pump().await;
    }

    /// Drain the queue until something is in flight or it runs dry.
    /// Messages that expect no response complete immediately.
    async fn pump(&mut self) {
        while self.in_flight.is_none() {
            let Some(msg) = self.pending.pop_front() else {
                break;
            };
            if !self.send_now(msg).await {
                break;
            }
        }
    }

    async fn send_now(&mut self, msg: VtxMessage) -> bool {
        let frame = msg.encode();
        trace!(command = command_name(&msg), bytes = frame.len(), "Sending");

        if let Err(err) = self.port.send(&frame).await {
            warn!(%err, "Send failed");
            self.fail(StatusEvent::CommunicationFailure);
            return false;
        }

        self.last_sent_name = command_name(&msg);
        if expects_response(&msg) {
            self.in_flight = Some(InFlight {
                message: msg,
                deadline: Instant::now() + self.timeout,
                attempts: 0,
            });
        }
        true
    }

    async fn handle_timeout(&mut self) {
        let Some(mut in_flight) = self.in_flight.take() else {
            return;
        };

        if in_flight.attempts < self.retries {
            in_flight.attempts += 1;
            warn!(
                command = command_name(&in_flight.message),
                attempt = in_flight.attempts,
                "No response, retrying"
            );
            let frame = in_flight.message.encode();
            if let Err(err) = self.port.send(&frame).await {
                warn!(%err, "Resend failed");
                self.fail(StatusEvent::CommunicationFailure);
                return;
            }
            in_flight.deadline = Instant::now() + self.timeout;
            self.in_flight = Some(in_flight);
        } else {
            warn!(
                command = command_name(&in_flight.message),
                "Device stopped answering"
            );
            self.fail(StatusEvent::CommunicationFailure);
        }
    }

    // ---------------------------------------------------------------------
    // Inbound path
    // ---------------------------------------------------------------------

    async fn handle_frame(&mut self, raw: &[u8]) {
        // frames left over after a disconnect are never applied
        if matches!(self.state, SyncState::Disconnected | SyncState::Error) {
            trace!("Discarding frame outside an active session");
            return;
        }

        match VtxMessage::decode(raw) {
            Ok(msg) => self.apply_message(msg).await,
            Err(err) if err.is_foreign() => {
                trace!("Ignoring frame addressed to other gear");
            }
            Err(err) => {
                warn!(%err, "Dropped corrupt frame");
                self.record_protocol_error();
            }
        }
    }

    async fn apply_message(&mut self, msg: VtxMessage) {
        let completed = self.complete_in_flight(&msg);

        match msg {
            VtxMessage::ModeData { mode, slot } => {
                self.mode = mode;
                self.slot = slot;
                self.notify(&StatusEvent::ModeChanged { mode, slot });
            }
            VtxMessage::CurrentProgramDump(mut program) => {
                self.flag_out_of_range(program.clamp_all(), "current program dump");
                self.store.set_current(program);
                self.notify(&StatusEvent::ProgramChanged);
                if self.state == SyncState::Querying
                    && self.in_flight.is_none()
                    && self.pending.is_empty()
                {
                    // device is authoritative at this transition
                    self.set_state(SyncState::Synced);
                    self.notify(&StatusEvent::CommunicationOk);
                }
            }
            VtxMessage::ProgramDump {
                mode,
                slot,
                mut program,
            } => {
                self.flag_out_of_range(program.clamp_all(), "program dump");
                let result = match mode {
                    VoxMode::User => self.store.write_bank(BankKind::User, slot, program),
                    VoxMode::Preset => self.store.populate_factory(slot, program),
                    VoxMode::Manual => {
                        warn!(slot, "Program dump for manual mode dropped");
                        Ok(())
                    }
                };
                if let Err(err) = result {
                    warn!(%err, slot, "Program dump not stored");
                }
            }
            VtxMessage::AmpFxDump { slot, ampfx } => {
                if let Err(err) = self.store.set_ampfx(slot, ampfx) {
                    warn!(%err, slot, "AmpFx dump not stored");
                }
            }
            VtxMessage::ParameterChange {
                section,
                index,
                value,
            } => self.apply_device_parameter(section, index, value),
            VtxMessage::ModeChange { mode, slot } => {
                // footswitch or front panel switched programs
                self.mode = mode;
                self.slot = slot;
                self.notify(&StatusEvent::ModeChanged { mode, slot });
                let mirrored = match mode {
                    VoxMode::User => self.store.read_bank(BankKind::User, slot).ok().cloned(),
                    VoxMode::Preset if self.fetch_factory => {
                        self.store.read_bank(BankKind::Factory, slot).ok().cloned()
                    }
                    // manual mode (or an unfetched factory slot) has no
                    // usable bank copy; ask the device
                    _ => None,
                };
                match mirrored {
                    Some(program) => {
                        self.store.set_current(program);
                        self.notify(&StatusEvent::ProgramChanged);
                    }
                    None => self.enqueue(VtxMessage::CurrentProgramRequest).await,
                }
            }
            VtxMessage::WriteCompleted { slot } => {
                let current = self.store.current().clone();
                if let Err(err) = self.store.write_bank(BankKind::User, slot, current) {
                    warn!(%err, slot, "Write confirmation for bad slot");
                }
                self.notify(&StatusEvent::CommunicationOk);
            }
            VtxMessage::DataLoadCompleted => {
                self.notify(&StatusEvent::CommunicationOk);
            }
            VtxMessage::DataFormatError => {
                // only a format error can implicate fire-and-forget traffic
                let command = completed
                    .as_ref()
                    .map(|sent| command_name(sent))
                    .unwrap_or(self.last_sent_name);
                self.report_rejection(command);
            }
            VtxMessage::WriteError | VtxMessage::DataLoadError => {
                // a late write/load error refers to the last answered
                // request, not to whatever went out since
                let command = completed
                    .as_ref()
                    .map(|sent| command_name(sent))
                    .unwrap_or(self.last_request_name);
                self.report_rejection(command);
            }
            other => {
                trace!(command = command_name(&other), "Ignoring request-direction message");
            }
        }

        if completed.is_some() {
            self.pump().await;
        }
    }

    /// Device-initiated (or echoed) parameter update. The device wins in
    /// steady state: the value lands in the model even if the user just
    /// edited the same parameter.
    fn apply_device_parameter(&mut self, section: SectionId, index: u8, value: u16) {
        if section == SectionId::ProgramName {
            self.set_name_cell(index, value);
            self.notify(&StatusEvent::ParameterChanged {
                section,
                index,
                value,
            });
            return;
        }

        let mut value = value;
        if let Some(spec) = self.store.current().spec_for(section, index) {
            if !spec.contains(value) {
                warn!(param = spec.name, value, "Out-of-range value from device, clamping");
                self.notify(&StatusEvent::DataError {
                    command: DataError::OutOfRange {
                        params: vec![spec.name],
                    }
                    .to_string(),
                });
                value = spec.clamp(value);
            }
        }

        if self.store.current_mut().set_value(section, index, value) {
            self.notify(&StatusEvent::ParameterChanged {
                section,
                index,
                value,
            });
        } else {
            warn!(%section, index, "Parameter update for invalid address dropped");
        }
    }

    fn set_name_cell(&mut self, index: u8, value: u16) {
        if (index as usize) >= NAME_LEN {
            warn!(index, "Name cell out of range");
            return;
        }
        let mut cells = encode_name(&self.store.current().name);
        cells[index as usize] = (value & 0x7F) as u8;
        self.store.current_mut().name = decode_name(&cells);
    }

    fn report_rejection(&self, command: &str) {
        warn!(command, "Device rejected command");
        self.notify(&StatusEvent::DataError {
            command: command.to_string(),
        });
    }

    fn flag_out_of_range(&self, flagged: Vec<&'static str>, context: &str) {
        if flagged.is_empty() {
            return;
        }
        warn!(?flagged, context, "Out-of-range values from device, clamped");
        self.notify(&StatusEvent::DataError {
            command: DataError::OutOfRange { params: flagged }.to_string(),
        });
    }

    /// Returns the sent message the inbound frame answers, if any.
    fn complete_in_flight(&mut self, inbound: &VtxMessage) -> Option<VtxMessage> {
        let in_flight = self.in_flight.as_ref()?;
        if !response_matches(&in_flight.message, inbound) {
            return None;
        }
        let sent = self.in_flight.take().map(|f| f.message);
        if let Some(sent) = &sent {
            self.last_request_name = command_name(sent);
        }
        sent
    }

    fn record_protocol_error(&mut self) {
        let now = Instant::now();
        self.protocol_errors.push_back(now);
        while let Some(&oldest) = self.protocol_errors.front() {
            if now.duration_since(oldest) > PROTOCOL_ERROR_WINDOW {
                self.protocol_errors.pop_front();
            } else {
                break;
            }
        }
        if self.protocol_errors.len() >= PROTOCOL_ERROR_LIMIT {
            warn!(
                count = self.protocol_errors.len(),
                "Repeated corrupt frames, giving up"
            );
            self.fail(StatusEvent::CommunicationFailure);
        }
    }

    fn fail(&mut self, status: StatusEvent) {
        self.pending.clear();
        self.in_flight = None;
        self.notify(&status);
        self.set_state(SyncState::Error);
    }

    // ---------------------------------------------------------------------
    // Notifications
    // ---------------------------------------------------------------------

    fn set_state(&mut self, state: SyncState) {
        if self.state == state {
            return;
        }
        info!(from = %self.state, to = %state, "State change");
        self.state = state;
        self.notify(&StatusEvent::StateChanged(state));
    }

    fn notify(&self, event: &StatusEvent) {
        for subscriber in &self.subscribers {
            subscriber(event);
        }
    }
}

/// Load every `<name>.json` under the programs directory into the local
/// cache. Unreadable files are skipped, not fatal.
fn load_local_programs(dir: &Path, store: &mut ProgramStore) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(%err, path = %dir.display(), "No local program directory");
            return;
        }
    };
    let mut loaded = 0usize;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match ampfile::load_program(&path) {
            Ok(program) => {
                store.insert_local(name.to_string(), program);
                loaded += 1;
            }
            Err(err) => warn!(%err, path = %path.display(), "Skipping unreadable local program"),
        }
    }
    if loaded > 0 {
        info!(loaded, "Restored local programs from disk");
    }
}

/// Does this outbound message hold the in-flight slot until the device
/// answers?
fn expects_response(msg: &VtxMessage) -> bool {
    use VtxMessage::*;
    matches!(
        msg,
        ModeRequest
            | CurrentProgramRequest
            | ProgramRequest { .. }
            | AmpFxRequest { .. }
            | ProgramWriteRequest { .. }
            | ProgramDump { .. }
            | CurrentProgramDump(_)
            | AmpFxDump { .. }
    )
}

fn response_matches(sent: &VtxMessage, inbound: &VtxMessage) -> bool {
    use VtxMessage::*;
    match (sent, inbound) {
        (ModeRequest, ModeData { .. }) => true,
        (CurrentProgramRequest, CurrentProgramDump(_)) => true,
        (
            ProgramRequest { mode, slot },
            ProgramDump {
                mode: got_mode,
                slot: got_slot,
                ..
            },
        ) => mode == got_mode && slot == got_slot,
        (AmpFxRequest { slot }, AmpFxDump { slot: got_slot, .. }) => slot == got_slot,
        (ProgramWriteRequest { .. }, WriteCompleted { .. } | WriteError) => true,
        (
            ProgramDump { .. } | CurrentProgramDump(_) | AmpFxDump { .. },
            DataLoadCompleted | DataLoadError,
        ) => true,
        // a format error answers whatever was last sent
        (_, DataFormatError) => true,
        _ => false,
    }
}

fn command_name(msg: &VtxMessage) -> &'static str {
    use VtxMessage::*;
    match msg {
        ModeRequest => "mode request",
        CurrentProgramRequest => "current program request",
        ProgramRequest { .. } => "program request",
        AmpFxRequest { .. } => "ampfx request",
        ProgramWriteRequest { .. } => "program write",
        ParameterChange { .. } => "parameter change",
        ModeChange { .. } => "mode change",
        ModeData { .. } => "mode data",
        CurrentProgramDump(_) => "current program dump",
        ProgramDump { .. } => "program dump",
        AmpFxDump { .. } => "ampfx dump",
        WriteCompleted { .. } => "write completed",
        DataLoadCompleted => "data load completed",
        WriteError => "write error",
        DataLoadError => "data load error",
        DataFormatError => "data format error",
    }
}
