//! Tests for the synchronizer state machine
//!
//! The transport is replaced by a recording mock port; a small in-test
//! device simulator answers the query sequence the way the amplifier
//! would.

use super::*;
use crate::config::SyncConfig;
use crate::midi::{ConnectError, ConnectState, SysexPort};
use crate::params::{SectionId, VoxMode};
use crate::program::{AmpFx, Program};
use crate::protocol::VtxMessage;
use crate::store::{BankKind, DataError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Duration;

/// Shared view on everything the actor pushed out the port.
#[derive(Clone, Default)]
struct PortLog {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl PortLog {
    fn frames(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    fn sent_messages(&self) -> Vec<VtxMessage> {
        self.frames()
            .iter()
            .filter_map(|f| VtxMessage::decode(f).ok())
            .collect()
    }
}

struct MockPort {
    log: PortLog,
    open_error: Option<ConnectError>,
    opened: bool,
}

#[async_trait]
impl SysexPort for MockPort {
    fn open(&mut self) -> Result<(), ConnectError> {
        if let Some(err) = self.open_error.clone() {
            return Err(err);
        }
        self.opened = true;
        Ok(())
    }

    fn close(&mut self) {
        self.opened = false;
    }

    async fn send(&mut self, frame: &[u8]) -> Result<(), ConnectError> {
        if !self.opened {
            return Err(ConnectError::NotConnected);
        }
        self.log.sent.lock().unwrap().push(frame.to_vec());
        Ok(())
    }

    fn connect_state(&self) -> ConnectState {
        if self.opened {
            ConnectState::Connected
        } else {
            ConnectState::Disconnected
        }
    }
}

type EventLog = Arc<Mutex<Vec<StatusEvent>>>;

async fn spawn_sync(
    open_error: Option<ConnectError>,
    config: SyncConfig,
) -> (SyncHandle, PortLog, mpsc::Sender<Vec<u8>>, EventLog) {
    spawn_sync_in(open_error, config, None).await
}

async fn spawn_sync_in(
    open_error: Option<ConnectError>,
    config: SyncConfig,
    programs_dir: Option<PathBuf>,
) -> (SyncHandle, PortLog, mpsc::Sender<Vec<u8>>, EventLog) {
    let (frame_tx, frame_rx) = mpsc::channel(64);
    let log = PortLog::default();
    let port = MockPort {
        log: log.clone(),
        open_error,
        opened: false,
    };
    let handle = Synchronizer::spawn(Box::new(port), frame_rx, config, programs_dir);

    let events: EventLog = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    handle
        .subscribe(Arc::new(move |event: &StatusEvent| {
            sink.lock().unwrap().push(event.clone());
        }))
        .await
        .unwrap();

    (handle, log, frame_tx, events)
}

fn test_config() -> SyncConfig {
    SyncConfig {
        response_timeout_ms: 5_000,
        retries: 3,
        fetch_factory: false,
    }
}

fn named_program(name: &str) -> Program {
    Program {
        name: name.to_string(),
        ..Program::default()
    }
}

/// What the amplifier would answer to each request.
fn device_answer(msg: &VtxMessage) -> Option<VtxMessage> {
    match msg {
        VtxMessage::ModeRequest => Some(VtxMessage::ModeData {
            mode: VoxMode::User,
            slot: 2,
        }),
        VtxMessage::CurrentProgramRequest => Some(VtxMessage::CurrentProgramDump(named_program(
            "Edit Buffer",
        ))),
        VtxMessage::ProgramRequest { mode, slot } => Some(VtxMessage::ProgramDump {
            mode: *mode,
            slot: *slot,
            program: named_program(&format!("Slot {slot}")),
        }),
        VtxMessage::AmpFxRequest { slot } => Some(VtxMessage::AmpFxDump {
            slot: *slot,
            ampfx: AmpFx::default(),
        }),
        VtxMessage::ProgramWriteRequest { slot } => {
            Some(VtxMessage::WriteCompleted { slot: *slot })
        }
        VtxMessage::ProgramDump { .. }
        | VtxMessage::CurrentProgramDump(_)
        | VtxMessage::AmpFxDump { .. } => Some(VtxMessage::DataLoadCompleted),
        _ => None,
    }
}

/// Answer outbound requests until the synchronizer reaches `until`.
async fn run_device(
    log: &PortLog,
    frame_tx: &mpsc::Sender<Vec<u8>>,
    handle: &SyncHandle,
    until: SyncState,
) {
    let mut answered = 0;
    for _ in 0..500 {
        let frames = log.frames();
        for frame in frames.iter().skip(answered) {
            if let Ok(msg) = VtxMessage::decode(frame) {
                if let Some(response) = device_answer(&msg) {
                    frame_tx.send(response.encode()).await.unwrap();
                }
            }
        }
        answered = frames.len();

        if handle.state().await == Some(until) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("synchronizer never reached {until}");
}

async fn wait_for_state(handle: &SyncHandle, want: SyncState) {
    for _ in 0..500 {
        if handle.state().await == Some(want) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("synchronizer never reached {want}");
}

#[tokio::test]
async fn refused_output_keeps_state_disconnected() {
    let (handle, _log, _frame_tx, events) =
        spawn_sync(Some(ConnectError::OutputNotConnected), test_config()).await;

    handle.connect();
    wait_for_state(&handle, SyncState::Disconnected).await;

    let events = events.lock().unwrap().clone();
    assert!(events.contains(&StatusEvent::NotConnected(Direction::Output)));
    assert!(!events.contains(&StatusEvent::StateChanged(SyncState::Querying)));
}

#[tokio::test]
async fn absent_device_is_reported() {
    let (handle, _log, _frame_tx, events) = spawn_sync(
        Some(ConnectError::AbsentDevice {
            pattern: "VOX".to_string(),
        }),
        test_config(),
    )
    .await;

    handle.connect();
    wait_for_state(&handle, SyncState::Disconnected).await;

    let events = events.lock().unwrap().clone();
    assert!(events.contains(&StatusEvent::AbsentDevice));
}

#[tokio::test]
async fn connect_and_query_reaches_synced() {
    let (handle, log, frame_tx, events) = spawn_sync(None, test_config()).await;

    handle.connect();
    run_device(&log, &frame_tx, &handle, SyncState::Synced).await;

    // banks and the edit buffer are populated from the dumps
    let bank3 = handle
        .read_program_from_bank(BankKind::User, 3)
        .await
        .unwrap();
    assert_eq!(bank3.name, "Slot 3");
    let current = handle.current_program().await.unwrap();
    assert_eq!(current.name, "Edit Buffer");

    let events = events.lock().unwrap().clone();
    assert!(events.contains(&StatusEvent::StateChanged(SyncState::Synced)));
    assert!(events.contains(&StatusEvent::CommunicationOk));

    // one request was in flight at a time, so every request got answered
    // before the next went out
    let sent = log.sent_messages();
    assert_eq!(sent.first(), Some(&VtxMessage::ModeRequest));
    assert_eq!(sent.last(), Some(&VtxMessage::CurrentProgramRequest));
}

#[tokio::test]
async fn device_wins_on_conflicting_parameter() {
    let (handle, log, frame_tx, _events) = spawn_sync(None, test_config()).await;
    handle.connect();
    run_device(&log, &frame_tx, &handle, SyncState::Synced).await;

    // user edit, immediately contradicted by the device
    handle.set_parameter(SectionId::Amp, 0, 55);
    frame_tx
        .send(
            VtxMessage::ParameterChange {
                section: SectionId::Amp,
                index: 0,
                value: 91,
            }
            .encode(),
        )
        .await
        .unwrap();

    for _ in 0..500 {
        let current = handle.current_program().await.unwrap();
        if current.amp_values[0] == 91 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("device-reported value never landed in the model");
}

#[tokio::test]
async fn edits_coalesce_behind_an_unacknowledged_command() {
    let (handle, log, frame_tx, _events) = spawn_sync(None, test_config()).await;
    handle.connect();
    run_device(&log, &frame_tx, &handle, SyncState::Synced).await;

    // park a request in flight, then edit the same parameter three times
    handle.load_current_program();
    handle.set_parameter(SectionId::Amp, 0, 10);
    handle.set_parameter(SectionId::Amp, 0, 20);
    handle.set_parameter(SectionId::Amp, 0, 30);

    // barrier: commands above are processed once this query answers
    assert!(handle.current_program().await.is_some());
    let before = log.sent_messages();

    frame_tx
        .send(VtxMessage::CurrentProgramDump(named_program("Edit Buffer")).encode())
        .await
        .unwrap();

    let mut edits = Vec::new();
    for _ in 0..500 {
        edits = log
            .sent_messages()
            .into_iter()
            .skip(before.len())
            .filter(|m| {
                matches!(
                    m,
                    VtxMessage::ParameterChange {
                        section: SectionId::Amp,
                        index: 0,
                        ..
                    }
                )
            })
            .collect();
        if !edits.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    assert_eq!(
        edits,
        vec![VtxMessage::ParameterChange {
            section: SectionId::Amp,
            index: 0,
            value: 30,
        }],
        "three queued edits to one parameter collapse to the last value"
    );
}

#[tokio::test]
async fn response_timeout_retries_then_errors() {
    let config = SyncConfig {
        response_timeout_ms: 20,
        retries: 2,
        fetch_factory: false,
    };
    let (handle, log, _frame_tx, events) = spawn_sync(None, config).await;

    handle.connect();
    wait_for_state(&handle, SyncState::Error).await;

    // initial send plus two retries of the first query
    let mode_requests = log
        .sent_messages()
        .iter()
        .filter(|m| matches!(m, VtxMessage::ModeRequest))
        .count();
    assert_eq!(mode_requests, 3);

    let events = events.lock().unwrap().clone();
    assert!(events.contains(&StatusEvent::CommunicationFailure));
}

#[tokio::test]
async fn repeated_corrupt_frames_escalate_to_error() {
    let (handle, log, frame_tx, _events) = spawn_sync(None, test_config()).await;
    handle.connect();
    run_device(&log, &frame_tx, &handle, SyncState::Synced).await;

    let mut corrupt = VtxMessage::ModeData {
        mode: VoxMode::User,
        slot: 1,
    }
    .encode();
    let checksum_at = corrupt.len() - 2;
    corrupt[checksum_at] ^= 0x01;

    for _ in 0..3 {
        frame_tx.send(corrupt.clone()).await.unwrap();
    }

    wait_for_state(&handle, SyncState::Error).await;
}

#[tokio::test]
async fn foreign_frames_never_escalate() {
    let (handle, log, frame_tx, _events) = spawn_sync(None, test_config()).await;
    handle.connect();
    run_device(&log, &frame_tx, &handle, SyncState::Synced).await;

    // another manufacturer's gear on the same bus
    for _ in 0..10 {
        frame_tx
            .send(vec![0xF0, 0x43, 0x10, 0x4C, 0x00, 0x00, 0x7E, 0x00, 0xF7])
            .await
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(handle.state().await, Some(SyncState::Synced));
}

#[tokio::test]
async fn bank_write_bounds_are_enforced() {
    let (handle, log, frame_tx, _events) = spawn_sync(None, test_config()).await;
    handle.connect();
    run_device(&log, &frame_tx, &handle, SyncState::Synced).await;

    let result = handle
        .write_program_to_bank(12, named_program("Nope"))
        .await;
    assert_eq!(
        result,
        Err(DataError::SlotOutOfRange { slot: 12, max: 7 })
    );

    // the rejected write never reached the wire
    let dumps = log
        .sent_messages()
        .iter()
        .filter(|m| matches!(m, VtxMessage::ProgramDump { .. }))
        .count();
    assert_eq!(dumps, 0);
}

#[tokio::test]
async fn disconnect_flushes_pending_and_discards_inbound() {
    let (handle, log, frame_tx, _events) = spawn_sync(None, test_config()).await;
    handle.connect();
    run_device(&log, &frame_tx, &handle, SyncState::Synced).await;

    let before = handle.current_program().await.unwrap();

    // park a request, queue an edit behind it, then disconnect
    handle.load_current_program();
    handle.set_parameter(SectionId::Amp, 1, 33);
    handle.disconnect();
    wait_for_state(&handle, SyncState::Disconnected).await;

    let sent_before = log.frames().len();

    // a late frame from the device must not touch the model
    frame_tx
        .send(
            VtxMessage::ParameterChange {
                section: SectionId::Amp,
                index: 2,
                value: 77,
            }
            .encode(),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let after = handle.current_program().await.unwrap();
    assert_eq!(after.amp_values[2], before.amp_values[2]);
    assert_eq!(log.frames().len(), sent_before, "nothing sent after disconnect");
}

#[tokio::test]
async fn cache_local_signals_existing_name() {
    let (handle, log, frame_tx, _events) = spawn_sync(None, test_config()).await;
    handle.connect();
    run_device(&log, &frame_tx, &handle, SyncState::Synced).await;

    assert_eq!(handle.cache_local_program("Lead", false).await, Ok(()));
    assert_eq!(
        handle.cache_local_program("Lead", false).await,
        Err(DataError::NameExists("Lead".to_string()))
    );
    // explicit overwrite confirmation goes through
    assert_eq!(handle.cache_local_program("Lead", true).await, Ok(()));
}

#[tokio::test]
async fn program_write_updates_bank_mirror_on_confirmation() {
    let (handle, log, frame_tx, _events) = spawn_sync(None, test_config()).await;
    handle.connect();
    run_device(&log, &frame_tx, &handle, SyncState::Synced).await;

    handle.save_current_program_to_device(5);

    // wait for the write request, confirm it, then watch the bank mirror
    for _ in 0..500 {
        if log
            .sent_messages()
            .iter()
            .any(|m| matches!(m, VtxMessage::ProgramWriteRequest { slot: 5 }))
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    frame_tx
        .send(VtxMessage::WriteCompleted { slot: 5 }.encode())
        .await
        .unwrap();

    for _ in 0..500 {
        let bank5 = handle
            .read_program_from_bank(BankKind::User, 5)
            .await
            .unwrap();
        if bank5.name == "Edit Buffer" {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("write confirmation never mirrored into the bank");
}

#[tokio::test]
async fn edits_without_a_session_never_reach_error_state() {
    let (handle, log, _frame_tx, events) = spawn_sync(None, test_config()).await;

    // no connect: the machine rests in Disconnected
    handle.set_parameter(SectionId::Amp, 0, 55);
    assert_eq!(
        handle
            .write_program_to_bank(2, named_program("Offline"))
            .await,
        Err(DataError::NoSession)
    );

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(handle.state().await, Some(SyncState::Disconnected));
    assert!(log.frames().is_empty(), "nothing may reach the wire");

    let current = handle.current_program().await.unwrap();
    assert_eq!(
        current.amp_values[0],
        Program::default().amp_values[0],
        "dropped edit must not diverge the model"
    );

    let events = events.lock().unwrap().clone();
    assert!(!events.contains(&StatusEvent::CommunicationFailure));
    assert!(!events.contains(&StatusEvent::StateChanged(SyncState::Error)));
}

#[tokio::test]
async fn local_programs_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let programs = dir.path().to_path_buf();

    let (handle, log, frame_tx, _events) =
        spawn_sync_in(None, test_config(), Some(programs.clone())).await;
    handle.connect();
    run_device(&log, &frame_tx, &handle, SyncState::Synced).await;

    assert_eq!(handle.cache_local_program("Lead", false).await, Ok(()));
    assert!(programs.join("Lead.json").exists());
    handle.shutdown();

    // a fresh synchronizer over the same directory sees the entry
    let (handle, _log, _frame_tx, _events) =
        spawn_sync_in(None, test_config(), Some(programs)).await;
    let store = handle.store_snapshot().await.unwrap();
    assert_eq!(store.local_names(), vec!["Lead".to_string()]);
    assert_eq!(store.local("Lead").unwrap().name, "Lead");
}

#[tokio::test]
async fn device_program_switch_swaps_in_the_bank_copy() {
    let (handle, log, frame_tx, _events) = spawn_sync(None, test_config()).await;
    handle.connect();
    run_device(&log, &frame_tx, &handle, SyncState::Synced).await;

    let requests_before = count_current_program_requests(&log);
    frame_tx
        .send(
            VtxMessage::ModeChange {
                mode: VoxMode::User,
                slot: 6,
            }
            .encode(),
        )
        .await
        .unwrap();

    let mut swapped = false;
    for _ in 0..500 {
        if handle.current_program().await.unwrap().name == "Slot 6" {
            swapped = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(swapped, "bank copy never became the edit buffer");
    assert_eq!(
        count_current_program_requests(&log),
        requests_before,
        "the known bank copy needs no round trip"
    );
}

#[tokio::test]
async fn manual_mode_switch_requests_the_edit_buffer() {
    let (handle, log, frame_tx, _events) = spawn_sync(None, test_config()).await;
    handle.connect();
    run_device(&log, &frame_tx, &handle, SyncState::Synced).await;

    let requests_before = count_current_program_requests(&log);
    frame_tx
        .send(
            VtxMessage::ModeChange {
                mode: VoxMode::Manual,
                slot: 0,
            }
            .encode(),
        )
        .await
        .unwrap();

    for _ in 0..500 {
        if count_current_program_requests(&log) > requests_before {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("manual mode switch never asked for the edit buffer");
}

fn count_current_program_requests(log: &PortLog) -> usize {
    log.sent_messages()
        .iter()
        .filter(|m| matches!(m, VtxMessage::CurrentProgramRequest))
        .count()
}

#[tokio::test]
async fn late_load_error_names_the_upload() {
    let (handle, log, frame_tx, events) = spawn_sync(None, test_config()).await;
    handle.connect();
    run_device(&log, &frame_tx, &handle, SyncState::Synced).await;

    // upload the edit buffer and let the device acknowledge it
    handle.set_current_program(named_program("Pushed"));
    for _ in 0..500 {
        if log
            .sent_messages()
            .iter()
            .any(|m| matches!(m, VtxMessage::CurrentProgramDump(_)))
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    frame_tx
        .send(VtxMessage::DataLoadCompleted.encode())
        .await
        .unwrap();

    // fire-and-forget traffic goes out after the acknowledgement
    handle.set_parameter(SectionId::Amp, 0, 40);
    for _ in 0..500 {
        if log
            .sent_messages()
            .iter()
            .any(|m| matches!(m, VtxMessage::ParameterChange { value: 40, .. }))
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    // the device reports the upload failure only now
    frame_tx
        .send(VtxMessage::DataLoadError.encode())
        .await
        .unwrap();

    for _ in 0..500 {
        let seen = events.lock().unwrap().clone();
        if let Some(StatusEvent::DataError { command }) = seen
            .iter()
            .find(|e| matches!(e, StatusEvent::DataError { .. }))
        {
            assert_eq!(command.as_str(), "current program dump");
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("upload failure never surfaced");
}
