//! End-to-end behaviour of the relay engine against a real state file and
//! simulated output lines.

use std::fs;
use std::time::Duration;

use relay_tui::config::BindingTable;
use relay_tui::hardware_line::FaultKind;
use relay_tui::hardware_line::RelayOutputs;
use relay_tui::relay_engine::EngineStatus;
use relay_tui::relay_engine::RelayEngine;
use relay_tui::relay_engine::ToggleError;
use relay_tui::relay_types::PersistedSnapshot;
use relay_tui::relay_types::PinValue;
use relay_tui::relay_types::RelayId;
use relay_tui::simulated_line::SimulatedLine;
use relay_tui::state_store::SnapshotStore;
use relay_tui::state_store::StateStore;
use tempfile::TempDir;

struct Rig {
    dir: TempDir,
    lines: [SimulatedLine; 4],
}

impl Rig {
    fn new() -> Rig {
        Rig {
            dir: TempDir::new().unwrap(),
            lines: Default::default(),
        }
    }

    fn store(&self) -> StateStore {
        StateStore::new(self.dir.path().join("relay_state.json"))
    }

    fn line(&self, id: RelayId) -> &SimulatedLine {
        &self.lines[id.index()]
    }

    fn start(&self) -> RelayEngine {
        let lines = self.lines.clone();
        let outputs = RelayOutputs::new(
            &BindingTable::default(),
            Duration::from_millis(200),
            move |binding| Box::new(lines[binding.id.index()].clone()),
        )
        .unwrap();
        RelayEngine::start(self.store(), outputs)
    }
}

#[test]
fn toggle_twice_returns_to_off() {
    let rig = Rig::new();
    let mut engine = rig.start();
    assert!(!engine.is_on(RelayId::Relay2));

    assert_eq!(engine.toggle(RelayId::Relay2).unwrap(), true);
    assert!(engine.is_on(RelayId::Relay2));
    assert!(rig.store().load().snapshot.get(RelayId::Relay2));
    assert_eq!(rig.line(RelayId::Relay2).level(), Some(PinValue::Low));

    assert_eq!(engine.toggle(RelayId::Relay2).unwrap(), false);
    assert!(!engine.is_on(RelayId::Relay2));
    assert!(!rig.store().load().snapshot.get(RelayId::Relay2));
    assert_eq!(rig.line(RelayId::Relay2).level(), Some(PinValue::High));
}

#[test]
fn state_is_saved_before_the_line_is_driven() {
    let rig = Rig::new();
    let mut engine = rig.start();
    rig.line(RelayId::Relay1).fail_with(FaultKind::Io);

    let err = engine.toggle(RelayId::Relay1).unwrap_err();
    assert!(matches!(err, ToggleError::Hardware(ref fault) if fault.id == RelayId::Relay1));

    // the decision stands, on disk and in memory
    assert!(rig.store().load().snapshot.get(RelayId::Relay1));
    assert!(engine.is_on(RelayId::Relay1));
    assert!(engine.fault(RelayId::Relay1).is_some());
    assert_eq!(engine.status(), EngineStatus::Degraded);
}

#[test]
fn startup_drives_lines_to_recorded_state() {
    let rig = Rig::new();
    rig.store()
        .save(&PersistedSnapshot::all_off().with(RelayId::Relay3, true))
        .unwrap();

    let engine = rig.start();

    assert!(engine.recovery().is_none());
    assert_eq!(rig.line(RelayId::Relay3).driven(), vec![PinValue::Low]);
    assert_eq!(rig.line(RelayId::Relay1).driven(), vec![PinValue::High]);
    assert_eq!(engine.status(), EngineStatus::Ready);
}

#[test]
fn faulted_relay_does_not_block_the_others() {
    let rig = Rig::new();
    rig.line(RelayId::Relay4).fail_with(FaultKind::Busy);
    let mut engine = rig.start();

    assert_eq!(engine.status(), EngineStatus::Degraded);
    assert!(!engine.views()[RelayId::Relay4.index()].is_available());

    assert_eq!(engine.toggle(RelayId::Relay1).unwrap(), true);
    assert_eq!(rig.line(RelayId::Relay1).level(), Some(PinValue::Low));
    assert_eq!(engine.fault(RelayId::Relay4).unwrap().kind(), FaultKind::Busy);
}

#[test]
fn faulted_relay_recovers_on_successful_toggle() {
    let rig = Rig::new();
    rig.line(RelayId::Relay4).fail_with(FaultKind::NotPresent);
    let mut engine = rig.start();

    rig.line(RelayId::Relay4).recover();
    engine.toggle(RelayId::Relay4).unwrap();

    assert!(engine.fault(RelayId::Relay4).is_none());
    assert_eq!(engine.status(), EngineStatus::Ready);
}

#[test]
fn stalled_line_is_a_timeout_fault() {
    let rig = Rig::new();
    let mut engine = rig.start();
    rig.line(RelayId::Relay2).stall_for(Duration::from_secs(2));

    let err = engine.toggle(RelayId::Relay2).unwrap_err();
    match err {
        ToggleError::Hardware(fault) => assert_eq!(fault.kind(), FaultKind::Timeout),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(engine.is_on(RelayId::Relay2));
}

#[test]
fn failed_save_rejects_the_toggle() {
    let rig = Rig::new();
    let nested = rig.dir.path().join("state");
    fs::create_dir(&nested).unwrap();
    let lines = rig.lines.clone();
    let outputs = RelayOutputs::new(
        &BindingTable::default(),
        Duration::from_millis(200),
        move |binding| Box::new(lines[binding.id.index()].clone()),
    )
    .unwrap();
    let store = StateStore::new(nested.join("relay_state.json"));
    let mut engine = RelayEngine::start(store, outputs);
    fs::remove_dir(&nested).unwrap();

    let err = engine.toggle(RelayId::Relay1).unwrap_err();
    assert!(matches!(err, ToggleError::Persistence(_)));
    assert!(!engine.is_on(RelayId::Relay1));
    assert_eq!(rig.line(RelayId::Relay1).driven(), vec![PinValue::High]);
}

#[test]
fn restart_restores_toggled_state() {
    let rig = Rig::new();
    {
        let mut engine = rig.start();
        engine.toggle(RelayId::Relay1).unwrap();
        engine.toggle(RelayId::Relay4).unwrap();
    }

    let engine = rig.start();
    assert_eq!(
        engine.snapshot(),
        PersistedSnapshot::new([true, false, false, true])
    );
    assert_eq!(rig.line(RelayId::Relay4).level(), Some(PinValue::Low));
}

#[test]
fn corrupt_state_file_starts_all_off() {
    let rig = Rig::new();
    fs::write(rig.store().path(), b"not json at all").unwrap();

    let engine = rig.start();
    assert!(engine.recovery().is_some());
    assert_eq!(engine.snapshot(), PersistedSnapshot::all_off());
    for id in RelayId::ALL {
        assert_eq!(rig.line(id).level(), Some(PinValue::High));
    }
}
