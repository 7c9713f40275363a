use log::error;
use log::info;
use log::warn;
use thiserror::Error;

use crate::hardware_line::HardwareFault;
use crate::hardware_line::RelayOutputs;
use crate::relay_types::HardwareBinding;
use crate::relay_types::PersistedSnapshot;
use crate::relay_types::RelayId;
use crate::relay_types::RelayState;
use crate::state_store::LoadedSnapshot;
use crate::state_store::PersistenceWriteFailure;
use crate::state_store::RecoveryEvent;
use crate::state_store::SnapshotStore;
use crate::state_store::StateStore;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EngineStatus {
    Ready,
    /// At least one relay is faulted, the others stay controllable.
    Degraded,
}

#[derive(Debug, Error)]
pub enum ToggleError {
    /// Nothing changed, neither on disk, in memory nor on the line.
    #[error(transparent)]
    Persistence(#[from] PersistenceWriteFailure),

    /// The new state is recorded but the line could not be driven.
    #[error(transparent)]
    Hardware(#[from] HardwareFault),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayView {
    pub id: RelayId,
    pub line: u32,
    pub logical_on: bool,
    pub fault: Option<HardwareFault>,
}

impl RelayView {
    pub fn is_available(&self) -> bool {
        self.fault.is_none()
    }
}

/// The single authority over relay state.
///
/// Every change is saved as a complete snapshot before the line is driven. A
/// crash between both steps therefore leaves the requested state on disk and
/// the next start drives the lines to it.
pub struct RelayEngine<S: SnapshotStore = StateStore> {
    store: S,
    outputs: RelayOutputs,
    relays: [RelayState; 4],
    faults: [Option<HardwareFault>; 4],
    recovery: Option<RecoveryEvent>,
}

impl<S: SnapshotStore> RelayEngine<S> {
    /// Loads the last recorded state and drives every line to it. Relays whose
    /// line fails are marked faulted instead of aborting the start.
    pub fn start(store: S, outputs: RelayOutputs) -> RelayEngine<S> {
        info!("Initializing relay engine");
        let LoadedSnapshot { snapshot, recovery } = store.load();

        let mut engine = RelayEngine {
            store,
            outputs,
            relays: RelayId::ALL.map(|id| RelayState {
                id,
                logical_on: snapshot.get(id),
            }),
            faults: Default::default(),
            recovery,
        };

        for id in RelayId::ALL {
            let _ = engine.actuate(id);
        }

        match engine.status() {
            EngineStatus::Ready => info!("Relay engine ready: {:?}", engine.snapshot()),
            EngineStatus::Degraded => warn!(
                "Relay engine degraded, faulted relays: {:?}",
                engine.faulted().collect::<Vec<_>>()
            ),
        }
        engine
    }

    pub fn toggle(&mut self, id: RelayId) -> Result<bool, ToggleError> {
        let logical_on = !self.is_on(id);
        self.set(id, logical_on)
    }

    /// Records `logical_on` for `id` and drives the line. Setting the current
    /// state again re-drives the line, which clears a fault once it is gone.
    pub fn set(&mut self, id: RelayId, logical_on: bool) -> Result<bool, ToggleError> {
        let next = self.snapshot().with(id, logical_on);
        if let Err(e) = self.store.save(&next) {
            error!(
                "Rejected switching relay '{}' {}: {}",
                id,
                on_off(logical_on),
                e
            );
            return Err(e.into());
        }

        self.relays[id.index()].logical_on = logical_on;
        self.actuate(id)?;
        Ok(logical_on)
    }

    fn actuate(&mut self, id: RelayId) -> Result<(), HardwareFault> {
        let logical_on = self.is_on(id);
        match self.outputs.apply(id, logical_on) {
            Ok(level) => {
                if let Some(fault) = self.faults[id.index()].take() {
                    info!("Relay '{}' recovered from: {}", id, fault);
                }
                info!(
                    "Set relay '{}' to '{}' (GPIO {} '{:?}')",
                    id,
                    on_off(logical_on),
                    self.binding(id).line,
                    level
                );
                Ok(())
            }
            Err(fault) => {
                error!("{}", fault);
                self.faults[id.index()] = Some(fault.clone());
                Err(fault)
            }
        }
    }

    pub fn is_on(&self, id: RelayId) -> bool {
        self.relays[id.index()].logical_on
    }

    pub fn fault(&self, id: RelayId) -> Option<&HardwareFault> {
        self.faults[id.index()].as_ref()
    }

    fn faulted(&self) -> impl Iterator<Item = RelayId> + '_ {
        RelayId::ALL
            .into_iter()
            .filter(move |id| self.faults[id.index()].is_some())
    }

    pub fn status(&self) -> EngineStatus {
        match self.faulted().next() {
            Some(_) => EngineStatus::Degraded,
            None => EngineStatus::Ready,
        }
    }

    pub fn snapshot(&self) -> PersistedSnapshot {
        let mut snapshot = PersistedSnapshot::all_off();
        for relay in &self.relays {
            snapshot.set(relay.id, relay.logical_on);
        }
        snapshot
    }

    pub fn binding(&self, id: RelayId) -> &HardwareBinding {
        self.outputs.binding(id)
    }

    /// Why startup fell back to all relays off, if it did.
    pub fn recovery(&self) -> Option<&RecoveryEvent> {
        self.recovery.as_ref()
    }

    pub fn views(&self) -> [RelayView; 4] {
        RelayId::ALL.map(|id| RelayView {
            id,
            line: self.binding(id).line,
            logical_on: self.is_on(id),
            fault: self.fault(id).cloned(),
        })
    }
}

fn on_off(logical_on: bool) -> &'static str {
    match logical_on {
        true => "On",
        false => "Off",
    }
}
