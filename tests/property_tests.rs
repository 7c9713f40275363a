//! Property tests for the state file.

use std::fs;

use proptest::prelude::*;
use relay_tui::relay_types::PersistedSnapshot;
use relay_tui::relay_types::RelayId;
use relay_tui::state_store::SnapshotStore;
use relay_tui::state_store::StateStore;
use tempfile::TempDir;

fn arb_snapshot() -> impl Strategy<Value = PersistedSnapshot> {
    any::<[bool; 4]>().prop_map(PersistedSnapshot::new)
}

proptest! {
    #[test]
    fn saved_snapshot_loads_back(snapshot in arb_snapshot()) {
        let dir = TempDir::new().unwrap();
        let mut store = StateStore::new(dir.path().join("relay_state.json"));
        store.save(&snapshot).unwrap();

        let loaded = store.load();
        prop_assert_eq!(loaded.snapshot, snapshot);
        prop_assert!(loaded.recovery.is_none());
    }

    #[test]
    fn garbage_loads_as_all_off(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("relay_state.json"));
        fs::write(store.path(), &data).unwrap();

        let loaded = store.load();
        // a random blob can only decode if it happens to be a valid file
        if loaded.recovery.is_some() {
            prop_assert_eq!(loaded.snapshot, PersistedSnapshot::all_off());
        }
    }

    #[test]
    fn partial_files_load_as_all_off(snapshot in arb_snapshot(), keep in 0usize..4) {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("relay_state.json"));
        let entries: Vec<String> = (1..=keep)
            .map(|n| format!("\"{}\": {}", n, snapshot.get(RelayId::ALL[n - 1])))
            .collect();
        fs::write(store.path(), format!("{{{}}}", entries.join(", "))).unwrap();

        let loaded = store.load();
        prop_assert!(loaded.recovery.is_some());
        prop_assert_eq!(loaded.snapshot, PersistedSnapshot::all_off());
    }
}
