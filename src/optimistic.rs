//! The displayed history and the local transactions applied to it.

use crate::models::Entry;
use serde::Serialize;
use uuid::Uuid;

/// Entries as shown to the user, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct History {
    entries: Vec<Entry>,
}

impl History {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_tins(&self) -> u64 {
        self.entries
            .iter()
            .map(|entry| u64::from(entry.tins.get()))
            .sum()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }
}

#[derive(Debug, Clone)]
pub enum HistoryAction {
    Prepend(Entry),
    Remove(Uuid),
    Replace(Vec<Entry>),
}

/// Applies `action` without touching `state`. Returns the state to display
/// and the snapshot to restore if the backend later refuses the change.
pub fn apply_optimistic(state: &History, action: HistoryAction) -> (History, History) {
    let rollback = state.clone();
    let next = match action {
        HistoryAction::Prepend(entry) => {
            let mut entries = Vec::with_capacity(state.len() + 1);
            entries.push(entry);
            entries.extend(state.entries.iter().cloned());
            History { entries }
        }
        HistoryAction::Remove(id) => History {
            entries: state
                .entries
                .iter()
                .filter(|entry| entry.id != id)
                .cloned()
                .collect(),
        },
        HistoryAction::Replace(entries) => History { entries },
    };
    (next, rollback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tins;
    use chrono::{NaiveDate, Utc};

    fn entry(tins: u8, day: u32) -> Entry {
        Entry {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            tins: Tins::new(tins).unwrap(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn prepend_puts_new_entry_on_top() {
        let first = entry(3, 1);
        let second = entry(2, 2);
        let (state, _) = apply_optimistic(&History::default(), HistoryAction::Prepend(first.clone()));
        let (state, rollback) = apply_optimistic(&state, HistoryAction::Prepend(second.clone()));

        assert_eq!(state.entries(), &[second, first.clone()]);
        assert_eq!(state.total_tins(), 5);
        assert_eq!(rollback.entries(), &[first]);
    }

    #[test]
    fn remove_returns_snapshot_for_rollback() {
        let kept = entry(1, 1);
        let dropped = entry(4, 2);
        let before = History::new(vec![dropped.clone(), kept.clone()]);

        let (after, rollback) = apply_optimistic(&before, HistoryAction::Remove(dropped.id));
        assert!(!after.contains(dropped.id));
        assert_eq!(after.total_tins(), 1);
        assert_eq!(rollback, before);
        assert_eq!(rollback.total_tins(), 5);
    }

    #[test]
    fn removing_unknown_id_changes_nothing() {
        let before = History::new(vec![entry(2, 1)]);
        let (after, _) = apply_optimistic(&before, HistoryAction::Remove(Uuid::new_v4()));
        assert_eq!(after, before);
    }

    #[test]
    fn replace_is_a_full_swap() {
        let before = History::new(vec![entry(2, 1), entry(5, 2)]);
        let fresh = vec![entry(1, 3)];
        let (after, rollback) = apply_optimistic(&before, HistoryAction::Replace(fresh.clone()));
        assert_eq!(after.entries(), fresh.as_slice());
        assert_eq!(rollback, before);
    }
}
