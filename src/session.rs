use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::models::ReportShape;

pub type ChatId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModeSelection {
    pub shape: ReportShape,
    pub selected_at: DateTime<Utc>,
}

/// Report mode chosen per conversation. Entries live until replaced or
/// cleared; conversations never see each other's entries.
#[derive(Debug, Default)]
pub struct ModeStore {
    modes: Mutex<HashMap<ChatId, ModeSelection>>,
}

impl ModeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ChatId, ModeSelection>> {
        // A panic while holding the guard cannot leave the map half-written.
        self.modes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set(&self, chat_id: ChatId, shape: ReportShape) -> ModeSelection {
        let selection = ModeSelection {
            shape,
            selected_at: Utc::now(),
        };
        self.lock().insert(chat_id, selection);
        info!(chat_id, mode = %shape, "report mode selected");
        selection
    }

    pub fn current(&self, chat_id: ChatId) -> Option<ReportShape> {
        self.lock().get(&chat_id).map(|selection| selection.shape)
    }

    pub fn selection(&self, chat_id: ChatId) -> Option<ModeSelection> {
        self.lock().get(&chat_id).copied()
    }

    pub fn clear(&self, chat_id: ChatId) -> Option<ReportShape> {
        self.lock().remove(&chat_id).map(|selection| selection.shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn read_after_write_in_one_conversation() {
        let store = ModeStore::new();
        assert_eq!(store.current(7), None);
        store.set(7, ReportShape::Attendance);
        assert_eq!(store.current(7), Some(ReportShape::Attendance));
        store.set(7, ReportShape::Schedule);
        assert_eq!(store.current(7), Some(ReportShape::Schedule));
        assert_eq!(store.clear(7), Some(ReportShape::Schedule));
        assert_eq!(store.current(7), None);
    }

    #[test]
    fn selection_records_when_it_was_made() {
        let store = ModeStore::new();
        let before = Utc::now();
        store.set(1, ReportShape::Students);
        let selection = store.selection(1).unwrap();
        assert_eq!(selection.shape, ReportShape::Students);
        assert!(selection.selected_at >= before);
    }

    #[test]
    fn conversations_are_independent_under_contention() {
        let store = Arc::new(ModeStore::new());
        let handles: Vec<_> = (0..8)
            .map(|chat_id| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let shape = ReportShape::ALL[chat_id as usize % ReportShape::ALL.len()];
                    for _ in 0..100 {
                        store.set(chat_id, shape);
                        assert_eq!(store.current(chat_id), Some(shape));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        for chat_id in 0..8i64 {
            let expected = ReportShape::ALL[chat_id as usize % ReportShape::ALL.len()];
            assert_eq!(store.current(chat_id), Some(expected));
        }
    }
}
