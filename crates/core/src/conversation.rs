use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::domain::message::{Message, Role};
use crate::domain::slot::{SlotId, MAX_SAVED_SLOTS};
use crate::errors::DomainError;

pub const MAX_MEMORY: usize = 50;

#[derive(Debug, Default)]
struct ConversationState {
    slots: BTreeMap<SlotId, Vec<Message>>,
    current: Option<SlotId>,
    memory: VecDeque<Message>,
    memory_enabled: bool,
}

/// Process-wide conversational state: the rolling memory buffer plus the
/// saved chat slots and the pointer to the active one.
///
/// Memory and the active slot are two independent recording paths. A turn is
/// written to each path that is active, so the same exchange can live in both.
#[derive(Debug)]
pub struct ConversationStore {
    max_memory: usize,
    state: Mutex<ConversationState>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(MAX_MEMORY)
    }
}

impl ConversationStore {
    pub fn new(max_memory: usize) -> Self {
        Self { max_memory, state: Mutex::new(ConversationState::default()) }
    }

    /// Allocates the smallest free slot id and makes it current.
    pub fn start_slot(&self) -> Result<SlotId, DomainError> {
        let mut state = self.lock();
        if state.slots.len() >= MAX_SAVED_SLOTS {
            return Err(DomainError::CapacityExceeded { max: MAX_SAVED_SLOTS });
        }

        let slot = SlotId::all()
            .find(|candidate| !state.slots.contains_key(candidate))
            .ok_or(DomainError::CapacityExceeded { max: MAX_SAVED_SLOTS })?;
        state.slots.insert(slot, Vec::new());
        state.current = Some(slot);
        debug!(event_name = "conversation.slot_started", slot = slot.get(), "saved chat started");
        Ok(slot)
    }

    pub fn switch_slot(&self, slot: SlotId) -> Result<(), DomainError> {
        let mut state = self.lock();
        if !state.slots.contains_key(&slot) {
            return Err(DomainError::SlotNotFound(slot.get()));
        }
        state.current = Some(slot);
        Ok(())
    }

    pub fn close_current(&self) {
        self.lock().current = None;
    }

    pub fn clear_all_slots(&self) {
        let mut state = self.lock();
        state.slots.clear();
        state.current = None;
    }

    pub fn current_slot(&self) -> Option<SlotId> {
        self.lock().current
    }

    /// Live slots in id order with their message counts.
    pub fn slot_summaries(&self) -> Vec<(SlotId, usize)> {
        self.lock().slots.iter().map(|(slot, messages)| (*slot, messages.len())).collect()
    }

    pub fn set_memory_enabled(&self, enabled: bool) {
        self.lock().memory_enabled = enabled;
    }

    pub fn memory_enabled(&self) -> bool {
        self.lock().memory_enabled
    }

    pub fn clear_memory(&self) {
        self.lock().memory.clear();
    }

    pub fn memory(&self) -> Vec<Message> {
        self.lock().memory.iter().cloned().collect()
    }

    pub fn append_user(&self, text: &str) {
        self.append(Message::user(text));
    }

    pub fn append_assistant(&self, text: &str) {
        self.append(Message::assistant(text));
    }

    /// Records a user/assistant exchange under a single lock acquisition so a
    /// concurrent dispatch cannot interleave between the two turns.
    pub fn record_exchange(&self, prompt: &str, response: &str) {
        let mut state = self.lock();
        self.push(&mut state, Message::user(prompt));
        self.push(&mut state, Message::assistant(response));
    }

    /// Memory tail (only while memory is enabled) followed by the current
    /// slot, deduplicated on exact `(role, text)` in first-seen order, then
    /// the new user prompt.
    ///
    /// A history entry identical to the new prompt is dropped so the prompt
    /// always closes the list.
    pub fn build_context(&self, new_prompt: &str) -> Vec<Message> {
        let state = self.lock();
        let prompt = Message::user(new_prompt);

        let recalled = if state.memory_enabled { state.memory.len() } else { 0 };
        let skip = state.memory.len().saturating_sub(self.max_memory.min(recalled));
        let memory = state.memory.iter().skip(skip);
        let slot = state
            .current
            .and_then(|current| state.slots.get(&current))
            .map(|messages| messages.as_slice())
            .unwrap_or_default();

        let mut seen: HashSet<(Role, &str)> = HashSet::new();
        seen.insert((prompt.role(), prompt.text()));

        let mut context = Vec::with_capacity(state.memory.len() + slot.len() + 1);
        for message in memory.chain(slot.iter()) {
            if seen.insert((message.role(), message.text())) {
                context.push(message.clone());
            }
        }
        context.push(prompt.clone());
        context
    }

    /// Restores the per-session switches: no active slot, memory off.
    /// Stored slot and memory contents survive.
    pub fn soft_reset(&self) {
        let mut state = self.lock();
        state.current = None;
        state.memory_enabled = false;
    }

    pub fn hard_reset(&self) {
        let mut state = self.lock();
        *state = ConversationState::default();
    }

    fn append(&self, message: Message) {
        let mut state = self.lock();
        self.push(&mut state, message);
    }

    fn push(&self, state: &mut ConversationState, message: Message) {
        if let Some(current) = state.current {
            if let Some(messages) = state.slots.get_mut(&current) {
                messages.push(message.clone());
            }
        }

        if state.memory_enabled {
            state.memory.push_back(message);
            while state.memory.len() > self.max_memory {
                state.memory.pop_front();
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConversationState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{ConversationStore, MAX_MEMORY};
    use crate::domain::message::Message;
    use crate::domain::slot::SlotId;
    use crate::errors::DomainError;

    fn slot(value: u8) -> SlotId {
        SlotId::new(value).expect("valid slot id")
    }

    #[test]
    fn start_slot_allocates_sequential_ids_and_selects_them() {
        let store = ConversationStore::default();
        assert_eq!(store.start_slot(), Ok(slot(1)));
        assert_eq!(store.start_slot(), Ok(slot(2)));
        assert_eq!(store.current_slot(), Some(slot(2)));
    }

    #[test]
    fn sixth_slot_is_rejected_without_creating_anything() {
        let store = ConversationStore::default();
        for _ in 0..5 {
            store.start_slot().expect("slot below capacity");
        }
        store.switch_slot(slot(2)).expect("slot 2 exists");

        assert_eq!(store.start_slot(), Err(DomainError::CapacityExceeded { max: 5 }));
        assert_eq!(store.slot_summaries().len(), 5);
        assert_eq!(store.current_slot(), Some(slot(2)));
    }

    #[test]
    fn switching_to_missing_slot_changes_nothing() {
        let store = ConversationStore::default();
        store.start_slot().expect("first slot");
        assert_eq!(store.switch_slot(slot(4)), Err(DomainError::SlotNotFound(4)));
        assert_eq!(store.current_slot(), Some(slot(1)));
    }

    #[test]
    fn close_current_keeps_slot_content() {
        let store = ConversationStore::default();
        let id = store.start_slot().expect("slot");
        store.append_user("kept");
        store.close_current();

        assert_eq!(store.current_slot(), None);
        assert_eq!(store.slot_summaries(), vec![(id, 1)]);

        store.switch_slot(id).expect("slot still live");
        assert_eq!(store.build_context("next"), vec![Message::user("kept"), Message::user("next")]);
    }

    #[test]
    fn clear_all_slots_drops_content_and_pointer() {
        let store = ConversationStore::default();
        store.start_slot().expect("slot");
        store.append_user("gone");
        store.clear_all_slots();

        assert!(store.slot_summaries().is_empty());
        assert_eq!(store.current_slot(), None);
        assert_eq!(store.start_slot(), Ok(slot(1)));
    }

    #[test]
    fn memory_is_bounded_and_evicts_oldest_first() {
        let store = ConversationStore::default();
        store.set_memory_enabled(true);
        for index in 0..(MAX_MEMORY + 7) {
            store.append_user(&format!("m{index}"));
            assert!(store.memory().len() <= MAX_MEMORY);
        }

        let memory = store.memory();
        assert_eq!(memory.len(), MAX_MEMORY);
        assert_eq!(memory.first(), Some(&Message::user("m7")));
        assert_eq!(memory.last(), Some(&Message::user(format!("m{}", MAX_MEMORY + 6))));
    }

    #[test]
    fn disabled_memory_records_nothing() {
        let store = ConversationStore::default();
        store.append_user("ignored");
        assert!(store.memory().is_empty());
    }

    #[test]
    fn appends_go_to_both_memory_and_active_slot() {
        let store = ConversationStore::default();
        store.set_memory_enabled(true);
        let id = store.start_slot().expect("slot");
        store.record_exchange("q", "a");

        assert_eq!(store.memory(), vec![Message::user("q"), Message::assistant("a")]);
        assert_eq!(store.slot_summaries(), vec![(id, 2)]);
    }

    #[test]
    fn single_appends_record_into_slot_and_memory_independently() {
        let store = ConversationStore::default();
        let id = store.start_slot().expect("slot");
        store.append_user("slot only");
        store.set_memory_enabled(true);
        store.append_assistant("both");

        assert_eq!(store.memory(), vec![Message::assistant("both")]);
        assert_eq!(store.slot_summaries(), vec![(id, 2)]);

        store.close_current();
        store.append_assistant("memory only");
        assert_eq!(
            store.memory(),
            vec![Message::assistant("both"), Message::assistant("memory only")]
        );
        assert_eq!(store.slot_summaries(), vec![(id, 2)]);

        store.switch_slot(id).expect("slot still live");
        store.set_memory_enabled(false);
        assert_eq!(
            store.build_context("next"),
            vec![Message::user("slot only"), Message::assistant("both"), Message::user("next")]
        );
    }

    #[test]
    fn context_without_memory_or_slot_is_just_the_prompt() {
        let store = ConversationStore::default();
        assert_eq!(store.build_context("hello"), vec![Message::user("hello")]);
    }

    #[test]
    fn context_deduplicates_overlap_between_memory_and_slot() {
        let store = ConversationStore::default();
        store.set_memory_enabled(true);
        store.append_user("before slot");
        store.start_slot().expect("slot");
        store.record_exchange("A", "B");

        let context = store.build_context("C");
        assert_eq!(
            context,
            vec![
                Message::user("before slot"),
                Message::user("A"),
                Message::assistant("B"),
                Message::user("C"),
            ]
        );

        let unique: HashSet<_> = context.iter().collect();
        assert_eq!(unique.len(), context.len());
    }

    #[test]
    fn repeated_prompt_moves_to_the_end_once() {
        let store = ConversationStore::default();
        store.set_memory_enabled(true);
        store.record_exchange("ping", "pong");

        assert_eq!(
            store.build_context("ping"),
            vec![Message::assistant("pong"), Message::user("ping")]
        );
    }

    #[test]
    fn same_text_with_different_roles_is_not_a_duplicate() {
        let store = ConversationStore::default();
        store.set_memory_enabled(true);
        store.record_exchange("echo", "echo");

        assert_eq!(
            store.build_context("next"),
            vec![Message::user("echo"), Message::assistant("echo"), Message::user("next")]
        );
    }

    #[test]
    fn soft_reset_keeps_contents_but_clears_switches() {
        let store = ConversationStore::default();
        store.set_memory_enabled(true);
        store.start_slot().expect("slot");
        store.append_user("kept");
        store.soft_reset();

        assert_eq!(store.current_slot(), None);
        assert!(!store.memory_enabled());
        assert_eq!(store.memory().len(), 1);
        assert_eq!(store.slot_summaries().len(), 1);
    }

    #[test]
    fn hard_reset_drops_everything() {
        let store = ConversationStore::default();
        store.set_memory_enabled(true);
        store.start_slot().expect("slot");
        store.append_user("gone");
        store.hard_reset();

        assert!(store.memory().is_empty());
        assert!(store.slot_summaries().is_empty());
        assert!(!store.memory_enabled());
    }
}
