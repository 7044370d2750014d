use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pengpt_agent::runtime::AgentRuntime;
use pengpt_core::domain::slot::SlotId;
use tracing::info;

use crate::replies;

/// Every control token the bot understands. A message that parses to one of
/// these is acknowledged and never dispatched to the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatCommand {
    Help,
    PingOnly(bool),
    SoftReset,
    HardReset,
    SwitchTier { tier: Option<String> },
    CurrentTier,
    StartSlot,
    SwitchSlot(SlotId),
    CloseSlot,
    ViewSlots,
    ClearSlots,
    Memory(bool),
    ViewMemory,
    ClearMemory,
}

impl ChatCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::PingOnly(true) => "ping_only_on",
            Self::PingOnly(false) => "ping_only_off",
            Self::SoftReset => "soft_reset",
            Self::HardReset => "hard_reset",
            Self::SwitchTier { .. } => "switch_tier",
            Self::CurrentTier => "current_tier",
            Self::StartSlot => "start_slot",
            Self::SwitchSlot(_) => "switch_slot",
            Self::CloseSlot => "close_slot",
            Self::ViewSlots => "view_slots",
            Self::ClearSlots => "clear_slots",
            Self::Memory(true) => "memory_on",
            Self::Memory(false) => "memory_off",
            Self::ViewMemory => "view_memory",
            Self::ClearMemory => "clear_memory",
        }
    }
}

/// Parses the whole trimmed message as a command token. Anything else,
/// including unknown slash words and `/sc6`, is a normal prompt.
pub fn parse_command(text: &str) -> Option<ChatCommand> {
    let trimmed = text.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut parts = trimmed.split_whitespace();
    let verb = parts.next()?;
    let args = parts.collect::<Vec<_>>();

    if verb == "/cha-llm" {
        let tier = match args.as_slice() {
            [tier] => Some((*tier).to_owned()),
            _ => None,
        };
        return Some(ChatCommand::SwitchTier { tier });
    }
    if !args.is_empty() {
        return None;
    }

    let command = match verb {
        "/help" => ChatCommand::Help,
        "/pa" => ChatCommand::PingOnly(true),
        "/pd" => ChatCommand::PingOnly(false),
        "/ds" => ChatCommand::SoftReset,
        "/dsh" => ChatCommand::HardReset,
        "/cur-llm" => ChatCommand::CurrentTier,
        "/sc" => ChatCommand::StartSlot,
        "/sco" => ChatCommand::CloseSlot,
        "/vsc" => ChatCommand::ViewSlots,
        "/csc" => ChatCommand::ClearSlots,
        "/sm" => ChatCommand::Memory(true),
        "/smo" => ChatCommand::Memory(false),
        "/vsm" => ChatCommand::ViewMemory,
        "/csm" => ChatCommand::ClearMemory,
        other => return parse_slot_switch(other),
    };
    Some(command)
}

fn parse_slot_switch(verb: &str) -> Option<ChatCommand> {
    let digits = verb.strip_prefix("/sc")?;
    if digits.len() != 1 {
        return None;
    }
    let value = digits.parse::<u8>().ok()?;
    SlotId::new(value).ok().map(ChatCommand::SwitchSlot)
}

/// Applies commands to the shared runtime state and renders the single
/// acknowledgement each one produces.
#[derive(Clone)]
pub struct CommandRouter {
    runtime: Arc<AgentRuntime>,
    ping_only: Arc<AtomicBool>,
}

impl CommandRouter {
    pub fn new(runtime: Arc<AgentRuntime>, ping_only: Arc<AtomicBool>) -> Self {
        Self { runtime, ping_only }
    }

    pub fn ping_only(&self) -> bool {
        self.ping_only.load(Ordering::SeqCst)
    }

    pub fn route(&self, command: &ChatCommand, now: DateTime<Utc>) -> String {
        let store = self.runtime.store();
        let scheduler = self.runtime.scheduler();

        let reply = match command {
            ChatCommand::Help => replies::help_message(),
            ChatCommand::PingOnly(enabled) => {
                self.ping_only.store(*enabled, Ordering::SeqCst);
                if *enabled {
                    replies::PING_ONLY_ON.to_owned()
                } else {
                    replies::PING_ONLY_OFF.to_owned()
                }
            }
            ChatCommand::SoftReset => {
                self.ping_only.store(true, Ordering::SeqCst);
                store.soft_reset();
                scheduler.reset_tier();
                replies::SETTINGS_RESET.to_owned()
            }
            ChatCommand::HardReset => {
                self.ping_only.store(true, Ordering::SeqCst);
                store.hard_reset();
                self.runtime.gate().clear();
                scheduler.reset();
                replies::HARD_RESET.to_owned()
            }
            ChatCommand::SwitchTier { tier: Some(tier) } => match scheduler.switch_tier(tier) {
                Ok(()) => replies::tier_switched(tier),
                Err(_) => replies::tier_usage(&scheduler.tier_names()),
            },
            ChatCommand::SwitchTier { tier: None } => replies::tier_usage(&scheduler.tier_names()),
            ChatCommand::CurrentTier => replies::scheduler_status(&scheduler.snapshot(now), now),
            ChatCommand::StartSlot => match store.start_slot() {
                Ok(slot) => replies::chat_started(slot),
                Err(error) => error.user_message(),
            },
            ChatCommand::SwitchSlot(slot) => match store.switch_slot(*slot) {
                Ok(()) => replies::chat_switched(*slot),
                Err(error) => error.user_message(),
            },
            ChatCommand::CloseSlot => {
                store.close_current();
                replies::CHAT_CLOSED.to_owned()
            }
            ChatCommand::ViewSlots => replies::slot_summary(&store.slot_summaries()),
            ChatCommand::ClearSlots => {
                store.clear_all_slots();
                replies::CHATS_CLEARED.to_owned()
            }
            ChatCommand::Memory(enabled) => {
                store.set_memory_enabled(*enabled);
                if *enabled {
                    replies::MEMORY_ON.to_owned()
                } else {
                    replies::MEMORY_OFF.to_owned()
                }
            }
            ChatCommand::ViewMemory => replies::memory_listing(&store.memory()),
            ChatCommand::ClearMemory => {
                store.clear_memory();
                replies::MEMORY_CLEARED.to_owned()
            }
        };

        info!(event_name = "chat.command.applied", command = command.name(), "command applied");
        reply
    }
}
