use chrono::{DateTime, Utc};
use pengpt_core::domain::message::Message;
use pengpt_core::domain::slot::SlotId;
use pengpt_core::rotation::SchedulerSnapshot;

pub const THINKING_PLACEHOLDER: &str = "🤖 Thinking...";
pub const PING_ONLY_ON: &str = "✅ Ping-only mode ON.";
pub const PING_ONLY_OFF: &str = "❌ Ping-only mode OFF.";
pub const SETTINGS_RESET: &str = "🔁 Settings reset.";
pub const HARD_RESET: &str = "♻️ Everything reset: chats, memory, cooldowns, and models.";
pub const CHAT_CLOSED: &str = "📂 Closed chat";
pub const CHATS_CLEARED: &str = "🧹 Chats cleared";
pub const MEMORY_ON: &str = "🧠 Memory ON";
pub const MEMORY_OFF: &str = "🧠 Memory OFF";
pub const MEMORY_CLEARED: &str = "🧹 Memory cleared";
pub const NO_CHATS: &str = "No chats saved";
pub const NO_MEMORY: &str = "No memory saved";

pub fn help_message() -> String {
    [
        "**PenGPT Commands**:",
        "`/help` Show this help menu",
        "`/pa` Ping-only ON | `/pd` Ping-only OFF",
        "`/ds` Reset settings | `/dsh` Reset everything",
        "`/sc` Start saved chat | `/sco` Close chat | `/sc1`-`/sc5` Switch chat",
        "`/vsc` View chats | `/csc` Clear chats",
        "`/sm` Save memory ON | `/smo` OFF | `/vsm` View | `/csm` Clear",
        "`/cur-llm` Current model | `/cha-llm <tier>` to change",
    ]
    .join("\n")
}

pub fn chat_started(slot: SlotId) -> String {
    format!("💾 Started chat {slot}")
}

pub fn chat_switched(slot: SlotId) -> String {
    format!("🚀 Switched to chat {slot}")
}

pub fn slot_summary(slots: &[(SlotId, usize)]) -> String {
    if slots.is_empty() {
        return NO_CHATS.to_string();
    }
    slots.iter().map(|(slot, count)| format!("{slot}: {count} msgs")).collect::<Vec<_>>().join("\n")
}

pub fn memory_listing(memory: &[Message]) -> String {
    if memory.is_empty() {
        return NO_MEMORY.to_string();
    }
    memory
        .iter()
        .map(|message| format!("[{}] {}", message.role(), message.text()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn tier_switched(tier: &str) -> String {
    format!("✅ LLM changed to `{tier}`")
}

pub fn tier_usage(tiers: &[String]) -> String {
    format!("❌ Use one of: {}", tiers.join(", "))
}

pub fn scheduler_status(snapshot: &SchedulerSnapshot, now: DateTime<Utc>) -> String {
    let mut lines = vec![
        format!("🔍 Current LLM: `{}` (tier `{}`)", snapshot.model, snapshot.tier),
        format!(
            "🔑 Key {}/{} ({})",
            snapshot.credential_position + 1,
            snapshot.credential_count,
            snapshot.credential_fingerprint
        ),
    ];
    for (model, until) in &snapshot.cooling {
        let remaining = (*until - now).num_seconds().max(0);
        lines.push(format!("🧊 `{model}` cooling for {remaining}s"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pengpt_core::domain::message::Message;
    use pengpt_core::domain::slot::SlotId;
    use pengpt_core::rotation::SchedulerSnapshot;

    use super::{help_message, memory_listing, scheduler_status, slot_summary, NO_CHATS};

    #[test]
    fn help_lists_every_command_family() {
        let help = help_message();
        for token in ["/help", "/pa", "/pd", "/ds", "/dsh", "/sc", "/vsm", "/cha-llm", "/cur-llm"] {
            assert!(help.contains(token), "help should mention {token}");
        }
    }

    #[test]
    fn slot_summary_lists_counts_or_empty_notice() {
        assert_eq!(slot_summary(&[]), NO_CHATS);
        let one = SlotId::new(1).expect("slot");
        let three = SlotId::new(3).expect("slot");
        assert_eq!(slot_summary(&[(one, 2), (three, 0)]), "#1: 2 msgs\n#3: 0 msgs");
    }

    #[test]
    fn memory_listing_tags_roles() {
        let listing = memory_listing(&[Message::user("hi"), Message::assistant("hello")]);
        assert_eq!(listing, "[user] hi\n[assistant] hello");
    }

    #[test]
    fn scheduler_status_shows_position_and_cooling_models() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).single().expect("time");
        let snapshot = SchedulerSnapshot {
            tier: "fast".to_string(),
            model: "m-b".to_string(),
            credential_position: 1,
            credential_count: 3,
            credential_fingerprint: "...1111".to_string(),
            cooling: vec![("m-a".to_string(), now + chrono::Duration::seconds(25))],
        };

        let status = scheduler_status(&snapshot, now);
        assert!(status.contains("`m-b` (tier `fast`)"));
        assert!(status.contains("Key 2/3 (...1111)"));
        assert!(status.contains("`m-a` cooling for 25s"));
    }
}
