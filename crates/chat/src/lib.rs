//! Chat front end for the assistant.
//!
//! - **Listener** (`listener`) - event source seam with reconnect backoff, one task per event
//! - **Commands** (`commands`) - `/sc`, `/sm`, `/cha-llm` and the rest of the control surface
//! - **Events** (`events`) - inbound message model, responder seam, message handler
//! - **Replies** (`replies`) - acknowledgement and status texts
//! - **Console** (`console`) - stdin/stdout transport for local runs
//!
//! # Architecture
//!
//! ```text
//! EventSource → ListenerRunner → MessageHandler → CommandRouter
//!                                      ↓
//!                                AgentRuntime → Responder (send placeholder, edit reply)
//! ```

pub mod commands;
pub mod console;
pub mod events;
pub mod listener;
pub mod replies;

pub use commands::{parse_command, ChatCommand, CommandRouter};
pub use console::{ConsoleResponder, ConsoleSource};
pub use events::{
    BotIdentity, ChatEvent, EventContext, EventHandler, HandlerResult, MessageHandle,
    MessageHandler, NoopResponder, Responder, ResponderError,
};
pub use listener::{EventSource, ListenerRunner, NoopEventSource, ReconnectPolicy, TransportError};
