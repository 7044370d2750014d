pub mod message;
pub mod slot;
