//! simon core library — conversation store, relay orchestration, WhatsApp
//! channel, completion backend, and the HTTP front door used by the CLI.

pub mod channels;
pub mod config;
pub mod conversation;
pub mod init;
pub mod llm;
pub mod relay;
pub mod server;
