// Library half of the keysplit binary; the integration tests drive it directly

#[cfg(feature = "cli")]
pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod directory;
pub mod domain;
pub mod guard;
pub mod nonce;
pub mod pipeline;
pub mod selection;
pub mod session;
