//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for the services used by the moira-bot:
//! - Chat services (e.g., Matrix)
//! - Directory services (e.g., Moira)
//!
//! Each service module defines both generic traits and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod chat;
pub mod directory;
