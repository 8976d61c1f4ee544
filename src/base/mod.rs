//! Core components, types, and utilities for the moira-bot.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - Chat identifier parsing.
//! - Common types and result handling.

pub mod config;
pub mod identity;
pub mod types;
