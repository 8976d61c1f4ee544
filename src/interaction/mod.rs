//! Event handling and user interactions for moira-bot.
//!
//! This module provides functionality for handling room messages:
//! - Recognizing commands in message bodies
//! - Answering commands with directory lookups
//! - Replying into the originating room

pub mod command;
pub mod room_message;
