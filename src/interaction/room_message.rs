//! This module answers commands found in room messages.

use tracing::{Instrument, error, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        identity::extract_localpart,
        types::{ChatEvent, Res, Void},
    },
    service::{chat::ChatClient, directory::DirectoryClient},
};

use super::command::Command;

pub const HELLO_REPLY: &str = "Hello world!";

/// Handles a room message event.
///
/// Each event is processed on its own task; a failing command is logged and
/// does not affect other events.
#[instrument(skip_all)]
pub fn handle_room_message(event: ChatEvent, config: Config, directory: DirectoryClient, chat: ChatClient) {
    tokio::spawn(async move {
        // Process the event.
        let result = process_room_message(&event, &config, &directory, &chat).in_current_span().await;

        // Log any errors.
        if let Err(err) = &result {
            error!("Error while handling: {}", err);
        }
    });
}

/// Filter a room message, run the command it names, and reply with the result.
///
/// Non-text messages, the bot's own messages, and bodies without a known
/// command are ignored without error.
#[instrument(skip_all, fields(room_id = %event.room_id, sender = %event.sender))]
pub async fn process_room_message(event: &ChatEvent, config: &Config, directory: &DirectoryClient, chat: &ChatClient) -> Void {
    if !event.is_text() || event.sender == chat.bot_user_id() {
        return Ok(());
    }

    let Some(command) = Command::parse(&event.body) else {
        return Ok(());
    };

    info!("Handling `{}` ...", command.prefix());

    let reply = match answer(command, event, config, directory).await {
        Ok(reply) => reply,
        Err(err) => {
            if config.reply_on_error
                && let Err(send_err) = chat.send_reply(&event.room_id, &event.event_id, &format!("Error: {err}")).await
            {
                warn!("Failed to report error: {}", send_err);
            }

            return Err(err);
        }
    };

    chat.send_reply(&event.room_id, &event.event_id, &reply).await
}

/// Compute the reply text for a command.
pub async fn answer(command: Command, event: &ChatEvent, config: &Config, directory: &DirectoryClient) -> Res<String> {
    match command {
        Command::Hello => Ok(HELLO_REPLY.to_string()),
        Command::MyClasses => {
            let kerb = extract_localpart(&event.sender)?;

            // The directory already narrows to class lists; this narrows further to the current term.
            let classes = directory
                .get_user_classes(kerb)
                .await?
                .into_iter()
                .filter(|c| c.starts_with(&config.myclasses_prefix))
                .collect::<Vec<_>>();

            if classes.is_empty() {
                Ok(format!("No classes found for {kerb}."))
            } else {
                Ok(format!("Your classes:\n{}", classes.join("\n")))
            }
        }
        Command::MyName => {
            let kerb = extract_localpart(&event.sender)?;
            let name = directory.get_user_name(kerb).await?;

            Ok(format!("Your name is {name}."))
        }
    }
}
