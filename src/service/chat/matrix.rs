//! Chat service integration for moira-bot.
//!
//! This module provides functionality for interacting with Matrix:
//! - Restoring the bot's session from an access token
//! - Receiving room messages through the sync loop
//! - Sending notice replies

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use matrix_sdk::{
    Client, Room, SessionMeta,
    config::SyncSettings,
    matrix_auth::{MatrixSession, MatrixSessionTokens},
    ruma::{
        EventId, OwnedDeviceId, RoomId, UserId,
        events::{
            relation::InReplyTo,
            room::message::{OriginalSyncRoomMessageEvent, Relation, RoomMessageEventContent},
        },
    },
};
use tracing::{debug, info, instrument};

use crate::{
    base::{
        config::Config,
        types::{ChatEvent, Res, Void},
    },
    interaction,
    service::directory::DirectoryClient,
};

use super::{ChatClient, GenericChatClient};

// Extra methods on `ChatClient` applied by the matrix implementation.

impl ChatClient {
    /// Creates a new Matrix chat client.
    pub async fn matrix(config: &Config, directory: DirectoryClient) -> Res<Self> {
        let client = MatrixChatClient::new(config, directory).await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

impl From<MatrixChatClient> for ChatClient {
    fn from(client: MatrixChatClient) -> Self {
        Self { inner: Arc::new(client) }
    }
}

// Structs.

/// Matrix client implementation.
#[derive(Clone)]
struct MatrixChatClient {
    pub bot_user_id: String,
    pub client: Client,
    pub config: Config,
    pub directory: DirectoryClient,
}

impl MatrixChatClient {
    /// Create a new Matrix chat client.
    #[instrument(name = "MatrixChatClient::new", skip_all)]
    pub async fn new(config: &Config, directory: DirectoryClient) -> Res<Self> {
        // Read the access token.

        let access_token = std::fs::read_to_string(&config.access_token_file)
            .with_context(|| format!("Failed to read access token file `{}`", config.access_token_file.display()))?
            .trim()
            .to_string();

        // Initialize the Matrix client, backed by the on-disk session store.

        let client = Client::builder().homeserver_url(&config.homeserver_url).sqlite_store(&config.storage_path, None).build().await?;

        // Restore the bot's session.

        let session = MatrixSession {
            meta: SessionMeta {
                user_id: UserId::parse(config.bot_user_id.as_str())?,
                device_id: OwnedDeviceId::from(config.device_id.as_str()),
            },
            tokens: MatrixSessionTokens { access_token, refresh_token: None },
        };

        client.restore_session(session).await?;

        info!("Matrix bot user ID: {}", config.bot_user_id);

        Ok(Self {
            bot_user_id: config.bot_user_id.clone(),
            client,
            config: config.clone(),
            directory,
        })
    }
}

#[async_trait]
impl GenericChatClient for MatrixChatClient {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    async fn start(&self) -> Void {
        // Register the room message handler.

        let config = self.config.clone();
        let directory = self.directory.clone();
        let chat = ChatClient::from(self.clone());

        self.client.add_event_handler(move |event: OriginalSyncRoomMessageEvent, room: Room| {
            let config = config.clone();
            let directory = directory.clone();
            let chat = chat.clone();

            async move {
                handle_room_message_event(event, room, config, directory, chat);
            }
        });

        // Sync until the process is stopped; the store keeps the sync token between runs.
        self.client.sync(SyncSettings::default()).await?;

        Ok(())
    }

    #[instrument(skip(self, text))]
    async fn send_reply(&self, room_id: &str, event_id: &str, text: &str) -> Void {
        let room_id = RoomId::parse(room_id)?;
        let room = self.client.get_room(&room_id).ok_or_else(|| anyhow::anyhow!("Bot is not in room `{}`", room_id))?;

        let mut content = RoomMessageEventContent::notice_plain(text);
        content.relates_to = Some(Relation::Reply {
            in_reply_to: InReplyTo::new(EventId::parse(event_id)?),
        });

        room.send(content).await.map_err(|e| anyhow::anyhow!("Failed to send message: {}", e))?;

        Ok(())
    }
}

// Event handler callbacks for Matrix.

/// Handles room message events from Matrix.
#[instrument(skip_all)]
fn handle_room_message_event(event: OriginalSyncRoomMessageEvent, room: Room, config: Config, directory: DirectoryClient, chat: ChatClient) {
    debug!("Received room message event ...");

    let event = ChatEvent {
        room_id: room.room_id().to_string(),
        event_id: event.event_id.to_string(),
        sender: event.sender.to_string(),
        msgtype: event.content.msgtype().to_string(),
        body: event.content.body().to_string(),
    };

    interaction::room_message::handle_room_message(event, config, directory, chat);
}
