//! Library root for `moira-bot`.
//!
//! Moira-bot is a Matrix bot that answers a few directory questions:
//! - `!hello` checks that the bot is alive
//! - `!myname` looks up the sender's full name
//! - `!myclasses` lists the class rosters the sender is on
//!
//! The bot integrates with Matrix for chat and with the Moira SOAP service
//! for directory data. The architecture is built around extensible traits
//! that allow for different implementations of each service.

pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use service::directory::DirectoryClient;
use tracing::info;

/// Install the process-wide TLS crypto provider.
fn install_crypto_provider() {
    // A provider may already be installed; either way one is in place.
    let _ = crypto::ring::default_provider().install_default();
}

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the moira-bot runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with directory and chat clients
/// - Starts the sync loop for processing messages
pub async fn start(config: Config) -> Void {
    info!("Starting moira-bot ...");

    // Start the crypto provider.
    install_crypto_provider();

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}

/// Connect to the directory service and print the operations it advertises.
pub async fn list_operations(config: Config) -> Void {
    install_crypto_provider();

    let directory = DirectoryClient::moira(&config).await?;

    for operation in directory.describe_operations().await? {
        println!("{operation}");
    }

    Ok(())
}
