//! Command handlers for the SupportChat CLI

use supportchat_core::{ChatSession, ClientId, LocalTransport, SendOutcome, SessionTransport};
use supportchat_ws::WsTransport;
use tracing::info;

use crate::app::{spawn_loopback_agent, ChatApp};
use crate::cli::Commands;
use crate::config::AppConfig;
use crate::error::{CliError, Result};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(command: Commands, config: AppConfig) -> Result<()> {
        match command {
            Commands::Chat {
                client_id,
                loopback,
            } => Self::handle_chat_command(config, &client_id, loopback).await,
            Commands::Send { client_id, message } => {
                Self::handle_send_command(config, &client_id, message).await
            }
            Commands::Config => {
                print!("{}", config.to_toml()?);
                Ok(())
            }
        }
    }

    /// Handle the interactive chat command
    async fn handle_chat_command(config: AppConfig, client_id: &str, loopback: bool) -> Result<()> {
        let client_id = ClientId::new(client_id)?;

        if loopback {
            info!("Starting loopback chat for client {}", client_id);
            let (transport, peer) = LocalTransport::pair();
            let session = Self::open_session(&config, client_id, transport).await?;
            let agent = spawn_loopback_agent(peer, config.cli.loopback_reply.clone());
            let result = ChatApp::new(session, config.cli).run().await;
            agent.abort();
            result
        } else {
            info!(
                "Starting chat for client {} via {}",
                client_id, config.chat.transport.endpoint
            );
            let transport = WsTransport::new(config.chat.transport.clone());
            let session = Self::open_session(&config, client_id, transport).await?;
            ChatApp::new(session, config.cli).run().await
        }
    }

    /// Handle the one-shot send command
    async fn handle_send_command(config: AppConfig, client_id: &str, message: String) -> Result<()> {
        let client_id = ClientId::new(client_id)?;
        let transport = WsTransport::new(config.chat.transport.clone());
        let mut session = Self::open_session(&config, client_id, transport).await?;

        let outcome = session.send_outbound(message).await;
        let delivered = match outcome {
            Ok(SendOutcome::Dispatched { id, receipt }) => {
                receipt.await.map(|_| id).map_err(|e| CliError::Undelivered(e.to_string()))
            }
            Ok(SendOutcome::Undelivered { reason, .. }) => Err(CliError::Undelivered(reason)),
            Ok(SendOutcome::Dropped) => Err(CliError::NotConnected {
                client_id: session.client_id().clone(),
            }),
            Err(e) => Err(e.into()),
        };
        session.close().await;

        let id = delivered?;
        println!("Message {} sent", id);
        Ok(())
    }

    /// Open a session, failing if the transport could not connect
    async fn open_session<T: SessionTransport>(
        config: &AppConfig,
        client_id: ClientId,
        transport: T,
    ) -> Result<ChatSession<T>> {
        let session = ChatSession::open(client_id, transport, config.chat.session.clone()).await?;
        if !session.is_connected() {
            return Err(CliError::NotConnected {
                client_id: session.client_id().clone(),
            });
        }
        Ok(session)
    }
}
