//! Interactive chat loop
//!
//! Reads lines from stdin and sends them through a `ChatSession`, printing
//! inbound messages as they arrive. Also hosts the loopback agent used by
//! `--loopback`.

use std::io::Write;

use supportchat_core::{
    ChatMessage, ChatSession, LocalPeer, Origin, SendOutcome, SessionTransport,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CliConfig;
use crate::error::Result;

const QUIT_COMMAND: &str = "/quit";

enum Event {
    Input(Option<String>),
    Incoming(Option<ChatMessage>),
}

/// Terminal front end for one chat session
pub struct ChatApp<T: SessionTransport> {
    session: ChatSession<T>,
    config: CliConfig,
}

impl<T: SessionTransport> ChatApp<T> {
    pub fn new(session: ChatSession<T>, config: CliConfig) -> Self {
        Self { session, config }
    }

    /// Run until the user quits, stdin closes or the session disconnects
    pub async fn run(mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!(
            "Chatting as {} ({} to leave)",
            self.session.client_id(),
            QUIT_COMMAND
        );
        self.prompt()?;

        loop {
            let event = tokio::select! {
                line = lines.next_line() => Event::Input(line?),
                incoming = async { self.session.recv().await.cloned() } => Event::Incoming(incoming),
            };

            match event {
                Event::Input(None) => break,
                Event::Input(Some(line)) => {
                    let line = line.trim();
                    if line == QUIT_COMMAND {
                        break;
                    }
                    if !line.is_empty() {
                        self.send_line(line).await;
                    }
                    self.prompt()?;
                }
                Event::Incoming(Some(message)) => {
                    println!();
                    println!("{}", render(&message));
                    self.prompt()?;
                }
                Event::Incoming(None) => {
                    println!();
                    println!("Connection lost, messages can no longer be sent.");
                    break;
                }
            }
        }

        self.session.close().await;
        info!(
            client_id = %self.session.client_id(),
            messages = self.session.messages().len(),
            "Chat ended"
        );
        Ok(())
    }

    async fn send_line(&mut self, line: &str) {
        match self.session.send_outbound(line).await {
            Ok(SendOutcome::Dispatched { id, .. }) => debug!(message_id = %id, "Message sent"),
            Ok(SendOutcome::Undelivered { reason, .. }) => {
                println!("(not delivered: {})", reason);
            }
            Ok(SendOutcome::Dropped) => println!("(not connected, message discarded)"),
            Err(e) => println!("({})", e),
        }
    }

    fn prompt(&self) -> Result<()> {
        print!("{}", self.config.prompt);
        std::io::stdout().flush()?;
        Ok(())
    }
}

/// Format a message for the terminal
pub fn render(message: &ChatMessage) -> String {
    let speaker = match message.origin() {
        Origin::Local => "you",
        Origin::Remote => "agent",
    };
    format!("{}> {}", speaker, message.content())
}

/// Answer every message the session sends with a canned reply
pub fn spawn_loopback_agent(mut peer: LocalPeer, reply: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = peer.next_sent().await {
            debug!(message_id = %message.id(), "Loopback agent received message");
            if let Err(e) = peer.push_message(&reply) {
                warn!("Loopback agent could not reply: {}", e);
                break;
            }
        }
    })
}
