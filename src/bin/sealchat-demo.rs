//! SealChat demo
//!
//! Spins up an in-memory relay and two sessions, performs the key exchange
//! and sends one message each way, logging every step. Useful for watching
//! the protocol without a real relay server.
//!
//! ```text
//! RUST_LOG=sealchat_core=debug sealchat-demo --from alice --to bob --message "hi"
//! ```

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sealchat_core::transport::RelayInbox;
use sealchat_core::{
    MemoryRelay, OsCryptoProvider, Result, SeededCryptoProvider, SessionConfig, SessionEvent,
    SessionOrchestrator,
};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "sealchat-demo", version, about = "SealChat secure channel demo")]
struct Args {
    /// User that starts the conversation
    #[arg(long, default_value = "alice")]
    from: String,

    /// User that receives the first message
    #[arg(long, default_value = "bob")]
    to: String,

    /// Message to send
    #[arg(short, long, default_value = "hi")]
    message: String,

    /// Reply sent back by the recipient
    #[arg(long, default_value = "hello")]
    reply: String,

    /// Use deterministic randomness seeded with this value
    #[arg(long, env = "SEALCHAT_SEED")]
    seed: Option<u64>,

    /// Session configuration as JSON
    #[arg(long, env = "SEALCHAT_CONFIG")]
    config: Option<String>,
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sealchat_core=info,sealchat_demo=info")),
        )
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        tracing::error!("Demo failed ({}): {}", e.code(), e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(json) => SessionConfig::from_json(json)?,
        None => SessionConfig::default(),
    };

    let relay = MemoryRelay::new();
    let (sender, mut sender_in) = login(&relay, &args.from, &config, args.seed)?;
    let (recipient, mut recipient_in) =
        login(&relay, &args.to, &config, args.seed.map(|s| s.wrapping_add(1)))?;

    tracing::info!("Online: {:?}", relay.online_users());

    sender.select_peer(&args.to).await?;
    drain(&recipient, &mut recipient_in).await?;
    drain(&sender, &mut sender_in).await?;

    sender.send_to_active(&args.message).await?;
    drain(&recipient, &mut recipient_in).await?;

    recipient.send_message(&args.from, &args.reply).await?;
    drain(&sender, &mut sender_in).await?;

    for entry in sender.messages_for(&args.to) {
        tracing::info!("[{}] {} {}: {}", entry.timestamp_ms, args.from, entry.direction.as_str(), entry.text);
    }

    sender.logout().await;
    recipient.logout().await;
    Ok(())
}

fn login(
    relay: &MemoryRelay,
    user_id: &str,
    config: &SessionConfig,
    seed: Option<u64>,
) -> Result<(SessionOrchestrator, RelayInbox)> {
    let (endpoint, inbox) = relay.register(user_id);
    let session = match seed {
        Some(seed) => SessionOrchestrator::new(
            user_id,
            Arc::new(endpoint),
            Arc::new(SeededCryptoProvider::new(seed)),
            config.clone(),
        )?,
        None => SessionOrchestrator::new(
            user_id,
            Arc::new(endpoint),
            Arc::new(OsCryptoProvider),
            config.clone(),
        )?,
    };
    tracing::info!("{} logged in with key {}", user_id, session.public_key().fingerprint());
    Ok((session, inbox))
}

/// Handle everything queued for `session`
async fn drain(session: &SessionOrchestrator, inbox: &mut RelayInbox) -> Result<()> {
    while let Some(event) = inbox.try_recv() {
        match session.handle_event(event?).await {
            Ok(Some(SessionEvent::MessageReceived(entry))) => {
                tracing::info!("{} received from {}: {}", session.local_id(), entry.peer, entry.text);
            }
            Ok(Some(SessionEvent::ChannelEstablished { peer })) => {
                tracing::info!("{} has a secure channel with {}", session.local_id(), peer);
            }
            Ok(_) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => tracing::warn!("{}: {}", session.local_id(), e.user_message()),
        }
    }
    Ok(())
}
