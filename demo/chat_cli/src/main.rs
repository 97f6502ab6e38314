mod config;
mod fixture;

use std::sync::Arc;

use avatar_core::catalog::render_reply;
use avatar_core::llm::{ChatMessage, LanguageModel, OpenAiClient};
use avatar_core::store::PostgrestStore;
use avatar_core::{ChatEngine, RespondContext};
use config::{Backend, ChatCliConfig};
use fixture::Fixture;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Logging / tracing
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,avatar_core=info,chat_cli=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cfg = ChatCliConfig::load();
    let model: Arc<dyn LanguageModel> = Arc::new(OpenAiClient::new(cfg.llm.clone())?);

    let engine = match &cfg.backend {
        Backend::Fixture(path) => {
            let store = Fixture::read(path)?.into_store()?;
            if let Some(key) = &cfg.api_key {
                store.set_operator_key(&cfg.user_id, key);
            }
            info!(target: "chat_cli", fixture = %path.display(), "Loaded fixture store");
            ChatEngine::from_store(Arc::new(store), model, cfg.engine.clone())
        }
        Backend::Postgrest => {
            let store = PostgrestStore::from_env()?;
            info!(target: "chat_cli", "Using PostgREST store");
            ChatEngine::from_store(Arc::new(store), model, cfg.engine.clone())
        }
    };

    info!(
        target: "chat_cli",
        avatar_id = %cfg.avatar_id,
        platform = ?cfg.platform,
        tools = engine.tools().names().len(),
        "Chat ready; /reset clears history, /quit exits"
    );

    let mut history: Vec<ChatMessage> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let message = line.trim();
        match message {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                history.clear();
                continue;
            }
            _ => {}
        }

        let ctx = RespondContext {
            history: history.clone(),
            platform: cfg.platform,
            contact_handle: cfg.contact_handle.clone(),
            ..RespondContext::new(cfg.avatar_id.clone(), cfg.user_id.clone(), message)
        };
        match engine.respond(ctx).await {
            Ok(reply) => {
                let rendered = render_reply(&reply.text, cfg.platform);
                stdout.write_all(format!("{rendered}\n").as_bytes()).await?;
                info!(
                    target: "chat_cli",
                    outcome = reply.metadata.outcome.as_str(),
                    tools = ?reply.metadata.tool_calls_executed,
                    images = reply.images.len(),
                    "Reply"
                );
                history.push(ChatMessage::user(message));
                history.push(ChatMessage::assistant(reply.text));
            }
            Err(e) => {
                error!(target: "chat_cli", error = %e, kind = e.kind(), "respond failed");
                stdout.write_all(format!("[error] {e}\n").as_bytes()).await?;
            }
        }
    }

    Ok(())
}
