//! One-shot "say" command

use std::error::Error;
use std::sync::Arc;

use crate::core::chat_completion::ChatCompletionsModel;
use crate::core::config::data::Config;
use crate::core::dispatcher::{handle_turn, TurnOutcome};
use crate::core::model::ChatModel;
use crate::core::session::{env_lookup, McpSessionFactory, SessionKey, SessionStore};

pub async fn run_say(config: Config, prompt: Vec<String>) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: repolens say <question>");
        std::process::exit(1);
    }

    let model: Arc<dyn ChatModel> =
        Arc::new(ChatCompletionsModel::from_config(&config.model, env_lookup)?);
    let store = SessionStore::new(McpSessionFactory::new(config, model));
    let session = store.get_or_create(&SessionKey::new("say")).await?;

    let outcome = {
        let mut session = session.lock().await;
        handle_turn(&mut session, &prompt).await
    };
    drop(session);
    store.close_all().await;

    if let TurnOutcome::Reply(reply) = outcome {
        println!("{}", reply.text);
    }
    Ok(())
}
