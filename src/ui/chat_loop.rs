//! Interactive chat entry point.

use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;

use tokio::io::BufReader;
use tracing::info;

use crate::core::chat_completion::ChatCompletionsModel;
use crate::core::config::data::Config;
use crate::core::model::ChatModel;
use crate::core::session::{env_lookup, McpSessionFactory, SessionKey, SessionStore};
use crate::ui::repl::{print_banner, run_repl};

pub const REPL_SESSION_KEY: &str = "repl";

/// Connects to the tool server, then answers questions from stdin until the
/// user exits. The connection is closed on every exit path.
pub async fn run_chat(config: Config) -> Result<(), Box<dyn Error>> {
    let model = ChatCompletionsModel::from_config(&config.model, env_lookup)?;
    info!(model = model.model(), "Starting chat");
    let model: Arc<dyn ChatModel> = Arc::new(model);

    let store = SessionStore::new(McpSessionFactory::new(config, model));
    let key = SessionKey::new(REPL_SESSION_KEY);

    let session = store.get_or_create(&key).await?;
    let tool_count = session.lock().await.catalog().len();

    let mut stdout = io::stdout();
    let result = match print_banner(&mut stdout, tool_count) {
        Ok(()) => {
            let input = BufReader::new(tokio::io::stdin());
            run_repl(&session, input, &mut stdout).await
        }
        Err(err) => Err(err),
    };
    let _ = stdout.flush();

    drop(session);
    store.close_all().await;
    result.map_err(Into::into)
}
