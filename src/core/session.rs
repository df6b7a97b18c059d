//! Live sessions and the store that keeps one per key.

use crate::core::agent::{ConversationAgent, ToolAgent};
use crate::core::config::Config;
use crate::core::failure::FailureRecord;
use crate::core::message::Transcript;
use crate::core::model::ChatModel;
use crate::core::policy::ToolPolicy;
use crate::mcp::catalog::{load_tool_catalog, ToolCatalog};
use crate::mcp::transport::stdio::{ServerLaunch, StdioClient};
use crate::mcp::transport::{ConnectionSetupError, McpTransport, TransportError};
use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

/// Identity of one logical session, e.g. a REPL run or a browser session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One connection, its catalog, the agent bound to both and the displayed
/// transcript.
pub struct Session {
    connection: Arc<dyn McpTransport>,
    catalog: Arc<ToolCatalog>,
    pub(crate) agent: Box<dyn ConversationAgent>,
    pub(crate) transcript: Transcript,
}

impl Session {
    pub fn new(
        connection: Arc<dyn McpTransport>,
        catalog: Arc<ToolCatalog>,
        agent: Box<dyn ConversationAgent>,
    ) -> Self {
        Self {
            connection,
            catalog,
            agent,
            transcript: Transcript::default(),
        }
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn connection(&self) -> &Arc<dyn McpTransport> {
        &self.connection
    }
}

/// Serialises turns: at most one holder of the lock runs a turn.
pub type SharedSession = Arc<Mutex<Session>>;

#[derive(Debug)]
pub enum SessionError {
    Setup(ConnectionSetupError),
    Catalog(TransportError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Setup(ConnectionSetupError::Handshake(err)) => write!(
                f,
                "The GitHub tool server did not finish starting up. {}",
                FailureRecord::from_transport(err).user_message
            ),
            SessionError::Setup(err) => write!(f, "{err}"),
            SessionError::Catalog(err) => write!(
                f,
                "Could not load the GitHub tool list. {}",
                FailureRecord::from_transport(err).user_message
            ),
        }
    }
}

impl StdError for SessionError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            SessionError::Setup(err) => Some(err),
            SessionError::Catalog(err) => Some(err),
        }
    }
}

impl From<ConnectionSetupError> for SessionError {
    fn from(err: ConnectionSetupError) -> Self {
        SessionError::Setup(err)
    }
}

/// Builds a fully connected session for a key.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self, key: &SessionKey) -> Result<Session, SessionError>;
}

/// Spawns the configured tool server, handshakes, loads the catalog and binds
/// a [`ToolAgent`] to it.
pub struct McpSessionFactory {
    config: Config,
    model: Arc<dyn ChatModel>,
    lookup: fn(&str) -> Option<String>,
}

impl McpSessionFactory {
    pub fn new(config: Config, model: Arc<dyn ChatModel>) -> Self {
        Self {
            config,
            model,
            lookup: env_lookup,
        }
    }
}

pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Connects to the tool server and loads its catalog. The connection is
/// closed again if any step after spawning fails.
pub async fn connect(
    config: &Config,
    lookup: fn(&str) -> Option<String>,
) -> Result<(Arc<StdioClient>, ToolCatalog), SessionError> {
    let launch = ServerLaunch::resolve(&config.tool_server, lookup)?;
    let client = StdioClient::spawn(&launch).await?;

    if let Err(err) = client.initialize().await {
        client.close().await;
        return Err(err.into());
    }

    match load_tool_catalog(client.as_ref()).await {
        Ok(catalog) => {
            info!(tools = catalog.len(), "Loaded MCP tools");
            Ok((client, catalog))
        }
        Err(err) => {
            client.close().await;
            Err(SessionError::Catalog(err))
        }
    }
}

#[async_trait]
impl SessionFactory for McpSessionFactory {
    async fn create(&self, key: &SessionKey) -> Result<Session, SessionError> {
        debug!(session = %key, "Creating session");
        let (client, catalog) = connect(&self.config, self.lookup).await?;
        let connection: Arc<dyn McpTransport> = client;
        let catalog = Arc::new(catalog);
        let agent = ToolAgent::new(
            self.model.clone(),
            connection.clone(),
            catalog.clone(),
            ToolPolicy::from_config(&self.config.policy),
            self.config.model.max_tool_rounds,
        );
        Ok(Session::new(connection, catalog, Box::new(agent)))
    }
}

type SessionSlot = Arc<OnceCell<SharedSession>>;

/// Keeps exactly one live session per key.
///
/// Creation is single-flight: concurrent callers for the same key wait on the
/// same initialisation. A failed creation leaves the slot uninitialised, so
/// the next caller for that key runs the factory again.
pub struct SessionStore<F: SessionFactory> {
    factory: F,
    sessions: StdMutex<HashMap<SessionKey, SessionSlot>>,
}

impl<F: SessionFactory> SessionStore<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            sessions: StdMutex::new(HashMap::new()),
        }
    }

    pub async fn get_or_create(&self, key: &SessionKey) -> Result<SharedSession, SessionError> {
        let slot = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .clone();

        let session = slot
            .get_or_try_init(|| async {
                let session = self.factory.create(key).await?;
                info!(session = %key, "Session ready");
                Ok::<_, SessionError>(Arc::new(Mutex::new(session)))
            })
            .await?;
        Ok(session.clone())
    }

    /// Closes and evicts the session for `key`. Returns whether one existed.
    pub async fn remove(&self, key: &SessionKey) -> bool {
        let slot = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        let Some(session) = slot.and_then(|slot| slot.get().cloned()) else {
            return false;
        };
        let connection = session.lock().await.connection().clone();
        connection.close().await;
        debug!(session = %key, "Session closed");
        true
    }

    pub async fn close_all(&self) {
        let slots: Vec<SessionSlot> = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, slot)| slot)
            .collect();
        let sessions: Vec<SharedSession> = slots
            .iter()
            .filter_map(|slot| slot.get().cloned())
            .collect();
        join_all(sessions.iter().map(|session| async move {
            let connection = session.lock().await.connection().clone();
            connection.close().await;
        }))
        .await;
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
