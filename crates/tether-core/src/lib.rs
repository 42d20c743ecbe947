//! Mediates between a streaming LLM and local side effects.
//!
//! [`Agent`] ties the pieces together: the [`TurnController`] drives the
//! provider, the [`ToolDispatcher`] runs tool calls behind the
//! [`CapabilityGate`], and deletions go through the two-phase
//! [`DeletionManager`]. Sessions are keyed by conversation id and live in
//! memory only.

pub mod controller;
pub mod decoder;
pub mod dispatch;
pub mod error_handling;
pub mod events;
pub mod history;
pub mod prompts;
pub mod provider_registration;
pub mod sandbox;
pub mod session;
pub mod tool_definitions;
pub mod tools;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tether_bridge::BrowserCommands;
use tether_config::{Config, ToolsConfig};
use tether_execution::ShellExecutor;
use tether_providers::{LLMProvider, Message};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use controller::{RunOutcome, TurnController, TurnSettings, TurnState};
pub use decoder::{DecodedFragment, DecodedTurn, EventStreamDecoder};
pub use dispatch::{ToolDispatcher, ToolError, ToolHandler, ToolKind, ToolOutcome};
pub use events::{AgentEvent, EventSink, NullEventSink};
pub use history::ConversationHistory;
pub use sandbox::deletion::{DeletionError, DeletionManager, PendingDeletion};
pub use sandbox::{Access, CapabilityGate, Classification, GateError, Operation, PendingPermission};
pub use session::{Session, SessionStore};
pub use tools::ToolContext;

pub struct Agent {
    provider: Arc<dyn LLMProvider>,
    controller: Arc<TurnController>,
    sessions: Arc<SessionStore>,
    gate: Arc<CapabilityGate>,
    deletions: Arc<DeletionManager>,
    browser: Option<Arc<dyn BrowserCommands>>,
    shell: ShellExecutor,
    http: reqwest::Client,
    limits: ToolsConfig,
    working_dir: PathBuf,
}

impl Agent {
    /// Build an agent around the configured default provider.
    pub fn from_config(config: &Config, browser: Option<Arc<dyn BrowserCommands>>) -> Result<Self> {
        let provider = provider_registration::create_provider(config)?;
        Self::new(config, provider, browser)
    }

    pub fn new(
        config: &Config,
        provider: Arc<dyn LLMProvider>,
        browser: Option<Arc<dyn BrowserCommands>>,
    ) -> Result<Self> {
        let working_dir = match &config.agent.working_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).as_ref()),
            None => std::env::current_dir().context("Failed to determine working directory")?,
        };

        let sessions = Arc::new(SessionStore::new());
        let gate = Arc::new(CapabilityGate::new(
            sessions.clone(),
            &config.sandbox.extra_sensitive_paths,
        ));

        let settings = TurnSettings {
            max_turns: config.agent.max_turns,
            history_window: config.agent.history_window,
            system_prompt: prompts::system_prompt(
                config.agent.system_prompt.as_deref(),
                &working_dir.to_string_lossy(),
            ),
            tools: tool_definitions::create_tool_definitions(browser.is_some()),
        };
        debug!(
            "Agent ready: provider={} model={} tools={}",
            provider.name(),
            provider.model(),
            settings.tools.len()
        );

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("tether/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            controller: Arc::new(TurnController::new(provider.clone(), settings)),
            provider,
            sessions,
            gate,
            deletions: Arc::new(DeletionManager::new()),
            browser,
            shell: ShellExecutor::new(Duration::from_secs(config.tools.shell_timeout_secs)),
            http,
            limits: config.tools.clone(),
            working_dir,
        })
    }

    pub fn provider(&self) -> &Arc<dyn LLMProvider> {
        &self.provider
    }

    pub fn working_dir(&self) -> &std::path::Path {
        &self.working_dir
    }

    pub fn tool_context(&self, session_id: &str, cancel: CancellationToken) -> ToolContext {
        ToolContext {
            session_id: session_id.to_string(),
            working_dir: self.working_dir.clone(),
            gate: self.gate.clone(),
            deletions: self.deletions.clone(),
            shell: self.shell.clone(),
            http: self.http.clone(),
            browser: self.browser.clone(),
            limits: self.limits.clone(),
            cancel,
        }
    }

    /// Start a run for `conversation_id` with a new user message.
    ///
    /// Events arrive on the returned channel, which closes after the terminal
    /// `done` or `error`. Runs on the same conversation wait for each other.
    pub fn run(
        &self,
        conversation_id: &str,
        user_text: &str,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<AgentEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = self.sessions.get_or_create(conversation_id);
        let ctx = self.tool_context(conversation_id, cancel);
        let controller = self.controller.clone();
        let text = user_text.to_string();

        tokio::spawn(async move {
            let mut history = session.history().lock().await;
            history.push_user_text(&text);
            let outcome = controller.run(&mut history, &ctx, &tx).await;
            debug!("Run on {} ended: {:?}", session.id, outcome);
        });
        rx
    }

    /// Run to completion and collect every event.
    pub async fn run_collect(
        &self,
        conversation_id: &str,
        user_text: &str,
        cancel: CancellationToken,
    ) -> Vec<AgentEvent> {
        let mut rx = self.run(conversation_id, user_text, cancel);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    pub fn pending_permissions(&self, session_id: &str) -> Vec<PendingPermission> {
        self.gate.list_pending(session_id)
    }

    pub fn approve(&self, permission_id: &str) -> Result<PendingPermission, GateError> {
        self.gate.approve(permission_id)
    }

    pub fn deny(&self, permission_id: &str) -> Result<PendingPermission, GateError> {
        self.gate.deny(permission_id)
    }

    pub fn pending_deletions(&self, session_id: &str) -> Vec<PendingDeletion> {
        self.deletions.list(session_id)
    }

    /// Execute a pending deletion. A recursive one is refused, and stays
    /// pending, while anything under it is denied or still needs approval.
    pub async fn confirm_deletion(&self, deletion_id: &str) -> Result<PendingDeletion, DeletionError> {
        if let Some(pending) = self.deletions.get(deletion_id) {
            if pending.is_directory && pending.recursive {
                self.screen_deletion(&pending).await?;
            }
        }
        self.deletions.confirm(deletion_id).await
    }

    async fn screen_deletion(&self, pending: &PendingDeletion) -> Result<(), DeletionError> {
        let gate = self.gate.clone();
        let session_id = pending.session_id.clone();
        let root = pending.path.clone();
        let restricted = tokio::task::spawn_blocking(move || {
            gate.first_restricted(&session_id, &root, Operation::Delete)
        })
        .await
        .map_err(|e| DeletionError::Io {
            path: pending.path.clone(),
            source: std::io::Error::other(e),
        })?;

        let Some((child, access)) = restricted else {
            return Ok(());
        };
        let reason = match access {
            Access::NeedsApproval { .. } => {
                let child_path = child.to_string_lossy();
                match self.gate.classify(&pending.session_id, &child_path, Operation::Delete) {
                    Classification::RequiresApproval { pending_id } => {
                        format!("{} needs approval first ({})", child.display(), pending_id)
                    }
                    Classification::Denied { reason } => {
                        format!("{} cannot be deleted: {}", child.display(), reason)
                    }
                    Classification::Allowed => {
                        format!("access to {} changed during the check; confirm again", child.display())
                    }
                }
            }
            Access::Denied { reason } => format!("{} cannot be deleted: {}", child.display(), reason),
            Access::Allowed => return Ok(()),
        };
        warn!("Deletion {} held back: {}", pending.id, reason);
        Err(DeletionError::Refused {
            path: pending.path.clone(),
            reason,
        })
    }

    pub fn cancel_deletion(&self, deletion_id: &str) -> Result<PendingDeletion, DeletionError> {
        self.deletions.cancel(deletion_id)
    }

    /// Forget a conversation: history, path decisions and anything pending.
    pub fn clear_session(&self, session_id: &str) {
        self.gate.clear_session(session_id);
        self.deletions.clear_session(session_id);
        if self.sessions.remove(session_id).is_some() {
            info!("Session {} cleared", session_id);
        }
    }

    /// Snapshot of a conversation's history.
    pub async fn history(&self, session_id: &str) -> Vec<Message> {
        match self.sessions.get(session_id) {
            Some(session) => session.history().lock().await.messages().to_vec(),
            None => Vec::new(),
        }
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.list_ids()
    }
}
