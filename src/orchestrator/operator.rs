//! The operator side of a recording session: session name and overwrite prompts.

use std::collections::VecDeque;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Questions the orchestrator asks while a session is being set up.
#[async_trait::async_trait]
pub trait Operator: Send {
    /// The session name, or `None` when the operator cancels.
    async fn session_name(&mut self) -> Option<String>;

    /// Whether to overwrite the listed existing output files.
    async fn confirm_overwrite(&mut self, existing: &[String]) -> bool;
}

/// Answers from a fixed script, for tests and unattended runs.
#[derive(Debug, Clone, Default)]
pub struct ScriptedOperator {
    names: VecDeque<Option<String>>,
    overwrite: VecDeque<bool>,
    /// File lists the operator was asked about, in order.
    pub overwrite_prompts: Vec<Vec<String>>,
}

impl ScriptedOperator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.names.push_back(Some(name.into()));
        self
    }

    pub fn cancel_name(mut self) -> Self {
        self.names.push_back(None);
        self
    }

    pub fn overwrite(mut self, answer: bool) -> Self {
        self.overwrite.push_back(answer);
        self
    }
}

#[async_trait::async_trait]
impl Operator for ScriptedOperator {
    async fn session_name(&mut self) -> Option<String> {
        self.names.pop_front().flatten()
    }

    async fn confirm_overwrite(&mut self, existing: &[String]) -> bool {
        self.overwrite_prompts.push(existing.to_vec());
        self.overwrite.pop_front().unwrap_or(false)
    }
}

/// A question waiting for one line of operator input.
#[derive(Debug)]
pub struct Prompt {
    pub question: String,
    pub reply: oneshot::Sender<String>,
}

/// Forwards prompts over a channel to whatever reads operator input.
pub struct ChannelOperator {
    prompts: mpsc::Sender<Prompt>,
}

impl ChannelOperator {
    pub fn new(prompts: mpsc::Sender<Prompt>) -> Self {
        Self { prompts }
    }

    async fn ask(&self, question: String) -> Option<String> {
        let (reply, answer) = oneshot::channel();
        if self.prompts.send(Prompt { question, reply }).await.is_err() {
            debug!("prompt receiver dropped");
            return None;
        }
        answer.await.ok()
    }
}

#[async_trait::async_trait]
impl Operator for ChannelOperator {
    async fn session_name(&mut self) -> Option<String> {
        self.ask("Session name (empty to cancel):".to_string()).await
    }

    async fn confirm_overwrite(&mut self, existing: &[String]) -> bool {
        let question = format!(
            "These files already exist:\n  {}\nOverwrite them? [y/N]",
            existing.join("\n  ")
        );
        self.ask(question)
            .await
            .is_some_and(|a| matches!(a.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
    }
}
