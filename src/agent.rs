use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::error::{Error, Result};
use crate::gemini::GeminiClient;

/// The three configurations of the one agent capability. Role selects the
/// prompt template; the transport underneath is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Generator,
    Reviewer,
    Fixer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Generator => "generator",
            Role::Reviewer => "reviewer",
            Role::Fixer => "fixer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait AgentRunner {
    /// Send one rendered prompt for the given role, returning the raw model text.
    fn run(
        &self,
        role: Role,
        prompt: &str,
    ) -> impl std::future::Future<Output = Result<String>> + Send;
}

/// Production runner backed by the blocking Gemini client. Cloning shares
/// the underlying HTTP agent.
#[derive(Clone)]
pub struct GeminiRunner {
    client: Arc<GeminiClient>,
}

impl GeminiRunner {
    pub fn new(client: GeminiClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl AgentRunner for GeminiRunner {
    async fn run(&self, role: Role, prompt: &str) -> Result<String> {
        let client = Arc::clone(&self.client);
        let prompt = prompt.to_string();
        let started = Instant::now();
        debug!(role = %role, prompt_chars = prompt.len(), "sending prompt to model");

        let output = tokio::task::spawn_blocking(move || client.complete(&prompt))
            .await
            .map_err(|e| Error::Upstream(format!("model call task failed: {e}")))??;

        debug!(
            role = %role,
            elapsed_secs = format!("{:.1}", started.elapsed().as_secs_f64()),
            output_chars = output.len(),
            "model call finished"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Generator.to_string(), "generator");
        assert_eq!(Role::Reviewer.to_string(), "reviewer");
        assert_eq!(Role::Fixer.to_string(), "fixer");
    }

    #[test]
    fn test_role_as_str_matches_display() {
        for role in [Role::Generator, Role::Reviewer, Role::Fixer] {
            assert_eq!(role.as_str(), role.to_string());
        }
    }
}
