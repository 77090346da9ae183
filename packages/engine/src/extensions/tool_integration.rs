// packages/engine/src/extensions/tool_integration.rs
//! Tool server access for agents
//!
//! Marks every run as tool-enabled and lists the configured tool servers in
//! the context metadata. Agents read these through `AgentState::metadata`.

use crate::runtime::context::ExecutionContext;
use crate::runtime::extension::ExecutionExtension;
use crate::utils::config::EngineConfig;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

pub const MCP_ENABLED: &str = "mcp_enabled";
pub const TOOL_SERVERS: &str = "tool_servers";

pub struct ToolIntegrationExtension {
    tool_servers: Vec<String>,
}

impl ToolIntegrationExtension {
    pub fn new<I, S>(tool_servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tool_servers: tool_servers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn tool_servers(&self) -> &[String] {
        &self.tool_servers
    }
}

#[async_trait]
impl ExecutionExtension for ToolIntegrationExtension {
    fn name(&self) -> &str {
        "tool_integration"
    }

    async fn initialize(&self, _config: &EngineConfig) -> anyhow::Result<()> {
        if self.tool_servers.is_empty() {
            warn!("Tool integration enabled without any tool servers");
        } else {
            info!("Tool servers available: {}", self.tool_servers.join(", "));
        }
        Ok(())
    }

    async fn pre_execute(&self, ctx: &mut ExecutionContext) -> anyhow::Result<()> {
        ctx.metadata.insert(MCP_ENABLED.to_string(), Value::Bool(true));
        ctx.metadata
            .insert(TOOL_SERVERS.to_string(), json!(self.tool_servers));
        Ok(())
    }

    fn health(&self) -> Value {
        json!({
            "status": "healthy",
            "tool_servers": self.tool_servers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::registry::AgentState;

    #[tokio::test]
    async fn test_marks_metadata() {
        let ext = ToolIntegrationExtension::new(["search", "calendar"]);
        let mut ctx = ExecutionContext::new("assistant");

        ext.pre_execute(&mut ctx).await.unwrap();

        let state = AgentState::from_context(&ctx);
        assert!(state.metadata_flag(MCP_ENABLED));
        assert_eq!(state.metadata[TOOL_SERVERS], json!(["search", "calendar"]));
    }
}
