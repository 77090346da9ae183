// packages/engine/src/runtime/factory.rs
//! Engine presets
//!
//! | Preset | Extensions | Notes |
//! |---|---|---|
//! | `user-interactive` | user_concurrency, event_emission | user id required |
//! | `data-batch` | domain_optimization | no events, 300s timeout, 20 slots |
//! | `mcp-enabled` / `tool-integrated` | user_concurrency, tool_integration, event_emission | 120s timeout |
//!
//! Event emission is always registered last, so `agent_completed` is only
//! sent after every other post hook succeeded.

use crate::events::EventTransport;
use crate::extensions::{
    DomainOptimizationConfig, DomainOptimizationExtension, EventEmissionExtension,
    ToolIntegrationExtension, UserConcurrencyExtension,
};
use crate::runtime::engine::ExecutionEngine;
use crate::runtime::extension::ExecutionExtension;
use crate::runtime::registry::AgentRegistry;
use crate::runtime::scoped::RequestScopedExecutionEngine;
use crate::utils::config::EngineConfig;
use crate::utils::errors::{EngineError, Result};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePreset {
    UserInteractive,
    DataBatch,
    ToolIntegrated,
}

impl EnginePreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnginePreset::UserInteractive => "user-interactive",
            EnginePreset::DataBatch => "data-batch",
            EnginePreset::ToolIntegrated => "tool-integrated",
        }
    }

    /// Apply this preset's overrides to `base`
    pub fn configure(&self, base: EngineConfig) -> EngineConfig {
        match self {
            EnginePreset::UserInteractive => EngineConfig {
                enable_user_features: true,
                enable_websocket_events: true,
                require_user_context: true,
                ..base
            },
            EnginePreset::DataBatch => EngineConfig {
                enable_websocket_events: false,
                agent_execution_timeout: 300.0,
                max_concurrent_agents: 20,
                ..base
            },
            EnginePreset::ToolIntegrated => EngineConfig {
                enable_user_features: true,
                enable_websocket_events: true,
                agent_execution_timeout: 120.0,
                ..base
            },
        }
    }
}

impl std::fmt::Display for EnginePreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnginePreset {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user-interactive" | "user_interactive" => Ok(EnginePreset::UserInteractive),
            "data-batch" | "data_batch" => Ok(EnginePreset::DataBatch),
            "mcp-enabled" | "mcp_enabled" | "tool-integrated" | "tool_integrated" => {
                Ok(EnginePreset::ToolIntegrated)
            }
            other => Err(EngineError::ConfigError(format!(
                "Unknown engine preset: {}",
                other
            ))),
        }
    }
}

/// Builds engines from presets around an injected registry and transport
pub struct EngineFactory {
    registry: Arc<dyn AgentRegistry>,
    transport: Option<Arc<dyn EventTransport>>,
    tool_servers: Vec<String>,
    optimized_agents: Vec<String>,
}

impl EngineFactory {
    pub fn new(registry: Arc<dyn AgentRegistry>, transport: Option<Arc<dyn EventTransport>>) -> Self {
        Self {
            registry,
            transport,
            tool_servers: Vec::new(),
            optimized_agents: Vec::new(),
        }
    }

    /// Tool servers advertised by the tool-integrated preset
    pub fn with_tool_servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_servers = servers.into_iter().map(Into::into).collect();
        self
    }

    /// Agents the data-batch preset optimizes and caches
    pub fn with_optimized_agents<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optimized_agents = agents.into_iter().map(Into::into).collect();
        self
    }

    /// Engine with the preset's configuration on top of the defaults
    pub async fn create(&self, preset: EnginePreset) -> Result<Arc<ExecutionEngine>> {
        self.create_with_config(preset, preset.configure(EngineConfig::default()))
            .await
    }

    /// Engine with the preset's extensions and the caller's configuration
    pub async fn create_with_config(
        &self,
        preset: EnginePreset,
        config: EngineConfig,
    ) -> Result<Arc<ExecutionEngine>> {
        let extensions = self.extensions_for(preset, &config);
        info!(
            "Creating {} engine with {} extensions",
            preset,
            extensions.len()
        );

        let mut builder = ExecutionEngine::builder(config)
            .registry(Arc::clone(&self.registry))
            .extensions(extensions);
        if let Some(transport) = &self.transport {
            builder = builder.transport(Arc::clone(transport));
        }

        Ok(Arc::new(builder.build().await?))
    }

    pub fn create_request_scoped(
        &self,
        engine: Arc<ExecutionEngine>,
        request_id: impl Into<String>,
        user_id: Option<String>,
    ) -> Result<RequestScopedExecutionEngine> {
        if !engine.config().enable_request_scoping {
            return Err(EngineError::ConfigError(
                "Request scoping is disabled for this engine".to_string(),
            ));
        }
        Ok(RequestScopedExecutionEngine::new(engine, request_id, user_id))
    }

    fn extensions_for(
        &self,
        preset: EnginePreset,
        config: &EngineConfig,
    ) -> Vec<Arc<dyn ExecutionExtension>> {
        let mut extensions: Vec<Arc<dyn ExecutionExtension>> = Vec::new();

        let user_limits = config.enable_user_features
            && matches!(preset, EnginePreset::UserInteractive | EnginePreset::ToolIntegrated);
        if user_limits {
            extensions.push(Arc::new(UserConcurrencyExtension::from_config(config)));
        }

        match preset {
            EnginePreset::DataBatch => {
                extensions.push(Arc::new(DomainOptimizationExtension::new(
                    DomainOptimizationConfig {
                        agents: self.optimized_agents.clone(),
                        ..Default::default()
                    },
                )));
            }
            EnginePreset::ToolIntegrated => {
                extensions.push(Arc::new(ToolIntegrationExtension::new(
                    self.tool_servers.iter().cloned(),
                )));
            }
            EnginePreset::UserInteractive => {}
        }

        if config.enable_websocket_events && preset != EnginePreset::DataBatch {
            extensions.push(Arc::new(EventEmissionExtension::new()));
        }

        extensions
    }
}
