//! MCP progress notifications.
//!
//! Backfill batches are reported to the client as progress notifications when
//! the tool call carries a progress token.

use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::{Meta, ProgressNotificationParam, ProgressToken};
use rmcp::{Peer, RoleServer};

use crate::services::progress::{noop_progress, ProgressReporter};

/// Sends progress notifications to the MCP client.
pub struct McpProgressReporter {
    client: Peer<RoleServer>,
    token: ProgressToken,
}

impl McpProgressReporter {
    pub fn new(client: Peer<RoleServer>, token: ProgressToken) -> Self {
        Self { client, token }
    }
}

#[async_trait]
impl ProgressReporter for McpProgressReporter {
    async fn report(&self, current: f64, total: f64, message: Option<String>) {
        if let Err(e) = self
            .client
            .notify_progress(ProgressNotificationParam {
                progress_token: self.token.clone(),
                progress: current,
                total: Some(total),
                message,
            })
            .await
        {
            tracing::debug!("Dropping progress notification: {}", e);
        }
    }
}

/// Progress reporter for a tool call: MCP notifications when the client sent
/// a progress token, no-op otherwise.
pub fn make_mcp_progress(meta: &Meta, client: &Peer<RoleServer>) -> Arc<dyn ProgressReporter> {
    match meta.get_progress_token() {
        Some(token) => Arc::new(McpProgressReporter::new(client.clone(), token.clone())),
        None => noop_progress(),
    }
}
