use rmcp::{
    handler::server::tool::ToolRouter,
    handler::server::wrapper::{Json, Parameters},
    model::*,
    tool, tool_handler, tool_router, Peer, RoleServer, ServerHandler, ServiceExt,
};
use std::sync::Arc;
use tracing::instrument;

use crate::config::PulseConfig;
use crate::embedding::{BackfillConfig, BackfillService, EmbeddingService};
use crate::mcp::error::ToolError;
use crate::mcp::progress::make_mcp_progress;
use crate::mcp::{
    BackfillInput, BackfillResponse, CorpusStatusResponse, SearchFeedbackInput,
    SearchFeedbackResponse, MAX_LIMIT,
};
use crate::repository::RecordStore;
use crate::services::SearchService;

/// MCP server for the feedback corpus.
#[derive(Clone)]
pub struct PulseServer {
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) embedding_service: Arc<dyn EmbeddingService + Send + Sync>,
    pub(crate) search_service: Arc<dyn SearchService>,
    pub(crate) config: PulseConfig,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl PulseServer {
    pub fn new(
        store: Arc<dyn RecordStore>,
        embedding_service: Arc<dyn EmbeddingService + Send + Sync>,
        search_service: Arc<dyn SearchService>,
        config: PulseConfig,
    ) -> Self {
        Self {
            store,
            embedding_service,
            search_service,
            config,
            tool_router: Self::tool_router(),
        }
    }

    /// Create server from shared AppContext.
    pub fn from_context(ctx: &crate::init::AppContext) -> Self {
        Self::new(
            ctx.store.clone(),
            ctx.embedding_service.clone(),
            ctx.search_service.clone(),
            ctx.config.clone(),
        )
    }

    #[tool(
        description = "Answer a question from survey feedback. Returns the most semantically similar feedback forms, formatted as numbered Question/Answer blocks, best match first."
    )]
    #[instrument(name = "mcp.search_feedback", skip_all)]
    pub async fn search_feedback(
        &self,
        request: Parameters<SearchFeedbackInput>,
    ) -> Result<Json<SearchFeedbackResponse>, ToolError> {
        let Parameters(input) = request;
        let top_k = input
            .limit
            .unwrap_or(self.config.search.top_k)
            .min(MAX_LIMIT);

        self.search_service
            .answer_top_k(&input.query, top_k)
            .await
            .map(|answer| Json(answer.into()))
            .map_err(ToolError::from)
    }

    #[tool(
        description = "Compute embeddings for every feedback record that does not have one yet. Safe to re-run: records that already have an embedding are skipped."
    )]
    #[instrument(name = "mcp.backfill_embeddings", skip_all)]
    pub async fn backfill_embeddings(
        &self,
        request: Parameters<BackfillInput>,
        meta: Meta,
        client: Peer<RoleServer>,
    ) -> Result<Json<BackfillResponse>, ToolError> {
        let Parameters(input) = request;
        let progress = make_mcp_progress(&meta, &client);

        let service = BackfillService::new(
            self.store.clone(),
            self.embedding_service.clone(),
            self.backfill_config(&input),
        )
        .with_progress(progress);

        service
            .run()
            .await
            .map(|report| Json(report.into()))
            .map_err(ToolError::from)
    }

    #[tool(
        description = "Corpus status: total records, how many are searchable (embedded) or still waiting for an embedding, and which model produced the stored embeddings."
    )]
    #[instrument(name = "mcp.corpus_status", skip_all)]
    pub async fn corpus_status(&self) -> Result<Json<CorpusStatusResponse>, ToolError> {
        self.search_service
            .status()
            .await
            .map(|status| Json(status.into()))
            .map_err(ToolError::from)
    }
}

impl PulseServer {
    fn backfill_config(&self, input: &BackfillInput) -> BackfillConfig {
        let mut config = self.config.backfill.to_backfill_config();
        if let Some(batch_size) = input.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(parallel) = input.max_parallel_batches {
            config.max_parallel_batches = parallel;
        }
        if let Some(secs) = input.deadline_secs {
            config.deadline = Some(std::time::Duration::from_secs(secs));
        }
        config
    }
}

#[tool_handler]
impl ServerHandler for PulseServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "pulse".to_string(),
                title: Some("Pulse Feedback Search".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                r#"# Pulse Feedback Search

Semantic search over free-text survey feedback.

- search_feedback: Answer a question with the most similar feedback forms
- backfill_embeddings: Embed newly imported feedback (run after imports)
- corpus_status: How much of the corpus is searchable

Only embedded records are searchable. If corpus_status shows embeddable > 0, run backfill_embeddings first."#
                    .to_string(),
            ),
        }
    }
}

/// Run MCP server on stdio transport.
pub async fn run_mcp_server(ctx: crate::init::AppContext) -> anyhow::Result<()> {
    let server = PulseServer::from_context(&ctx);

    tracing::info!("Starting Pulse MCP server v{}", env!("CARGO_PKG_VERSION"));

    let transport = (tokio::io::stdin(), tokio::io::stdout());
    let service = server.serve(transport).await?;
    tracing::info!("MCP server listening on stdio (3 tools)");

    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
        }
    });

    service.waiting().await?;

    tracing::info!("MCP server shutting down");
    Ok(())
}
