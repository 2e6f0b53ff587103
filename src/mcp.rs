use std::{sync::Arc, time::Duration};

use rmcp::{
    ServerHandler,
    ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult,
        Content,
        Implementation,
        ServerCapabilities,
        ServerInfo,
    },
    tool,
    tool_handler,
    tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    embedder::RemoteEmbedder,
    error::{self, Error},
    filter::Categories,
    index::CorpusIndex,
    retrieval::{
        RetrievalOutcome,
        RetrievalParams,
        RetrievalResponse,
        Retriever,
    },
};

const DEFAULT_RETRIEVE_LIMIT: usize = 5;

#[derive(Clone)]
pub struct DongyoMcpServer {
    retriever: Arc<Retriever<RemoteEmbedder>>,
    tool_router: ToolRouter<Self>,
}

impl DongyoMcpServer {
    pub fn new(retriever: Retriever<RemoteEmbedder>) -> Self {
        Self {
            retriever: Arc::new(retriever),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router(router = tool_router)]
impl DongyoMcpServer {
    /// Retrieve reference songs by meaning and keywords.
    #[tool(
        name = "dongyo_retrieve",
        description = "Find children's songs similar to a query. Combines embedding similarity with keyword matches; optional category values narrow the results."
    )]
    pub async fn dongyo_retrieve(
        &self,
        params: Parameters<RetrieveParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let request = RetrievalParams {
            query: params.query,
            top_k: params.limit.unwrap_or(DEFAULT_RETRIEVE_LIMIT),
            categories: params.categories,
            use_hybrid: params.use_hybrid.unwrap_or(true),
            allow_keyword_fallback: params.keyword_fallback.unwrap_or(false),
        };

        let outcome = self.retriever.retrieve(&request).await.map_err(|e| {
            match e {
                Error::InvalidArgument(_) => {
                    rmcp::ErrorData::invalid_params(e.to_string(), None)
                }
                e => mcp_error("retrieval failed", e),
            }
        })?;

        let summary = format_retrieve_summary(&outcome, &request.query);
        let structured = serde_json::to_value(RetrievalResponse::new(
            &request.query,
            &outcome,
        ))
        .map_err(|e| mcp_error("failed to serialize results", e))?;

        let mut result = CallToolResult::success(vec![Content::text(summary)]);
        result.structured_content = Some(structured);
        Ok(result)
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for DongyoMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_server_info(
                Implementation::new("dongyo", env!("CARGO_PKG_VERSION"))
                    .with_title("dongyo MCP"),
            )
            .with_instructions(
                "Use dongyo_retrieve to find reference songs for a theme, mood or phrase. Pass categories such as {\"계절\": \"겨울\"} to prefer matching songs.",
            )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveParams {
    /// Free-text query.
    pub query: String,
    /// Maximum number of songs (default: 5).
    pub limit: Option<usize>,
    /// Category name to value; songs mentioning any value are preferred.
    pub categories: Option<Categories>,
    /// Fuse keyword matches into the ranking (default: true).
    pub use_hybrid: Option<bool>,
    /// Rank by keywords alone if embeddings are unavailable.
    pub keyword_fallback: Option<bool>,
}

fn format_retrieve_summary(outcome: &RetrievalOutcome, query: &str) -> String {
    if outcome.results.is_empty() {
        return format!("No songs found for \"{query}\"");
    }

    let mut lines = Vec::with_capacity(outcome.results.len() + 1);
    let suffix = if outcome.results.len() == 1 { "" } else { "s" };
    lines.push(format!(
        "Found {} song{} for \"{query}\":",
        outcome.results.len(),
        suffix
    ));

    for song in &outcome.results {
        lines.push(format!(
            "{}. #{} {:.3} {}",
            song.rank, song.document_index, song.score, song.title
        ));
    }

    if outcome.semantic_degraded {
        lines.push("(embedding unavailable, ranked by keywords only)".into());
    }

    lines.join("\n")
}

fn mcp_error(message: &str, error: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(
        message.to_string(),
        Some(json!({ "error": error.to_string() })),
    )
}

pub fn run_mcp(
    index: CorpusIndex,
    embedder: RemoteEmbedder,
    embed_timeout: Duration,
) -> error::Result<()> {
    let retriever = Retriever::new(Arc::new(index), embedder, embed_timeout);
    let server = DongyoMcpServer::new(retriever);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    runtime.block_on(async move {
        let transport = rmcp::transport::stdio();
        let running = server.serve(transport).await.map_err(|e| {
            Error::Config(format!("MCP server initialization failed: {e}"))
        })?;
        running
            .waiting()
            .await
            .map_err(|e| Error::Config(format!("MCP server error: {e}")))?;
        Ok(())
    })
}
