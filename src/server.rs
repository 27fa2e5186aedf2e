use std::sync::Arc;
use std::time::Instant;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};

use crate::config::Config;
use crate::context::{self, FileContext};
use crate::dispatch::http::HttpDispatch;
use crate::dispatch::registry::Registry;
use crate::error::OuvertError;
use crate::filetree::FileTree;
use crate::history::QueryLog;
use crate::response::{ToolMetadata, ToolResponse};
use crate::runner::{BatchRequest, FanoutRunner};
use crate::session::Session;
use crate::store::UpstashKv;
use crate::tools::ask::{self, AskRequest};
use crate::tools::enums::AskMode;
use crate::tools::filetree::{FileTreeRequest, MAX_LISTED_FILES};
use crate::tools::listmodels::{ListModelsResponse, ModelInfo};
use crate::tools::queries::{self, QueriesRequest};

#[derive(Clone)]
pub struct OuvertServer {
    runner: Arc<FanoutRunner>,
    log: QueryLog,
    registry: Arc<Registry>,
    history_limit: usize,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl OuvertServer {
    pub fn new(config: Config) -> Result<Self, OuvertError> {
        let completion = Arc::new(HttpDispatch::new(
            "groq",
            config.completion_url.clone(),
            config.completion_api_key.clone(),
            config.runner.request_timeout,
        )?);
        let store = Arc::new(UpstashKv::new(config.kv_url.clone(), config.kv_token.clone())?);
        let log = QueryLog::new(store);
        let runner = FanoutRunner::from_config(completion, Some(log.clone()), &config.runner);
        let registry = Registry::new(&config.runner.default_model);

        Ok(Self::from_parts(
            runner,
            log,
            registry,
            config.runner.history_limit,
        ))
    }

    /// Assemble from prebuilt parts (alternate backends, tests).
    pub fn from_parts(
        runner: FanoutRunner,
        log: QueryLog,
        registry: Registry,
        history_limit: usize,
    ) -> Self {
        Self {
            runner: Arc::new(runner),
            log,
            registry: Arc::new(registry),
            history_limit,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "ask",
        description = "Send one prompt to a model N times in parallel and return every response. Each response retries independently. Optional file_paths are read and placed ahead of the prompt; files left out are listed in metadata.files_skipped and metadata.files_errors. Use `listmodels` for model names.",
        annotations(read_only_hint = false)
    )]
    async fn ask(&self, Parameters(req): Parameters<AskRequest>) -> Result<CallToolResult, McpError> {
        self.handle_ask(req)
            .await
            .map(ToolResponse::into_call_tool_result)
    }

    /// Run one `ask` call on its own session, so concurrent calls never
    /// supersede each other.
    pub async fn handle_ask(&self, req: AskRequest) -> Result<ToolResponse, McpError> {
        let start = Instant::now();

        let model = match self.registry.resolve(req.model.as_deref()) {
            Ok(entry) => entry.model_id.clone(),
            Err(e) => {
                return Ok(ToolResponse::error(
                    e.user_message(),
                    ToolMetadata::new("ask", req.model.as_deref().unwrap_or("unknown"), 0.0),
                ));
            }
        };

        let mut file_context = None;
        let mut files = FileContext::default();
        if let Some(ref file_paths) = req.file_paths {
            let wd = req.working_directory.as_deref().ok_or_else(|| {
                McpError::invalid_params(
                    "working_directory is required when file_paths is set",
                    None,
                )
            })?;
            let base_dir = context::validate_working_directory(wd)
                .await
                .map_err(|e| McpError::invalid_params(e.user_message(), None))?;
            files = context::read_selected(
                file_paths,
                &base_dir,
                context::MAX_FILE_CONTEXT_BYTES,
                req.label_paths.unwrap_or(false),
            )
            .await
            .map_err(|e| McpError::invalid_params(e.user_message(), None))?;
            if !files.skipped.is_empty() || !files.errors.is_empty() {
                tracing::warn!(
                    skipped = ?files.skipped,
                    errors = ?files.errors,
                    "some files left out of context"
                );
            }
            // Context was asked for; do not silently run without it.
            if !file_paths.is_empty() && files.is_empty() {
                return Ok(ToolResponse::error(
                    "none of the selected files could be included".to_string(),
                    ToolMetadata::new("ask", &model, start.elapsed().as_secs_f64())
                        .with_file_report(&files),
                ));
            }
            if !files.is_empty() {
                file_context = Some(std::mem::take(&mut files.contents));
            }
        }

        let session = Arc::new(Session::new());
        let format = req.response_format.unwrap_or_default();
        let result = match req.mode.unwrap_or_default() {
            AskMode::Single => {
                let prompt = match &file_context {
                    Some(ctx) => context::inject_context(ctx, &req.prompt),
                    None => req.prompt.clone(),
                };
                self.runner
                    .ask_once(&session, &prompt, &model)
                    .await
                    .map(|slot| {
                        let meta =
                            ToolMetadata::new("ask", &model, start.elapsed().as_secs_f64());
                        (slot.display_text().unwrap_or_default(), meta)
                    })
            }
            AskMode::Fanout => {
                let batch = BatchRequest {
                    count: req.count(),
                    model: model.clone(),
                    context: file_context,
                    prompt: req.prompt,
                };
                self.runner
                    .run_batch(&session, &batch)
                    .await
                    .map(|outcome| {
                        let mut meta =
                            ToolMetadata::new("ask", &model, start.elapsed().as_secs_f64());
                        meta.query_id = outcome.query_id.clone();
                        (ask::to_markdown(&outcome, format), meta)
                    })
            }
        };

        Ok(match result {
            Ok((content, meta)) => ToolResponse::success(content, meta.with_file_report(&files)),
            Err(e) => {
                tracing::warn!("ask failed: {e}");
                ToolResponse::error(
                    e.user_message(),
                    ToolMetadata::new("ask", &model, start.elapsed().as_secs_f64())
                        .with_file_report(&files),
                )
            }
        })
    }

    #[tool(
        name = "queries",
        description = "List the most recently submitted prompts, newest first.",
        annotations(read_only_hint = true)
    )]
    async fn queries(
        &self,
        Parameters(req): Parameters<QueriesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let limit = req.limit_or(self.history_limit);

        let response = match self.log.recent(limit).await {
            Ok(entries) => ToolResponse::success(
                queries::to_markdown(&entries),
                ToolMetadata::new("queries", "none", start.elapsed().as_secs_f64()),
            ),
            Err(e) => {
                tracing::warn!("query log read failed: {e}");
                ToolResponse::error(
                    e.user_message(),
                    ToolMetadata::new("queries", "none", start.elapsed().as_secs_f64()),
                )
            }
        };
        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "listmodels",
        description = "List the selectable models.",
        annotations(read_only_hint = true)
    )]
    async fn listmodels(&self) -> Result<CallToolResult, McpError> {
        let default_model = self.registry.default_model();
        let models = self
            .registry
            .list_models()
            .iter()
            .map(|entry| ModelInfo::new(entry, default_model))
            .collect();
        let content = ListModelsResponse { models }.to_markdown();

        let response =
            ToolResponse::success(content, ToolMetadata::new("listmodels", "none", 0.0));
        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "filetree",
        description = "Show the selectable files under a folder as a tree. Paths from this listing can be passed to `ask` as file_paths.",
        annotations(read_only_hint = true)
    )]
    async fn filetree(
        &self,
        Parameters(req): Parameters<FileTreeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let base_dir = context::validate_working_directory(&req.working_directory)
            .await
            .map_err(|e| McpError::invalid_params(e.user_message(), None))?;
        let files = context::list_files(&base_dir, MAX_LISTED_FILES)
            .await
            .map_err(|e| McpError::internal_error(e.user_message(), None))?;

        let tree = FileTree::build(&files);
        let content = if tree.is_empty() {
            "No selectable files.".to_string()
        } else {
            tree.render()
        };
        let response = ToolResponse::success(
            content,
            ToolMetadata::new("filetree", "none", start.elapsed().as_secs_f64()),
        );
        Ok(response.into_call_tool_result())
    }
}

#[tool_handler]
impl ServerHandler for OuvertServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "ouvert".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Ouvert: ask one model the same question many times in parallel.\n\n\
                 1. `listmodels` for model names.\n\
                 2. `filetree` to see which files in a folder can be attached.\n\
                 3. `ask` with a prompt, a count, and optional file_paths + working_directory.\n\
                 4. `queries` to see recently submitted prompts."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
