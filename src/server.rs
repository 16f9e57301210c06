use std::sync::Arc;
use std::time::Instant;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::delivery::Proofreader;
use crate::dispatch::http::HttpTransport;
use crate::document::DocumentSource;
use crate::error::ProofreadError;
use crate::progress::TracingProgress;
use crate::render::{self, ResultMeta};
use crate::response::{ToolMetadata, ToolResponse};
use crate::settings::{FileSettings, KEY_API_KEY, KEY_MODEL, SettingsStore, usable_key};
use crate::tools::listmodels::ListModelsResponse;
use crate::tools::proofread::ProofreadRequest;
use crate::tools::settings::{SettingsRequest, SettingsView};

/// Credential and model for one run, resolved once at run start.
#[derive(Clone)]
pub struct RunSettings {
    pub api_key: String,
    pub model: String,
}

#[derive(Clone)]
pub struct ProofpaneServer {
    config: Arc<Config>,
    settings: Arc<dyn SettingsStore>,
    /// Held for the duration of a proofreading run; a second run is refused.
    run_lock: Arc<Mutex<()>>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl ProofpaneServer {
    pub fn new(config: Config) -> Self {
        let settings = Arc::new(FileSettings::open(&config.settings_path));
        Self::with_settings(config, settings)
    }

    pub fn with_settings(config: Config, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            config: Arc::new(config),
            settings,
            run_lock: Arc::new(Mutex::new(())),
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "proofread",
        description = "Proofread a Japanese document: typos, grammar, wording, consistency and structure. Pass the text inline or a file_path. Long documents are split into paragraph blocks and reviewed in order.",
        annotations(read_only_hint = true)
    )]
    async fn proofread(
        &self,
        Parameters(req): Parameters<ProofreadRequest>,
    ) -> Result<CallToolResult, McpError> {
        let source = req
            .source()
            .map_err(|msg| McpError::invalid_params(msg, None))?;
        Ok(self
            .proofread_document(source.as_ref(), &req)
            .await
            .into_call_tool_result())
    }

    #[tool(
        name = "listmodels",
        description = "List chat models available to the configured API key, newest name first.",
        annotations(read_only_hint = true)
    )]
    async fn listmodels(&self) -> Result<CallToolResult, McpError> {
        Ok(self.list_models().await.into_call_tool_result())
    }

    #[tool(
        name = "settings",
        description = "Show the saved API key (masked) and default model. Pass api_key and/or model to change them."
    )]
    async fn settings(
        &self,
        Parameters(req): Parameters<SettingsRequest>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.update_settings(&req).into_call_tool_result())
    }
}

impl ProofpaneServer {
    /// Saved model, else the configured default. `model` wins when given.
    pub fn resolve_model(&self, model: Option<&str>) -> String {
        model
            .map(str::to_string)
            .or_else(|| self.settings.get(KEY_MODEL).filter(|m| !m.trim().is_empty()))
            .unwrap_or_else(|| self.config.default_model.clone())
    }

    pub fn resolve_run(&self, model: Option<&str>) -> Result<RunSettings, ProofreadError> {
        let api_key = usable_key(self.settings.get(KEY_API_KEY))
            .or_else(|| usable_key(self.config.api_key.clone()))
            .ok_or(ProofreadError::MissingApiKey)?;
        Ok(RunSettings {
            api_key,
            model: self.resolve_model(model),
        })
    }

    /// One full run: settings, document, delivery, rendering.
    pub async fn proofread_document(
        &self,
        source: &dyn DocumentSource,
        req: &ProofreadRequest,
    ) -> ToolResponse {
        let start = Instant::now();
        let model = self.resolve_model(req.model());
        let mut metadata = ToolMetadata::new("proofread", &model);

        let Ok(_guard) = self.run_lock.try_lock() else {
            tracing::warn!("proofread refused: a run is already in progress");
            metadata.reason = Some("busy");
            return ToolResponse::error(
                "A proofreading run is already in progress. Wait for it to finish.".to_string(),
                metadata,
            );
        };

        let progress = TracingProgress::new();
        let outcome = async {
            let run = self.resolve_run(req.model())?;
            let mut config = (*self.config).clone();
            if let Some(strategy) = req.strategy {
                config.strategy = strategy.into();
            }
            Proofreader::from_config(&config, &run.api_key)
                .run_document(source, &run.model, &progress)
                .await
        }
        .await;

        metadata.duration_seconds = start.elapsed().as_secs_f64();
        match outcome {
            Ok((document, result)) => {
                let meta = ResultMeta::for_document(&result.model, &document);
                metadata.strategy = Some(result.strategy);
                metadata.blocks = Some(result.blocks);
                metadata.char_count = Some(meta.char_count);
                metadata.line_count = Some(meta.line_count);
                metadata.timestamp = Some(meta.timestamp);
                let html = req.wants_html().then(|| render::to_html(&result.text));
                let response = ToolResponse::success(result.text, metadata);
                match html {
                    Some(html) => response.with_html(html),
                    None => response,
                }
            }
            Err(e) => {
                tracing::warn!(
                    reason = e.reason(),
                    last_progress = progress.last().as_deref().unwrap_or("none"),
                    "proofread failed: {e}"
                );
                metadata.reason = Some(e.reason());
                ToolResponse::error(e.user_message(), metadata)
            }
        }
    }

    pub async fn list_models(&self) -> ToolResponse {
        let start = Instant::now();
        let outcome = async {
            let run = self.resolve_run(None)?;
            let models = HttpTransport::new(&self.config.api_base, &run.api_key)
                .list_models(&self.config.model_prefix)
                .await?;
            Ok::<_, ProofreadError>(ListModelsResponse {
                models,
                current: run.model,
            })
        }
        .await;

        let mut metadata = ToolMetadata::new("listmodels", "none");
        metadata.duration_seconds = start.elapsed().as_secs_f64();
        match outcome {
            Ok(list) => ToolResponse::success(list.to_markdown(), metadata),
            Err(e) => {
                tracing::warn!("listmodels failed: {e}");
                metadata.reason = Some(e.reason());
                ToolResponse::error(e.user_message(), metadata)
            }
        }
    }

    pub fn update_settings(&self, req: &SettingsRequest) -> ToolResponse {
        match self.apply_settings(req) {
            Ok(view) => {
                let metadata = ToolMetadata::new("settings", &view.model);
                ToolResponse::success(view.to_markdown(), metadata)
            }
            Err(e) => {
                tracing::warn!("settings update failed: {e}");
                let mut metadata = ToolMetadata::new("settings", "none");
                metadata.reason = Some(e.reason());
                ToolResponse::error(e.user_message(), metadata)
            }
        }
    }

    fn apply_settings(&self, req: &SettingsRequest) -> Result<SettingsView, ProofreadError> {
        if let Some(key) = req.api_key.as_deref() {
            self.settings.set(KEY_API_KEY, key.trim())?;
            tracing::info!("api key updated");
        }
        if let Some(model) = req.model.as_deref().map(str::trim)
            && !model.is_empty()
        {
            self.settings.set(KEY_MODEL, model)?;
            tracing::info!(model, "default model updated");
        }
        Ok(SettingsView::read(
            self.settings.as_ref(),
            &self.config.default_model,
        ))
    }
}

#[tool_handler]
impl ServerHandler for ProofpaneServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "proofpane".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Proofpane: editorial proofreading of Japanese documents.\n\n\
                 Workflow:\n\
                 1. Call `settings` once with `api_key` (and optionally `model`).\n\
                 2. Call `listmodels` to see which models the key can use.\n\
                 3. Call `proofread` with `text` or `file_path`. Set `html: true` for rendered output.\n\
                    - `strategy: \"streamed\"` sends the whole document in one streamed request.\n\
                    - The default `chunked` strategy splits long documents into blocks and retries transient failures."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
