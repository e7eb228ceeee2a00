//! Solver service: projects exposed as OpenAI-style models.
//!
//! A [`SolverService`] is an explicit context object built once at startup
//! and shared by reference. It lists the projects known to a
//! [`ProjectDirectory`], maps model ids of the form `<category>/<project>`
//! onto them, and answers queries by running the project's solver pipeline
//! on a [`StreamCoordinator`].
//!
//! ```rust,ignore
//! let service = SolverService::connect(directory, builder, config.service).await?;
//! let completion = service.chat_completion_stream(&request)?;
//! while let Some(frame) = completion.frames.next().await {
//!     sse.send(frame.to_sse()?).await?;
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use serde_json::{Map, Value, json};
use tracing::{info, instrument, warn};

use crate::config::ServiceSection;
use crate::stream::{Pipeline, StreamCoordinator, StreamHandle, StreamSession};
use crate::transport::{Frame, frame_events};
use crate::types::{ChatCompletionRequest, ModelCard, ModelList, Role};
use crate::{HuginError, Result};

/// A project as stored by the directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRecord {
    pub id: String,
    pub namespace: String,
    /// Raw JSON configuration text.
    pub config: String,
}

/// Source of projects and their configurations.
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    /// Address of the backing project service, recorded in synthesized
    /// project sections.
    fn host_addr(&self) -> &str;

    /// All projects, name to id.
    async fn projects(&self) -> Result<BTreeMap<String, String>>;

    /// One project by id, `None` if unknown.
    async fn project(&self, id: &str) -> Result<Option<ProjectRecord>>;
}

/// Builds a runnable pipeline from a project's solver configuration.
pub trait PipelineBuilder: Send + Sync {
    /// `solver` is the project's `solver_pipeline` section, `project` the
    /// whole normalized configuration.
    fn build(&self, solver: &Value, project: &Value) -> Result<Arc<dyn Pipeline>>;
}

impl<F> PipelineBuilder for F
where
    F: Fn(&Value, &Value) -> Result<Arc<dyn Pipeline>> + Send + Sync,
{
    fn build(&self, solver: &Value, project: &Value) -> Result<Arc<dyn Pipeline>> {
        self(solver, project)
    }
}

/// In-memory [`ProjectDirectory`].
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    host_addr: String,
    names: BTreeMap<String, String>,
    records: BTreeMap<String, ProjectRecord>,
}

impl StaticDirectory {
    pub fn new(host_addr: impl Into<String>) -> Self {
        Self {
            host_addr: host_addr.into(),
            ..Self::default()
        }
    }

    /// Add (or replace) a project.
    pub fn with_project(
        mut self,
        name: impl Into<String>,
        id: impl Into<String>,
        namespace: impl Into<String>,
        config: &Value,
    ) -> Self {
        let id = id.into();
        self.names.insert(name.into(), id.clone());
        self.records.insert(
            id.clone(),
            ProjectRecord {
                id,
                namespace: namespace.into(),
                config: config.to_string(),
            },
        );
        self
    }
}

#[async_trait]
impl ProjectDirectory for StaticDirectory {
    fn host_addr(&self) -> &str {
        &self.host_addr
    }

    async fn projects(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.names.clone())
    }

    async fn project(&self, id: &str) -> Result<Option<ProjectRecord>> {
        Ok(self.records.get(id).cloned())
    }
}

/// Bring a stored project configuration into the shape pipelines expect.
///
/// - Without a `project` section one is synthesized from the record
///   (`id`, `host_addr`, `namespace`), taking `language` and `biz_scene`
///   from the `prompt` section, which is removed.
/// - `vectorizer` is copied to `vectorize_model` unless the latter exists.
/// - `project.project_id` is always set to the record's id.
pub fn normalize_project_config(record: &ProjectRecord, host_addr: &str) -> Result<Value> {
    let mut config: Map<String, Value> = match serde_json::from_str::<Value>(&record.config)? {
        Value::Object(map) => map,
        other => {
            return Err(HuginError::Configuration(format!(
                "project {} config must be an object, got {other}",
                record.id
            )));
        }
    };

    if !config.contains_key("project") {
        let mut project = Map::new();
        project.insert("id".to_string(), json!(record.id));
        project.insert("host_addr".to_string(), json!(host_addr));
        project.insert("namespace".to_string(), json!(record.namespace));
        if let Some(Value::Object(prompt)) = config.remove("prompt") {
            for key in ["language", "biz_scene"] {
                if let Some(value) = prompt.get(key) {
                    project.insert(key.to_string(), value.clone());
                }
            }
        }
        config.insert("project".to_string(), Value::Object(project));
    }

    if !config.contains_key("vectorize_model")
        && let Some(vectorizer) = config.get("vectorizer").cloned()
    {
        config.insert("vectorize_model".to_string(), vectorizer);
    }

    match config.get_mut("project") {
        Some(Value::Object(project)) => {
            project.insert("project_id".to_string(), json!(record.id));
        }
        _ => {
            return Err(HuginError::Configuration(format!(
                "project {} has a non-object \"project\" section",
                record.id
            )));
        }
    }

    Ok(Value::Object(config))
}

/// A validated chat request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedQuery {
    pub model: String,
    pub project_name: String,
    pub project_id: String,
    pub query: String,
}

/// A framed completion stream and the control handle of its worker.
pub struct CompletionStream {
    pub frames: BoxStream<'static, Frame>,
    pub handle: StreamHandle,
}

/// Service context shared by all request handlers.
pub struct SolverService {
    directory: Arc<dyn ProjectDirectory>,
    builder: Arc<dyn PipelineBuilder>,
    settings: ServiceSection,
    projects: BTreeMap<String, String>,
    coordinator: StreamCoordinator,
}

impl SolverService {
    /// Load the project list and build the service.
    #[instrument(skip_all, fields(host = directory.host_addr()))]
    pub async fn connect(
        directory: Arc<dyn ProjectDirectory>,
        builder: Arc<dyn PipelineBuilder>,
        settings: ServiceSection,
    ) -> Result<Self> {
        info!("loading projects");
        let projects = directory.projects().await?;
        info!(count = projects.len(), "loaded projects");
        for (name, id) in &projects {
            info!(project = %name, id = %id, "project available");
        }
        Ok(Self {
            directory,
            builder,
            settings,
            projects,
            coordinator: StreamCoordinator::new(),
        })
    }

    /// Project names to ids, as loaded at connect time.
    pub fn projects(&self) -> &BTreeMap<String, String> {
        &self.projects
    }

    pub fn project_id(&self, name: &str) -> Option<&str> {
        self.projects.get(name).map(String::as_str)
    }

    pub fn model_category(&self) -> &str {
        &self.settings.model_category
    }

    /// One model card per project, `<category>/<project>`.
    pub fn list_models(&self) -> ModelList {
        ModelList::new(
            self.projects
                .keys()
                .map(|name| ModelCard::new(format!("{}/{name}", self.model_category())))
                .collect(),
        )
    }

    /// Validate a chat request and map it onto a project.
    pub fn resolve(&self, request: &ChatCompletionRequest) -> Result<ResolvedQuery> {
        let last = match request.messages.last() {
            Some(message) if message.role == Role::User => message,
            Some(message) => {
                return Err(HuginError::InvalidMessages(format!(
                    "last message has role {:?}, expected user",
                    message.role
                )));
            }
            None => return Err(HuginError::InvalidMessages("no messages".to_string())),
        };

        let project_name = request
            .model
            .strip_prefix(self.model_category())
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| HuginError::InvalidModelId(request.model.clone()))?;

        let project_id = self
            .project_id(project_name)
            .ok_or_else(|| HuginError::ProjectNotFound(project_name.to_string()))?;

        Ok(ResolvedQuery {
            model: request.model.clone(),
            project_name: project_name.to_string(),
            project_id: project_id.to_string(),
            query: last.content.clone(),
        })
    }

    /// Answer `query` with the pipeline of project `project_id`.
    ///
    /// Loading the configuration and building the pipeline happen on the
    /// worker; failures there end the stream with an error event like any
    /// pipeline failure.
    #[instrument(skip(self, query))]
    pub fn query(&self, query: impl Into<String>, project_id: &str) -> StreamSession {
        let directory = Arc::clone(&self.directory);
        let builder = Arc::clone(&self.builder);
        let project_id = project_id.to_string();

        self.coordinator
            .spawn(query.into(), move |query, reporter| async move {
                let config = load_project_config(directory.as_ref(), &project_id).await?;
                let solver = config.get("solver_pipeline").ok_or_else(|| {
                    HuginError::Configuration(format!(
                        "project {project_id} has no solver_pipeline config"
                    ))
                })?;
                let pipeline = builder.build(solver, &config)?;
                pipeline.invoke(&query, &reporter).await
            })
    }

    /// Resolve, run and frame a chat request.
    pub fn chat_completion_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<CompletionStream> {
        let resolved = self.resolve(request)?;
        info!(model = %resolved.model, project = %resolved.project_name, "chat completion");
        let (events, handle) = self.query(resolved.query, &resolved.project_id).into_parts();
        Ok(CompletionStream {
            frames: frame_events(resolved.model, events).boxed(),
            handle,
        })
    }

    /// Cancel every running stream.
    pub fn shutdown(&self) {
        self.coordinator.shutdown();
    }
}

async fn load_project_config(directory: &dyn ProjectDirectory, project_id: &str) -> Result<Value> {
    let Some(record) = directory.project(project_id).await? else {
        warn!(project_id, "project vanished from directory");
        return Err(HuginError::ProjectNotFound(project_id.to_string()));
    };
    normalize_project_config(&record, directory.host_addr())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(config: Value) -> ProjectRecord {
        ProjectRecord {
            id: "7".to_string(),
            namespace: "Demo".to_string(),
            config: config.to_string(),
        }
    }

    #[test]
    fn synthesizes_project_section() {
        let config = normalize_project_config(
            &record(json!({
                "prompt": {"language": "en", "biz_scene": "default", "other": 1},
                "vectorizer": {"type": "openai"},
            })),
            "http://spg:8887",
        )
        .unwrap();
        assert_eq!(
            config["project"],
            json!({
                "id": "7",
                "host_addr": "http://spg:8887",
                "namespace": "Demo",
                "language": "en",
                "biz_scene": "default",
                "project_id": "7",
            })
        );
        assert!(config.get("prompt").is_none());
        assert_eq!(config["vectorize_model"], json!({"type": "openai"}));
    }

    #[test]
    fn keeps_existing_sections() {
        let config = normalize_project_config(
            &record(json!({
                "project": {"id": "other", "namespace": "X"},
                "prompt": {"language": "zh"},
                "vectorizer": {"type": "a"},
                "vectorize_model": {"type": "b"},
            })),
            "http://spg:8887",
        )
        .unwrap();
        assert_eq!(
            config["project"],
            json!({"id": "other", "namespace": "X", "project_id": "7"})
        );
        assert_eq!(config["prompt"], json!({"language": "zh"}));
        assert_eq!(config["vectorize_model"], json!({"type": "b"}));
    }

    #[test]
    fn rejects_non_object_config() {
        let result = normalize_project_config(&record(json!([1, 2])), "h");
        assert!(matches!(result, Err(HuginError::Configuration(_))));
    }
}
