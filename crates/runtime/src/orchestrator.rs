//! The top-level orchestration façade.
//!
//! Owns the model registry, the assistant runtimes, and the shared
//! conversation memory store. Built once per process (`from_config`) and
//! injected into the request-handling layer; the memory store lives as
//! long as the orchestrator does, so history survives across calls.
//!
//! Locking discipline: the user's memory lock is taken first and held for
//! the whole turn (single-writer-per-user — the turn sequence is
//! order-sensitive), then the runtime lock (setters and invoke on one
//! assistant are mutually exclusive). The order is total, so there is no
//! deadlock between concurrent invocations.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use troupe_config::TroupeConfig;
use troupe_core::assistant::{AssistantDefinition, OutputFormat};
use troupe_core::conversation::Role;
use troupe_core::error::{ConfigurationError, NotFoundError, Result};
use troupe_core::model::{EngineConfig, ModelHandle};
use troupe_engines::ModelRegistry;

use crate::memory::MemoryStore;
use crate::runtime::AssistantRuntime;

/// Per-call changes to an assistant runtime. Every present field is a
/// persistent mutation of the named runtime (the next call inherits it),
/// applied in model → prompt template → language → output format order;
/// the fields are disjoint, so the order only matters for staleness, not
/// precedence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvokeOverrides {
    /// Rebind the runtime to this registered engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,

    /// Replace the base prompt template (e.g. a user's personalized one)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,

    /// Switch the active language directive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Switch the active output format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<OutputFormat>,
}

impl InvokeOverrides {
    pub fn model(mut self, name: impl Into<String>) -> Self {
        self.model_name = Some(name.into());
        self
    }

    pub fn prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = Some(template.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }
}

/// Routes user turns to assistant runtimes and maintains per-user history.
pub struct Orchestrator {
    registry: ModelRegistry,
    runtimes: HashMap<String, Mutex<AssistantRuntime>>,
    memory: MemoryStore,
    max_turns: usize,
    default_language: String,
}

impl Orchestrator {
    /// Create an empty orchestrator with the given history bound.
    pub fn new(max_turns: usize) -> Self {
        Self {
            registry: ModelRegistry::new(),
            runtimes: HashMap::new(),
            memory: MemoryStore::new(),
            max_turns,
            default_language: crate::composer::DEFAULT_LANGUAGE.into(),
        }
    }

    /// Build an orchestrator from loaded configuration: register every
    /// engine, then every active assistant bound to the configured default
    /// model. Fails fast on a misconfigured engine or an unknown default
    /// model; inactive assistants are skipped with a warning.
    pub fn from_config(config: &TroupeConfig) -> Result<Self> {
        let mut orchestrator = Self::new(config.orchestrator.max_turns);
        orchestrator.default_language = config.orchestrator.default_language.clone();

        for engine in &config.engines {
            orchestrator.add_engine(engine.clone())?;
        }

        if config.assistants.is_empty() {
            return Ok(orchestrator);
        }

        let Some(default_model) = config.orchestrator.default_model.as_deref() else {
            return Err(NotFoundError::Model("orchestrator.default_model is not set".into()).into());
        };

        for assistant in &config.assistants {
            if !assistant.active {
                warn!(assistant = %assistant.name, "Skipping inactive assistant");
                continue;
            }
            orchestrator.add_assistant(assistant.clone(), default_model)?;
        }

        info!(
            engines = orchestrator.registry.len(),
            assistants = orchestrator.runtimes.len(),
            max_turns = orchestrator.max_turns,
            "Orchestrator ready"
        );

        Ok(orchestrator)
    }

    /// Register a model backend from its configuration record.
    pub fn add_engine(
        &mut self,
        config: EngineConfig,
    ) -> std::result::Result<ModelHandle, ConfigurationError> {
        self.registry.register(config)
    }

    /// Register a pre-built backend handle (custom backends, test doubles).
    pub fn add_engine_handle(&mut self, name: impl Into<String>, handle: ModelHandle) {
        self.registry.register_handle(name, handle);
    }

    /// Register an assistant bound to the named engine.
    pub fn add_assistant(
        &mut self,
        definition: AssistantDefinition,
        model_name: &str,
    ) -> Result<()> {
        let handle = self.registry.resolve(model_name)?;
        let runtime = AssistantRuntime::new(
            definition.clone(),
            model_name,
            handle,
            self.default_language.clone(),
        );
        self.runtimes
            .insert(definition.name.clone(), Mutex::new(runtime));
        Ok(())
    }

    /// Execute one conversational turn.
    ///
    /// Lookup failures abort before any model call or memory mutation; a
    /// backend failure aborts after the call with nothing recorded. Turns
    /// are persisted (and the history trimmed) only for memory-enabled
    /// assistants.
    pub async fn invoke(
        &self,
        assistant_name: &str,
        user_id: &str,
        user_input: &str,
        overrides: InvokeOverrides,
    ) -> Result<String> {
        let runtime_slot = self
            .runtimes
            .get(assistant_name)
            .ok_or_else(|| NotFoundError::Assistant(assistant_name.to_string()))?;

        // Resolve the override model before touching any state, so an
        // unknown name aborts with nothing mutated.
        let model_override = match &overrides.model_name {
            Some(name) => Some((name.clone(), self.registry.resolve(name)?)),
            None => None,
        };

        let request_id = Uuid::new_v4();
        info!(
            %request_id,
            assistant = %assistant_name,
            user = %user_id,
            "Invoking assistant"
        );

        let memory_handle = self.memory.get_or_create(user_id).await;
        let mut memory = memory_handle.lock().await;
        let mut runtime = runtime_slot.lock().await;

        if let Some((name, handle)) = model_override {
            runtime.set_model(name, handle);
        }
        if let Some(template) = overrides.prompt_template {
            runtime.set_prompt_template(template);
        }
        if let Some(language) = overrides.language {
            runtime.set_language(language);
        }
        if let Some(format) = overrides.output_format {
            runtime.set_output_format(format);
        }

        let history = memory.turns().to_vec();
        let reply = runtime.invoke(user_input, &history).await?;

        if runtime.memory_enabled() {
            memory.record(Role::User, user_input);
            memory.record(Role::Assistant, &reply);
            memory.trim_to(self.max_turns);
            debug!(%request_id, entries = memory.len(), "Recorded turn");
        }

        Ok(reply)
    }

    /// Empty the user's history without removing their slot.
    pub async fn clear_memory(&self, user_id: &str) {
        self.memory.clear(user_id).await;
    }

    /// The shared memory store.
    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// Registered assistant names.
    pub fn assistants(&self) -> Vec<&str> {
        self.runtimes.keys().map(|s| s.as_str()).collect()
    }

    /// Registered engine names.
    pub fn engines(&self) -> Vec<&str> {
        self.registry.list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex as StdMutex};
    use troupe_core::error::{Error, ModelError};
    use troupe_core::model::{ChatModel, ChatRequest};

    /// Test backend recording every request. Replies either echo the user
    /// input or return a fixed string.
    struct RecordingModel {
        name: String,
        fixed_reply: Option<String>,
        calls: StdMutex<Vec<ChatRequest>>,
    }

    impl RecordingModel {
        fn echo(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                fixed_reply: None,
                calls: StdMutex::new(Vec::new()),
            })
        }

        fn fixed(name: &str, reply: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                fixed_reply: Some(reply.into()),
                calls: StdMutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<ChatRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for RecordingModel {
        fn name(&self) -> &str {
            &self.name
        }

        async fn complete(&self, request: ChatRequest) -> std::result::Result<String, ModelError> {
            let reply = match &self.fixed_reply {
                Some(fixed) => fixed.clone(),
                None => format!("echo:{}", request.user_input),
            };
            self.calls.lock().unwrap().push(request);
            Ok(reply)
        }
    }

    struct FailingModel;

    #[async_trait]
    impl ChatModel for FailingModel {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete(&self, _request: ChatRequest) -> std::result::Result<String, ModelError> {
            Err(ModelError::Timeout(120))
        }
    }

    fn orchestrator_with(model: Arc<RecordingModel>, max_turns: usize) -> Orchestrator {
        let mut orchestrator = Orchestrator::new(max_turns);
        orchestrator.add_engine_handle(model.name.clone(), model);
        orchestrator
            .add_assistant(AssistantDefinition::new("coach", "Be helpful."), "mock")
            .unwrap();
        orchestrator
    }

    #[tokio::test]
    async fn unknown_assistant_fails_without_memory_mutation() {
        let orchestrator = orchestrator_with(RecordingModel::echo("mock"), 10);

        let err = orchestrator
            .invoke("ghost", "u1", "hello", InvokeOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(NotFoundError::Assistant(_))));
        assert_eq!(orchestrator.memory().user_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_model_override_fails_without_memory_mutation() {
        let orchestrator = orchestrator_with(RecordingModel::echo("mock"), 10);

        let err = orchestrator
            .invoke(
                "coach",
                "u1",
                "hello",
                InvokeOverrides::default().model("ghost-model"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(NotFoundError::Model(_))));
        assert_eq!(orchestrator.memory().user_count().await, 0);
    }

    #[tokio::test]
    async fn five_turns_with_bound_two_keep_the_last_two() {
        let model = RecordingModel::echo("mock");
        let orchestrator = orchestrator_with(Arc::clone(&model), 2);

        for input in ["a", "b", "c", "d", "e"] {
            orchestrator
                .invoke("coach", "u1", input, InvokeOverrides::default())
                .await
                .unwrap();
        }

        let turns = orchestrator.memory().snapshot("u1").await;
        let texts: Vec<&str> = turns.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, ["d", "echo:d", "e", "echo:e"]);
    }

    #[tokio::test]
    async fn memory_growth_matches_the_bound() {
        let model = RecordingModel::echo("mock");
        let orchestrator = orchestrator_with(Arc::clone(&model), 3);

        for n in 1..=5usize {
            orchestrator
                .invoke("coach", "u1", &format!("turn {n}"), InvokeOverrides::default())
                .await
                .unwrap();
            let expected = (2 * n).min(2 * 3);
            assert_eq!(orchestrator.memory().len("u1").await, expected);
        }
    }

    #[tokio::test]
    async fn memory_disabled_assistant_never_writes() {
        let model = RecordingModel::echo("mock");
        let mut orchestrator = Orchestrator::new(10);
        orchestrator.add_engine_handle("mock", Arc::clone(&model) as ModelHandle);
        orchestrator
            .add_assistant(
                AssistantDefinition::new("emotion", "Classify the mood.").with_memory(false),
                "mock",
            )
            .unwrap();
        orchestrator
            .add_assistant(AssistantDefinition::new("coach", "Be helpful."), "mock")
            .unwrap();

        // Seed history through the memory-enabled assistant.
        orchestrator
            .invoke("coach", "u1", "remember me", InvokeOverrides::default())
            .await
            .unwrap();
        assert_eq!(orchestrator.memory().len("u1").await, 2);

        for _ in 0..3 {
            orchestrator
                .invoke("emotion", "u1", "how do I sound?", InvokeOverrides::default())
                .await
                .unwrap();
        }
        assert_eq!(orchestrator.memory().len("u1").await, 2);

        // The suppressed writes are a persistence policy only: the backend
        // still saw the existing history.
        let last_call = model.calls().last().unwrap().clone();
        assert_eq!(last_call.history.len(), 2);
    }

    #[tokio::test]
    async fn model_override_rebinds_and_persists() {
        let first = RecordingModel::echo("mock");
        let second = RecordingModel::fixed("other", "from other");
        let mut orchestrator = orchestrator_with(Arc::clone(&first), 10);
        orchestrator.add_engine_handle("other", Arc::clone(&second) as ModelHandle);

        let reply = orchestrator
            .invoke(
                "coach",
                "u1",
                "hello",
                InvokeOverrides::default().model("other"),
            )
            .await
            .unwrap();
        assert_eq!(reply, "from other");
        assert_eq!(first.calls().len(), 0);
        assert_eq!(second.calls().len(), 1);

        // The rebind is persistent: the next plain call hits the new model.
        orchestrator
            .invoke("coach", "u1", "again", InvokeOverrides::default())
            .await
            .unwrap();
        assert_eq!(second.calls().len(), 2);
    }

    #[tokio::test]
    async fn language_and_template_overrides_recompose() {
        let model = RecordingModel::echo("mock");
        let orchestrator = orchestrator_with(Arc::clone(&model), 10);

        orchestrator
            .invoke(
                "coach",
                "u1",
                "hello",
                InvokeOverrides::default()
                    .language("zh")
                    .prompt_template("You are a poet."),
            )
            .await
            .unwrap();

        let call = &model.calls()[0];
        assert!(call.system_prompt.starts_with("You are a poet."));
        assert!(call.system_prompt.contains("language 'zh'"));
    }

    #[tokio::test]
    async fn output_format_override_shapes_the_reply() {
        let model = RecordingModel::fixed("mock", "```json\n{\"response\":\"shaped\"}\n```");
        let orchestrator = orchestrator_with(Arc::clone(&model), 10);

        let reply = orchestrator
            .invoke(
                "coach",
                "u1",
                "hello",
                InvokeOverrides::default().output_format(OutputFormat::Json),
            )
            .await
            .unwrap();
        assert_eq!(reply, "shaped");
        // The raw model text is never what lands in memory's assistant turn.
        let turns = orchestrator.memory().snapshot("u1").await;
        assert_eq!(turns[1].text, "shaped");
    }

    #[tokio::test]
    async fn backend_failure_leaves_memory_untouched() {
        let mut orchestrator = Orchestrator::new(10);
        orchestrator.add_engine_handle("failing", Arc::new(FailingModel) as ModelHandle);
        orchestrator
            .add_assistant(AssistantDefinition::new("coach", "Be helpful."), "failing")
            .unwrap();

        let err = orchestrator
            .invoke("coach", "u1", "hello", InvokeOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Model(ModelError::Timeout(_))));
        assert_eq!(orchestrator.memory().len("u1").await, 0);
    }

    #[tokio::test]
    async fn clear_memory_delegates_to_the_store() {
        let orchestrator = orchestrator_with(RecordingModel::echo("mock"), 10);
        orchestrator
            .invoke("coach", "u1", "hello", InvokeOverrides::default())
            .await
            .unwrap();
        assert_eq!(orchestrator.memory().len("u1").await, 2);

        orchestrator.clear_memory("u1").await;
        assert_eq!(orchestrator.memory().len("u1").await, 0);
        assert_eq!(orchestrator.memory().user_count().await, 1);
    }

    #[tokio::test]
    async fn add_assistant_with_unknown_model_fails() {
        let mut orchestrator = Orchestrator::new(10);
        let err = orchestrator
            .add_assistant(AssistantDefinition::new("coach", "Be helpful."), "missing")
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(NotFoundError::Model(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_users_never_corrupt_each_other() {
        const USERS: usize = 4;
        const TURNS: usize = 6;
        const MAX_TURNS: usize = 4;

        let model = RecordingModel::echo("mock");
        let orchestrator = Arc::new(orchestrator_with(model, MAX_TURNS));

        let mut handles = Vec::new();
        for u in 0..USERS {
            let orchestrator = Arc::clone(&orchestrator);
            handles.push(tokio::spawn(async move {
                let user = format!("user-{u}");
                for n in 0..TURNS {
                    orchestrator
                        .invoke("coach", &user, &format!("{user}:{n}"), InvokeOverrides::default())
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for u in 0..USERS {
            let user = format!("user-{u}");
            let turns = orchestrator.memory().snapshot(&user).await;
            assert_eq!(turns.len(), (2 * TURNS).min(2 * MAX_TURNS));
            // Each user's surviving history is exactly their own most
            // recent turns, in order.
            let expected_first = format!("{user}:{}", TURNS - MAX_TURNS);
            assert_eq!(turns[0].text, expected_first);
            for pair in turns.chunks(2) {
                assert_eq!(pair[0].role, Role::User);
                assert_eq!(pair[1].role, Role::Assistant);
                assert!(pair[0].text.starts_with(&user));
                assert_eq!(pair[1].text, format!("echo:{}", pair[0].text));
            }
        }
    }

    #[tokio::test]
    async fn from_config_registers_engines_and_active_assistants() {
        let config: TroupeConfig = toml::from_str(
            r#"
[orchestrator]
max_turns = 4
default_model = "qwen-max"

[[engines]]
name = "qwen-max"
api_key = "sk-test"
base_url = "https://dashscope.aliyuncs.com/compatible-mode/v1"

[[assistants]]
name = "coach"
prompt_template = "You are a supportive coach."

[[assistants]]
name = "retired"
prompt_template = "Old persona."
active = false
"#,
        )
        .unwrap();

        let orchestrator = Orchestrator::from_config(&config).unwrap();
        let mut assistants = orchestrator.assistants();
        assistants.sort_unstable();
        assert_eq!(assistants, ["coach"]);
        assert_eq!(orchestrator.engines(), ["qwen-max"]);
    }

    #[tokio::test]
    async fn from_config_fails_on_unknown_default_model() {
        let config: TroupeConfig = toml::from_str(
            r#"
[orchestrator]
default_model = "missing-engine"

[[assistants]]
name = "coach"
prompt_template = "You are a supportive coach."
"#,
        )
        .unwrap();

        assert!(matches!(
            Orchestrator::from_config(&config),
            Err(Error::NotFound(NotFoundError::Model(_)))
        ));
    }
}
