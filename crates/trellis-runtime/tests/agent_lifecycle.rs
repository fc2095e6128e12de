//! End-to-end run lifecycle tests against a scripted executor.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Notify;
use trellis_core::logging::capture_logs;
use trellis_core::messages::{LlmModel, Message, Prompt, ToolDescriptor};
use trellis_llm::{ExecutorResult, PromptExecutor, ScriptedExecutor, TextChunkStream};
use trellis_pipeline::features::{EventLog, EventLogConfig};
use trellis_pipeline::{
    EventContext, EventKind, Feature, FeatureKey, HandlerError, HandlerRegistrar,
};
use trellis_runtime::{
    AgentContext, AgentOrchestrator, FinalMessage, RuntimeError, Strategy, StrategyBuilder,
};

fn with_log(config: &mut EventLogConfig) {
    config.keep_history = true;
}

/// `start --["X"]--> llmNode --> finish`, where llmNode asks the model.
fn hello_strategy() -> Strategy<String, String> {
    let mut b = StrategyBuilder::<String, String>::new("hello");
    let (start, finish) = (b.start(), b.finish());
    let llm = b.node_fn("llmNode", |text: String, ctx: AgentContext| async move {
        ctx.llm().append_user(text);
        let responses = ctx.llm().request_without_tools().await?;
        Ok::<_, RuntimeError>(
            responses
                .iter()
                .find_map(Message::text)
                .unwrap_or_default()
                .to_owned(),
        )
    });
    b.edge_map(start, llm, |_: &String| "X".to_owned());
    b.forward(llm, finish);
    b.build().unwrap()
}

#[tokio::test]
async fn graph_walk_fires_lifecycle_in_order() {
    let agent = AgentOrchestrator::builder(hello_strategy())
        .executor(ScriptedExecutor::new().with_text("Done"))
        .install::<EventLog>(with_log)
        .unwrap()
        .build()
        .unwrap();

    let result = agent
        .run_and_get_result("Hello, world!".into())
        .await
        .unwrap();
    assert_eq!(result.as_deref(), Some("Done"));

    let log = agent.feature(&EventLog::KEY).unwrap();
    let history = log.history();
    let trace: Vec<String> = history
        .iter()
        .map(|e| match e.node() {
            Some(node) => format!("{}({node})", e.kind()),
            None => e.kind().to_string(),
        })
        .collect();
    assert_eq!(
        trace,
        [
            "AgentStarted",
            "StrategyStarted",
            "BeforeNode(start)",
            "AfterNode(start)",
            "BeforeNode(llmNode)",
            "BeforeLlmCall",
            "AfterLlmCall",
            "AfterNode(llmNode)",
            "StrategyFinished",
            "AgentFinished",
        ]
    );
    assert_matches!(&history[0], EventContext::AgentStarted { input, .. } if input == "Hello, world!");
    assert_matches!(&history[4], EventContext::BeforeNode { input, .. } if input == "X");
    assert_matches!(&history[8], EventContext::StrategyFinished { result, .. } if result == "Done");
    assert_matches!(
        &history[9],
        EventContext::AgentFinished { result: Some(r), strategy, .. } if r == "Done" && strategy == "hello"
    );

    let session = history[0].session_id().to_owned();
    assert!(history.iter().all(|e| e.session_id() == session));
}

#[tokio::test]
async fn system_prompt_seeds_each_run() {
    let executor = Arc::new(ScriptedExecutor::new().with_text("a").with_text("b"));
    let agent = AgentOrchestrator::builder(hello_strategy())
        .executor_arc(executor.clone())
        .system_prompt("Be brief.")
        .build()
        .unwrap();

    let _ = agent.run_and_get_result("one".into()).await.unwrap();
    let _ = agent.run_and_get_result("two".into()).await.unwrap();

    let calls = executor.calls();
    assert_eq!(calls.len(), 2);
    for call in calls {
        assert_eq!(call.prompt.messages, vec![Message::system("Be brief."), Message::user("X")]);
    }
}

/// Holds every call until released.
struct GatedExecutor {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl PromptExecutor for GatedExecutor {
    async fn execute(
        &self,
        _prompt: &Prompt,
        _model: &LlmModel,
        _tools: &[ToolDescriptor],
    ) -> ExecutorResult<Vec<Message>> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(vec![Message::assistant("released")])
    }

    async fn execute_streaming(
        &self,
        _prompt: &Prompt,
        _model: &LlmModel,
    ) -> ExecutorResult<TextChunkStream> {
        Ok(Box::pin(futures::stream::empty()))
    }
}

#[tokio::test]
async fn concurrent_run_is_rejected_without_disturbing_the_first() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let agent = Arc::new(
        AgentOrchestrator::builder(hello_strategy())
            .executor(GatedExecutor {
                entered: entered.clone(),
                release: release.clone(),
            })
            .install::<EventLog>(with_log)
            .unwrap()
            .build()
            .unwrap(),
    );

    let first = tokio::spawn({
        let agent = agent.clone();
        async move { agent.run_and_get_result("first".into()).await }
    });
    entered.notified().await;
    assert!(agent.is_running());
    let running = agent.current_session().unwrap();

    let err = agent.run_and_get_result("second".into()).await.unwrap_err();
    assert_matches!(err, RuntimeError::ConcurrentRun(id) if id == running.as_str());

    release.notify_one();
    let result = first.await.unwrap().unwrap();
    assert_eq!(result.as_deref(), Some("released"));
    assert!(!agent.is_running());

    let log = agent.feature(&EventLog::KEY).unwrap();
    assert_eq!(log.count(EventKind::AgentStarted), 1);
    assert_eq!(log.count(EventKind::AgentFinished), 1);
    assert_eq!(log.count(EventKind::AgentRunError), 0);
}

#[tokio::test]
async fn termination_resolves_exactly_once() {
    let mut b = StrategyBuilder::<String, String>::new("early");
    let (start, finish) = (b.start(), b.finish());
    let early = b.node_fn("early", |_: String, ctx: AgentContext| async move {
        ctx.environment().send_termination(Some("early".into())).await?;
        ctx.environment().send_termination(Some("again".into())).await?;
        Ok::<_, RuntimeError>("late".to_owned())
    });
    b.forward(start, early);
    b.forward(early, finish);

    let agent = AgentOrchestrator::builder(b.build().unwrap())
        .executor(ScriptedExecutor::new())
        .install::<EventLog>(with_log)
        .unwrap()
        .build()
        .unwrap();

    let result = agent.run_and_get_result("go".into()).await.unwrap();
    assert_eq!(result.as_deref(), Some("early"));
    let log = agent.feature(&EventLog::KEY).unwrap();
    assert_eq!(log.count(EventKind::AgentFinished), 1);
    assert_eq!(log.count(EventKind::StrategyFinished), 1);
}

fn delivering(message: Message) -> Strategy<String, String> {
    let mut b = StrategyBuilder::<String, String>::new("deliver");
    let (start, finish) = (b.start(), b.finish());
    let deliver = b.node_fn("deliver", move |s: String, ctx: AgentContext| {
        let message = message.clone();
        async move {
            ctx.environment()
                .deliver_final(FinalMessage::Content(message))
                .await?;
            Ok::<_, RuntimeError>(s)
        }
    });
    b.forward(start, deliver);
    b.forward(deliver, finish);
    b.build().unwrap()
}

#[tokio::test]
async fn malformed_termination_is_a_protocol_violation() {
    let cases = [
        Message::tool_call(None, "search", json!({ "result": "x" })),
        Message::tool_call(None, trellis_runtime::TERMINATION_TOOL, json!({})),
        Message::assistant("all done"),
    ];
    for message in cases {
        let agent = AgentOrchestrator::builder(delivering(message))
            .executor(ScriptedExecutor::new())
            .install::<EventLog>(with_log)
            .unwrap()
            .build()
            .unwrap();

        let err = agent.run_and_get_result("go".into()).await.unwrap_err();
        assert_matches!(err, RuntimeError::ProtocolViolation(_));
        assert!(!agent.is_running());

        let log = agent.feature(&EventLog::KEY).unwrap();
        assert_eq!(log.count(EventKind::AgentFinished), 0);
        assert_matches!(
            log.history().last(),
            Some(EventContext::AgentRunError { category, .. }) if category == "protocol_violation"
        );
    }
}

#[tokio::test]
async fn well_formed_delivery_terminates() {
    let message = Message::tool_call(
        None,
        trellis_runtime::TERMINATION_TOOL,
        json!({ "result": "delivered" }),
    );
    let agent = AgentOrchestrator::builder(delivering(message))
        .executor(ScriptedExecutor::new())
        .build()
        .unwrap();
    let result = agent.run_and_get_result("ignored".into()).await.unwrap();
    assert_eq!(result.as_deref(), Some("delivered"));
}

#[tokio::test]
async fn strategy_failure_resolves_to_none() {
    let agent = AgentOrchestrator::builder(hello_strategy())
        .executor(ScriptedExecutor::new().with_failure("model overloaded"))
        .install::<EventLog>(with_log)
        .unwrap()
        .build()
        .unwrap();

    let result = agent.run_and_get_result("hi".into()).await.unwrap();
    assert!(result.is_none());

    let log = agent.feature(&EventLog::KEY).unwrap();
    assert_eq!(log.count(EventKind::AgentFinished), 0);
    assert_matches!(
        log.history().last(),
        Some(EventContext::AgentRunError { category, error, .. })
            if category == "executor" && error.contains("model overloaded")
    );

    // the session is released, so the agent can run again
    assert!(agent.run_and_get_result("again".into()).await.is_ok());
}

#[derive(Default)]
struct OrderConfig {
    label: &'static str,
    sink: Arc<Mutex<Vec<String>>>,
}

struct FirstFeature(OrderConfig);
struct SecondFeature(OrderConfig);

fn record_on_start(label: &'static str, sink: &Arc<Mutex<Vec<String>>>, registrar: &mut HandlerRegistrar<'_>) {
    let sink = Arc::clone(sink);
    registrar.on_fn(EventKind::AgentStarted, move |_| {
        sink.lock().push(label.to_owned());
        Ok(())
    });
}

impl Feature for FirstFeature {
    type Config = OrderConfig;
    const KEY: FeatureKey<Self> = FeatureKey::new("test.first");

    fn create(config: OrderConfig) -> Self {
        Self(config)
    }

    fn register(feature: &Arc<Self>, registrar: &mut HandlerRegistrar<'_>) {
        record_on_start(feature.0.label, &feature.0.sink, registrar);
    }
}

impl Feature for SecondFeature {
    type Config = OrderConfig;
    const KEY: FeatureKey<Self> = FeatureKey::new("test.second");

    fn create(config: OrderConfig) -> Self {
        Self(config)
    }

    fn register(feature: &Arc<Self>, registrar: &mut HandlerRegistrar<'_>) {
        record_on_start(feature.0.label, &feature.0.sink, registrar);
    }
}

#[tokio::test]
async fn handlers_run_in_install_order() {
    let sink = Arc::new(Mutex::new(Vec::new()));
    let agent = AgentOrchestrator::builder(hello_strategy())
        .executor(ScriptedExecutor::new().with_text("a").with_text("b"))
        .install::<FirstFeature>(|c| {
            c.label = "H1";
            c.sink = sink.clone();
        })
        .unwrap()
        .install::<SecondFeature>(|c| {
            c.label = "H2";
            c.sink = sink.clone();
        })
        .unwrap()
        .build()
        .unwrap();

    agent.run("one".into()).await.unwrap();
    agent.run("two".into()).await.unwrap();
    assert_eq!(*sink.lock(), ["H1", "H2", "H1", "H2"]);
}

struct VetoLlm;

impl Feature for VetoLlm {
    type Config = ();
    const KEY: FeatureKey<Self> = FeatureKey::new("test.veto-llm");

    fn create((): ()) -> Self {
        Self
    }

    fn register(_feature: &Arc<Self>, registrar: &mut HandlerRegistrar<'_>) {
        registrar.on_fn(EventKind::BeforeLlmCall, |_| {
            Err(HandlerError::new("model calls are disabled"))
        });
    }
}

#[tokio::test]
async fn feature_can_veto_a_run() {
    let executor = Arc::new(ScriptedExecutor::new().with_text("never"));
    let agent = AgentOrchestrator::builder(hello_strategy())
        .executor_arc(executor.clone())
        .install::<VetoLlm>(|_| {})
        .unwrap()
        .install::<EventLog>(with_log)
        .unwrap()
        .build()
        .unwrap();

    let result = agent.run_and_get_result("hi".into()).await.unwrap();
    assert!(result.is_none());
    assert!(executor.calls().is_empty());
    let log = agent.feature(&EventLog::KEY).unwrap();
    assert_matches!(
        log.history().last(),
        Some(EventContext::AgentRunError { category, error, .. })
            if category == "pipeline" && error.contains("model calls are disabled")
    );
}

struct VetoFinish;

impl Feature for VetoFinish {
    type Config = ();
    const KEY: FeatureKey<Self> = FeatureKey::new("test.veto-finish");

    fn create((): ()) -> Self {
        Self
    }

    fn register(_feature: &Arc<Self>, registrar: &mut HandlerRegistrar<'_>) {
        registrar.on_fn(EventKind::AgentFinished, |_| {
            Err(HandlerError::new("results are embargoed"))
        });
    }
}

#[tokio::test]
async fn vetoed_finish_resolves_to_none() {
    let agent = AgentOrchestrator::builder(hello_strategy())
        .executor(ScriptedExecutor::new().with_text("Done"))
        .install::<VetoFinish>(|_| {})
        .unwrap()
        .install::<EventLog>(with_log)
        .unwrap()
        .build()
        .unwrap();

    let result = agent.run_and_get_result("hi".into()).await.unwrap();
    assert!(result.is_none());
    let log = agent.feature(&EventLog::KEY).unwrap();
    assert_matches!(
        log.history().last(),
        Some(EventContext::AgentRunError { error, .. }) if error.contains("results are embargoed")
    );
    assert!(!agent.is_running());
}

#[tokio::test]
async fn abort_stops_before_the_next_node() {
    let entered = Arc::new(Notify::new());
    let mut b = StrategyBuilder::<String, String>::new("slow");
    let (start, finish) = (b.start(), b.finish());
    let wait = b.node_fn("wait", {
        let entered = entered.clone();
        move |s: String, ctx: AgentContext| {
            let entered = entered.clone();
            async move {
                entered.notify_one();
                ctx.cancellation().cancelled().await;
                Ok::<_, RuntimeError>(s)
            }
        }
    });
    let after = b.node_fn("after", |s: String, _ctx| async move { Ok::<_, RuntimeError>(s) });
    b.forward(start, wait);
    b.forward(wait, after);
    b.forward(after, finish);

    let agent = Arc::new(
        AgentOrchestrator::builder(b.build().unwrap())
            .executor(ScriptedExecutor::new())
            .install::<EventLog>(with_log)
            .unwrap()
            .build()
            .unwrap(),
    );

    let run = tokio::spawn({
        let agent = agent.clone();
        async move { agent.run_and_get_result("x".into()).await }
    });
    entered.notified().await;
    assert!(agent.abort());

    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(result.is_none());

    let log = agent.feature(&EventLog::KEY).unwrap();
    let visited: Vec<_> = log
        .history()
        .iter()
        .filter(|e| e.kind() == EventKind::BeforeNode)
        .filter_map(|e| e.node().map(str::to_owned))
        .collect();
    assert_eq!(visited, ["start", "wait"]);
    assert_matches!(
        log.history().last(),
        Some(EventContext::AgentRunError { category, .. }) if category == "cancelled"
    );
}

#[tokio::test]
async fn close_shuts_features_down() {
    let agent = AgentOrchestrator::builder(hello_strategy())
        .executor(ScriptedExecutor::new().with_text("ok"))
        .install::<EventLog>(with_log)
        .unwrap()
        .build()
        .unwrap();
    agent.run("hi".into()).await.unwrap();
    assert!(agent.close().is_ok());
}

#[tokio::test]
async fn run_logs_start_and_finish() {
    let (logs, _guard) = capture_logs();
    let agent = AgentOrchestrator::builder(hello_strategy())
        .executor(ScriptedExecutor::new().with_text("ok"))
        .build()
        .unwrap();
    agent.run("hi".into()).await.unwrap();

    assert!(logs.has_message("run started"));
    assert!(logs.has_message("run finished"));
    assert!(logs.has_message("run terminated"));
}
