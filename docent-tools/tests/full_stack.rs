//! Full-stack wiring test: registry-built tools feed the classifier, the
//! hierarchical retriever feeds the loop, and one run flows end to end.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_stream::StreamExt;

use docent_core::agent::{
    AgentMode, AgentRequestContext, AgentStage, AgentVisibility, Orchestrator, SolverAgent,
    VerifierAgent,
};
use docent_core::cache::EmbeddingCache;
use docent_core::chat::{ChatClientRegistry, ChatRole, MockChatClient};
use docent_core::classifier::ToolClassifier;
use docent_core::config::{ClassifierConfig, RagConfig};
use docent_core::embeddings::LocalEmbedder;
use docent_core::rag::{HierarchicalRetriever, RagEngine};
use docent_core::scratchpad::InMemoryScratchpadStore;
use docent_core::store::{InMemoryVectorStore, VectorStore};
use docent_core::types::{md, Document};

use docent_tools::{CorpusStatsTool, DateTimeTool, ToolRegistry};

fn para(level: i64, title: Option<&str>, text: &str, page: i64) -> Document {
    let mut meta = HashMap::new();
    meta.insert(md::LEVEL.to_string(), serde_json::json!(level));
    if let Some(t) = title {
        meta.insert(md::TITLE.to_string(), serde_json::json!(t));
    }
    meta.insert("page_number".to_string(), serde_json::json!(page));
    Document::new(text, meta)
}

#[tokio::test]
async fn test_registry_routes_through_classifier_into_a_run() {
    // Corpus + engine.
    let store = Arc::new(InMemoryVectorStore::new(Arc::new(LocalEmbedder::new(1024))));
    let engine = Arc::new(RagEngine::new(
        Arc::clone(&store) as Arc<dyn VectorStore>,
        RagConfig::default(),
    ));
    engine
        .index_hierarchical(vec![
            para(1, Some("Academic Calendar"), "Academic Calendar", 1),
            para(
                0,
                None,
                "Lectures begin on the first Monday of September each year.",
                1,
            ),
        ])
        .await
        .unwrap();

    // Tools, assembled explicitly.
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(DateTimeTool)).unwrap();
    tools
        .register(Arc::new(CorpusStatsTool::new(
            Arc::clone(&store) as Arc<dyn VectorStore>
        )))
        .unwrap();
    assert_eq!(tools.names(), vec!["datetime", "corpus_stats"]);

    let classifier = Arc::new(ToolClassifier::new(
        Arc::new(LocalEmbedder::new(1024)),
        Arc::new(EmbeddingCache::new()),
        tools.all(),
        ClassifierConfig {
            similarity_threshold: 0.05,
            top_n_tools: 2,
            cache_ttl_secs: 3600,
        },
    ));
    classifier.warm_up();

    // Scripted model roles.
    let solver_mock = Arc::new(MockChatClient::new());
    solver_mock.invoke_tool_with(serde_json::json!({}));
    solver_mock.push_response("It is currently early afternoon.");
    let verifier_mock = Arc::new(MockChatClient::new());
    verifier_mock.push_response(r#"{"ok": true, "reasons": [], "requiredChanges": null}"#);

    let mut registry = ChatClientRegistry::new();
    registry.register("groq", ChatRole::Solver, Arc::clone(&solver_mock) as _);
    registry.register("ollama", ChatRole::Verifier, Arc::clone(&verifier_mock) as _);
    let registry = Arc::new(registry);

    let scratchpads = Arc::new(InMemoryScratchpadStore::new(Duration::from_secs(3600)));
    let orchestrator = Arc::new(Orchestrator::new(
        SolverAgent::new(Arc::clone(&registry), classifier, 512),
        VerifierAgent::new(Arc::clone(&registry)),
        Arc::new(HierarchicalRetriever::new(engine)),
        scratchpads as _,
        registry,
        3,
    ));

    let run = orchestrator
        .run(AgentRequestContext::new(
            "conv-full",
            "what time is it now",
            "groq",
            "ollama",
            AgentMode::Blocking,
            AgentVisibility::Trace,
        ))
        .unwrap();
    let events: Vec<_> = run.events.collect().await;

    // The datetime tool was routed, executed, and reported.
    let selection = events
        .iter()
        .find(|e| e.stage == AgentStage::ToolSelection)
        .expect("datetime tool selected");
    assert_eq!(selection.data["tool"], serde_json::json!("datetime"));

    let success = events
        .iter()
        .filter(|e| e.stage == AgentStage::ToolExecution)
        .find(|e| e.data["status"] == serde_json::json!("success"))
        .expect("tool executed");
    assert!(success.data["output_preview"].as_str().unwrap().contains('T'));

    let final_event = events
        .iter()
        .find(|e| e.stage == AgentStage::FinalAnswer)
        .expect("run finishes");
    assert_eq!(final_event.data["tool"], serde_json::json!("datetime"));
    assert_eq!(
        final_event.data["answer"],
        serde_json::json!("It is currently early afternoon.")
    );
}
