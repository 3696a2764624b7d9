//! AI generation through the admin API and against a mocked OpenAI endpoint

mod helpers;

use axum::http::StatusCode;
use glossary_common::config::{TomlConfig, OPENAI_API_KEY_ENV};
use glossary_common::db::{get_setting, init_in_memory, OPENAI_API_KEY_SETTING};
use glossary_ingest::build_router;
use glossary_ingest::generation::{
    resolve_api_key, store_api_key, Checkpoint, CompletionClient, GenerationRunner,
    GenerationSettings, NoopObserver, OpenAiClient, RunStatus, SYSTEM_PROMPT,
};
use glossary_common::events::GlossaryEvent;
use glossary_ingest::db::operations::load_operation;
use glossary_ingest::table::SheetTable;
use helpers::{
    get, post_json, test_state, wait_for_terminal, write_glossary_csv, FixedCompletionClient,
    GatedCompletionClient,
};
use serial_test::serial;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{bearer_token, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATED: &str = "Used to prevent overfitting in deep networks.";

fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 120, "completion_tokens": 40, "total_tokens": 160}
    })
}

fn fast_settings() -> GenerationSettings {
    let mut settings = GenerationSettings::default();
    settings.retry_delay = Duration::from_millis(1);
    settings.workers = 2;
    settings.batch_size = 2;
    settings
}

#[tokio::test]
async fn test_openai_client_parses_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(bearer_token("sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(GENERATED)))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiClient::new(
        &format!("{}/v1", server.uri()),
        "sk-test".to_string(),
        Duration::from_secs(5),
        10,
    )
    .unwrap();

    let completion = client
        .complete("gpt-4o-mini", SYSTEM_PROMPT, "For the term \"Dropout\"")
        .await
        .unwrap();
    assert_eq!(completion.content, GENERATED);
    assert_eq!(completion.prompt_tokens, 120);
    assert_eq!(completion.completion_tokens, 40);
}

#[tokio::test]
async fn test_openai_client_reports_http_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let client = OpenAiClient::new(&server.uri(), "sk-test".to_string(), Duration::from_secs(5), 10)
        .unwrap();
    let err = client.complete("m", "s", "u").await.unwrap_err();
    assert!(err.to_string().contains("429"));
}

#[tokio::test]
async fn test_runner_fills_sheet_through_mock_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(GENERATED)))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let input = write_glossary_csv(dir.path());
    let checkpoint = dir.path().join("checkpoint.json");
    let client = OpenAiClient::new(&server.uri(), "sk-test".to_string(), Duration::from_secs(5), 50)
        .unwrap();

    let mut settings = fast_settings();
    settings.prompt_cost_per_1k_tokens = 0.5;
    let report = GenerationRunner::new(&client, settings)
        .run(&input, &checkpoint, &NoopObserver)
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.cells_updated, 2);
    assert!((report.cost_usd - 0.12).abs() < 1e-9);

    let table = SheetTable::load(&input).unwrap();
    assert_eq!(table.cell(0, 4), GENERATED);
    assert_eq!(table.cell(1, 4), GENERATED);
    assert!(Checkpoint::load(&checkpoint).unwrap().contains(2, 4));
}

#[tokio::test]
async fn test_generate_requires_api_key() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_glossary_csv(dir.path());
    let app = build_router(test_state(dir.path(), TomlConfig::default()).await);

    let (status, json) = post_json(
        &app,
        "/api/admin/generate",
        json!({"path": input.to_str().unwrap()}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"]["message"].as_str().unwrap().contains("API key"));
}

#[tokio::test]
async fn test_generate_operation_fills_cells() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_glossary_csv(dir.path());
    let mut config = TomlConfig::default();
    config.generation.retry_delay_secs = 0;

    let client = FixedCompletionClient::new(GENERATED);
    let state = test_state(dir.path(), config)
        .await
        .with_completion_client(client.clone() as Arc<dyn CompletionClient>);
    let pool = state.db.clone();
    let app = build_router(state);

    let (status, json) = post_json(
        &app,
        "/api/admin/generate",
        json!({"path": input.to_str().unwrap(), "mode": "bottomup", "workers": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let id = Uuid::parse_str(json["operation_id"].as_str().unwrap()).unwrap();
    let operation = wait_for_terminal(&pool, id).await;
    assert_eq!(operation.state.as_str(), "COMPLETED", "errors: {:?}", operation.errors);
    assert_eq!(operation.progress.current, 2);
    assert_eq!(client.calls(), 2);

    let table = SheetTable::load(&input).unwrap();
    assert_eq!(table.cell(0, 4), GENERATED);
    assert!(dir.path().join("checkpoint.json").exists());
}

#[tokio::test]
async fn test_cancel_running_generate_stays_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_glossary_csv(dir.path());
    let before = std::fs::read_to_string(&input).unwrap();
    let mut config = TomlConfig::default();
    config.generation.retry_delay_secs = 0;

    let client = GatedCompletionClient::new(GENERATED);
    let state = test_state(dir.path(), config)
        .await
        .with_completion_client(client.clone() as Arc<dyn CompletionClient>);
    let pool = state.db.clone();
    let tokens = state.cancellation_tokens.clone();
    let mut events = state.event_bus.subscribe();
    let app = build_router(state);

    let (status, json) = post_json(
        &app,
        "/api/admin/generate",
        json!({"path": input.to_str().unwrap(), "workers": 1, "batch_size": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id = Uuid::parse_str(json["operation_id"].as_str().unwrap()).unwrap();

    // First cell is in flight, held by the gate
    client.wait_for_calls(1).await;
    let (_, json) = get(&app, &format!("/api/admin/operations/{}", id)).await;
    assert_eq!(json["data"]["state"], "RUNNING");

    let cancel_uri = format!("/api/admin/operations/{}/cancel", id);
    let (status, json) = post_json(&app, &cancel_uri, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["state"], "CANCELLED");

    client.open();
    for _ in 0..250 {
        if !tokens.read().await.contains_key(&id) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!tokens.read().await.contains_key(&id), "executor did not finish");

    // The executor's late progress and final writes must not revive the row
    let operation = wait_for_terminal(&pool, id).await;
    assert_eq!(operation.state.as_str(), "CANCELLED");
    tokio::time::sleep(Duration::from_millis(100)).await;
    let reloaded = load_operation(&pool, id).await.unwrap().unwrap();
    assert_eq!(reloaded.state.as_str(), "CANCELLED");
    assert_eq!(reloaded.ended_at, operation.ended_at);

    // Only the first batch ran; the second was never requested
    assert_eq!(client.calls(), 1);
    assert_ne!(std::fs::read_to_string(&input).unwrap(), before);

    let mut cancelled_events = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, GlossaryEvent::OperationCancelled { .. }) {
            cancelled_events += 1;
        }
        assert!(!matches!(event, GlossaryEvent::OperationCompleted { .. }));
    }
    assert_eq!(cancelled_events, 1);

    let (status, json) = post_json(&app, &cancel_uri, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"]["message"].as_str().unwrap().contains("CANCELLED"));
}

#[tokio::test]
async fn test_generate_rejects_bad_mode_and_excess_runs() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_glossary_csv(dir.path());
    let mut config = TomlConfig::default();
    config.generation.max_concurrent_runs = 1;

    let state = test_state(dir.path(), config)
        .await
        .with_completion_client(FixedCompletionClient::new(GENERATED) as Arc<dyn CompletionClient>);
    let slots = state.generation_slots.clone();
    let app = build_router(state);

    let (status, _) = post_json(
        &app,
        "/api/admin/generate",
        json!({"path": input.to_str().unwrap(), "mode": "sideways"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let _held = slots.try_acquire_owned().unwrap();
    let (status, json) = post_json(
        &app,
        "/api/admin/generate",
        json!({"path": input.to_str().unwrap()}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_generate_rejects_excel() {
    let dir = tempfile::tempdir().unwrap();
    let workbook = dir.path().join("glossary.xlsx");
    std::fs::write(&workbook, b"not really a workbook").unwrap();

    let state = test_state(dir.path(), TomlConfig::default())
        .await
        .with_completion_client(FixedCompletionClient::new(GENERATED) as Arc<dyn CompletionClient>);
    let app = build_router(state);

    let (status, json) = post_json(
        &app,
        "/api/admin/generate",
        json!({"path": workbook.to_str().unwrap()}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"]["message"].as_str().unwrap().contains("Excel"));
}

#[tokio::test]
#[serial]
async fn test_api_key_priority() {
    std::env::remove_var(OPENAI_API_KEY_ENV);
    let pool = init_in_memory().await.unwrap();
    let mut config = TomlConfig::default();
    config.openai.api_key = Some("sk-toml".to_string());

    assert_eq!(
        resolve_api_key(Some(&pool), &config).await.unwrap().as_deref(),
        Some("sk-toml")
    );

    assert!(store_api_key(&pool, "   ").await.is_err());
    store_api_key(&pool, " sk-database\n").await.unwrap();
    assert_eq!(
        get_setting::<String>(&pool, OPENAI_API_KEY_SETTING).await.unwrap().as_deref(),
        Some("sk-database")
    );
    assert_eq!(
        resolve_api_key(Some(&pool), &config).await.unwrap().as_deref(),
        Some("sk-database")
    );

    std::env::set_var(OPENAI_API_KEY_ENV, "sk-environment");
    let resolved = resolve_api_key(Some(&pool), &config).await.unwrap();
    std::env::remove_var(OPENAI_API_KEY_ENV);
    assert_eq!(resolved.as_deref(), Some("sk-environment"));

    config.openai.api_key = None;
    assert_eq!(resolve_api_key(None, &config).await.unwrap(), None);
}
