//! Integration tests for the glossary HTTP API

mod helpers;

use axum::http::StatusCode;
use glossary_common::config::TomlConfig;
use glossary_ingest::build_router;
use helpers::{get, post_json, seed_glossary, test_state, wait_for_terminal, write_glossary_csv};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), TomlConfig::default()).await;
    let app = build_router(state);

    let (status, json) = get(&app, "/api/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["module"], "glossary-ingest");
    assert_eq!(json["database"], "connected");
    assert!(json.get("last_error").is_none());
}

#[tokio::test]
async fn test_terms_pagination_and_category_filter() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), TomlConfig::default()).await;
    seed_glossary(&state.db).await;
    let app = build_router(state);

    let (status, json) = get(&app, "/api/terms?page=1&limit=3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 4);
    assert_eq!(json["data"].as_array().unwrap().len(), 3);
    assert_eq!(json["has_more"], true);
    assert_eq!(json["data"][0]["name"], "Batch Normalization");

    let (_, json) = get(&app, "/api/terms?page=2&limit=3").await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
    assert_eq!(json["has_more"], false);

    let (_, json) = get(&app, "/api/terms?category=c-stats").await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["data"][0]["category_name"], "Statistics");

    let (_, json) = get(&app, "/api/terms?limit=1000").await;
    assert_eq!(json["limit"], 100);
}

#[tokio::test]
async fn test_term_detail_counts_views() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), TomlConfig::default()).await;
    seed_glossary(&state.db).await;
    let app = build_router(state);

    let (status, json) = get(&app, "/api/terms/t-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["name"], "Dropout");
    assert_eq!(json["data"]["category"]["name"], "Deep Learning");
    assert_eq!(json["data"]["subcategories"][0]["name"], "Regularization");
    assert_eq!(json["data"]["view_count"], 1);

    let (_, json) = get(&app, "/api/terms/t-1").await;
    assert_eq!(json["data"]["view_count"], 2);

    let (status, json) = get(&app, "/api/terms/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_category_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), TomlConfig::default()).await;
    seed_glossary(&state.db).await;
    let app = build_router(state);

    let (status, json) = get(&app, "/api/categories").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"][0]["name"], "Deep Learning");
    assert_eq!(json["data"][0]["term_count"], 3);
    assert_eq!(json["data"][1]["term_count"], 1);

    let (status, json) = get(&app, "/api/categories/c-dl").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["description"], "Neural network methods");

    let (_, json) = get(&app, "/api/categories/c-dl/terms?limit=2").await;
    assert_eq!(json["total"], 3);
    assert_eq!(json["has_more"], true);

    let (_, json) = get(&app, "/api/categories/c-dl/subcategories").await;
    assert_eq!(json["data"][0]["name"], "Regularization");
    assert_eq!(json["data"][0]["term_count"], 1);

    let (status, _) = get(&app, "/api/categories/nope/terms").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_search_ranking_and_validation() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), TomlConfig::default()).await;
    seed_glossary(&state.db).await;
    let app = build_router(state);

    let (status, json) = get(&app, "/api/search?q=dropout").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 2);
    // name match before definition-only match
    assert_eq!(json["data"][0]["name"], "Dropout");
    assert_eq!(json["data"][1]["name"], "Weight Decay");

    let (status, json) = get(&app, "/api/search?q=%20%20").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "BAD_REQUEST");

    let (status, _) = get(&app, "/api/search").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_stats() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), TomlConfig::default()).await;
    seed_glossary(&state.db).await;
    let app = build_router(state);

    let (status, json) = get(&app, "/api/admin/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["terms"], 4);
    assert_eq!(json["data"]["categories"], 2);
    assert_eq!(json["data"]["subcategories"], 1);
    assert_eq!(json["data"]["operations"], 0);
}

#[tokio::test]
async fn test_process_rejects_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), TomlConfig::default()).await;
    let app = build_router(state);

    let (status, json) = post_json(
        &app,
        "/api/admin/process",
        json!({"input": "/definitely/not/here.csv", "output": "/tmp/out.json"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);

    let unsupported = dir.path().join("notes.txt");
    std::fs::write(&unsupported, "hello").unwrap();
    let (status, _) = post_json(
        &app,
        "/api/admin/import",
        json!({"path": unsupported.to_str().unwrap()}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_process_operation_imports_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_glossary_csv(dir.path());
    let output = dir.path().join("out").join("dataset.json");
    let state = test_state(dir.path(), TomlConfig::default()).await;
    let pool = state.db.clone();
    let app = build_router(state);

    let (status, json) = post_json(
        &app,
        "/api/admin/process",
        json!({
            "input": input.to_str().unwrap(),
            "output": output.to_str().unwrap(),
            "chunk_size": 1,
            "import_into_database": true
        }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["state"], "PENDING");

    let id = Uuid::parse_str(json["operation_id"].as_str().unwrap()).unwrap();
    let operation = wait_for_terminal(&pool, id).await;
    assert_eq!(operation.state.as_str(), "COMPLETED", "errors: {:?}", operation.errors);
    assert!(output.exists());

    let (_, json) = get(&app, "/api/terms").await;
    assert_eq!(json["total"], 2);

    let (status, json) = get(&app, &format!("/api/admin/operations/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["kind"], "process");
    assert_eq!(json["data"]["state"], "COMPLETED");

    let (_, json) = get(&app, "/api/admin/operations").await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_import_operation_dry_run_and_apply() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_glossary_csv(dir.path());
    let state = test_state(dir.path(), TomlConfig::default()).await;
    let pool = state.db.clone();
    let app = build_router(state);

    let (status, json) = post_json(
        &app,
        "/api/admin/import",
        json!({"path": input.to_str().unwrap(), "dry_run": true}),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id = Uuid::parse_str(json["operation_id"].as_str().unwrap()).unwrap();
    assert_eq!(wait_for_terminal(&pool, id).await.state.as_str(), "COMPLETED");

    let (_, json) = get(&app, "/api/admin/stats").await;
    assert_eq!(json["data"]["terms"], 0);

    let (_, json) = post_json(&app, "/api/admin/import", json!({"path": input.to_str().unwrap()})).await;
    let id = Uuid::parse_str(json["operation_id"].as_str().unwrap()).unwrap();
    assert_eq!(wait_for_terminal(&pool, id).await.state.as_str(), "COMPLETED");

    let (_, json) = get(&app, "/api/search?q=gradient").await;
    assert_eq!(json["data"][0]["name"], "Gradient Descent");
    assert_eq!(json["data"][0]["category_name"], "AI/ML Generated");
    assert!(dir.path().join("import").exists());
}

#[tokio::test]
async fn test_cancel_operation_errors() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_glossary_csv(dir.path());
    let state = test_state(dir.path(), TomlConfig::default()).await;
    let pool = state.db.clone();
    let app = build_router(state);

    let (status, _) = post_json(
        &app,
        &format!("/api/admin/operations/{}/cancel", Uuid::new_v4()),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&app, "/api/admin/operations/not-a-uuid").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, json) = post_json(
        &app,
        "/api/admin/import",
        json!({"path": input.to_str().unwrap(), "dry_run": true}),
    )
    .await;
    let id = Uuid::parse_str(json["operation_id"].as_str().unwrap()).unwrap();
    wait_for_terminal(&pool, id).await;

    let (status, json) = post_json(&app, &format!("/api/admin/operations/{}/cancel", id), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .contains("terminal state"));
}

#[tokio::test]
async fn test_split_operation_writes_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = dir.path().join("dataset.json");
    std::fs::write(
        &dataset,
        json!({
            "categories": [{"id": "c1", "name": "Deep Learning"}],
            "subcategories": [],
            "terms": [{"name": "Dropout"}, {"name": "Adam"}, {"name": "Softmax"}]
        })
        .to_string(),
    )
    .unwrap();
    let chunks = dir.path().join("chunks");

    let state = test_state(dir.path(), TomlConfig::default()).await;
    let pool = state.db.clone();
    let app = build_router(state);

    let csv = write_glossary_csv(dir.path());
    let (status, _) = post_json(
        &app,
        "/api/admin/split",
        json!({"input": csv.to_str().unwrap(), "output_dir": chunks.to_str().unwrap()}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = post_json(
        &app,
        "/api/admin/split",
        json!({
            "input": dataset.to_str().unwrap(),
            "output_dir": chunks.to_str().unwrap(),
            "chunk_size": 2
        }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let id = Uuid::parse_str(json["operation_id"].as_str().unwrap()).unwrap();
    let operation = wait_for_terminal(&pool, id).await;
    assert_eq!(operation.state.as_str(), "COMPLETED", "errors: {:?}", operation.errors);
    assert!(chunks.join("terms_chunk_1.json").exists());
    assert!(chunks.join("terms_chunk_2.json").exists());
    assert!(chunks.join("categories_chunk_1.json").exists());
}
