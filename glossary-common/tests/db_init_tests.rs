//! Database initialization against a real file

use glossary_common::db::{get_setting, init_database, set_setting};

#[tokio::test]
async fn test_init_database_creates_file_and_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sub").join("glossary.db");

    let pool = init_database(&db_path).await.unwrap();
    assert!(db_path.exists());

    set_setting(&pool, "openai_api_key", "sk-file").await.unwrap();
    sqlx::query("INSERT INTO categories (id, name) VALUES ('c1', 'Machine Learning')")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let key: Option<String> = get_setting(&pool, "openai_api_key").await.unwrap();
    assert_eq!(key.as_deref(), Some("sk-file"));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_duplicate_category_name_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("glossary.db")).await.unwrap();

    sqlx::query("INSERT INTO categories (id, name) VALUES ('c1', 'Nlp')")
        .execute(&pool)
        .await
        .unwrap();
    let duplicate = sqlx::query("INSERT INTO categories (id, name) VALUES ('c2', 'Nlp')")
        .execute(&pool)
        .await;

    assert!(duplicate.is_err());
}
