use db_manager::{DatabaseManager, DbError, SqlParams, params};
use std::sync::Arc;
use tempfile::NamedTempFile;

async fn temp_manager(extra_opts: &str) -> (DatabaseManager, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let url = format!(
        "sqlite:{}?mode=rwc{}",
        temp_file.path().display(),
        extra_opts
    );
    let manager = DatabaseManager::connect(&url, None, false).await.unwrap();
    (manager, temp_file)
}

#[tokio::test]
async fn test_commit_on_success() {
    let (db, _file) = temp_manager("").await;
    db.sql_raw("CREATE TABLE t (n INTEGER)", SqlParams::new())
        .await
        .unwrap();

    db.with_session(|session| async move {
        session.execute("INSERT INTO t (n) VALUES (:n)", &params! { "n" => 1 })
            .await?;
        session.execute("INSERT INTO t (n) VALUES (:n)", &params! { "n" => 2 })
            .await?;
        Ok(())
    })
    .await
    .unwrap();

    let result = db.sql_raw("SELECT n FROM t", SqlParams::new()).await.unwrap();
    assert_eq!(result.row_count(), 2);
}

#[tokio::test]
async fn test_rollback_on_body_error_reverts_all_writes() {
    let (db, _file) = temp_manager("").await;
    db.sql_raw("CREATE TABLE t (n INTEGER)", SqlParams::new())
        .await
        .unwrap();

    let err = db
        .with_session(|session| async move {
            session
                .execute("INSERT INTO t (n) VALUES (1)", &SqlParams::new())
                .await?;
            session
                .execute("INSERT INTO t (n) VALUES (2)", &SqlParams::new())
                .await?;
            // Caller-side failure after two successful writes
            Err::<(), _>(DbError::internal("caller logic failed"))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Internal { .. }));

    // None of the writes are visible, and the slot is gone
    let result = db.sql_raw("SELECT n FROM t", SqlParams::new()).await.unwrap();
    assert!(result.is_empty());
    assert_eq!(db.session_count().await, 0);
}

#[tokio::test]
async fn test_execution_error_rolls_back_and_propagates() {
    let (db, _file) = temp_manager("").await;
    db.sql_raw("CREATE TABLE t (n INTEGER PRIMARY KEY)", SqlParams::new())
        .await
        .unwrap();

    let err = db
        .with_session(|session| async move {
            session
                .execute("INSERT INTO t (n) VALUES (5)", &SqlParams::new())
                .await?;
            // Primary key violation
            session
                .execute("INSERT INTO t (n) VALUES (5)", &SqlParams::new())
                .await?;
            Ok(())
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Database { .. }));

    let result = db.sql_raw("SELECT n FROM t", SqlParams::new()).await.unwrap();
    assert!(result.is_empty());
}

#[tokio::test]
async fn test_session_closed_after_scope_on_both_paths() {
    let (db, _file) = temp_manager("").await;

    let session_handle = db
        .with_session(|session| async move { Ok(session) })
        .await
        .unwrap();
    assert!(!session_handle.is_open().await);
    assert_eq!(db.session_count().await, 0);

    let session_clone = Arc::new(tokio::sync::Mutex::new(None));
    let stash = Arc::clone(&session_clone);
    let _ = db
        .with_session(|session| async move {
            *stash.lock().await = Some(session);
            Err::<(), _>(DbError::internal("boom"))
        })
        .await;
    let stashed = session_clone.lock().await.take().unwrap();
    assert!(!stashed.is_open().await);
    assert_eq!(db.session_count().await, 0);
}

#[tokio::test]
async fn test_nested_scope_reuses_the_context_session() {
    let (db, _file) = temp_manager("").await;
    db.sql_raw("CREATE TABLE t (n INTEGER)", SqlParams::new())
        .await
        .unwrap();

    let db_ref = &db;
    db_ref
        .with_session(|outer| async move {
            let outer_id = outer.id().to_string();
            outer
                .execute("INSERT INTO t (n) VALUES (1)", &SqlParams::new())
                .await?;

            // Same context: the inner scope must see the same session, and
            // the outer scope keeps control of commit/close.
            db_ref
                .with_session(|inner| {
                    let outer_id = outer_id.clone();
                    async move {
                        assert_eq!(inner.id(), outer_id);
                        // Uncommitted write from the same session is visible
                        let seen =
                            inner.fetch_all("SELECT n FROM t", &SqlParams::new()).await?;
                        assert_eq!(seen.row_count(), 1);
                        Ok(())
                    }
                })
                .await?;

            assert!(outer.is_open().await);
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(db.session_count().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_contexts_get_distinct_sessions() {
    let (db, _file) = temp_manager("&max_connections=4").await;
    let db = Arc::new(db);
    db.sql_raw("CREATE TABLE t (ctx TEXT)", SqlParams::new())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..3 {
        let db = Arc::clone(&db);
        handles.push(tokio::spawn(async move {
            db.with_session(|session| async move {
                session
                    .execute(
                        "INSERT INTO t (ctx) VALUES (:c)",
                        &params! { "c" => format!("ctx-{i}") },
                    )
                    .await?;
                Ok(session.id().to_string())
            })
            .await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3, "each context must get its own session");

    // All three commits landed
    let result = db.sql_raw("SELECT ctx FROM t", SqlParams::new()).await.unwrap();
    assert_eq!(result.row_count(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_uncommitted_writes_invisible_across_contexts() {
    let (db, _file) = temp_manager("&max_connections=4").await;
    let db = Arc::new(db);
    db.sql_raw("CREATE TABLE t (n INTEGER)", SqlParams::new())
        .await
        .unwrap();

    let (entered_tx, entered_rx) = tokio::sync::oneshot::channel::<()>();
    let (observed_tx, observed_rx) = tokio::sync::oneshot::channel::<()>();

    let writer = {
        let db = Arc::clone(&db);
        tokio::spawn(async move {
            db.with_session(|session| async move {
                session
                    .execute("INSERT INTO t (n) VALUES (1)", &SqlParams::new())
                    .await?;
                entered_tx.send(()).unwrap();
                // Hold the transaction open until the reader has looked
                observed_rx.await.unwrap();
                Ok(())
            })
            .await
        })
    };

    entered_rx.await.unwrap();
    // Another context must not see the uncommitted row
    let seen = db.sql_raw("SELECT n FROM t", SqlParams::new()).await.unwrap();
    assert!(seen.is_empty(), "dirty read across contexts");
    observed_tx.send(()).unwrap();
    writer.await.unwrap().unwrap();

    // After commit the row is visible everywhere
    let seen = db.sql_raw("SELECT n FROM t", SqlParams::new()).await.unwrap();
    assert_eq!(seen.row_count(), 1);
}

#[tokio::test]
async fn test_session_listing_reports_open_scope() {
    let (db, _file) = temp_manager("").await;

    let db_ref = &db;
    db_ref
        .with_session(|session| async move {
            let listed = db_ref.list_sessions().await;
            assert_eq!(listed.len(), 1);
            assert_eq!(listed[0].session_id, session.id());
            assert_eq!(db_ref.session_count().await, 1);
            Ok(())
        })
        .await
        .unwrap();

    assert!(db.list_sessions().await.is_empty());
    assert_eq!(db.session_count().await, 0);
}
