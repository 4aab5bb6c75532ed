use serde_json::json;

use crate::common::{TestApp, UploadFile, routes};

mod health {
    use super::*;

    #[tokio::test]
    async fn reports_ok() {
        let app = TestApp::spawn().await;

        let res = app.get(routes::HEALTH).await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["status"], "ok");
    }
}

mod create {
    use super::*;

    #[tokio::test]
    async fn returns_created_todo_with_empty_attachments() {
        let app = TestApp::spawn().await;

        let res = app
            .post_json(routes::TODOS, &json!({ "owner": "alice", "title": "  Buy milk " }))
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["owner"], "alice");
        assert_eq!(res.body["title"], "Buy milk");
        assert_eq!(res.body["status"], "incomplete");
        assert_eq!(res.body["file_count"], 0);
        assert!(res.body["created_at"].is_string());
        assert!(app.namespace_dir(res.id()).is_dir());
    }

    #[tokio::test]
    async fn rejects_blank_title() {
        let app = TestApp::spawn().await;

        let res = app
            .post_json(routes::TODOS, &json!({ "owner": "alice", "title": "   " }))
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn rejects_overlong_title() {
        let app = TestApp::spawn().await;

        let res = app
            .post_json(
                routes::TODOS,
                &json!({ "owner": "alice", "title": "x".repeat(256) }),
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn rejects_missing_owner() {
        let app = TestApp::spawn().await;

        let res = app
            .post_json(routes::TODOS, &json!({ "owner": "", "title": "Chores" }))
            .await;

        assert_eq!(res.status, 400);
    }

    #[tokio::test]
    async fn rejects_malformed_body() {
        let app = TestApp::spawn().await;

        let res = app
            .post_json(routes::TODOS, &json!({ "title": "no owner field" }))
            .await;

        assert_eq!(res.status, 400);
    }
}

mod read {
    use super::*;

    #[tokio::test]
    async fn get_returns_stored_todo() {
        let app = TestApp::spawn().await;
        let id = app.create_todo("alice", "Water plants").await;

        let res = app.get(&routes::todo(id)).await;

        assert_eq!(res.status, 200);
        assert_eq!(res.id(), id);
        assert_eq!(res.body["title"], "Water plants");
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let app = TestApp::spawn().await;

        let res = app.get(&routes::todo(424242)).await;

        assert_eq!(res.status, 404);
        assert_eq!(res.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn list_filters_by_owner_and_paginates() {
        let app = TestApp::spawn().await;
        for i in 0..3 {
            app.create_todo("alice", &format!("Task {i}")).await;
        }
        app.create_todo("bob", "Other").await;

        let res = app
            .get(&format!("{}?owner=alice&page=1&per_page=2", routes::TODOS))
            .await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["data"].as_array().unwrap().len(), 2);
        assert_eq!(res.body["pagination"]["total"], 3);
        assert_eq!(res.body["pagination"]["total_pages"], 2);
        // Newest first.
        assert_eq!(res.body["data"][0]["title"], "Task 2");

        let second = app
            .get(&format!("{}?owner=alice&page=2&per_page=2", routes::TODOS))
            .await;
        assert_eq!(second.body["data"].as_array().unwrap().len(), 1);
        assert_eq!(second.body["data"][0]["title"], "Task 0");
    }

    #[tokio::test]
    async fn list_without_owner_returns_everything() {
        let app = TestApp::spawn().await;
        app.create_todo("alice", "One").await;
        app.create_todo("bob", "Two").await;

        let res = app.get(routes::TODOS).await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["pagination"]["total"], 2);
        assert_eq!(res.body["pagination"]["per_page"], 20);
    }
}

mod update {
    use super::*;

    #[tokio::test]
    async fn changes_title_and_status() {
        let app = TestApp::spawn().await;
        let id = app.create_todo("alice", "Draft").await;

        let res = app
            .patch_json(
                &routes::todo(id),
                &json!({ "title": " Final ", "status": "complete" }),
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["title"], "Final");
        assert_eq!(res.body["status"], "complete");

        let stored = app.get(&routes::todo(id)).await;
        assert_eq!(stored.body["status"], "complete");
        assert_eq!(stored.body["title"], "Final");
    }

    #[tokio::test]
    async fn status_alone_keeps_title_and_attachments() {
        let app = TestApp::spawn().await;
        let id = app.create_todo("alice", "Keep me").await;
        let upload = app
            .upload(
                id,
                vec![UploadFile::text("a.txt", "a"), UploadFile::text("b.txt", "b")],
            )
            .await;
        assert_eq!(upload.status, 201, "{}", upload.text);

        let res = app
            .patch_json(&routes::todo(id), &json!({ "status": "complete" }))
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["title"], "Keep me");
        assert_eq!(res.body["file_count"], 2);
        assert_eq!(app.file_count(id).await, 2);
        assert_eq!(app.get(&routes::attachments(id)).await.body["total"], 2);
    }

    #[tokio::test]
    async fn unknown_todo_is_not_found() {
        let app = TestApp::spawn().await;

        let res = app
            .patch_json(&routes::todo(777), &json!({ "title": "Ghost" }))
            .await;

        assert_eq!(res.status, 404);
        assert_eq!(res.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn rejects_unknown_status() {
        let app = TestApp::spawn().await;
        let id = app.create_todo("alice", "Status check").await;

        let res = app
            .patch_json(&routes::todo(id), &json!({ "status": "done" }))
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "VALIDATION_ERROR");
        assert_eq!(
            app.get(&routes::todo(id)).await.body["status"],
            "incomplete"
        );
    }

    #[tokio::test]
    async fn rejects_blank_title_and_empty_body() {
        let app = TestApp::spawn().await;
        let id = app.create_todo("alice", "Unchanged").await;

        let blank = app
            .patch_json(&routes::todo(id), &json!({ "title": "  " }))
            .await;
        assert_eq!(blank.status, 400);

        let empty = app.patch_json(&routes::todo(id), &json!({})).await;
        assert_eq!(empty.status, 400);

        assert_eq!(app.get(&routes::todo(id)).await.body["title"], "Unchanged");
    }
}

mod delete {
    use super::*;

    #[tokio::test]
    async fn returns_no_content_then_not_found() {
        let app = TestApp::spawn().await;
        let id = app.create_todo("alice", "Short lived").await;

        let first = app.delete(&routes::todo(id)).await;
        assert_eq!(first.status, 204);

        let second = app.delete(&routes::todo(id)).await;
        assert_eq!(second.status, 404);
        assert_eq!(app.get(&routes::todo(id)).await.status, 404);
    }

    #[tokio::test]
    async fn removes_attachments_and_namespace() {
        let app = TestApp::spawn().await;
        let id = app.create_todo("alice", "With files").await;
        let upload = app
            .upload(
                id,
                vec![UploadFile::text("a.txt", "a"), UploadFile::text("b.txt", "b")],
            )
            .await;
        assert_eq!(upload.status, 201, "{}", upload.text);
        let attachment_id = upload.body["attachments"][0]["id"].as_i64().unwrap();

        let res = app.delete(&routes::todo(id)).await;

        assert_eq!(res.status, 204);
        assert!(!app.namespace_dir(id).exists());
        assert_eq!(app.get(&routes::attachments(id)).await.status, 404);
        assert_eq!(
            app.get(&routes::attachment(id, attachment_id)).await.status,
            404
        );
    }
}
