use ::common::policy::AttachmentPolicy;

use crate::common::{TestApp, UploadFile, routes};

mod upload {
    use super::*;

    #[tokio::test]
    async fn stores_files_and_raises_count() {
        let app = TestApp::spawn().await;
        let id = app.create_todo("alice", "Receipts").await;

        let res = app
            .upload(
                id,
                vec![
                    UploadFile::text("first.txt", "one"),
                    UploadFile::text("second.txt", "two"),
                ],
            )
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["todo"]["file_count"], 2);
        let attachments = res.body["attachments"].as_array().unwrap();
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0]["filename"], "first.txt");
        assert_eq!(attachments[0]["todo_id"], id);
        assert!(attachments[0].get("storage_filename").is_none());
        assert_eq!(app.file_count(id).await, 2);
    }

    #[tokio::test]
    async fn unknown_todo_is_not_found() {
        let app = TestApp::spawn().await;

        let res = app.upload(9999, vec![UploadFile::text("a.txt", "a")]).await;

        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn empty_form_is_rejected() {
        let app = TestApp::spawn().await;
        let id = app.create_todo("alice", "Nothing").await;

        let res = app.upload(id, vec![]).await;

        assert_eq!(res.status, 400);
        assert_eq!(app.file_count(id).await, 0);
    }

    #[tokio::test]
    async fn path_components_are_stripped_from_names() {
        let app = TestApp::spawn().await;
        let id = app.create_todo("alice", "Sneaky").await;

        let res = app
            .upload(id, vec![UploadFile::text("../../etc/passwd.txt", "x")])
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        let filename = res.body["attachments"][0]["filename"].as_str().unwrap();
        assert!(filename.ends_with("passwd.txt"));
        assert!(!filename.contains('/'));
        let stored: Vec<_> = std::fs::read_dir(app.namespace_dir(id))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(stored.len(), 1);
        assert!(!stored[0].contains("passwd"));
    }

    #[tokio::test]
    async fn unsupported_media_type_is_rejected() {
        let app = TestApp::spawn().await;
        let id = app.create_todo("alice", "Binaries").await;

        let res = app
            .upload(
                id,
                vec![UploadFile {
                    name: "setup.exe",
                    content_type: "application/x-msdownload",
                    data: vec![0x4d, 0x5a],
                }],
            )
            .await;

        assert_eq!(res.status, 415);
        assert_eq!(res.code(), "UNSUPPORTED_MEDIA_TYPE");
        assert_eq!(app.file_count(id).await, 0);
    }

    #[tokio::test]
    async fn oversized_file_is_rejected() {
        let app = TestApp::spawn_with_policy(AttachmentPolicy {
            max_file_size: 16,
            ..AttachmentPolicy::default()
        })
        .await;
        let id = app.create_todo("alice", "Large").await;

        let res = app
            .upload(id, vec![UploadFile::text("big.txt", "seventeen bytes!!")])
            .await;

        assert_eq!(res.status, 413);
        assert_eq!(res.code(), "PAYLOAD_TOO_LARGE");
        assert_eq!(app.file_count(id).await, 0);
    }

    #[tokio::test]
    async fn batch_over_the_cap_is_rejected() {
        let app = TestApp::spawn().await;
        let id = app.create_todo("alice", "Crowded").await;
        let first = app
            .upload(
                id,
                ["a.txt", "b.txt", "c.txt", "d.txt"]
                    .into_iter()
                    .map(|name| UploadFile::text(name, "x"))
                    .collect(),
            )
            .await;
        assert_eq!(first.status, 201, "{}", first.text);

        let res = app
            .upload(
                id,
                vec![UploadFile::text("e.txt", "x"), UploadFile::text("f.txt", "x")],
            )
            .await;

        assert_eq!(res.status, 413);
        assert_eq!(app.file_count(id).await, 4);
    }

    #[tokio::test]
    async fn full_todo_is_forbidden() {
        let app = TestApp::spawn().await;
        let id = app.create_todo("alice", "Full").await;
        let files = ["1.txt", "2.txt", "3.txt", "4.txt", "5.txt"]
            .into_iter()
            .map(|name| UploadFile::text(name, "x"))
            .collect();
        assert_eq!(app.upload(id, files).await.status, 201);

        let res = app.upload(id, vec![UploadFile::text("6.txt", "x")]).await;

        assert_eq!(res.status, 403);
        assert_eq!(res.code(), "ATTACHMENT_LIMIT");
        assert_eq!(app.file_count(id).await, 5);
    }
}

mod list {
    use super::*;

    #[tokio::test]
    async fn returns_attachments_in_upload_order() {
        let app = TestApp::spawn().await;
        let id = app.create_todo("alice", "Listing").await;
        app.upload(id, vec![UploadFile::text("a.txt", "a")]).await;
        app.upload(id, vec![UploadFile::text("b.txt", "b")]).await;

        let res = app.get(&routes::attachments(id)).await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["total"], 2);
        assert_eq!(res.body["attachments"][0]["filename"], "a.txt");
        assert_eq!(res.body["attachments"][1]["filename"], "b.txt");
    }

    #[tokio::test]
    async fn unknown_todo_is_not_found() {
        let app = TestApp::spawn().await;

        let res = app.get(&routes::attachments(31337)).await;

        assert_eq!(res.status, 404);
    }
}

mod download {
    use super::*;

    #[tokio::test]
    async fn streams_content_with_original_name() {
        let app = TestApp::spawn().await;
        let id = app.create_todo("alice", "Download").await;
        let upload = app
            .upload(id, vec![UploadFile::text("meeting notes.txt", "agenda")])
            .await;
        let attachment_id = upload.body["attachments"][0]["id"].as_i64().unwrap();

        let res = app.get(&routes::attachment(id, attachment_id)).await;

        assert_eq!(res.status, 200);
        assert_eq!(res.text, "agenda");
        assert_eq!(res.headers["content-type"], "text/plain");
        assert_eq!(
            res.headers["content-disposition"],
            "attachment; filename=\"meetingnotes.txt\"; filename*=UTF-8''meeting%20notes.txt"
        );
    }

    #[tokio::test]
    async fn attachment_of_another_todo_is_not_found() {
        let app = TestApp::spawn().await;
        let owner = app.create_todo("alice", "Owner").await;
        let other = app.create_todo("alice", "Other").await;
        let upload = app.upload(owner, vec![UploadFile::text("a.txt", "a")]).await;
        let attachment_id = upload.body["attachments"][0]["id"].as_i64().unwrap();

        let res = app.get(&routes::attachment(other, attachment_id)).await;

        assert_eq!(res.status, 404);
    }
}

mod delete {
    use super::*;

    #[tokio::test]
    async fn removes_once_then_not_found() {
        let app = TestApp::spawn().await;
        let id = app.create_todo("alice", "Cleanup").await;
        let upload = app
            .upload(
                id,
                vec![UploadFile::text("a.txt", "a"), UploadFile::text("b.txt", "b")],
            )
            .await;
        let attachment_id = upload.body["attachments"][0]["id"].as_i64().unwrap();

        let first = app.delete(&routes::attachment(id, attachment_id)).await;
        assert_eq!(first.status, 204);
        assert_eq!(app.file_count(id).await, 1);

        let second = app.delete(&routes::attachment(id, attachment_id)).await;
        assert_eq!(second.status, 404);
        assert_eq!(app.file_count(id).await, 1);

        let remaining = app.get(&routes::attachments(id)).await;
        assert_eq!(remaining.body["total"], 1);
        assert_eq!(remaining.body["attachments"][0]["filename"], "b.txt");
    }

    #[tokio::test]
    async fn freed_slot_can_be_reused() {
        let app = TestApp::spawn().await;
        let id = app.create_todo("alice", "Recycle").await;
        let files = ["1.txt", "2.txt", "3.txt", "4.txt", "5.txt"]
            .into_iter()
            .map(|name| UploadFile::text(name, "x"))
            .collect();
        let upload = app.upload(id, files).await;
        let attachment_id = upload.body["attachments"][4]["id"].as_i64().unwrap();

        assert_eq!(
            app.delete(&routes::attachment(id, attachment_id)).await.status,
            204
        );
        let res = app.upload(id, vec![UploadFile::text("6.txt", "x")]).await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(app.file_count(id).await, 5);
    }
}
