use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use ::common::policy::AttachmentPolicy;
use ::common::storage::filesystem::FilesystemBlobStore;
use reqwest::Client;
use reqwest::header::HeaderMap;
use sea_orm::DatabaseConnection;
use serde_json::Value;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use server::config::{AppConfig, CorsConfig, DatabaseConfig, ServerConfig, StorageConfig};
use server::state::AppState;
use server::store::SqlStore;

pub mod routes {
    pub const HEALTH: &str = "/api/v1/health";
    pub const TODOS: &str = "/api/v1/todos";

    pub fn todo(id: i64) -> String {
        format!("/api/v1/todos/{id}")
    }

    pub fn attachments(todo_id: i64) -> String {
        format!("/api/v1/todos/{todo_id}/attachments")
    }

    pub fn attachment(todo_id: i64, attachment_id: i64) -> String {
        format!("/api/v1/todos/{todo_id}/attachments/{attachment_id}")
    }
}

/// A running test server backed by SQLite and a blob directory in a temp dir.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub db: DatabaseConnection,
    pub storage_root: PathBuf,
    _dir: TempDir,
}

/// Parsed HTTP response for test assertions.
pub struct TestResponse {
    pub status: u16,
    pub headers: HeaderMap,
    /// Raw response body as text.
    pub text: String,
    /// Parsed JSON body, or `Null` if the response is not valid JSON.
    pub body: Value,
}

/// One file part of a multipart upload.
pub struct UploadFile<'a> {
    pub name: &'a str,
    pub content_type: &'a str,
    pub data: Vec<u8>,
}

impl<'a> UploadFile<'a> {
    pub fn text(name: &'a str, data: &str) -> Self {
        Self {
            name,
            content_type: "text/plain",
            data: data.as_bytes().to_vec(),
        }
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_policy(AttachmentPolicy::default()).await
    }

    pub async fn spawn_with_policy(policy: AttachmentPolicy) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let storage_root = dir.path().join("storage");

        let db_url = format!("sqlite://{}?mode=rwc", dir.path().join("todo.db").display());
        let mut database = DatabaseConfig::new(db_url);
        database.max_connections = 5;
        database.min_connections = 1;
        database.sqlx_logging = false;

        let app_config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors: CorsConfig {
                    allow_origins: vec![],
                    max_age: 3600,
                },
            },
            database,
            storage: StorageConfig {
                root: storage_root.clone(),
            },
            attachment: policy,
        };

        let db = server::database::init_db(&app_config.database)
            .await
            .expect("Failed to initialize test database");
        let blobs = FilesystemBlobStore::new(storage_root.clone())
            .await
            .expect("Failed to open blob store");

        let state = AppState {
            store: Arc::new(SqlStore::new(db.clone(), Arc::new(blobs))),
            config: app_config,
            shutdown: CancellationToken::new(),
        };

        let app = server::build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: Client::new(),
            db,
            storage_root,
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Directory holding the blobs of a todo.
    pub fn namespace_dir(&self, todo_id: i64) -> PathBuf {
        self.storage_root.join(format!("{todo_id:08}"))
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn patch_json(&self, path: &str, body: &Value) -> TestResponse {
        let res = self
            .client
            .patch(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to send PATCH request");

        TestResponse::from_response(res).await
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .delete(self.url(path))
            .send()
            .await
            .expect("Failed to send DELETE request");

        TestResponse::from_response(res).await
    }

    /// Upload files as repeated `attachments` parts.
    pub async fn upload(&self, todo_id: i64, files: Vec<UploadFile<'_>>) -> TestResponse {
        let mut form = reqwest::multipart::Form::new();
        for file in files {
            let part = reqwest::multipart::Part::bytes(file.data)
                .file_name(file.name.to_string())
                .mime_str(file.content_type)
                .expect("Failed to set MIME type");
            form = form.part("attachments", part);
        }

        let res = self
            .client
            .post(self.url(&routes::attachments(todo_id)))
            .multipart(form)
            .send()
            .await
            .expect("Failed to send multipart upload request");

        TestResponse::from_response(res).await
    }

    /// Create a todo via the API and return its `id`.
    pub async fn create_todo(&self, owner: &str, title: &str) -> i64 {
        let res = self
            .post_json(
                routes::TODOS,
                &serde_json::json!({ "owner": owner, "title": title }),
            )
            .await;
        assert_eq!(res.status, 201, "create_todo failed: {}", res.text);
        res.id()
    }

    /// Current `file_count` of a todo, read through the API.
    pub async fn file_count(&self, todo_id: i64) -> i64 {
        let res = self.get(&routes::todo(todo_id)).await;
        assert_eq!(res.status, 200, "get_todo failed: {}", res.text);
        res.body["file_count"].as_i64().unwrap()
    }
}

impl TestResponse {
    pub async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let headers = res.headers().clone();
        let text = res.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self {
            status,
            headers,
            text,
            body,
        }
    }

    pub fn id(&self) -> i64 {
        self.body["id"]
            .as_i64()
            .expect("response body should contain 'id'")
    }

    pub fn code(&self) -> &str {
        self.body["code"].as_str().unwrap_or_default()
    }
}
