use axum::{
    Router,
    routing::{get, post},
};

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub fn routes(config: &AppConfig) -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health::health))
        .nest("/todos", todo_routes(config))
}

fn todo_routes(config: &AppConfig) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::todo::list_todos).post(handlers::todo::create_todo),
        )
        .route(
            "/{id}",
            get(handlers::todo::get_todo)
                .patch(handlers::todo::update_todo)
                .delete(handlers::todo::delete_todo),
        )
        .nest("/{id}/attachments", attachment_routes(config))
}

fn attachment_routes(config: &AppConfig) -> Router<AppState> {
    let upload = Router::new()
        .route(
            "/",
            post(handlers::attachment::upload_attachments)
                .get(handlers::attachment::list_attachments),
        )
        .layer(handlers::attachment::attachment_upload_body_limit(
            &config.attachment,
        ));

    let single = Router::new().route(
        "/{attachment_id}",
        get(handlers::attachment::download_attachment)
            .delete(handlers::attachment::delete_attachment),
    );

    upload.merge(single)
}
