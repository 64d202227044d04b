use actix_web::{web, HttpResponse};

use crate::metrics;

pub mod conversations;
pub mod files;
pub mod messages;
pub mod users;
pub mod wsroute;

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

/// Every HTTP and WebSocket route of the service.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(conversations::create_conversation)
        .service(conversations::list_conversations)
        .service(conversations::get_conversation)
        .service(conversations::get_messages)
        .service(conversations::send_message)
        .service(messages::search_messages)
        .service(messages::edit_message)
        .service(messages::delete_message)
        .service(messages::add_reaction)
        .service(messages::remove_reaction)
        .service(messages::forward_message)
        .service(users::search_users)
        .service(users::get_me)
        .service(users::update_me)
        .service(files::upload_file)
        .service(files::delete_file)
        .service(wsroute::ws_handler)
        .route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics::metrics_handler));
}
