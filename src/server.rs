/// HTTP server factory and configuration.
/// Provides a reusable function to create and configure the HTTP server
/// for use in both the main binary and tests.
use crate::functions::Functions;
use crate::handlers::{
    create_document, delete_document, get_document, health, put_document, submit_rating,
    trigger_cleanup, update_document, Authenticator,
};
use crate::triggers::{RetryPolicy, TriggerDispatcher};
use actix_web::{middleware, web, App, HttpServer};
use std::collections::HashMap;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub functions: web::Data<Functions>,
    pub dispatcher: web::Data<TriggerDispatcher>,
    pub auth: web::Data<Authenticator>,
}

impl AppState {
    /// `tokens` maps bearer token to uid for the callable endpoints.
    pub fn new(functions: Functions, policy: RetryPolicy, tokens: HashMap<String, String>) -> Self {
        AppState {
            dispatcher: web::Data::new(TriggerDispatcher::new(functions.clone(), policy)),
            functions: web::Data::new(functions),
            auth: web::Data::new(Authenticator::new(tokens)),
        }
    }
}

/// Register every route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        // Callable functions
        .route("/callable/submitRating", web::post().to(submit_rating))
        .route("/callable/triggerCleanup", web::post().to(trigger_cleanup))
        // Document API
        .service(
            web::resource("/v1/documents/{path:.*}")
                .route(web::get().to(get_document))
                .route(web::post().to(create_document))
                .route(web::put().to(put_document))
                .route(web::patch().to(update_document))
                .route(web::delete().to(delete_document)),
        );
}

/// Create a configured HTTP server
///
/// # Example
/// ```ignore
/// let state = AppState::new(functions, RetryPolicy::default(), tokens);
/// let server = server::create_http_server(state, "127.0.0.1:4000")?;
/// server.await?;
/// ```
pub fn create_http_server(state: AppState, bind_addr: &str) -> std::io::Result<actix_web::dev::Server> {
    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.functions.clone())
            .app_data(state.dispatcher.clone())
            .app_data(state.auth.clone())
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind(bind_addr)?
    .run();

    Ok(server)
}

/// Create a test HTTP server bound to a random available port
///
/// # Returns
/// A tuple of (server, bind_address) where bind_address can be used to make requests
pub fn create_test_http_server(state: AppState) -> std::io::Result<(actix_web::dev::Server, String)> {
    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.functions.clone())
            .app_data(state.dispatcher.clone())
            .app_data(state.auth.clone())
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .workers(1)
    .bind("127.0.0.1:0")?;

    // Get the actual bind address (including the assigned port)
    let addr_str = server
        .addrs()
        .first()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "No bind address found"))?
        .to_string();

    Ok((server.run(), addr_str))
}
