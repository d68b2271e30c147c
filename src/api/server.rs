use crate::api::routes;
use crate::config::Shared;
use crate::controller::Controller;
use axum::Router;
use std::future::Future;
use std::sync::Arc;

#[derive(Clone)]
pub(super) struct AppState {
    pub config: Shared,
    pub controller: Arc<Controller>,
}

/// The RPC API routes, without a listener.
pub fn router(config: Shared, controller: Arc<Controller>) -> Router {
    routes::new(AppState { config, controller })
}

/// Serve the RPC API on the configured bind address.
pub fn new(config: Shared, controller: Arc<Controller>) -> impl Future<Output = hyper::Result<()>> {
    axum::Server::bind(&config.rpc_bind_addr)
        .serve(router(config.clone(), controller).into_make_service())
}
