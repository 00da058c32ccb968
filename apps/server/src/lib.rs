//! Liveness endpoint for the comeback recovery watcher.
//!
//! Hosting platforms only need a 200 on any GET to consider the process
//! alive; the body additionally reports what the polling engine is doing.

#![warn(clippy::all, clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::{App, HttpServer, web};
use tracing::info;

mod error;
mod routes;
mod status;

pub use error::AppError;
pub use status::{StatusSnapshot, StatusSource};

/// Parse a `host:port` pair into a bind address.
///
/// # Errors
///
/// Returns [`AppError::AddrParse`] when the pair is not a socket address.
pub fn bind_address(host: &str, port: u16) -> Result<SocketAddr, AppError> {
    Ok(format!("{host}:{port}").parse()?)
}

/// Bind the liveness server without starting it.
///
/// Signal handling is disabled so the owning process decides when to stop;
/// use [`Server::handle`] to shut it down.
///
/// # Errors
///
/// Returns [`AppError::Bind`] when the address cannot be bound.
pub fn bind_server(addr: SocketAddr, source: Arc<dyn StatusSource>) -> Result<Server, AppError> {
    let data: web::Data<dyn StatusSource> = web::Data::from(source);

    let server = HttpServer::new(move || App::new().app_data(data.clone()).configure(routes::routes))
        .workers(1)
        .disable_signals()
        .bind(addr)
        .map_err(|source| AppError::Bind { addr, source })?
        .run();

    info!(%addr, "liveness endpoint listening");
    Ok(server)
}

/// Register the liveness routes on an existing app, for embedding and tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    routes::routes(cfg);
}
