//! `owsgate` - OWS gateway in front of a map rendering engine.
//!
//! Initializes the application runtime, loads configuration, sets up logging,
//! and launches the proxy service.

use owsgate::{
    Config, EngineClient, FsProjectStore, HeaderIdentityResolver, LogFormat, OwsGateway, OwsProxy,
};

use pingora::proxy::http_proxy_service;
use pingora::server::Server;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    dotenvy::dotenv().ok();

    let config = Config::from_env();

    let (non_blocking, _guard) = tracing_appender::non_blocking(std::io::stdout());
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(non_blocking);

    match config.log_format {
        LogFormat::Pretty => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    let engine = EngineClient::new(&config).expect("Failed to create engine client");
    let target = engine.target().clone();
    let identity = HeaderIdentityResolver::new(&config.identity_header)
        .expect("IDENTITY_HEADER must be a valid header name");
    let store = FsProjectStore::new(config.projects_root.clone());

    info!(
        listen_addr = %config.listen_addr,
        engine = %target.authority(),
        publish_root = %config.publish_root,
        projects_root = %config.projects_root.display(),
        log_format = ?config.log_format,
        "Server initialized"
    );

    let gateway = OwsGateway::new(
        &config,
        &target,
        Arc::new(store),
        Arc::new(identity),
        Arc::new(engine),
    );

    let mut server = Server::new(None).expect("Failed to create Pingora server");
    server.bootstrap();

    let proxy = OwsProxy::new(config.clone(), Arc::new(gateway), target);
    let mut proxy_service = http_proxy_service(&server.configuration, proxy);
    proxy_service.add_tcp(&config.listen_addr.to_string());
    server.add_service(proxy_service);

    server.run_forever();
}
