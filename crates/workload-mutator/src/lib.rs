pub mod admission_request;
pub mod admission_response;
pub mod api;
mod certs;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod patch;
pub mod policy_store;
pub mod rules;
pub mod tracing;

use std::{
    net::SocketAddr,
    process,
    sync::{Arc, RwLock},
};

use ::tracing::{error, info};
use anyhow::Result;
use axum::{
    routing::{any, get},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use lazy_static::lazy_static;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use api::{
    handlers::{handle_panic, mutate_handler, readiness_handler},
    state::ApiServerState,
};
use config::Config;
use dispatcher::Dispatcher;
use policy_store::PolicyStore;

lazy_static! {
    static ref TRACE_SYSTEM_INITIALIZED: RwLock<bool> = RwLock::new(false);
}

pub struct MutatorServer {
    router: Router,
    addr: SocketAddr,
    tls_config: Option<RustlsConfig>,
}

impl MutatorServer {
    pub async fn new_from_config(config: Config) -> Result<Self> {
        let policy_store = Arc::new(PolicyStore::new());
        let dispatcher =
            Dispatcher::for_mode(config.mode, &config.controller_namespace, policy_store);
        info!(
            mode = %config.mode,
            kinds = ?dispatcher.supported_kinds(),
            "mutation rules registered"
        );

        let tls_config = match config.tls_config {
            Some(tls_config) => {
                Some(certs::create_tls_config_and_watch_certificate_changes(tls_config).await?)
            }
            None => None,
        };

        let state = Arc::new(ApiServerState { dispatcher });
        let router = Router::new()
            .route("/mutate", any(mutate_handler))
            .route("/mutatedns", any(mutate_handler))
            .route("/readiness", get(readiness_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CatchPanicLayer::custom(handle_panic));

        Ok(Self {
            router,
            addr: config.addr,
            tls_config,
        })
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub async fn run(self) -> Result<()> {
        info!(
            address = %self.addr,
            tls = self.tls_config.is_some(),
            "started HTTP server"
        );

        let service = self.router.into_make_service();
        match self.tls_config {
            Some(tls_config) => {
                axum_server::bind_rustls(self.addr, tls_config)
                    .serve(service)
                    .await?
            }
            None => axum_server::bind(self.addr).serve(service).await?,
        };

        Ok(())
    }
}

pub fn fatal_error(msg: String) -> ! {
    let trace_system_ready = TRACE_SYSTEM_INITIALIZED
        .read()
        .map(|ready| *ready)
        .unwrap_or_default();
    if trace_system_ready {
        error!("{}", msg);
    } else {
        eprintln!("{msg}");
    }

    process::exit(1);
}

fn mark_trace_system_initialized() {
    if let Ok(mut initialized) = TRACE_SYSTEM_INITIALIZED.write() {
        *initialized = true;
    }
}
