use axum::Router;
use serde_json::{json, Value};
use std::net::SocketAddr;
use workload_mutator::{
    config::{Config, MutationMode},
    MutatorServer,
};

pub(crate) fn default_test_config() -> Config {
    Config {
        addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
        tls_config: None,
        mode: MutationMode::Dns,
        controller_namespace: "webhook-demo".to_owned(),
        log_level: "info".to_owned(),
        log_fmt: "json".to_owned(),
        log_no_color: false,
    }
}

pub(crate) async fn app(config: Config) -> Router {
    let server = MutatorServer::new_from_config(config).await.unwrap();

    server.router()
}

/// Wrap `object` into an admission.k8s.io/v1 AdmissionReview
pub(crate) fn admission_review(
    kind: &str,
    namespace: &str,
    operation: &str,
    object: Option<Value>,
) -> String {
    let mut request = json!({
        "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
        "kind": {"group": "", "version": "v1", "kind": kind},
        "resource": {"group": "", "version": "v1", "resource": format!("{}s", kind.to_lowercase())},
        "name": "test",
        "namespace": namespace,
        "operation": operation,
        "userInfo": {"username": "admin", "groups": ["system:authenticated"]},
    });
    if let Some(object) = object {
        request["object"] = object;
    }

    json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": request,
    })
    .to_string()
}

pub(crate) fn load(data: &str) -> Value {
    serde_json::from_str(data).unwrap()
}
