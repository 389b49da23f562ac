use k8s_openapi::{
    api::core::v1::{Container, HTTPGetAction, Probe},
    apimachinery::pkg::util::intstr::IntOrString,
};

use super::{
    workload::{Workload, WorkloadKind},
    Mutation, MutationRule, RuleRequest,
};
use crate::{errors::RuleError, patch, policy_store::PolicySnapshot};

const DEFAULT_PROBE_PORT: i32 = 80;
const PROBE_PATH: &str = "/";
const PROBE_INITIAL_DELAY_SECONDS: i32 = 60;
const PROBE_TIMEOUT_SECONDS: i32 = 5;
const PROBE_FAILURE_THRESHOLD: i32 = 3;
const PROBE_SUCCESS_THRESHOLD: i32 = 1;
const PROBE_PERIOD_SECONDS: i32 = 10;

/// Inject an HTTP readiness and liveness probe into every container that
/// lacks one.
///
/// The probes target the first port declared by the container, port 80 when
/// none is declared. The whole containers array is replaced by a single
/// operation, even when no container needed a probe.
#[derive(Clone, Copy, Debug)]
pub struct SecurityDefaultsRule {
    kind: WorkloadKind,
}

impl SecurityDefaultsRule {
    pub fn new(kind: WorkloadKind) -> Self {
        Self { kind }
    }
}

impl MutationRule for SecurityDefaultsRule {
    fn mutate(
        &self,
        request: &RuleRequest<'_>,
        _policy: &PolicySnapshot,
    ) -> Result<Mutation, RuleError> {
        let Some(workload) = Workload::from_request(self.kind, request)? else {
            return Ok(Mutation::Unchanged);
        };
        let Some(spec) = workload.pod_spec() else {
            return Ok(Mutation::Unchanged);
        };

        let containers: Vec<Container> = spec
            .containers
            .iter()
            .cloned()
            .map(with_default_probes)
            .collect();
        let value = serde_json::to_value(&containers).map_err(|source| RuleError::Encode {
            kind: self.kind.to_string(),
            source,
        })?;

        Ok(Mutation::Patch(patch::replace(
            self.kind.containers_path().iter().copied(),
            value,
        )))
    }
}

fn with_default_probes(mut container: Container) -> Container {
    let port = container
        .ports
        .as_ref()
        .and_then(|ports| ports.first())
        .map_or(DEFAULT_PROBE_PORT, |port| port.container_port);

    if container.readiness_probe.is_none() {
        container.readiness_probe = Some(default_probe(port));
    }
    if container.liveness_probe.is_none() {
        container.liveness_probe = Some(default_probe(port));
    }
    container
}

fn default_probe(port: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(PROBE_PATH.to_owned()),
            port: IntOrString::Int(port),
            ..Default::default()
        }),
        initial_delay_seconds: Some(PROBE_INITIAL_DELAY_SECONDS),
        timeout_seconds: Some(PROBE_TIMEOUT_SECONDS),
        failure_threshold: Some(PROBE_FAILURE_THRESHOLD),
        success_threshold: Some(PROBE_SUCCESS_THRESHOLD),
        period_seconds: Some(PROBE_PERIOD_SECONDS),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{admission_request::Operation, rules::test_utils};
    use rstest::rstest;
    use serde_json::json;

    fn expected_probe(port: i32) -> serde_json::Value {
        json!({
            "httpGet": {"path": "/", "port": port},
            "initialDelaySeconds": 60,
            "timeoutSeconds": 5,
            "failureThreshold": 3,
            "successThreshold": 1,
            "periodSeconds": 10
        })
    }

    fn run(kind: WorkloadKind, object: &serde_json::Value) -> json_patch::Patch {
        let raw = serde_json::to_vec(object).unwrap();
        let request = RuleRequest {
            operation: Operation::Create,
            raw_object: Some(&raw),
        };
        match SecurityDefaultsRule::new(kind)
            .mutate(&request, &PolicySnapshot::default())
            .unwrap()
        {
            Mutation::Patch(patch) => patch,
            other => panic!("unexpected mutation {other:?}"),
        }
    }

    #[test]
    fn probes_are_injected_into_pod_containers() {
        let pod = test_utils::pod();
        let patch = run(WorkloadKind::Pod, &pod);

        assert_eq!(patch.0.len(), 1);
        let serialized = serde_json::to_value(&patch).unwrap();
        assert_eq!(serialized[0]["op"], "replace");
        assert_eq!(serialized[0]["path"], "/spec/containers");

        let patched = test_utils::apply(&pod, &patch);
        let containers = patched["spec"]["containers"].as_array().unwrap();
        assert_eq!(containers.len(), 2);

        // first declared port is used
        assert_eq!(containers[0]["name"], "nginx");
        assert_eq!(containers[0]["readinessProbe"], expected_probe(8080));
        assert_eq!(containers[0]["livenessProbe"], expected_probe(8080));
        assert_eq!(containers[0]["image"], "nginx:1.25");

        // existing probes are never replaced, container order is preserved
        assert_eq!(containers[1]["name"], "sidecar");
        assert_eq!(
            containers[1]["readinessProbe"],
            json!({"exec": {"command": ["true"]}})
        );
        assert_eq!(containers[1]["livenessProbe"], expected_probe(80));
    }

    #[rstest]
    #[case::no_ports(json!({"name": "app", "image": "app"}), 80)]
    #[case::empty_ports(json!({"name": "app", "image": "app", "ports": []}), 80)]
    #[case::single_port(json!({"name": "app", "image": "app", "ports": [{"containerPort": 3000}]}), 3000)]
    fn probe_port(#[case] container: serde_json::Value, #[case] expected_port: i32) {
        let mut deployment = test_utils::deployment();
        deployment["spec"]["template"]["spec"]["containers"] = json!([container]);

        let patch = run(WorkloadKind::Deployment, &deployment);

        let patched = test_utils::apply(&deployment, &patch);
        let container = &patched["spec"]["template"]["spec"]["containers"][0];
        assert_eq!(container["readinessProbe"], expected_probe(expected_port));
        assert_eq!(container["livenessProbe"], expected_probe(expected_port));
    }

    #[test]
    fn containers_are_replaced_even_when_complete() {
        let mut pod = test_utils::pod();
        pod["spec"]["containers"] = json!([{
            "name": "app",
            "image": "app",
            "readinessProbe": {"tcpSocket": {"port": 5432}},
            "livenessProbe": {"tcpSocket": {"port": 5432}}
        }]);

        let patch = run(WorkloadKind::Pod, &pod);

        assert_eq!(patch.0.len(), 1);
        assert_eq!(test_utils::apply(&pod, &patch), pod);
    }
}
