use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use json_patch::Patch;
use tracing::debug;

use crate::{
    admission_request::AdmissionRequest,
    config::MutationMode,
    errors::DispatchError,
    patch,
    policy_store::PolicyStore,
    rules::{
        DnsConfigRule, DnsPropagationRule, Mutation, MutationRule, QosRule, RuleRequest,
        SecurityDefaultsRule, WorkloadKind, DNS_CONFIG_KIND, QOS_KIND,
    },
};

/// Namespaces whose objects are admitted untouched, whatever the mode.
pub const SYSTEM_NAMESPACES: [&str; 2] = ["kube-public", "kube-system"];

/// Route admission requests to the rule registered for their kind, then turn
/// the rule outcome into a JSON patch.
///
/// Policy updates produced by the config kinds are committed to the
/// [`PolicyStore`] here, so that rules only ever see immutable snapshots.
pub struct Dispatcher {
    rules: BTreeMap<String, Box<dyn MutationRule>>,
    reserved_namespaces: BTreeSet<String>,
    policy_store: Arc<PolicyStore>,
}

impl Dispatcher {
    pub fn new(policy_store: Arc<PolicyStore>) -> Self {
        Self {
            rules: BTreeMap::new(),
            reserved_namespaces: BTreeSet::new(),
            policy_store,
        }
    }

    /// Build the registry served by the given mode.
    pub fn for_mode(
        mode: MutationMode,
        controller_namespace: &str,
        policy_store: Arc<PolicyStore>,
    ) -> Self {
        let mut dispatcher = Self::new(policy_store);
        for namespace in SYSTEM_NAMESPACES {
            dispatcher = dispatcher.reserve_namespace(namespace);
        }

        match mode {
            MutationMode::Dns => dispatcher
                .register(
                    WorkloadKind::Pod.as_str(),
                    DnsPropagationRule::new(WorkloadKind::Pod),
                )
                .register(
                    WorkloadKind::Deployment.as_str(),
                    DnsPropagationRule::new(WorkloadKind::Deployment),
                )
                .register(DNS_CONFIG_KIND, DnsConfigRule)
                .register(QOS_KIND, QosRule),
            MutationMode::SecurityDefaults => dispatcher
                .reserve_namespace(controller_namespace)
                .register(
                    WorkloadKind::Pod.as_str(),
                    SecurityDefaultsRule::new(WorkloadKind::Pod),
                )
                .register(
                    WorkloadKind::Deployment.as_str(),
                    SecurityDefaultsRule::new(WorkloadKind::Deployment),
                ),
        }
    }

    /// Register `rule` for `kind`, replacing any rule previously registered
    /// for it.
    pub fn register(mut self, kind: &str, rule: impl MutationRule + 'static) -> Self {
        self.rules.insert(kind.to_owned(), Box::new(rule));
        self
    }

    pub fn reserve_namespace(mut self, namespace: &str) -> Self {
        self.reserved_namespaces.insert(namespace.to_owned());
        self
    }

    pub fn is_reserved_namespace(&self, namespace: &str) -> bool {
        self.reserved_namespaces.contains(namespace)
    }

    pub fn supported_kinds(&self) -> Vec<String> {
        self.rules.keys().cloned().collect()
    }

    #[cfg(test)]
    pub(crate) fn policy_store(&self) -> &PolicyStore {
        &self.policy_store
    }

    pub fn dispatch(&self, request: &AdmissionRequest) -> Result<Patch, DispatchError> {
        if let Some(namespace) = request
            .namespace
            .as_deref()
            .filter(|namespace| self.is_reserved_namespace(namespace))
        {
            debug!(namespace, "namespace is reserved, skipping mutation");
            return Ok(patch::empty());
        }

        let kind = request.kind.kind.as_str();
        let rule = self
            .rules
            .get(kind)
            .ok_or_else(|| DispatchError::UnsupportedKind {
                kind: kind.to_owned(),
                supported: self.supported_kinds(),
            })?;

        let rule_request = RuleRequest {
            operation: request.operation,
            raw_object: request.raw_object(),
        };
        let mutation = rule.mutate(&rule_request, &self.policy_store.get())?;

        match mutation {
            Mutation::Unchanged => Ok(patch::empty()),
            Mutation::Object { original, mutated } => Ok(patch::diff(&original, &mutated)),
            Mutation::Patch(patch) => Ok(patch),
            Mutation::PolicyUpdate(update) => {
                self.policy_store.apply(update)?;
                Ok(patch::empty())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        admission_request::{GroupVersionKind, Operation},
        errors::RuleError,
        rules::test_utils,
    };
    use rstest::rstest;
    use serde_json::{json, value::RawValue};

    fn request(
        kind: &str,
        namespace: Option<&str>,
        operation: Operation,
        object: Option<serde_json::Value>,
    ) -> AdmissionRequest {
        AdmissionRequest {
            uid: "uid".to_owned(),
            kind: GroupVersionKind {
                group: String::new(),
                version: "v1".to_owned(),
                kind: kind.to_owned(),
            },
            resource: Default::default(),
            sub_resource: None,
            name: Some("test".to_owned()),
            namespace: namespace.map(str::to_owned),
            operation,
            user_info: Default::default(),
            object: object.map(|object| {
                RawValue::from_string(object.to_string()).expect("valid json")
            }),
            old_object: None,
            dry_run: None,
        }
    }

    fn dns_dispatcher() -> Dispatcher {
        Dispatcher::for_mode(MutationMode::Dns, "webhook-demo", Arc::new(PolicyStore::new()))
    }

    fn dns_config(nameservers: &[&str]) -> serde_json::Value {
        json!({
            "apiVersion": "example.com/v1",
            "kind": "DnsConfig",
            "metadata": {"name": "default"},
            "spec": {"nameServers": nameservers, "options": [{"name": "ndots", "value": "2"}]}
        })
    }

    #[rstest]
    #[case::kube_system_pod("Pod", "kube-system", MutationMode::Dns)]
    #[case::kube_public_deployment("Deployment", "kube-public", MutationMode::SecurityDefaults)]
    #[case::controller_namespace("Pod", "webhook-demo", MutationMode::SecurityDefaults)]
    #[case::unknown_kind("Service", "kube-system", MutationMode::Dns)]
    fn reserved_namespaces_are_skipped(
        #[case] kind: &str,
        #[case] namespace: &str,
        #[case] mode: MutationMode,
    ) {
        let dispatcher = Dispatcher::for_mode(mode, "webhook-demo", Arc::new(PolicyStore::new()));
        let pod = test_utils::pod();

        let patch = dispatcher
            .dispatch(&request(kind, Some(namespace), Operation::Create, Some(pod)))
            .unwrap();

        assert!(patch.0.is_empty());
    }

    #[test]
    fn controller_namespace_is_not_reserved_in_dns_mode() {
        let dispatcher = dns_dispatcher();

        assert!(!dispatcher.is_reserved_namespace("webhook-demo"));
        assert!(dispatcher.is_reserved_namespace("kube-system"));
    }

    #[test]
    fn unsupported_kind() {
        let dispatcher = dns_dispatcher();

        let err = dispatcher
            .dispatch(&request("Service", Some("default"), Operation::Create, Some(json!({}))))
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "unsupported Kind[Service], only support Deployment, DnsConfig, Pod, Qos"
        );
    }

    #[test]
    fn security_defaults_mode_only_supports_workloads() {
        let dispatcher = Dispatcher::for_mode(
            MutationMode::SecurityDefaults,
            "webhook-demo",
            Arc::new(PolicyStore::new()),
        );

        assert_eq!(dispatcher.supported_kinds(), vec!["Deployment", "Pod"]);
        let err = dispatcher
            .dispatch(&request(
                DNS_CONFIG_KIND,
                Some("default"),
                Operation::Create,
                Some(dns_config(&["10.0.0.10"])),
            ))
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnsupportedKind { .. }));
    }

    #[test]
    fn dns_config_is_propagated_to_later_pods() {
        let dispatcher = dns_dispatcher();

        let patch = dispatcher
            .dispatch(&request(
                DNS_CONFIG_KIND,
                Some("default"),
                Operation::Create,
                Some(dns_config(&["10.0.0.10", "10.0.0.11"])),
            ))
            .unwrap();
        assert!(patch.0.is_empty());

        let pod = test_utils::pod();
        let patch = dispatcher
            .dispatch(&request("Pod", Some("default"), Operation::Create, Some(pod.clone())))
            .unwrap();
        let patched = test_utils::apply(&pod, &patch);

        assert_eq!(patched["spec"]["dnsPolicy"], "None");
        assert_eq!(
            patched["spec"]["dnsConfig"],
            json!({
                "nameservers": ["10.0.0.10", "10.0.0.11"],
                "options": [{"name": "ndots", "value": "2"}]
            })
        );
        assert_eq!(patched["spec"]["containers"], pod["spec"]["containers"]);
    }

    #[test]
    fn dns_config_delete_resets_the_policy() {
        let dispatcher = dns_dispatcher();
        dispatcher
            .dispatch(&request(
                DNS_CONFIG_KIND,
                Some("default"),
                Operation::Create,
                Some(dns_config(&["10.0.0.10"])),
            ))
            .unwrap();

        dispatcher
            .dispatch(&request(DNS_CONFIG_KIND, Some("default"), Operation::Delete, None))
            .unwrap();

        assert_eq!(dispatcher.policy_store().get(), Default::default());
    }

    #[test]
    fn malformed_dns_config_keeps_the_previous_policy() {
        let dispatcher = dns_dispatcher();
        dispatcher
            .dispatch(&request(
                DNS_CONFIG_KIND,
                Some("default"),
                Operation::Create,
                Some(dns_config(&["10.0.0.10"])),
            ))
            .unwrap();
        let before = dispatcher.policy_store().get();

        let err = dispatcher
            .dispatch(&request(
                DNS_CONFIG_KIND,
                Some("default"),
                Operation::Update,
                Some(json!({"spec": {"nameServers": "not a list"}})),
            ))
            .unwrap_err();

        assert!(matches!(err, DispatchError::PolicyStore(_)));
        assert_eq!(dispatcher.policy_store().get(), before);
    }

    #[test]
    fn qos_update_is_recorded_but_not_applied() {
        let dispatcher = dns_dispatcher();
        let patch = dispatcher
            .dispatch(&request(
                QOS_KIND,
                Some("default"),
                Operation::Update,
                Some(json!({
                    "kind": "Qos",
                    "spec": {
                        "requests": {"cpu": "100m", "mem": "128Mi"},
                        "limits": {"cpu": "200m", "mem": "256Mi"}
                    }
                })),
            ))
            .unwrap();
        assert!(patch.0.is_empty());

        let qos = dispatcher.policy_store().get().qos;
        assert_eq!(qos.requests.cpu.as_deref(), Some("100m"));
        assert_eq!(qos.limits.memory.as_deref(), Some("256Mi"));

        let pod = test_utils::pod();
        let patch = dispatcher
            .dispatch(&request(
                "Pod",
                Some("default"),
                Operation::Create,
                Some(pod.clone()),
            ))
            .unwrap();
        let patched = test_utils::apply(&pod, &patch);

        assert_eq!(patched["spec"]["containers"], pod["spec"]["containers"]);
        let mut expected = pod.clone();
        expected["spec"]["dnsConfig"] = json!({});
        assert_eq!(patched, expected);
    }

    #[test]
    fn workload_without_object_is_an_error() {
        let dispatcher = dns_dispatcher();

        let err = dispatcher
            .dispatch(&request("Pod", Some("default"), Operation::Create, None))
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Rule(RuleError::MissingObject(kind)) if kind == "Pod"
        ));
    }

    #[test]
    fn workload_delete_is_not_mutated() {
        let dispatcher = dns_dispatcher();

        let patch = dispatcher
            .dispatch(&request("Pod", Some("default"), Operation::Delete, None))
            .unwrap();

        assert!(patch.0.is_empty());
    }

    #[test]
    fn later_registration_replaces_the_rule() {
        let dispatcher = Dispatcher::new(Arc::new(PolicyStore::new()))
            .register("Pod", DnsPropagationRule::new(WorkloadKind::Pod))
            .register("Pod", SecurityDefaultsRule::new(WorkloadKind::Pod));
        let pod = test_utils::pod();

        let patch = dispatcher
            .dispatch(&request("Pod", Some("default"), Operation::Create, Some(pod)))
            .unwrap();

        let serialized = serde_json::to_value(&patch).unwrap();
        assert_eq!(serialized[0]["path"], "/spec/containers");
    }
}
