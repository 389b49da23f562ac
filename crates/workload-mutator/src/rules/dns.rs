use k8s_openapi::api::core::v1::{PodDNSConfig, PodDNSConfigOption};

use super::{
    workload::{Workload, WorkloadKind},
    Mutation, MutationRule, RuleRequest,
};
use crate::{
    errors::RuleError,
    policy_store::{DnsPolicy, PolicySnapshot},
};

const DNS_POLICY_NONE: &str = "None";

/// Propagate the DNS policy to Pods and to the pod template of Deployments.
///
/// The `dnsConfig` of the pod spec is always overwritten with the current
/// policy, even when the policy is empty. Pods are switched to the `None` DNS
/// policy as soon as at least one nameserver is configured. The QoS policy is
/// only recorded, workloads never get it.
#[derive(Clone, Copy, Debug)]
pub struct DnsPropagationRule {
    kind: WorkloadKind,
}

impl DnsPropagationRule {
    pub fn new(kind: WorkloadKind) -> Self {
        Self { kind }
    }
}

impl MutationRule for DnsPropagationRule {
    fn mutate(
        &self,
        request: &RuleRequest<'_>,
        policy: &PolicySnapshot,
    ) -> Result<Mutation, RuleError> {
        let Some(workload) = Workload::from_request(self.kind, request)? else {
            return Ok(Mutation::Unchanged);
        };
        // nothing to propagate into
        if workload.pod_spec().is_none() {
            return Ok(Mutation::Unchanged);
        }

        let mut mutated = workload.clone();
        let spec = mutated.pod_spec_mut();
        spec.dns_config = Some(dns_config(&policy.dns));
        if self.kind == WorkloadKind::Pod && !policy.dns.nameservers.is_empty() {
            spec.dns_policy = Some(DNS_POLICY_NONE.to_owned());
        }

        Ok(Mutation::Object {
            original: workload.to_value()?,
            mutated: mutated.to_value()?,
        })
    }
}

fn dns_config(policy: &DnsPolicy) -> PodDNSConfig {
    let nameservers = (!policy.nameservers.is_empty()).then(|| policy.nameservers.clone());
    let options = (!policy.options.is_empty()).then(|| {
        policy
            .options
            .iter()
            .map(|option| PodDNSConfigOption {
                name: Some(option.name.clone()),
                value: option.value.clone(),
            })
            .collect()
    });

    PodDNSConfig {
        nameservers,
        options,
        ..Default::default()
    }
}
