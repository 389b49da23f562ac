use super::{Mutation, MutationRule, RuleRequest};
use crate::{
    admission_request::Operation,
    errors::RuleError,
    policy_store::{PolicySnapshot, PolicyUpdate},
};

pub const DNS_CONFIG_KIND: &str = "DnsConfig";
pub const QOS_KIND: &str = "Qos";

/// `DnsConfig` objects are not mutated: admitting one replaces the DNS
/// policy, deleting one resets it.
#[derive(Clone, Copy, Debug, Default)]
pub struct DnsConfigRule;

impl MutationRule for DnsConfigRule {
    fn mutate(
        &self,
        request: &RuleRequest<'_>,
        _policy: &PolicySnapshot,
    ) -> Result<Mutation, RuleError> {
        policy_update(request, DNS_CONFIG_KIND, PolicyUpdate::ResetDns, PolicyUpdate::SetDns)
    }
}

/// `Qos` objects are not mutated: admitting one replaces the QoS policy,
/// deleting one resets it.
#[derive(Clone, Copy, Debug, Default)]
pub struct QosRule;

impl MutationRule for QosRule {
    fn mutate(
        &self,
        request: &RuleRequest<'_>,
        _policy: &PolicySnapshot,
    ) -> Result<Mutation, RuleError> {
        policy_update(request, QOS_KIND, PolicyUpdate::ResetQos, PolicyUpdate::SetQos)
    }
}

fn policy_update(
    request: &RuleRequest<'_>,
    kind: &str,
    reset: PolicyUpdate,
    set: fn(Vec<u8>) -> PolicyUpdate,
) -> Result<Mutation, RuleError> {
    let update = if request.operation == Operation::Delete {
        reset
    } else {
        let raw = request
            .raw_object
            .ok_or_else(|| RuleError::MissingObject(kind.to_owned()))?;
        set(raw.to_vec())
    };

    Ok(Mutation::PolicyUpdate(update))
}
