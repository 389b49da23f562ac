//! Mutation rules, one per object kind.
//!
//! Rules never touch shared state: they receive a snapshot of the policies
//! and describe what should happen through a [`Mutation`]. Committing policy
//! updates and diffing objects is up to the [`crate::dispatcher::Dispatcher`].

mod dns;
mod policy_update;
mod security_defaults;
mod workload;

pub use dns::DnsPropagationRule;
pub use policy_update::{DnsConfigRule, QosRule, DNS_CONFIG_KIND, QOS_KIND};
pub use security_defaults::SecurityDefaultsRule;
pub use workload::WorkloadKind;

use serde_json::Value;

use crate::{
    admission_request::Operation,
    errors::RuleError,
    policy_store::{PolicySnapshot, PolicyUpdate},
};

/// The parts of an admission request a rule is allowed to look at.
#[derive(Clone, Copy, Debug)]
pub struct RuleRequest<'a> {
    pub operation: Operation,
    pub raw_object: Option<&'a [u8]>,
}

#[derive(Debug, PartialEq)]
pub enum Mutation {
    /// Nothing to change.
    Unchanged,
    /// The object has been decoded and modified, the patch is the diff
    /// between the two.
    Object { original: Value, mutated: Value },
    /// The rule computed the patch on its own.
    Patch(json_patch::Patch),
    /// The request is a side channel updating the policy store.
    PolicyUpdate(PolicyUpdate),
}

pub trait MutationRule: Send + Sync {
    fn mutate(
        &self,
        request: &RuleRequest<'_>,
        policy: &PolicySnapshot,
    ) -> Result<Mutation, RuleError>;
}
