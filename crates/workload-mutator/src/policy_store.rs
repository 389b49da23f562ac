//! Process-wide DNS and QoS policies.
//!
//! The policies are submitted through the admission endpoint itself, as
//! `DnsConfig` and `Qos` objects. The DNS policy is read by every Pod and
//! Deployment admission that follows, the QoS policy is only recorded. All
//! the state lives behind a single `RwLock`:
//! readers clone the whole record while holding the read guard, writers swap
//! a whole sub-record while holding the write guard. Nothing is ever merged,
//! the last completed write wins.

use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use tracing::info;

use crate::errors::PolicyStoreError;

/// DNS settings propagated to the pod spec of every workload.
///
/// Unknown fields are rejected, a misspelled payload must not be committed
/// as an empty policy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DnsPolicy {
    #[serde(default, rename = "nameServers", alias = "nameservers")]
    pub nameservers: Vec<String>,

    #[serde(default)]
    pub options: Vec<DnsOption>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DnsOption {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl DnsPolicy {
    /// Decode the `spec` of a `DnsConfig` object.
    pub fn from_raw(raw: &[u8]) -> Result<Self, PolicyStoreError> {
        decode_spec(raw, "dnsconfig")
    }
}

/// Default resource requests and limits. Recorded and logged, never written
/// into workloads.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QosPolicy {
    #[serde(default)]
    pub requests: QosResources,

    #[serde(default)]
    pub limits: QosResources,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QosResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    #[serde(
        default,
        rename = "mem",
        alias = "memory",
        skip_serializing_if = "Option::is_none"
    )]
    pub memory: Option<String>,
}

impl QosPolicy {
    /// Decode the `spec` of a `Qos` object.
    pub fn from_raw(raw: &[u8]) -> Result<Self, PolicyStoreError> {
        decode_spec(raw, "qos")
    }
}

#[derive(Deserialize)]
struct PolicyObject<T> {
    spec: Option<T>,
}

fn decode_spec<T>(raw: &[u8], kind: &'static str) -> Result<T, PolicyStoreError>
where
    T: for<'de> Deserialize<'de> + Default,
{
    serde_json::from_slice::<PolicyObject<T>>(raw)
        .map(|object| object.spec.unwrap_or_default())
        .map_err(|source| PolicyStoreError::Decode { kind, source })
}

/// A copy of both policies, taken atomically.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicySnapshot {
    pub dns: DnsPolicy,
    pub qos: QosPolicy,
}

/// A change requested by one of the config kinds. Payloads are kept raw,
/// decoding happens inside of the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyUpdate {
    SetDns(Vec<u8>),
    ResetDns,
    SetQos(Vec<u8>),
    ResetQos,
}

#[derive(Debug, Default)]
pub struct PolicyStore {
    current: RwLock<PolicySnapshot>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> PolicySnapshot {
        // a panic while holding the guard cannot leave a half written record:
        // writers only ever assign fully built values
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the DNS policy with the one decoded from `raw`. On decode
    /// failure the current policy is left untouched.
    pub fn set_dns(&self, raw: &[u8]) -> Result<(), PolicyStoreError> {
        let dns = DnsPolicy::from_raw(raw)?;
        info!(
            nameservers = ?dns.nameservers,
            options = ?dns.options,
            "new dnsconfig policy"
        );
        self.write().dns = dns;
        Ok(())
    }

    pub fn reset_dns(&self) {
        info!("dnsconfig policy deleted");
        self.write().dns = DnsPolicy::default();
    }

    /// Replace the QoS policy with the one decoded from `raw`. On decode
    /// failure the current policy is left untouched.
    pub fn set_qos(&self, raw: &[u8]) -> Result<(), PolicyStoreError> {
        let qos = QosPolicy::from_raw(raw)?;
        info!(
            requests_cpu = qos.requests.cpu.as_deref(),
            requests_mem = qos.requests.memory.as_deref(),
            limits_cpu = qos.limits.cpu.as_deref(),
            limits_mem = qos.limits.memory.as_deref(),
            "new qos policy"
        );
        self.write().qos = qos;
        Ok(())
    }

    pub fn reset_qos(&self) {
        info!("qos policy deleted");
        self.write().qos = QosPolicy::default();
    }

    pub fn apply(&self, update: PolicyUpdate) -> Result<(), PolicyStoreError> {
        match update {
            PolicyUpdate::SetDns(raw) => self.set_dns(&raw),
            PolicyUpdate::ResetDns => {
                self.reset_dns();
                Ok(())
            }
            PolicyUpdate::SetQos(raw) => self.set_qos(&raw),
            PolicyUpdate::ResetQos => {
                self.reset_qos();
                Ok(())
            }
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, PolicySnapshot> {
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
