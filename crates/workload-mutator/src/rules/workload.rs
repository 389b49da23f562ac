use k8s_openapi::api::{apps::v1::Deployment, core::v1::Pod, core::v1::PodSpec};
use serde_json::Value;
use std::fmt;

use super::RuleRequest;
use crate::{admission_request::Operation, errors::RuleError};

/// The workload kinds carrying a pod spec that rules know how to edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkloadKind {
    Pod,
    Deployment,
}

impl WorkloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Pod => "Pod",
            WorkloadKind::Deployment => "Deployment",
        }
    }

    /// JSON pointer tokens of the containers array
    pub fn containers_path(&self) -> &'static [&'static str] {
        match self {
            WorkloadKind::Pod => &["spec", "containers"],
            WorkloadKind::Deployment => &["spec", "template", "spec", "containers"],
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
pub(crate) enum Workload {
    Pod(Box<Pod>),
    Deployment(Box<Deployment>),
}

impl Workload {
    /// Decode the object of the request. DELETE requests carry no object and
    /// are never mutated, `None` is returned for them.
    pub(crate) fn from_request(
        kind: WorkloadKind,
        request: &RuleRequest<'_>,
    ) -> Result<Option<Self>, RuleError> {
        if request.operation == Operation::Delete {
            return Ok(None);
        }
        let raw = request
            .raw_object
            .ok_or_else(|| RuleError::MissingObject(kind.to_string()))?;
        Self::decode(kind, raw).map(Some)
    }

    pub(crate) fn decode(kind: WorkloadKind, raw: &[u8]) -> Result<Self, RuleError> {
        let decode_err = |source| RuleError::Decode {
            kind: kind.to_string(),
            source,
        };
        match kind {
            WorkloadKind::Pod => serde_json::from_slice(raw)
                .map(|pod| Workload::Pod(Box::new(pod)))
                .map_err(decode_err),
            WorkloadKind::Deployment => serde_json::from_slice(raw)
                .map(|deployment| Workload::Deployment(Box::new(deployment)))
                .map_err(decode_err),
        }
    }

    pub(crate) fn kind(&self) -> WorkloadKind {
        match self {
            Workload::Pod(_) => WorkloadKind::Pod,
            Workload::Deployment(_) => WorkloadKind::Deployment,
        }
    }

    pub(crate) fn pod_spec(&self) -> Option<&PodSpec> {
        match self {
            Workload::Pod(pod) => pod.spec.as_ref(),
            Workload::Deployment(deployment) => deployment
                .spec
                .as_ref()
                .and_then(|spec| spec.template.spec.as_ref()),
        }
    }

    /// The pod spec, created empty when the object doesn't have one yet
    pub(crate) fn pod_spec_mut(&mut self) -> &mut PodSpec {
        match self {
            Workload::Pod(pod) => pod.spec.get_or_insert_with(Default::default),
            Workload::Deployment(deployment) => deployment
                .spec
                .get_or_insert_with(Default::default)
                .template
                .spec
                .get_or_insert_with(Default::default),
        }
    }

    pub(crate) fn to_value(&self) -> Result<Value, RuleError> {
        let encoded = match self {
            Workload::Pod(pod) => serde_json::to_value(pod),
            Workload::Deployment(deployment) => serde_json::to_value(deployment),
        };
        encoded.map_err(|source| RuleError::Encode {
            kind: self.kind().to_string(),
            source,
        })
    }
}
