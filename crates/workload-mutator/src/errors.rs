use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyStoreError {
    #[error("{kind} json unmarshal failed: {source}")]
    Decode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("deserialize [{kind}] object failed: {source}")]
    Decode {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("admission request for [{0}] carries no object")]
    MissingObject(String),

    #[error("serialize [{kind}] object failed: {source}")]
    Encode {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unsupported Kind[{kind}], only support {}", .supported.join(", "))]
    UnsupportedKind {
        kind: String,
        supported: Vec<String>,
    },

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    PolicyStore(#[from] PolicyStoreError),
}

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("patch json marshal failed: {0}")]
    Serialize(#[source] serde_json::Error),
}
