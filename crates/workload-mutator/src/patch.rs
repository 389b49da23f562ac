//! JSONPatch generation.
//!
//! Mutated objects are never edited in place: rules work on a deep copy of
//! the decoded object, and the patch is the structural difference between the
//! serialized original and the serialized copy. Fields a rule does not touch
//! can't show up inside of the patch.

use json_patch::{Patch, PatchOperation, ReplaceOperation};
use jsonptr::PointerBuf;
use serde_json::Value;

pub fn empty() -> Patch {
    Patch(Vec::new())
}

pub fn diff(original: &Value, mutated: &Value) -> Patch {
    json_patch::diff(original, mutated)
}

/// A single `replace` operation targeting the location identified by `tokens`.
pub fn replace<'a>(tokens: impl IntoIterator<Item = &'a str>, value: Value) -> Patch {
    Patch(vec![PatchOperation::Replace(ReplaceOperation {
        path: PointerBuf::from_tokens(tokens),
        value,
    })])
}
