//! package.json manifest handling.
//!
//! A manifest is kept as a generic, order-preserving JSON tree rather than
//! a fixed schema: fields ferry does not know about must survive the
//! rewrite byte-for-byte in meaning and in key order.

use serde_json::{Map, Value};

/// Default manifest file name inside a package tarball.
pub const MANIFEST_NAME: &str = "package.json";

/// Top-level flag that makes npm refuse to publish.
pub const PRIVATE_FIELD: &str = "private";

/// Lifecycle script object.
pub const SCRIPTS_FIELD: &str = "scripts";

/// Hook that runs on `npm publish` and would run again on republish.
pub const PREPUBLISH_HOOK: &str = "prepublish";

/// A parsed package manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    value: Value,
}

impl Manifest {
    /// Parse a manifest from raw bytes.
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        let value = serde_json::from_slice(bytes)?;
        Ok(Manifest { value })
    }

    /// Wrap an already-parsed JSON value.
    pub fn from_value(value: Value) -> Self {
        Manifest { value }
    }

    /// Serialize with two-space indentation.
    ///
    /// Key order is the order the fields were parsed in, so the same input
    /// always produces the same bytes.
    pub fn to_pretty_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(&self.value)
    }

    /// The `name` field, if present.
    pub fn name(&self) -> Option<&str> {
        self.value.get("name").and_then(Value::as_str)
    }

    /// The `version` field, if present.
    pub fn version(&self) -> Option<&str> {
        self.value.get("version").and_then(Value::as_str)
    }

    /// Whether the manifest carries the `private` flag at all.
    pub fn is_private(&self) -> bool {
        self.value.get(PRIVATE_FIELD).is_some()
    }

    /// Borrow the underlying JSON tree.
    pub fn as_value(&self) -> &Value {
        &self.value
    }

    fn as_object_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.value.as_object_mut()
    }
}

/// Strip the fields that would block republishing.
///
/// Removes the top-level `private` flag regardless of its value and the
/// `scripts.prepublish` hook. Every other field, including other scripts,
/// is left untouched. Applying this twice is the same as applying it once.
pub fn sanitize(manifest: &mut Manifest) {
    let Some(root) = manifest.as_object_mut() else {
        return;
    };

    if root.shift_remove(PRIVATE_FIELD).is_some() {
        tracing::debug!("removed `{}` flag from manifest", PRIVATE_FIELD);
    }

    if let Some(Value::Object(scripts)) = root.get_mut(SCRIPTS_FIELD) {
        if scripts.shift_remove(PREPUBLISH_HOOK).is_some() {
            tracing::debug!("removed `{}.{}` hook", SCRIPTS_FIELD, PREPUBLISH_HOOK);
        }
    }
}
