//! Content addressing for code modules.
//!
//! A module's identity is derived purely from its source bytes plus a
//! namespace tag, so identical submissions map to the same isolate and
//! distinct submissions never share one. Keys are SHA-256 digests; the
//! namespace is domain-separated from the content with a zero byte so
//! "tool" and "sandbox" executions of the same source get distinct isolates.

use sha2::{Digest, Sha256};
use std::fmt;

/// Execution namespace a module is keyed under.
///
/// The same source submitted as a tool and as a sandbox demo must not share
/// an execution context, so the namespace participates in key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Tool,
    Sandbox,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Tool => "tool",
            Namespace::Sandbox => "sandbox",
        }
    }
}

/// Content-derived identifier for one isolate. Fixed width (64 hex chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IsolateKey(String);

impl IsolateKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IsolateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the isolate key for a module's source within a namespace.
///
/// Pure and deterministic: equal content within the same namespace always
/// yields an equal key. Empty content is valid and produces a stable key.
pub fn module_key(code: &str, namespace: Namespace) -> IsolateKey {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(code.as_bytes());
    let digest = hasher.finalize();
    IsolateKey(format!("{:x}", digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn identical_content_yields_identical_keys() {
        let a = module_key("export default {}", Namespace::Tool);
        let b = module_key("export default {}", Namespace::Tool);
        assert_eq!(a, b);
    }

    #[test]
    fn namespaces_separate_identical_content() {
        let tool = module_key("export default {}", Namespace::Tool);
        let sandbox = module_key("export default {}", Namespace::Sandbox);
        assert_ne!(tool, sandbox);
    }

    #[test]
    fn empty_content_produces_a_stable_key() {
        let a = module_key("", Namespace::Tool);
        let b = module_key("", Namespace::Tool);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn distinct_content_does_not_collide_over_a_large_sample() {
        let mut seen = HashSet::new();
        for i in 0..10_000 {
            let code = format!("export default {{ fetch() {{ return {}; }} }}", i);
            let key = module_key(&code, Namespace::Tool);
            assert!(seen.insert(key), "collision at sample {}", i);
        }
    }
}
