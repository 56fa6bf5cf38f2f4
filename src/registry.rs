//! Interception registry
//!
//! Host pipelines register their traceable functions under fully-qualified
//! identifiers (`module.function` or `module.Class.method`) and invoke them
//! through [`Tracer::call`](crate::tracer::Tracer::call). Marking an
//! identifier as instrumented reroutes every later call through the tracing
//! wrapper; nothing is rebound behind the host's back.

use crate::tracer::Tracer;
use crate::value::{BoundArgs, TracedValue};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// A registered host function
///
/// Receives the tracing context so that it can call other registered
/// functions, which keeps nested calls visible to the tracer.
pub type HostFn =
    Arc<dyn Fn(&mut Tracer, &BoundArgs) -> anyhow::Result<TracedValue> + Send + Sync>;

/// Errors raised by registry operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid target '{0}': expected 'module.function' or 'module.Class.function'")]
    InvalidPath(String),

    #[error("no function registered at '{0}'")]
    UnknownTarget(String),

    #[error("a function is already registered at '{0}'")]
    DuplicateTarget(String),
}

fn path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)+$")
            .expect("target path pattern is valid")
    })
}

/// Check that `path` has at least a module and a function component
pub fn validate_target_path(path: &str) -> Result<(), RegistryError> {
    if path_pattern().is_match(path) {
        Ok(())
    } else {
        Err(RegistryError::InvalidPath(path.to_string()))
    }
}

struct Target {
    func: HostFn,
    instrumented: bool,
}

/// Map from call-site identifier to host function
#[derive(Default)]
pub struct InterceptionRegistry {
    targets: BTreeMap<String, Target>,
}

impl fmt::Debug for InterceptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.targets.iter().map(|(k, t)| (k, t.instrumented)))
            .finish()
    }
}

impl InterceptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host function at `path`
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is malformed or already registered.
    pub fn register<F>(&mut self, path: &str, func: F) -> Result<(), RegistryError>
    where
        F: Fn(&mut Tracer, &BoundArgs) -> anyhow::Result<TracedValue> + Send + Sync + 'static,
    {
        validate_target_path(path)?;
        if self.targets.contains_key(path) {
            return Err(RegistryError::DuplicateTarget(path.to_string()));
        }
        self.targets.insert(
            path.to_string(),
            Target {
                func: Arc::new(func),
                instrumented: false,
            },
        );
        Ok(())
    }

    /// Current binding at `path` and whether it is instrumented
    pub fn resolve(&self, path: &str) -> Result<(HostFn, bool), RegistryError> {
        self.targets
            .get(path)
            .map(|t| (Arc::clone(&t.func), t.instrumented))
            .ok_or_else(|| RegistryError::UnknownTarget(path.to_string()))
    }

    /// Route future calls at `path` through the tracing wrapper
    pub fn instrument(&mut self, path: &str) -> Result<(), RegistryError> {
        validate_target_path(path)?;
        let target = self
            .targets
            .get_mut(path)
            .ok_or_else(|| RegistryError::UnknownTarget(path.to_string()))?;
        target.instrumented = true;
        Ok(())
    }

    pub fn is_instrumented(&self, path: &str) -> bool {
        self.targets.get(path).is_some_and(|t| t.instrumented)
    }

    /// Restore every binding to its uninstrumented form
    pub fn uninstrument_all(&mut self) {
        for target in self.targets.values_mut() {
            target.instrumented = false;
        }
    }

    /// Registered identifiers in sorted order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    /// Instrumented identifiers in sorted order
    pub fn instrumented(&self) -> impl Iterator<Item = &str> {
        self.targets
            .iter()
            .filter(|(_, t)| t.instrumented)
            .map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(_: &mut Tracer, args: &BoundArgs) -> anyhow::Result<TracedValue> {
        Ok(args.get("x").cloned().unwrap_or_else(TracedValue::none))
    }

    #[test]
    fn test_validate_target_path() {
        assert!(validate_target_path("pipeline.render").is_ok());
        assert!(validate_target_path("models.NerfModel.forward").is_ok());
        assert_eq!(
            validate_target_path("render"),
            Err(RegistryError::InvalidPath("render".into()))
        );
        assert!(validate_target_path("pipeline..render").is_err());
        assert!(validate_target_path("pipeline.render()").is_err());
        assert!(validate_target_path("").is_err());
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = InterceptionRegistry::new();
        registry.register("eval.identity", identity).unwrap();
        let (_, instrumented) = registry.resolve("eval.identity").unwrap();
        assert!(!instrumented);
        assert!(matches!(
            registry.resolve("eval.missing"),
            Err(RegistryError::UnknownTarget(_))
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = InterceptionRegistry::new();
        registry.register("eval.identity", identity).unwrap();
        assert_eq!(
            registry.register("eval.identity", identity),
            Err(RegistryError::DuplicateTarget("eval.identity".into()))
        );
    }

    #[test]
    fn test_instrument_and_reset() {
        let mut registry = InterceptionRegistry::new();
        registry.register("eval.identity", identity).unwrap();
        registry.register("eval.other", identity).unwrap();
        registry.instrument("eval.identity").unwrap();
        assert!(registry.is_instrumented("eval.identity"));
        assert_eq!(registry.instrumented().collect::<Vec<_>>(), vec!["eval.identity"]);

        registry.uninstrument_all();
        assert!(!registry.is_instrumented("eval.identity"));
        assert!(registry.instrument("eval.nope").is_err());
    }
}
