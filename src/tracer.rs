//! Tracing context and call interception protocol
//!
//! A [`Tracer`] owns all per-run state: the provenance graph, the call stack,
//! per-name sequence counters, the fingerprinter's identity cache, the
//! interception registry and the "configuration loaded" flag. Hosts create one
//! context per traced thread and pass it down the pipeline.
//!
//! # Interception protocol
//!
//! For every instrumented call [`Tracer::trace`]:
//!
//! 1. resolves the node id (`name`, or `name_<n>` in unique-call mode),
//! 2. ensures the node and bumps its invocation count,
//! 3. links it to the caller on top of the stack: call edge (weight +
//!    `last_args`) and at most one sibling edge from the caller's most recent
//!    earlier child,
//! 4. pushes the node and logs every argument as a value child,
//! 5. runs the wrapped body, popping the node on every exit path,
//! 6. logs the result and hands it back unchanged.
//!
//! Tracing problems never change what the wrapped body returns: failed
//! fingerprints degrade to warnings and the body's own error or panic always
//! propagates as-is.

use crate::call_stack::CallStack;
use crate::config::{self, TraceConfig};
use crate::fingerprint::{Fingerprinted, Fingerprinter};
use crate::provenance_graph::{EdgeAttr, EdgeKind, NodeAttrs, ProvenanceGraph};
use crate::registry::{validate_target_path, InterceptionRegistry, RegistryError};
use crate::value::{BoundArgs, TracedValue};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

/// Label under which a non-container result is logged
pub const OUTPUT_LABEL: &str = "Output";

/// Value that could only be logged by type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DegradedValue {
    pub label: String,
    pub value_type: String,
    pub reason: String,
}

/// Outcome of logging one (possibly nested) value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueLog {
    /// Value node ids linked from the parent, in logging order
    pub nodes: Vec<String>,
    /// Leaves that could not be fingerprinted
    pub degraded: Vec<DegradedValue>,
}

impl ValueLog {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    fn absorb(&mut self, other: ValueLog) {
        self.nodes.extend(other.nodes);
        self.degraded.extend(other.degraded);
    }
}

/// Outcome of a configuration load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// The context was already loaded; nothing changed
    pub already_loaded: bool,
    /// Targets now routed through the tracing wrapper
    pub instrumented: Vec<String>,
    /// Targets or entries that were skipped, with the reason
    pub skipped: Vec<(String, String)>,
}

/// Per-run tracing context
#[derive(Debug, Default)]
pub struct Tracer {
    graph: ProvenanceGraph,
    stack: CallStack,
    sequence: HashMap<String, u64>,
    fingerprinter: Fingerprinter,
    registry: InterceptionRegistry,
    unique_calls: bool,
    loaded: bool,
}

impl Tracer {
    /// Context sharing one node per call site
    pub fn new() -> Self {
        Self::default()
    }

    /// Context with unique-call mode set explicitly
    pub fn with_unique_calls(unique_calls: bool) -> Self {
        Self {
            unique_calls,
            ..Self::default()
        }
    }

    pub fn unique_calls(&self) -> bool {
        self.unique_calls
    }

    pub fn graph(&self) -> &ProvenanceGraph {
        &self.graph
    }

    /// Hand the accumulated graph over, leaving an empty one behind
    pub fn take_graph(&mut self) -> ProvenanceGraph {
        std::mem::take(&mut self.graph)
    }

    pub fn stack(&self) -> &CallStack {
        &self.stack
    }

    pub fn fingerprinter(&self) -> &Fingerprinter {
        &self.fingerprinter
    }

    pub fn registry(&self) -> &InterceptionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut InterceptionRegistry {
        &mut self.registry
    }

    /// Register a host function (see [`InterceptionRegistry::register`])
    pub fn register<F>(&mut self, path: &str, func: F) -> Result<(), RegistryError>
    where
        F: Fn(&mut Tracer, &BoundArgs) -> anyhow::Result<TracedValue> + Send + Sync + 'static,
    {
        self.registry.register(path, func)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Instrument the configured targets, once per context
    ///
    /// The first load starts a fresh run: graph, stack, sequence counters and
    /// identity cache are cleared. Later loads are no-ops until [`reset`].
    /// Malformed identifiers and unregistered targets are skipped with a
    /// warning; the remaining targets are still wired.
    ///
    /// # Arguments
    ///
    /// * `config` - Targets to instrument, plus an optional pinned identity mode
    /// * `unique_calls` - Identity mode used when `config.unique_calls` is unset
    ///
    /// # Returns
    ///
    /// A [`LoadReport`] listing instrumented and skipped targets, or one with
    /// `already_loaded` set if the context was loaded before.
    ///
    /// # Example
    ///
    /// ```
    /// use rastro::{TraceConfig, TracedValue, Tracer};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let mut tracer = Tracer::new();
    /// tracer.register("eval.f", |_, _| Ok(TracedValue::none()))?;
    ///
    /// let report = tracer.load(&TraceConfig::new(["eval.f", "eval.missing"]), true);
    /// assert_eq!(report.instrumented, vec!["eval.f"]);
    /// assert_eq!(report.skipped.len(), 1);
    /// assert!(tracer.unique_calls());
    ///
    /// assert!(tracer.load(&TraceConfig::new(["eval.f"]), false).already_loaded);
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// [`reset`]: Tracer::reset
    pub fn load(&mut self, config: &TraceConfig, unique_calls: bool) -> LoadReport {
        if self.loaded {
            tracing::debug!("trace configuration already loaded; ignoring");
            return LoadReport {
                already_loaded: true,
                ..LoadReport::default()
            };
        }

        self.clear_run();
        self.unique_calls = config.unique_calls_or(unique_calls);

        let mut report = LoadReport::default();
        for entry in &config.malformed {
            report
                .skipped
                .push((entry.clone(), "not a target identifier".to_string()));
        }
        for target in &config.targets {
            let wired = validate_target_path(target).and_then(|_| self.registry.instrument(target));
            match wired {
                Ok(()) => {
                    tracing::debug!("instrumented {}", target);
                    report.instrumented.push(target.clone());
                }
                Err(e) => {
                    tracing::warn!("error applying tracing to {}: {}", target, e);
                    report.skipped.push((target.clone(), e.to_string()));
                }
            }
        }

        self.loaded = true;
        report
    }

    /// Read a configuration file and [`load`](Tracer::load) it
    ///
    /// A context that is already loaded does not touch the file. A
    /// `unique_calls` key in the document overrides the `unique_calls`
    /// argument.
    ///
    /// # Errors
    ///
    /// Returns a [`config::ConfigError`] if the file cannot be read or parsed.
    pub fn load_from_path(
        &mut self,
        path: impl AsRef<Path>,
        unique_calls: bool,
        list: &str,
    ) -> config::Result<LoadReport> {
        if self.loaded {
            return Ok(self.load(&TraceConfig::default(), unique_calls));
        }
        let config = TraceConfig::from_path(path, list)?;
        Ok(self.load(&config, unique_calls))
    }

    /// Load the configuration named by `RASTRO_TRACE_CONFIG`, if any
    ///
    /// As with [`load_from_path`](Tracer::load_from_path), the document's
    /// `unique_calls` key wins over the argument.
    pub fn load_from_env(&mut self, unique_calls: bool) -> config::Result<Option<LoadReport>> {
        if self.loaded {
            return Ok(Some(self.load(&TraceConfig::default(), unique_calls)));
        }
        match TraceConfig::from_env()? {
            Some(config) => Ok(Some(self.load(&config, unique_calls))),
            None => Ok(None),
        }
    }

    /// Forget the run and the loaded configuration
    ///
    /// Registered functions stay registered but are no longer instrumented.
    pub fn reset(&mut self) {
        self.clear_run();
        self.registry.uninstrument_all();
        self.loaded = false;
    }

    fn clear_run(&mut self) {
        self.graph.clear();
        self.stack.clear();
        self.sequence.clear();
        self.fingerprinter.clear();
    }

    /// Call the function registered at `path`
    ///
    /// Instrumented targets go through [`trace`](Tracer::trace); others are
    /// called directly. Either way the host function's result is returned
    /// unchanged.
    pub fn call(&mut self, path: &str, args: BoundArgs) -> anyhow::Result<TracedValue> {
        let (func, instrumented) = self.registry.resolve(path)?;
        if instrumented {
            self.trace(path, &args, |tracer| func(tracer, &args))
        } else {
            func(self, &args)
        }
    }

    /// Node id for the next invocation of `name`
    fn next_node_id(&mut self, name: &str) -> String {
        if !self.unique_calls {
            return name.to_string();
        }
        let counter = self.sequence.entry(name.to_string()).or_insert(0);
        let id = format!("{}_{}", name, counter);
        *counter += 1;
        id
    }

    /// Run `body` as an instrumented invocation of `name`
    ///
    /// `args` are the invocation's bound arguments; they are logged before the
    /// body runs. The node is popped from the call stack whether the body
    /// returns, fails, or panics (the panic is resumed afterwards).
    ///
    /// # Arguments
    ///
    /// * `name` - Call site identifier; in unique-call mode the node id is
    ///   `name_<n>`
    /// * `args` - Bound arguments, logged as value children of the node
    /// * `body` - The wrapped computation, given this context for nested calls
    ///
    /// # Returns
    ///
    /// Exactly what `body` returned. The result is logged as `Output` (or
    /// element-wise for mappings and sequences) only when it is `Ok`.
    ///
    /// # Errors
    ///
    /// Propagates `body`'s error unchanged. Fingerprinting problems never
    /// surface here; they are logged as warnings.
    ///
    /// # Example
    ///
    /// ```
    /// use rastro::{BoundArgs, TracedValue, Tracer};
    /// use rastro::provenance_graph::EdgeKind;
    ///
    /// let mut tracer = Tracer::new();
    /// let out = tracer.trace("eval.f", &BoundArgs::new().arg("n", 2), |t| {
    ///     t.trace("eval.g", &BoundArgs::new(), |_| Ok::<_, String>(TracedValue::from(4)))
    /// });
    /// assert_eq!(out, Ok(TracedValue::from(4)));
    ///
    /// let graph = tracer.graph();
    /// assert!(graph.has_edge("eval.f", "eval.g", EdgeKind::Call));
    /// assert!(tracer.stack().is_empty());
    /// ```
    pub fn trace<E, F>(&mut self, name: &str, args: &BoundArgs, body: F) -> Result<TracedValue, E>
    where
        F: FnOnce(&mut Tracer) -> Result<TracedValue, E>,
    {
        let node = self.next_node_id(name);
        self.graph.ensure_node(&node, NodeAttrs::call());
        self.graph.bump_invocation(&node);

        if let Some(caller) = self.stack.top().map(str::to_owned) {
            self.link_to_caller(&caller, &node, args);
        }

        let depth = self.stack.depth();
        self.stack.push(node.clone());
        tracing::debug!(depth, "enter {}", node);

        for (arg_name, value) in args.iter() {
            self.log_value(arg_name, value, &node);
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&mut *self)));

        if self.stack.top() != Some(node.as_str()) {
            tracing::warn!(
                "call stack out of order when leaving {}: {:?}",
                node,
                self.stack.frames()
            );
        }
        self.stack.truncate(depth);
        tracing::debug!(depth, "leave {}", node);

        match outcome {
            Ok(Ok(result)) => {
                self.log_output(&result, &node);
                Ok(result)
            }
            Ok(Err(e)) => Err(e),
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Call edge from `caller`, plus one sibling edge from its latest child
    fn link_to_caller(&mut self, caller: &str, node: &str, args: &BoundArgs) {
        // Snapshot before the new call edge exists, so the node is never
        // mistaken for its own sibling.
        let last_sibling = self
            .graph
            .latest_successor(caller, EdgeKind::Call)
            .map(str::to_owned);
        let summary = args.summary();

        if self.graph.ensure_edge(caller, node, EdgeKind::Call) {
            self.graph
                .increment_edge_weight(caller, node, EdgeKind::Call);
        }
        self.graph.set_edge_attr(
            caller,
            node,
            EdgeKind::Call,
            EdgeAttr::LastArgs(summary.clone()),
        );

        if let Some(last) = last_sibling {
            if last != node && !self.graph.has_edge(&last, node, EdgeKind::Sibling) {
                self.graph.ensure_edge(&last, node, EdgeKind::Sibling);
                self.graph.set_edge_attr(
                    &last,
                    node,
                    EdgeKind::Sibling,
                    EdgeAttr::Relationship("sibling".to_string()),
                );
                self.graph
                    .set_edge_attr(&last, node, EdgeKind::Sibling, EdgeAttr::LastArgs(summary));
            }
        }
    }

    /// Log a result: mapping and sequence results element by element
    fn log_output(&mut self, result: &TracedValue, node: &str) -> ValueLog {
        let mut log = ValueLog::default();
        match result {
            TracedValue::Mapping(entries) => {
                for (key, value) in entries {
                    log.absorb(self.log_value(&format!("{}[{}]", OUTPUT_LABEL, key), value, node));
                }
            }
            TracedValue::Sequence(items) | TracedValue::Tuple(items) => {
                for (idx, value) in items.iter().enumerate() {
                    log.absorb(self.log_value(&format!("{}[{}]", OUTPUT_LABEL, idx), value, node));
                }
            }
            other => log.absorb(self.log_value(OUTPUT_LABEL, other, node)),
        }
        log
    }

    /// Record `value` under `label` as a child of `parent`
    ///
    /// Containers recurse with `label[key]` labels and get no node of their
    /// own. Each leaf becomes a value node `parent.label#<short fingerprint>`
    /// linked by a value edge. Leaves that cannot be fingerprinted are
    /// reported in the returned log and as warnings; logging carries on.
    pub fn log_value(&mut self, label: &str, value: &TracedValue, parent: &str) -> ValueLog {
        let mut log = ValueLog::default();
        match value {
            TracedValue::Sequence(items) | TracedValue::Tuple(items) => {
                for (idx, item) in items.iter().enumerate() {
                    log.absorb(self.log_value(&format!("{}[{}]", label, idx), item, parent));
                }
            }
            TracedValue::Mapping(entries) => {
                for (key, item) in entries {
                    log.absorb(self.log_value(&format!("{}[{}]", label, key), item, parent));
                }
            }
            leaf => match self.fingerprinter.fingerprint(leaf) {
                Ok(outcome) => log.nodes.push(self.record_leaf(label, leaf, parent, outcome)),
                Err(e) => {
                    tracing::warn!(
                        "{}: type={}, unable to generate fingerprint ({})",
                        label,
                        leaf.type_name(),
                        e
                    );
                    log.degraded.push(DegradedValue {
                        label: label.to_string(),
                        value_type: leaf.type_name().to_string(),
                        reason: e.to_string(),
                    });
                }
            },
        }
        log
    }

    fn record_leaf(
        &mut self,
        label: &str,
        value: &TracedValue,
        parent: &str,
        outcome: Fingerprinted,
    ) -> String {
        if let Some(reason) = outcome.degraded_reason() {
            tracing::warn!("{}: fingerprint degraded to fallback ({})", label, reason);
        }
        let fingerprint = outcome.into_fingerprint();
        let id = format!("{}.{}#{}", parent, label, fingerprint.short());
        let value_type = value.type_name().to_string();
        tracing::debug!(
            "{}: type={}, id={}, shape={:?}",
            label,
            value_type,
            fingerprint,
            value.shape()
        );

        self.graph.ensure_node(
            &id,
            NodeAttrs::value(
                value_type.clone(),
                fingerprint.clone(),
                value.shape().map(<[usize]>::to_vec),
            ),
        );
        if self.graph.ensure_edge(parent, &id, EdgeKind::Value) {
            self.graph.increment_edge_weight(parent, &id, EdgeKind::Value);
        }
        self.graph
            .set_edge_attr(parent, &id, EdgeKind::Value, EdgeAttr::Fingerprint(fingerprint));
        self.graph
            .set_edge_attr(parent, &id, EdgeKind::Value, EdgeAttr::ValueType(value_type));
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::OpaqueValue;

    fn leaf(_: &mut Tracer) -> Result<TracedValue, String> {
        Ok(TracedValue::none())
    }

    #[test]
    fn test_shared_mode_counts_invocations() {
        let mut tracer = Tracer::new();
        for _ in 0..3 {
            tracer.trace("eval.f", &BoundArgs::new(), leaf).unwrap();
        }
        assert_eq!(tracer.graph().node("eval.f").unwrap().invocation_count, 3);
    }

    #[test]
    fn test_unique_mode_creates_distinct_nodes() {
        let mut tracer = Tracer::with_unique_calls(true);
        for _ in 0..3 {
            tracer.trace("eval.f", &BoundArgs::new(), leaf).unwrap();
        }
        for i in 0..3 {
            let node = tracer.graph().node(&format!("eval.f_{}", i)).unwrap();
            assert_eq!(node.invocation_count, 1);
        }
        assert!(!tracer.graph().contains_node("eval.f"));
    }

    #[test]
    fn test_sibling_chain_not_clique() {
        let mut tracer = Tracer::new();
        tracer
            .trace("eval.parent", &BoundArgs::new(), |t| {
                for child in ["eval.c1", "eval.c2", "eval.c3"] {
                    t.trace(child, &BoundArgs::new(), leaf)?;
                }
                Ok::<_, String>(TracedValue::none())
            })
            .unwrap();

        let g = tracer.graph();
        assert!(g.has_edge("eval.c1", "eval.c2", EdgeKind::Sibling));
        assert!(g.has_edge("eval.c2", "eval.c3", EdgeKind::Sibling));
        assert!(!g.has_edge("eval.c1", "eval.c3", EdgeKind::Sibling));
        let sibling_edges = g.edges().filter(|e| e.kind == EdgeKind::Sibling).count();
        assert_eq!(sibling_edges, 2);
        let edge = g.edge("eval.c1", "eval.c2", EdgeKind::Sibling).unwrap();
        assert_eq!(edge.weight, 1);
        assert_eq!(edge.relationship.as_deref(), Some("sibling"));
    }

    #[test]
    fn test_wide_caller_chains_every_child_once() {
        const CHILDREN: usize = 2000;
        let mut tracer = Tracer::with_unique_calls(true);
        tracer
            .trace("eval.render", &BoundArgs::new().arg("scene", "room"), |t| {
                for i in 0..CHILDREN {
                    t.trace("eval.sample", &BoundArgs::new().arg("i", i as i64), leaf)?;
                }
                Ok::<_, String>(TracedValue::none())
            })
            .unwrap();

        let g = tracer.graph();
        let children = g.successors_of_kind("eval.render_0", EdgeKind::Call);
        assert_eq!(children.len(), CHILDREN);
        assert_eq!(
            g.latest_successor("eval.render_0", EdgeKind::Call),
            Some(format!("eval.sample_{}", CHILDREN - 1).as_str())
        );
        let sibling_edges = g.edges().filter(|e| e.kind == EdgeKind::Sibling).count();
        assert_eq!(sibling_edges, CHILDREN - 1);
        for i in 1..CHILDREN {
            let prev = format!("eval.sample_{}", i - 1);
            let next = format!("eval.sample_{}", i);
            assert!(g.has_edge(&prev, &next, EdgeKind::Sibling));
        }
    }

    #[test]
    fn test_call_edge_weight_and_last_args() {
        let mut tracer = Tracer::new();
        tracer
            .trace("eval.f", &BoundArgs::new(), |t| {
                t.trace("eval.g", &BoundArgs::new().arg("x", 1), leaf)?;
                t.trace("eval.g", &BoundArgs::new().arg("x", TracedValue::array(vec![1.0, 2.0])), leaf)?;
                Ok::<_, String>(TracedValue::none())
            })
            .unwrap();
        let edge = tracer.graph().edge("eval.f", "eval.g", EdgeKind::Call).unwrap();
        assert_eq!(edge.weight, 2);
        assert_eq!(edge.last_args, "ndarray(2,)");
    }

    #[test]
    fn test_stack_restored_after_error() {
        let mut tracer = Tracer::new();
        let result = tracer.trace("eval.outer", &BoundArgs::new(), |t| {
            t.trace("eval.inner", &BoundArgs::new(), |_| Err::<TracedValue, _>("boom".to_string()))
        });
        assert_eq!(result, Err("boom".to_string()));
        assert!(tracer.stack().is_empty());
    }

    #[test]
    fn test_stack_restored_after_panic() {
        let mut tracer = Tracer::new();
        tracer
            .trace("eval.outer", &BoundArgs::new(), |t| {
                let before = t.stack().clone();
                let caught = panic::catch_unwind(AssertUnwindSafe(|| {
                    let _ = t.trace("eval.inner", &BoundArgs::new(), |_| -> Result<TracedValue, String> {
                        panic!("wrapped call panicked")
                    });
                }));
                assert!(caught.is_err());
                assert_eq!(t.stack(), &before);
                Ok::<_, String>(TracedValue::none())
            })
            .unwrap();
        assert!(tracer.stack().is_empty());
    }

    #[test]
    fn test_result_passed_through_unchanged() {
        let mut tracer = Tracer::new();
        let value = TracedValue::mapping(vec![("rgb", TracedValue::array(vec![0.1, 0.2]))]);
        let expected = value.clone();
        let out = tracer
            .trace("eval.f", &BoundArgs::new(), move |_| Ok::<_, String>(value))
            .unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_empty_array_argument_degrades_without_failing() {
        let mut tracer = Tracer::new();
        let args = BoundArgs::new()
            .arg("empty", TracedValue::array(vec![]))
            .arg("n", 2);
        let out = tracer.trace("eval.f", &args, |_| Ok::<_, String>(TracedValue::from(7)));
        assert_eq!(out, Ok(TracedValue::from(7)));

        let log = tracer.log_value("empty", &TracedValue::array(vec![]), "eval.f");
        assert_eq!(log.degraded.len(), 1);
        assert_eq!(log.degraded[0].value_type, "ndarray");
        assert!(log.nodes.is_empty());

        let values: Vec<_> = tracer.graph().successors_of_kind("eval.f", EdgeKind::Value);
        assert_eq!(values.len(), 2); // n and Output
    }

    #[test]
    fn test_containers_logged_per_leaf() {
        let mut tracer = Tracer::new();
        tracer.graph.ensure_node("eval.f", NodeAttrs::call());
        let value = TracedValue::mapping(vec![
            ("rays", TracedValue::list(vec![1.into(), 2.into()])),
            ("meta", TracedValue::from("cam0")),
        ]);
        let log = tracer.log_value("batch", &value, "eval.f");
        assert_eq!(log.nodes.len(), 3);
        assert!(log.nodes[0].starts_with("eval.f.batch[rays][0]#"));
        assert!(log.nodes[1].starts_with("eval.f.batch[rays][1]#"));
        assert!(log.nodes[2].starts_with("eval.f.batch[meta]#"));
        for id in &log.nodes {
            assert!(tracer.graph().node(id).unwrap().is_value());
            assert!(tracer.graph().has_edge("eval.f", id, EdgeKind::Value));
        }
    }

    #[test]
    fn test_degraded_opaque_still_logged() {
        let mut tracer = Tracer::new();
        let value = TracedValue::opaque(OpaqueValue::unserializable("Device", "cuda:0", "no bytes"));
        let log = tracer.log_value("device", &value, "eval.f");
        assert_eq!(log.nodes.len(), 1);
        let node = tracer.graph().node(&log.nodes[0]).unwrap();
        assert_eq!(node.value_type.as_deref(), Some("Device"));
    }

    #[test]
    fn test_direct_recursion_shared_mode_self_loop() {
        fn countdown(t: &mut Tracer, n: i64) -> Result<TracedValue, String> {
            t.trace("eval.countdown", &BoundArgs::new().arg("n", n), |t| {
                if n > 0 {
                    countdown(t, n - 1)
                } else {
                    Ok(TracedValue::from(0))
                }
            })
        }
        let mut tracer = Tracer::new();
        countdown(&mut tracer, 2).unwrap();
        let g = tracer.graph();
        assert_eq!(g.node("eval.countdown").unwrap().invocation_count, 3);
        let edge = g.edge("eval.countdown", "eval.countdown", EdgeKind::Call).unwrap();
        assert_eq!(edge.weight, 2);
        assert!(!g.has_edge("eval.countdown", "eval.countdown", EdgeKind::Sibling));
    }

    #[test]
    fn test_direct_recursion_unique_mode_is_chain() {
        fn countdown(t: &mut Tracer, n: i64) -> Result<TracedValue, String> {
            t.trace("eval.countdown", &BoundArgs::new(), |t| {
                if n > 0 {
                    countdown(t, n - 1)
                } else {
                    Ok(TracedValue::none())
                }
            })
        }
        let mut tracer = Tracer::with_unique_calls(true);
        countdown(&mut tracer, 2).unwrap();
        let g = tracer.graph();
        assert!(g.has_edge("eval.countdown_0", "eval.countdown_1", EdgeKind::Call));
        assert!(g.has_edge("eval.countdown_1", "eval.countdown_2", EdgeKind::Call));
        assert!(!g.has_edge("eval.countdown_0", "eval.countdown_0", EdgeKind::Call));
    }
}
