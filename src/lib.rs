//! Rastro - execution-provenance tracing for data pipelines
//!
//! Records which instrumented functions called which, in what order, how
//! often, and with which values flowing in and out. Values are identified by
//! content fingerprints, so the same data seen twice maps to the same node.
//!
//! ```
//! use rastro::{BoundArgs, TraceConfig, TracedValue, Tracer};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut tracer = Tracer::new();
//! tracer.register("eval.g", |_, args| {
//!     Ok(args.get("x").cloned().unwrap_or_else(TracedValue::none))
//! })?;
//! tracer.register("eval.f", |t, args| {
//!     let x = args.get("x").cloned().unwrap_or_else(TracedValue::none);
//!     t.call("eval.g", BoundArgs::new().arg("x", x))
//! })?;
//! tracer.load(&TraceConfig::new(["eval.f", "eval.g"]), false);
//!
//! tracer.call("eval.f", BoundArgs::new().arg("x", TracedValue::array(vec![1.0, 2.0, 3.0])))?;
//! assert_eq!(tracer.graph().node("eval.g").map(|n| n.invocation_count), Some(1));
//! # Ok(())
//! # }
//! ```

pub mod call_stack;
pub mod cli;
pub mod config;
pub mod export;
pub mod fingerprint;
pub mod layout;
pub mod persistence;
pub mod provenance_graph;
pub mod registry;
pub mod tracer;
pub mod value;

pub use config::TraceConfig;
pub use fingerprint::{Fingerprint, Fingerprinted, Fingerprinter};
pub use provenance_graph::{EdgeKind, ProvenanceGraph};
pub use tracer::Tracer;
pub use value::{BoundArgs, NdArray, OpaqueValue, Primitive, TracedValue};
