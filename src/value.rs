//! Tagged value model for traced arguments and results
//!
//! Every value that crosses an instrumented call boundary is expressed as a
//! [`TracedValue`]. The variants mirror the classification used by the
//! fingerprinter: numeric arrays, ordered sequences and tuples, key-value
//! mappings, primitives, and opaque host objects.
//!
//! Arrays and opaque objects are reference counted. The allocation address of
//! the shared instance is the value's runtime identity, which the
//! fingerprinter uses for its per-run identity cache.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while constructing values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("shape {shape:?} describes {expected} elements but {actual} were given")]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
}

/// Scalar values hashed by their literal textual form
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Primitive {
    /// Kind tag used in the content representation
    pub fn kind(&self) -> &'static str {
        match self {
            Primitive::None => "none",
            Primitive::Bool(_) => "bool",
            Primitive::Int(_) => "int",
            Primitive::Float(_) => "float",
            Primitive::Str(_) => "str",
        }
    }

    /// Literal textual form
    ///
    /// Floats use the shortest round-trip representation so that `1.0` and `1`
    /// stay distinguishable through the kind tag and `NaN`/`inf` are stable.
    pub fn literal(&self) -> String {
        match self {
            Primitive::None => "None".to_string(),
            Primitive::Bool(b) => b.to_string(),
            Primitive::Int(i) => i.to_string(),
            Primitive::Float(f) => format!("{:?}", f),
            Primitive::Str(s) => s.clone(),
        }
    }
}

/// Dense numeric array with a row-major shape
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl NdArray {
    /// Create an array, checking that `shape` covers `data` exactly
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self, ValueError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ValueError::ShapeMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// One-dimensional array
    pub fn from_vec(data: Vec<f64>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Flattened elements in row-major order
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Host object the tracer cannot inspect structurally
///
/// Carries a full byte serialization when the host type supports one
/// (MessagePack via `rmp-serde`). When serialization failed, the reason is
/// kept and the fingerprinter falls back to type name plus text.
#[derive(Debug, Clone, PartialEq)]
pub struct OpaqueValue {
    type_name: String,
    repr: String,
    bytes: Result<Vec<u8>, String>,
}

impl OpaqueValue {
    /// Serialize a host value to bytes
    pub fn serialize<T>(type_name: impl Into<String>, value: &T) -> Self
    where
        T: Serialize + fmt::Debug,
    {
        Self {
            type_name: type_name.into(),
            repr: format!("{:?}", value),
            bytes: rmp_serde::to_vec_named(value).map_err(|e| e.to_string()),
        }
    }

    /// Object with no byte serialization available
    pub fn unserializable(
        type_name: impl Into<String>,
        repr: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            repr: repr.into(),
            bytes: Err(reason.into()),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Textual representation used by the fallback fingerprint
    pub fn repr(&self) -> &str {
        &self.repr
    }

    /// Serialized bytes, or the reason serialization was impossible
    pub fn bytes(&self) -> Result<&[u8], &str> {
        match &self.bytes {
            Ok(bytes) => Ok(bytes),
            Err(reason) => Err(reason),
        }
    }
}

/// A value observed at an instrumented call boundary
#[derive(Debug, Clone, PartialEq)]
pub enum TracedValue {
    Primitive(Primitive),
    Array(Arc<NdArray>),
    Sequence(Vec<TracedValue>),
    Tuple(Vec<TracedValue>),
    /// Entries in host enumeration order; fingerprinting sorts by key
    Mapping(Vec<(String, TracedValue)>),
    Opaque(Arc<OpaqueValue>),
}

impl TracedValue {
    /// Shared one-dimensional numeric array
    pub fn array(data: Vec<f64>) -> Self {
        TracedValue::Array(Arc::new(NdArray::from_vec(data)))
    }

    /// Shared numeric array with an explicit shape
    pub fn shaped_array(shape: Vec<usize>, data: Vec<f64>) -> Result<Self, ValueError> {
        Ok(TracedValue::Array(Arc::new(NdArray::new(shape, data)?)))
    }

    pub fn list(items: impl IntoIterator<Item = TracedValue>) -> Self {
        TracedValue::Sequence(items.into_iter().collect())
    }

    pub fn tuple(items: impl IntoIterator<Item = TracedValue>) -> Self {
        TracedValue::Tuple(items.into_iter().collect())
    }

    pub fn mapping<K: Into<String>>(entries: impl IntoIterator<Item = (K, TracedValue)>) -> Self {
        TracedValue::Mapping(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn opaque(value: OpaqueValue) -> Self {
        TracedValue::Opaque(Arc::new(value))
    }

    pub fn none() -> Self {
        TracedValue::Primitive(Primitive::None)
    }

    /// Declared type name, used in node attributes and argument summaries
    pub fn type_name(&self) -> &str {
        match self {
            TracedValue::Primitive(p) => match p {
                Primitive::None => "None",
                Primitive::Bool(_) => "bool",
                Primitive::Int(_) => "int",
                Primitive::Float(_) => "float",
                Primitive::Str(_) => "str",
            },
            TracedValue::Array(_) => "ndarray",
            TracedValue::Sequence(_) => "list",
            TracedValue::Tuple(_) => "tuple",
            TracedValue::Mapping(_) => "dict",
            TracedValue::Opaque(o) => o.type_name(),
        }
    }

    /// Array shape, if this value has one
    pub fn shape(&self) -> Option<&[usize]> {
        match self {
            TracedValue::Array(a) => Some(a.shape()),
            _ => None,
        }
    }

    /// Element count for sized containers (strings excluded)
    pub fn container_len(&self) -> Option<usize> {
        match self {
            TracedValue::Sequence(items) | TracedValue::Tuple(items) => Some(items.len()),
            TracedValue::Mapping(entries) => Some(entries.len()),
            _ => None,
        }
    }

    pub fn is_container(&self) -> bool {
        self.container_len().is_some()
    }

    /// Compact type/shape summary, e.g. `ndarray(2, 3)` or `list[len=4]`
    pub fn summary(&self) -> String {
        let type_name = self.type_name();
        if let Some(shape) = self.shape() {
            let dims: Vec<String> = shape.iter().map(usize::to_string).collect();
            if dims.len() == 1 {
                format!("{}({},)", type_name, dims[0])
            } else {
                format!("{}({})", type_name, dims.join(", "))
            }
        } else if let Some(len) = self.container_len() {
            format!("{}[len={}]", type_name, len)
        } else {
            type_name.to_string()
        }
    }
}

impl fmt::Display for TracedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TracedValue::Primitive(Primitive::Str(s)) => write!(f, "{:?}", s),
            TracedValue::Primitive(p) => f.write_str(&p.literal()),
            TracedValue::Array(a) => write!(f, "ndarray(shape={:?}, data={:?})", a.shape(), a.data()),
            TracedValue::Sequence(items) => write_items(f, "[", "]", items),
            TracedValue::Tuple(items) => write_items(f, "(", ")", items),
            TracedValue::Mapping(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:?}: {}", key, value)?;
                }
                f.write_str("}")
            }
            TracedValue::Opaque(o) => f.write_str(o.repr()),
        }
    }
}

fn write_items(
    f: &mut fmt::Formatter<'_>,
    open: &str,
    close: &str,
    items: &[TracedValue],
) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    f.write_str(close)
}

impl From<Primitive> for TracedValue {
    fn from(v: Primitive) -> Self {
        TracedValue::Primitive(v)
    }
}

impl From<bool> for TracedValue {
    fn from(v: bool) -> Self {
        TracedValue::Primitive(Primitive::Bool(v))
    }
}

impl From<i64> for TracedValue {
    fn from(v: i64) -> Self {
        TracedValue::Primitive(Primitive::Int(v))
    }
}

impl From<i32> for TracedValue {
    fn from(v: i32) -> Self {
        TracedValue::Primitive(Primitive::Int(i64::from(v)))
    }
}

impl From<f64> for TracedValue {
    fn from(v: f64) -> Self {
        TracedValue::Primitive(Primitive::Float(v))
    }
}

impl From<&str> for TracedValue {
    fn from(v: &str) -> Self {
        TracedValue::Primitive(Primitive::Str(v.to_string()))
    }
}

impl From<String> for TracedValue {
    fn from(v: String) -> Self {
        TracedValue::Primitive(Primitive::Str(v))
    }
}

impl From<NdArray> for TracedValue {
    fn from(v: NdArray) -> Self {
        TracedValue::Array(Arc::new(v))
    }
}

impl From<OpaqueValue> for TracedValue {
    fn from(v: OpaqueValue) -> Self {
        TracedValue::Opaque(Arc::new(v))
    }
}

/// Named arguments of one invocation, in binding order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArgs {
    args: Vec<(String, TracedValue)>,
}

impl BoundArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an argument (builder style)
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<TracedValue>) -> Self {
        self.args.push((name.into(), value.into()));
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<TracedValue>) {
        self.args.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&TracedValue> {
        self.args.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TracedValue)> {
        self.args.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Argument summary stored on call edges, e.g. `ndarray(3,)|int`
    pub fn summary(&self) -> String {
        self.args
            .iter()
            .map(|(_, v)| v.summary())
            .collect::<Vec<_>>()
            .join("|")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ndarray_shape_mismatch() {
        let err = NdArray::new(vec![2, 2], vec![1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(
            err,
            ValueError::ShapeMismatch {
                shape: vec![2, 2],
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn test_summary_formats() {
        assert_eq!(TracedValue::array(vec![1.0, 2.0, 3.0]).summary(), "ndarray(3,)");
        let matrix = TracedValue::shaped_array(vec![2, 3], vec![0.0; 6]).unwrap();
        assert_eq!(matrix.summary(), "ndarray(2, 3)");
        assert_eq!(
            TracedValue::list(vec![1.into(), 2.into()]).summary(),
            "list[len=2]"
        );
        assert_eq!(TracedValue::from("abc").summary(), "str");
        assert_eq!(TracedValue::from(3).summary(), "int");
    }

    #[test]
    fn test_bound_args_summary_joins_with_pipe() {
        let args = BoundArgs::new()
            .arg("x", TracedValue::array(vec![1.0, 2.0]))
            .arg("scale", 0.5)
            .arg("opts", TracedValue::mapping(vec![("a", TracedValue::from(1))]));
        assert_eq!(args.summary(), "ndarray(2,)|float|dict[len=1]");
        assert_eq!(args.get("scale"), Some(&TracedValue::from(0.5)));
    }

    #[test]
    fn test_opaque_serialization_outcomes() {
        let ok = OpaqueValue::serialize("Camera", &(1u8, "front"));
        assert!(ok.bytes().is_ok());
        assert_eq!(ok.type_name(), "Camera");

        let bad = OpaqueValue::unserializable("Handle", "Handle(0x1)", "no serializer");
        assert_eq!(bad.bytes(), Err("no serializer"));
        assert_eq!(bad.repr(), "Handle(0x1)");
    }

    #[test]
    fn test_display_is_readable() {
        let v = TracedValue::mapping(vec![
            ("k", TracedValue::list(vec![1.into(), "s".into()])),
            ("t", TracedValue::tuple(vec![true.into(), TracedValue::none()])),
        ]);
        assert_eq!(v.to_string(), r#"{"k": [1, "s"], "t": (true, None)}"#);
    }
}
