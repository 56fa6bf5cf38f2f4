//! Stack of currently active instrumented invocations
//!
//! Only the tracer mutates the stack. Every push is matched by a pop on all
//! exit paths of the wrapped call, including errors and panics.

/// Ordered node identifiers of active invocations, innermost last
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStack {
    frames: Vec<String>,
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: impl Into<String>) {
        self.frames.push(node.into());
    }

    pub fn pop(&mut self) -> Option<String> {
        self.frames.pop()
    }

    /// Innermost active invocation (the caller of the next call)
    pub fn top(&self) -> Option<&str> {
        self.frames.last().map(String::as_str)
    }

    /// Drop frames above `depth`
    pub fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth);
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[String] {
        &self.frames
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
