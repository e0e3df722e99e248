//! Loader configuration
//!
//! Structural policies the binary loader applies on top of the format
//! grammar. Custom sections are never affected by these policies.

/// What to do when a non-custom section tag is seen a second time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecurrencePolicy {
    /// Fail with `UnexpectedSection`.
    #[default]
    Reject,
    /// Decode into the existing slot, appending to its content.
    Accumulate,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoaderConfig {
    pub recurrence: RecurrencePolicy,

    /// Require non-custom sections in canonical order
    pub enforce_section_order: bool,

    /// Reject inputs larger than this many bytes before decoding
    pub max_module_size: Option<usize>,
}

impl LoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recurrence(mut self, recurrence: RecurrencePolicy) -> Self {
        self.recurrence = recurrence;
        self
    }

    pub fn with_section_order(mut self, enforce: bool) -> Self {
        self.enforce_section_order = enforce;
        self
    }

    pub fn with_max_module_size(mut self, limit: usize) -> Self {
        self.max_module_size = Some(limit);
        self
    }
}
