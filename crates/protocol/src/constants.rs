//! Protocol constants.

/// Namespace used when none is specified.
pub const DEFAULT_NAMESPACE: &str = "default";
