//! Hardware building blocks shared by the controllers.

/// Set-associative cache with pluggable replacement.
pub mod cache;
