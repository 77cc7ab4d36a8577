//! Package-level constants.

/// Current version of Warden (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "warden";

/// Identity used when no client address can be derived from a request.
pub const UNKNOWN_CLIENT: &str = "unknown";
