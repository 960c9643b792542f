/// The current version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User agent sent on every registry request.
pub const USER_AGENT: &str = concat!("npm-migrate-all/", env!("CARGO_PKG_VERSION"));
