//! Centralized environment variable names, mirroring the teacher codebase's
//! convention of naming env vars as constants in one module rather than
//! scattering `std::env::var("...")` string literals across the tree.

/// Overrides the canonical install root the Engine Loader resolves
/// `<family>/<variant>/<version>/` beneath. See §6 of the spec.
pub const ENGINE_PATH: &str = "ENGINE_PATH";

/// Overrides the listen host set in `cortex.yaml`.
pub const CORTEX_HOST: &str = "CORTEX_HOST";

/// Overrides the listen port set in `cortex.yaml`.
pub const CORTEX_PORT: &str = "CORTEX_PORT";

/// Overrides the data folder root (`<data>/...`).
pub const CORTEX_DATA_FOLDER: &str = "CORTEX_DATA_FOLDER";

/// Reads an environment variable, returning `None` if unset or not valid UTF-8.
pub fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Reads an environment variable as `u16`, ignoring unparsable values.
pub fn env_u16(name: &str) -> Option<u16> {
    env_string(name).and_then(|v| v.parse().ok())
}
