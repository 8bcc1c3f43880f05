use thiserror::Error;

/// An environment variable required by the application is not set, or is blank.
#[derive(Debug, Error)]
#[error("Missing environment variable: {0}")]
pub struct MissingEnvVarError(pub String);

/// Reads an environment variable, returning a structured error if it's missing.
///
/// Surrounding whitespace is trimmed and a blank value counts as missing, so a
/// `TOKEN=` line left in a shell profile doesn't turn into an empty credential.
///
/// # Arguments
/// * `name` - The name of the environment variable to read.
pub fn get_env_var(name: &str) -> Result<String, MissingEnvVarError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(MissingEnvVarError(name.to_string())),
    }
}
