pub use crate::types::ScoutError;

pub type Result<T> = std::result::Result<T, ScoutError>;

/// Attach a description to a foreign error while turning it into a configuration error.
pub trait ErrorContext<T> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| ScoutError::ConfigError(format!("{}: {}", f(), e)))
    }
}
