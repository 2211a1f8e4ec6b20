//! Process identity recorded as the owner of a lock.

/// Supplies the identity of the current process.
pub trait ProcessMetaDataProvider: Send + Sync {
    /// Identifier written as the owner pid of a lock.
    fn process_identifier(&self) -> String;

    /// Human-readable name of the process owner (e.g., `user@HOST`).
    fn process_display_name(&self) -> String;
}

/// Provider backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultProcessMetaDataProvider;

impl ProcessMetaDataProvider for DefaultProcessMetaDataProvider {
    fn process_identifier(&self) -> String {
        std::process::id().to_string()
    }

    fn process_display_name(&self) -> String {
        get_owner_string()
    }
}

/// Get the `user@HOST` owner string for the current process.
pub(crate) fn get_owner_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}
