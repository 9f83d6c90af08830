//! Default values for configuration

/// Environment variable that relocates the base directory
pub const HOME_ENV: &str = "STUDYPLAN_SYNC_HOME";

/// Default maximum pooled SQLite connections
pub fn default_max_connections() -> u32 {
    5
}

/// Default SQLite busy timeout in seconds
pub fn default_busy_timeout_secs() -> u64 {
    5
}

/// Default: an explicit `null` override does not clear a persisted date
pub fn default_allow_explicit_clear() -> bool {
    false
}

/// Default: schedule imports on a master plan also reach linked copy items
pub fn default_propagate_import_to_copies() -> bool {
    true
}

/// Render a commented config file for `init`
pub fn render_config_toml(config: &super::Config) -> String {
    format!(
        r#"# studyplan-sync configuration

[database]
# Maximum pooled SQLite connections
max_connections = {max_connections}
# Seconds to wait on a locked database before failing
busy_timeout_secs = {busy_timeout_secs}

[engine]
# When true, an explicit null in an override clears a persisted date.
# When false, null is only honored for items that have no value yet.
allow_explicit_clear = {allow_explicit_clear}
# Apply schedule imports on a master plan to the copy items linked to it
propagate_import_to_copies = {propagate_import_to_copies}
"#,
        max_connections = config.database.max_connections,
        busy_timeout_secs = config.database.busy_timeout_secs,
        allow_explicit_clear = config.engine.allow_explicit_clear,
        propagate_import_to_copies = config.engine.propagate_import_to_copies,
    )
}
