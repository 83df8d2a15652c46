//! Identifier validation and quoting.
//!
//! Table and column names come from configuration and end up inside generated
//! statements. They cannot be bound as parameters, so every identifier is
//! validated once when the table spec is loaded and quoted with the target
//! dialect's delimiter whenever a statement is built.

use crate::error::{ReconcileError, Result};

/// Maximum identifier length.
/// - PostgreSQL: 63 bytes
/// - MySQL: 64 characters
const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Validate an identifier.
///
/// Rejects empty identifiers, identifiers containing null bytes or control
/// characters, and identifiers exceeding the maximum length.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ReconcileError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.chars().any(|c| c == '\0' || c.is_control()) {
        return Err(ReconcileError::Config(format!(
            "Identifier contains a control character: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ReconcileError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier.
///
/// ```ignore
/// assert_eq!(quote_pg("users"), "\"users\"");
/// assert_eq!(quote_pg("table\"name"), "\"table\"\"name\"");
/// ```
pub fn quote_pg(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a MySQL identifier using backticks.
///
/// ```ignore
/// assert_eq!(quote_mysql("users"), "`users`");
/// assert_eq!(quote_mysql("table`name"), "`table``name`");
/// ```
pub fn quote_mysql(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
