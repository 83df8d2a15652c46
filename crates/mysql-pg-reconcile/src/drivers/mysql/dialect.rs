//! MySQL/MariaDB SQL dialect (Strategy pattern).
//!
//! Provides MySQL-specific identifier quoting and string literal rules.

use crate::core::identifier::quote_mysql;
use crate::core::traits::Dialect;

/// MySQL dialect implementation.
///
/// String literals follow the server default SQL mode (backslash is an escape
/// character), so backslashes are escaped before quotes are doubled.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_mysql(name)
    }

    fn quote_text(&self, value: &str) -> Result<String, String> {
        let mut out = String::with_capacity(value.len() + 2);
        out.push('\'');
        for c in value.chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                '\0' => out.push_str("\\0"),
                '\x1a' => out.push_str("\\Z"),
                '\'' => out.push_str("''"),
                _ => out.push(c),
            }
        }
        out.push('\'');
        Ok(out)
    }

    fn decode_text(&self, literal: &str) -> Option<String> {
        let inner = literal.strip_prefix('\'')?.strip_suffix('\'')?;
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    let escaped = match chars.next()? {
                        '0' => '\0',
                        'Z' => '\x1a',
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        'b' => '\x08',
                        other => other,
                    };
                    out.push(escaped);
                }
                '\'' => {
                    // Inside the literal a quote only appears doubled.
                    if chars.next()? != '\'' {
                        return None;
                    }
                    out.push('\'');
                }
                _ => out.push(c),
            }
        }

        Some(out)
    }

    fn list_tables_query(&self) -> String {
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = DATABASE() ORDER BY table_name"
            .to_string()
    }
}
