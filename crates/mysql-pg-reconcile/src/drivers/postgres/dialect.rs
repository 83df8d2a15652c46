//! PostgreSQL SQL dialect (Strategy pattern).
//!
//! Provides PostgreSQL-specific identifier quoting and string literal rules.

use crate::core::identifier::quote_pg;
use crate::core::traits::Dialect;

/// PostgreSQL dialect implementation.
///
/// Assumes `standard_conforming_strings = on` (the default since 9.1): in a
/// plain `'...'` literal a backslash is an ordinary character. Values that
/// contain a backslash are written as `E'...'` escape strings so the literal
/// means the same thing whatever that setting is.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_pg(name)
    }

    fn quote_text(&self, value: &str) -> Result<String, String> {
        if value.contains('\0') {
            return Err("PostgreSQL text cannot contain NUL bytes".to_string());
        }

        if value.contains('\\') {
            let escaped = value.replace('\\', "\\\\").replace('\'', "''");
            Ok(format!("E'{}'", escaped))
        } else {
            Ok(format!("'{}'", value.replace('\'', "''")))
        }
    }

    fn decode_text(&self, literal: &str) -> Option<String> {
        let prefixed = literal
            .strip_prefix('E')
            .or_else(|| literal.strip_prefix('e'));
        let (escape_string, body) = match prefixed {
            Some(rest) => (true, rest),
            None => (false, literal),
        };
        let inner = body.strip_prefix('\'')?.strip_suffix('\'')?;

        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' if escape_string => {
                    let escaped = match chars.next()? {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        'b' => '\x08',
                        'f' => '\x0c',
                        other => other,
                    };
                    out.push(escaped);
                }
                '\'' => {
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
        "SELECT tablename FROM pg_tables WHERE schemaname = current_schema() ORDER BY tablename"
            .to_string()
    }
}
