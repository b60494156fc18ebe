//! SQL dialects: the only backend-specific part of statement generation.

/// Identifier quoting and generated-key retrieval for one SQL flavour.
pub trait Dialect: Send + Sync + std::fmt::Debug {
    /// Short provider-facing name (`"sqlserver"`, `"mysql"`, ...)
    fn name(&self) -> &'static str;

    /// Escape a table or column name
    fn quote_identifier(&self, identifier: &str) -> String;

    /// Prefix of named parameters in generated SQL
    fn parameter_marker(&self) -> char {
        '@'
    }

    /// Adapt an INSERT so that scalar execution yields the generated key
    fn generated_key_sql(&self, insert_sql: &str, key_column: &str) -> String;
}

fn quote_with(identifier: &str, open: char, close: char) -> String {
    let escaped = identifier.replace(close, &format!("{close}{close}"));
    format!("{open}{escaped}{close}")
}

/// `[bracketed]` identifiers, `SCOPE_IDENTITY()` keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl Dialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        quote_with(identifier, '[', ']')
    }

    fn generated_key_sql(&self, insert_sql: &str, _key_column: &str) -> String {
        format!("{insert_sql}; SELECT CAST(SCOPE_IDENTITY() AS int)")
    }
}

/// `` `backtick` `` identifiers; the driver reports the last insert id.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        quote_with(identifier, '`', '`')
    }

    fn generated_key_sql(&self, insert_sql: &str, _key_column: &str) -> String {
        insert_sql.to_string()
    }
}

/// ANSI `"quoted"` identifiers, `RETURNING` keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        quote_with(identifier, '"', '"')
    }

    fn generated_key_sql(&self, insert_sql: &str, key_column: &str) -> String {
        format!("{insert_sql} RETURNING {}", self.quote_identifier(key_column))
    }
}

/// ANSI `"quoted"` identifiers, `RETURNING` keys (SQLite 3.35+).
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        quote_with(identifier, '"', '"')
    }

    fn generated_key_sql(&self, insert_sql: &str, key_column: &str) -> String {
        format!("{insert_sql} RETURNING {}", self.quote_identifier(key_column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoting_escapes_closing_delimiter() {
        assert_eq!(SqlServerDialect.quote_identifier("User"), "[User]");
        assert_eq!(SqlServerDialect.quote_identifier("we]ird"), "[we]]ird]");
        assert_eq!(MySqlDialect.quote_identifier("User"), "`User`");
        assert_eq!(PostgresDialect.quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_generated_key_sql() {
        let insert = "INSERT INTO [User] ([UserName]) VALUES (@UserName)";
        assert_eq!(
            SqlServerDialect.generated_key_sql(insert, "Id"),
            format!("{insert}; SELECT CAST(SCOPE_IDENTITY() AS int)")
        );
        assert_eq!(MySqlDialect.generated_key_sql("INSERT", "Id"), "INSERT");
        assert_eq!(
            SqliteDialect.generated_key_sql("INSERT", "Id"),
            "INSERT RETURNING \"Id\""
        );
    }
}
