//! Opaque schema metadata used to drive DDL.

/// One table's definition as enumerated by a schema descriptor.
#[derive(Debug, Clone)]
pub struct TableDdl {
    /// Table name.
    pub name: String,
    /// Column definition list, i.e. the body between the parentheses of a
    /// CREATE TABLE statement.
    pub columns_sql: String,
}

impl TableDdl {
    /// Create a new table definition.
    pub fn new(name: impl Into<String>, columns_sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns_sql: columns_sql.into(),
        }
    }
}

/// Table-definition metadata supplied by an external model layer.
///
/// The manager only enumerates tables to emit create/drop DDL; it never
/// interprets the column definitions.
pub trait SchemaDescriptor: Send + Sync {
    /// Tables described by this schema, in creation order.
    fn tables(&self) -> Vec<TableDdl>;
}

/// A fixed list of table definitions.
#[derive(Debug, Clone, Default)]
pub struct StaticSchema {
    tables: Vec<TableDdl>,
}

impl StaticSchema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table definition.
    pub fn with_table(
        mut self,
        name: impl Into<String>,
        columns_sql: impl Into<String>,
    ) -> Self {
        self.tables.push(TableDdl::new(name, columns_sql));
        self
    }
}

impl SchemaDescriptor for StaticSchema {
    fn tables(&self) -> Vec<TableDdl> {
        self.tables.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_schema_enumerates_in_order() {
        let schema = StaticSchema::new()
            .with_table("users", "id INTEGER PRIMARY KEY, name TEXT")
            .with_table("posts", "id INTEGER PRIMARY KEY, user_id INTEGER");
        let tables = schema.tables();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].name, "users");
        assert_eq!(tables[1].name, "posts");
    }
}
