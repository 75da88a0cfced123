//! Statement construction for sharded tables.
//!
//! Statements carry both a structured form, which in-process collaborators dispatch
//! on, and the rendered SQL a relational collaborator would execute.

use crate::model::{RecordId, ShardCoordinate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a record is written to its partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteMode {
    /// Plain insert; a duplicate id is a constraint violation.
    #[default]
    Insert,
    /// Insert or keep the existing row.
    Upsert,
}

/// Naming scheme for partitions: `<database_prefix><group>.<table_prefix><slot>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardNaming {
    pub database_prefix: String,
    pub table_prefix: String,
}

impl Default for ShardNaming {
    fn default() -> Self {
        Self {
            database_prefix: crate::config::DEFAULT_DATABASE_PREFIX.to_string(),
            table_prefix: crate::config::DEFAULT_TABLE_PREFIX.to_string(),
        }
    }
}

impl ShardNaming {
    pub fn database(&self, group: u32) -> String {
        format!("{}{}", self.database_prefix, group)
    }

    pub fn table(&self, coordinate: ShardCoordinate) -> String {
        format!(
            "{}{}.{}{}",
            self.database_prefix, coordinate.group, self.table_prefix, coordinate.slot
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    CreateDatabase { group: u32 },
    CreateTable { coordinate: ShardCoordinate },
    Insert {
        coordinate: ShardCoordinate,
        id: RecordId,
        mode: WriteMode,
    },
    PointLookup {
        coordinate: ShardCoordinate,
        id: RecordId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub kind: StatementKind,
    pub sql: String,
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Renders statements against a [`ShardNaming`].
#[derive(Debug, Clone, Default)]
pub struct StatementBuilder {
    naming: ShardNaming,
}

impl StatementBuilder {
    pub fn new(naming: ShardNaming) -> Self {
        Self { naming }
    }

    pub fn naming(&self) -> &ShardNaming {
        &self.naming
    }

    pub fn create_database(&self, group: u32) -> Statement {
        Statement {
            kind: StatementKind::CreateDatabase { group },
            sql: format!("CREATE DATABASE IF NOT EXISTS {}", self.naming.database(group)),
        }
    }

    pub fn create_table(&self, coordinate: ShardCoordinate) -> Statement {
        Statement {
            kind: StatementKind::CreateTable { coordinate },
            sql: format!(
                "CREATE TABLE IF NOT EXISTS {} (id BIGINT PRIMARY KEY, \
                 created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)",
                self.naming.table(coordinate)
            ),
        }
    }

    pub fn insert(&self, coordinate: ShardCoordinate, id: RecordId, mode: WriteMode) -> Statement {
        let table = self.naming.table(coordinate);
        let sql = match mode {
            WriteMode::Insert => format!("INSERT INTO {table} (id) VALUES ({id})"),
            WriteMode::Upsert => {
                format!("INSERT INTO {table} (id) VALUES ({id}) ON DUPLICATE KEY UPDATE id = id")
            }
        };
        Statement {
            kind: StatementKind::Insert {
                coordinate,
                id,
                mode,
            },
            sql,
        }
    }

    pub fn point_lookup(&self, coordinate: ShardCoordinate, id: RecordId) -> Statement {
        Statement {
            kind: StatementKind::PointLookup { coordinate, id },
            sql: format!(
                "SELECT id FROM {} WHERE id = {id}",
                self.naming.table(coordinate)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_naming_matches_user_tables() {
        let naming = ShardNaming::default();
        assert_eq!(naming.database(3), "user_3");
        assert_eq!(naming.table(ShardCoordinate::new(3, 5)), "user_3.user_info_5");
    }

    #[test]
    fn insert_and_lookup_render_scoped_sql() {
        let builder = StatementBuilder::default();
        let coordinate = ShardCoordinate::new(2, 0);
        let insert = builder.insert(coordinate, RecordId(100_000_000), WriteMode::Insert);
        assert_eq!(
            insert.sql,
            "INSERT INTO user_2.user_info_0 (id) VALUES (100000000)"
        );
        let lookup = builder.point_lookup(coordinate, RecordId(100_000_000));
        assert_eq!(
            lookup.to_string(),
            "SELECT id FROM user_2.user_info_0 WHERE id = 100000000"
        );
    }

    #[test]
    fn upsert_keeps_existing_row() {
        let builder = StatementBuilder::new(ShardNaming {
            database_prefix: "acct_".to_string(),
            table_prefix: "t".to_string(),
        });
        let statement = builder.insert(ShardCoordinate::new(0, 1), RecordId(-7), WriteMode::Upsert);
        assert_eq!(
            statement.sql,
            "INSERT INTO acct_0.t1 (id) VALUES (-7) ON DUPLICATE KEY UPDATE id = id"
        );
        assert!(matches!(
            statement.kind,
            StatementKind::Insert {
                mode: WriteMode::Upsert,
                ..
            }
        ));
    }

    #[test]
    fn schema_statements_are_idempotent_ddl() {
        let builder = StatementBuilder::default();
        assert_eq!(
            builder.create_database(7).sql,
            "CREATE DATABASE IF NOT EXISTS user_7"
        );
        assert!(builder
            .create_table(ShardCoordinate::new(7, 7))
            .sql
            .starts_with("CREATE TABLE IF NOT EXISTS user_7.user_info_7 (id BIGINT PRIMARY KEY"));
    }
}
