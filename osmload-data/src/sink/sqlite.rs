//! SQLite implementation of [`Destination`].
//!
//! Geometries are stored as EWKT text (`SRID=4326;POINT(lon lat)`) and
//! timestamps as RFC 3339 text, so the tables can be read without any spatial
//! extension loaded.

use chrono::{DateTime, SecondsFormat, Utc};
use geo::Point;
use rusqlite::{Connection, params};

use osmload_core::{EditInfo, Row, SinkKind};

use super::{BatchOutcome, Destination};
use crate::error::DestinationError;

struct TableSpec {
    columns: &'static [(&'static str, &'static str)],
    primary_key: &'static str,
}

const NODE: TableSpec = TableSpec {
    columns: &[
        ("id_node", "INTEGER NOT NULL"),
        ("the_geom", "TEXT NOT NULL"),
        ("elevation", "REAL"),
        ("user_name", "TEXT"),
        ("uid", "INTEGER"),
        ("visible", "INTEGER"),
        ("version", "INTEGER"),
        ("changeset", "INTEGER"),
        ("last_update", "TEXT"),
        ("name", "TEXT"),
    ],
    primary_key: "id_node",
};

const WAY: TableSpec = TableSpec {
    columns: &[
        ("id_way", "INTEGER NOT NULL"),
        ("user_name", "TEXT"),
        ("uid", "INTEGER"),
        ("visible", "INTEGER"),
        ("version", "INTEGER"),
        ("changeset", "INTEGER"),
        ("last_update", "TEXT"),
        ("name", "TEXT"),
    ],
    primary_key: "id_way",
};

const RELATION: TableSpec = TableSpec {
    columns: &[
        ("id_relation", "INTEGER NOT NULL"),
        ("user_name", "TEXT"),
        ("uid", "INTEGER"),
        ("visible", "INTEGER"),
        ("version", "INTEGER"),
        ("changeset", "INTEGER"),
        ("last_update", "TEXT"),
    ],
    primary_key: "id_relation",
};

const NODE_TAG: TableSpec = TableSpec {
    columns: &[
        ("id_node", "INTEGER NOT NULL"),
        ("tag_key", "TEXT NOT NULL"),
        ("tag_value", "TEXT"),
    ],
    primary_key: "id_node, tag_key",
};

const WAY_TAG: TableSpec = TableSpec {
    columns: &[
        ("id_way", "INTEGER NOT NULL"),
        ("tag_key", "TEXT NOT NULL"),
        ("tag_value", "TEXT"),
    ],
    primary_key: "id_way, tag_key",
};

const RELATION_TAG: TableSpec = TableSpec {
    columns: &[
        ("id_relation", "INTEGER NOT NULL"),
        ("tag_key", "TEXT NOT NULL"),
        ("tag_value", "TEXT"),
    ],
    primary_key: "id_relation, tag_key",
};

const WAY_NODE: TableSpec = TableSpec {
    columns: &[
        ("id_way", "INTEGER NOT NULL"),
        ("id_node", "INTEGER NOT NULL"),
        ("node_order", "INTEGER NOT NULL"),
    ],
    primary_key: "id_way, node_order",
};

const NODE_MEMBER: TableSpec = TableSpec {
    columns: &[
        ("id_relation", "INTEGER NOT NULL"),
        ("id_node", "INTEGER NOT NULL"),
        ("role", "TEXT"),
        ("node_order", "INTEGER NOT NULL"),
    ],
    primary_key: "id_relation, node_order",
};

const WAY_MEMBER: TableSpec = TableSpec {
    columns: &[
        ("id_relation", "INTEGER NOT NULL"),
        ("id_way", "INTEGER NOT NULL"),
        ("role", "TEXT"),
        ("way_order", "INTEGER NOT NULL"),
    ],
    primary_key: "id_relation, way_order",
};

const RELATION_MEMBER: TableSpec = TableSpec {
    columns: &[
        ("id_relation", "INTEGER NOT NULL"),
        ("id_sub_relation", "INTEGER NOT NULL"),
        ("role", "TEXT"),
        ("relation_order", "INTEGER NOT NULL"),
    ],
    primary_key: "id_relation, relation_order",
};

const fn spec(kind: SinkKind) -> &'static TableSpec {
    match kind {
        SinkKind::Node => &NODE,
        SinkKind::NodeTag => &NODE_TAG,
        SinkKind::Way => &WAY,
        SinkKind::WayTag => &WAY_TAG,
        SinkKind::WayNode => &WAY_NODE,
        SinkKind::Relation => &RELATION,
        SinkKind::RelationTag => &RELATION_TAG,
        SinkKind::NodeMember => &NODE_MEMBER,
        SinkKind::WayMember => &WAY_MEMBER,
        SinkKind::RelationMember => &RELATION_MEMBER,
    }
}

/// Quote `name` as an SQL identifier.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn create_sql(kind: SinkKind, table: &str) -> String {
    let spec = spec(kind);
    let columns: Vec<String> = spec
        .columns
        .iter()
        .map(|(column, ty)| format!("{column} {ty}"))
        .collect();
    format!(
        "CREATE TABLE {} ({}, PRIMARY KEY ({}))",
        quote_identifier(table),
        columns.join(", "),
        spec.primary_key
    )
}

fn insert_sql(kind: SinkKind, table: &str) -> String {
    let spec = spec(kind);
    let names: Vec<&str> = spec.columns.iter().map(|(column, _)| *column).collect();
    let placeholders: Vec<String> = (1..=names.len()).map(|n| format!("?{n}")).collect();
    let conflict = if kind.is_tag_table() {
        " ON CONFLICT DO NOTHING"
    } else {
        ""
    };
    format!(
        "INSERT INTO {} ({}) VALUES ({}){conflict}",
        quote_identifier(table),
        names.join(", "),
        placeholders.join(", ")
    )
}

/// Render a point as EWKT.
///
/// # Examples
/// ```
/// use geo::Point;
/// use osmload_data::ewkt_point;
///
/// assert_eq!(ewkt_point(Point::new(3.5, 45.25), 4326), "SRID=4326;POINT(3.5 45.25)");
/// ```
#[must_use]
pub fn ewkt_point(point: Point<f64>, srid: i32) -> String {
    format!("SRID={srid};POINT({} {})", point.x(), point.y())
}

fn timestamp_text(timestamp: Option<&DateTime<Utc>>) -> Option<String> {
    timestamp.map(|ts| ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn sqlite(operation: &'static str) -> impl Fn(rusqlite::Error) -> DestinationError {
    move |source| DestinationError::Sqlite { operation, source }
}

/// Destination writing into a borrowed SQLite connection.
///
/// Inserts use cached prepared statements, which
/// [`Destination::release`] drops again.
#[derive(Debug)]
pub struct SqliteDestination<'c> {
    connection: &'c Connection,
}

impl<'c> SqliteDestination<'c> {
    /// Wrap `connection`.
    #[must_use]
    pub const fn new(connection: &'c Connection) -> Self {
        Self { connection }
    }

    fn insert_row(&self, kind: SinkKind, sql: &str, row: &Row) -> Result<usize, DestinationError> {
        let mut statement = self
            .connection
            .prepare_cached(sql)
            .map_err(sqlite("prepare insert statement"))?;
        let execute = sqlite("insert row");
        match (kind, row) {
            (SinkKind::Node, Row::Node(node)) => {
                let EditInfo {
                    user,
                    uid,
                    visible,
                    version,
                    changeset,
                    timestamp,
                } = &node.edit;
                statement
                    .execute(params![
                        node.id,
                        ewkt_point(node.geometry, node.srid),
                        node.elevation,
                        user,
                        uid,
                        visible,
                        version,
                        changeset,
                        timestamp_text(timestamp.as_ref()),
                        node.name,
                    ])
                    .map_err(execute)
            }
            (SinkKind::Way, Row::Way(way)) => {
                let edit = &way.edit;
                statement
                    .execute(params![
                        way.id,
                        edit.user,
                        edit.uid,
                        edit.visible,
                        edit.version,
                        edit.changeset,
                        timestamp_text(edit.timestamp.as_ref()),
                        way.name,
                    ])
                    .map_err(execute)
            }
            (SinkKind::Relation, Row::Relation(relation)) => {
                let edit = &relation.edit;
                statement
                    .execute(params![
                        relation.id,
                        edit.user,
                        edit.uid,
                        edit.visible,
                        edit.version,
                        edit.changeset,
                        timestamp_text(edit.timestamp.as_ref()),
                    ])
                    .map_err(execute)
            }
            (SinkKind::NodeTag | SinkKind::WayTag | SinkKind::RelationTag, Row::Tag(tag)) => {
                statement
                    .execute(params![tag.owner_id, tag.key, tag.value])
                    .map_err(execute)
            }
            (SinkKind::WayNode, Row::WayNode(way_node)) => statement
                .execute(params![way_node.way_id, way_node.node_id, way_node.position])
                .map_err(execute),
            (
                SinkKind::NodeMember | SinkKind::WayMember | SinkKind::RelationMember,
                Row::Member(member),
            ) if SinkKind::members_of(member.kind) == kind => statement
                .execute(params![
                    member.relation_id,
                    member.member_ref,
                    member.role,
                    member.sequence
                ])
                .map_err(execute),
            (kind, row) => Err(DestinationError::Rejected {
                reason: format!("{row:?} does not belong in the {kind} table"),
            }),
        }
    }
}

impl Destination for SqliteDestination<'_> {
    fn table_exists(&mut self, table: &str) -> Result<bool, DestinationError> {
        let mut statement = self
            .connection
            .prepare_cached(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            )
            .map_err(sqlite("prepare table lookup"))?;
        statement
            .exists([table])
            .map_err(sqlite("look up table"))
    }

    fn drop_table(&mut self, table: &str) -> Result<(), DestinationError> {
        self.connection
            .execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_identifier(table)))
            .map_err(sqlite("drop table"))
    }

    fn create_table(&mut self, kind: SinkKind, table: &str) -> Result<(), DestinationError> {
        self.connection
            .execute_batch(&create_sql(kind, table))
            .map_err(sqlite("create table"))
    }

    fn begin(&mut self) -> Result<(), DestinationError> {
        self.connection
            .execute_batch("BEGIN")
            .map_err(sqlite("begin transaction"))
    }

    fn execute_batch(
        &mut self,
        kind: SinkKind,
        table: &str,
        rows: &[Row],
    ) -> Result<BatchOutcome, DestinationError> {
        let sql = insert_sql(kind, table);
        let mut outcome = BatchOutcome::default();
        for row in rows {
            match self.insert_row(kind, &sql, row)? {
                0 if kind.is_tag_table() => outcome.duplicate_tags += 1,
                changed => outcome.written += changed as u64,
            }
        }
        Ok(outcome)
    }

    fn commit(&mut self) -> Result<(), DestinationError> {
        self.connection
            .execute_batch("COMMIT")
            .map_err(sqlite("commit transaction"))
    }

    fn rollback(&mut self) -> Result<(), DestinationError> {
        if self.connection.is_autocommit() {
            return Ok(());
        }
        self.connection
            .execute_batch("ROLLBACK")
            .map_err(sqlite("roll back transaction"))
    }

    fn release(&mut self) -> Result<(), DestinationError> {
        self.connection.flush_prepared_statement_cache();
        Ok(())
    }
}
