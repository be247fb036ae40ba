//! File-level ingestion tests: containers, encodings and failure modes.

use camino::Utf8Path;
use rstest::{fixture, rstest};
use rusqlite::Connection;

use osmload_core::{CancellationToken, LoggingProgress, NoProgress};
use osmload_data::{FailureKind, IngestError, IngestOptions, TableNames, ingest_osm_file};

mod support;

use support::{
    SAMPLE_ROW_COUNTS, bzip2_bytes, dump_table, fixture_bytes, fixture_path, gzip_bytes,
    row_count, utf8, write_input,
};

#[fixture]
fn database() -> Connection {
    Connection::open_in_memory().expect("open in-memory database")
}

fn table_counts(connection: &Connection, base: &str) -> Vec<i64> {
    let tables = TableNames::new(base).expect("valid base name");
    tables
        .iter()
        .map(|(_, table)| row_count(connection, table))
        .collect()
}

fn dump(connection: &Connection, base: &str) -> Vec<Vec<String>> {
    let tables = TableNames::new(base).expect("valid base name");
    tables
        .iter()
        .map(|(_, table)| dump_table(connection, table))
        .collect()
}

#[rstest]
#[case::plain(".osm", fixture_bytes("sample.osm"))]
#[case::gzip(".osm.gz", gzip_bytes(&fixture_bytes("sample.osm")))]
#[case::bzip2(".OSM.BZ2", bzip2_bytes(&fixture_bytes("sample.osm")))]
fn every_container_yields_the_same_tables(
    database: Connection,
    #[case] suffix: &str,
    #[case] contents: Vec<u8>,
) {
    let input = write_input(&contents, suffix);
    let token = CancellationToken::new();
    let mut progress = LoggingProgress::new(token);

    let report = ingest_osm_file(
        utf8(&input),
        &database,
        "sample",
        &mut progress,
        &IngestOptions::default(),
    )
    .expect("sample ingests");

    assert_eq!(table_counts(&database, "sample"), SAMPLE_ROW_COUNTS.to_vec());
    assert_eq!(report.counts.nodes, 3);
    assert_eq!(report.counts.ways, 1);
    assert_eq!(report.counts.relations, 1);
    assert_eq!(report.duplicate_tags, 1);
    assert_eq!(progress.last_step(), Some(100));
}

#[rstest]
fn sample_metadata_is_preserved(database: Connection) {
    ingest_osm_file(
        &fixture_path("sample.osm"),
        &database,
        "sample",
        &mut NoProgress,
        &IngestOptions::default(),
    )
    .expect("sample ingests");

    let node: (String, Option<f64>, String, i64, bool, i32, i64, String, String) = database
        .query_row(
            "SELECT the_geom, elevation, user_name, uid, visible, version, changeset, \
             last_update, name FROM sample_node WHERE id_node = 1",
            [],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                ))
            },
        )
        .expect("node 1");
    assert_eq!(node.0, "SRID=4326;POINT(2.3522 48.8566)");
    assert_eq!(node.1, Some(35.0));
    assert_eq!(node.2, "alice");
    assert_eq!((node.3, node.4, node.5, node.6), (7, true, 3, 100));
    assert_eq!(node.7, "2023-05-01T10:00:00Z");
    assert_eq!(node.8, "Hôtel de Ville");

    let way_name: String = database
        .query_row("SELECT name FROM sample_way WHERE id_way = 10", [], |row| {
            row.get(0)
        })
        .expect("way 10");
    assert_eq!(way_name, "Quai de l'Hôtel de Ville");

    let bench: String = database
        .query_row(
            "SELECT tag_value FROM sample_node_tag WHERE id_node = 3 AND tag_key = 'amenity'",
            [],
            |row| row.get(0),
        )
        .expect("first amenity tag");
    assert_eq!(bench, "bench");
}

#[rstest]
fn way_nodes_and_members_keep_document_order(database: Connection) {
    ingest_osm_file(
        &fixture_path("sample.osm"),
        &database,
        "sample",
        &mut NoProgress,
        &IngestOptions::default(),
    )
    .expect("sample ingests");

    let mut statement = database
        .prepare("SELECT id_node FROM sample_way_node WHERE id_way = 10 ORDER BY node_order")
        .expect("query way nodes");
    let refs: Vec<i64> = statement
        .query_map([], |row| row.get(0))
        .expect("read way nodes")
        .collect::<Result<_, _>>()
        .expect("decode way nodes");
    assert_eq!(refs, vec![1, 2, 3, 1]);

    let sequences: Vec<i64> = ["way_order", "node_order", "relation_order"]
        .iter()
        .zip(["sample_way_member", "sample_node_member", "sample_relation_member"])
        .map(|(column, table)| {
            database
                .query_row(&format!("SELECT {column} FROM {table}"), [], |row| {
                    row.get(0)
                })
                .expect("member row")
        })
        .collect();
    assert_eq!(sequences, vec![1, 2, 3]);
}

#[rstest]
fn reingesting_into_a_fresh_database_is_identical() {
    let first = Connection::open_in_memory().expect("first database");
    let second = Connection::open_in_memory().expect("second database");
    for connection in [&first, &second] {
        ingest_osm_file(
            &fixture_path("sample.osm"),
            connection,
            "sample",
            &mut NoProgress,
            &IngestOptions::default(),
        )
        .expect("sample ingests");
    }
    assert_eq!(dump(&first, "sample"), dump(&second, "sample"));
}

#[rstest]
fn drop_existing_replaces_previous_tables(database: Connection) {
    let path = fixture_path("sample.osm");
    let options = IngestOptions::default();
    ingest_osm_file(&path, &database, "sample", &mut NoProgress, &options)
        .expect("first run");

    let err = ingest_osm_file(&path, &database, "sample", &mut NoProgress, &options)
        .expect_err("tables already exist");
    assert!(matches!(err, IngestError::TableExists { .. }), "got {err:?}");

    ingest_osm_file(
        &path,
        &database,
        "sample",
        &mut NoProgress,
        &options.with_drop_existing(true),
    )
    .expect("second run replaces the tables");
    assert_eq!(table_counts(&database, "sample"), SAMPLE_ROW_COUNTS.to_vec());
}

#[rstest]
fn empty_document_creates_ten_empty_tables(database: Connection) {
    let input = write_input(b"<?xml version=\"1.0\"?><osm version=\"0.6\"/>", ".osm");
    let report = ingest_osm_file(
        utf8(&input),
        &database,
        "empty",
        &mut NoProgress,
        &IngestOptions::default(),
    )
    .expect("empty document ingests");
    assert_eq!(report.tables.len(), 10);
    assert_eq!(table_counts(&database, "empty"), vec![0; 10]);
}

#[rstest]
fn declared_latin1_is_transcoded(database: Connection) {
    let input = write_input(
        b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\
          <osm><node id=\"1\" lat=\"0\" lon=\"0\"><tag k=\"name\" v=\"Caf\xE9\"/></node></osm>",
        ".osm",
    );
    ingest_osm_file(
        utf8(&input),
        &database,
        "latin",
        &mut NoProgress,
        &IngestOptions::default(),
    )
    .expect("latin-1 document ingests");
    let name: String = database
        .query_row("SELECT name FROM latin_node", [], |row| row.get(0))
        .expect("node name");
    assert_eq!(name, "Café");
}

#[rstest]
fn ascii_document_declaring_utf16_still_loads(database: Connection) {
    let input = write_input(
        b"<?xml version=\"1.0\" encoding=\"UTF-16\"?>\
          <osm><node id=\"1\" lat=\"1\" lon=\"2\"/></osm>",
        ".osm",
    );
    let report = ingest_osm_file(
        utf8(&input),
        &database,
        "mislabelled",
        &mut NoProgress,
        &IngestOptions::default(),
    )
    .expect("mislabelled document ingests");
    assert_eq!(report.counts.nodes, 1);
    assert_eq!(row_count(&database, "mislabelled_node"), 1);
}

#[rstest]
fn encoding_override_beats_the_declaration(database: Connection) {
    let input = write_input(
        b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
          <osm><node id=\"1\" lat=\"0\" lon=\"0\"><tag k=\"name\" v=\"Caf\xE9\"/></node></osm>",
        ".osm",
    );
    ingest_osm_file(
        utf8(&input),
        &database,
        "forced",
        &mut NoProgress,
        &IngestOptions::default().with_encoding("latin1"),
    )
    .expect("forced encoding ingests");
    let name: String = database
        .query_row("SELECT name FROM forced_node", [], |row| row.get(0))
        .expect("node name");
    assert_eq!(name, "Café");
}

#[rstest]
fn unknown_encoding_is_a_resource_failure(database: Connection) {
    let err = ingest_osm_file(
        &fixture_path("sample.osm"),
        &database,
        "sample",
        &mut NoProgress,
        &IngestOptions::default().with_encoding("klingon"),
    )
    .expect_err("unknown label");
    assert!(matches!(err, IngestError::UnknownEncoding { .. }), "got {err:?}");
    assert_eq!(err.kind(), FailureKind::ResourceFailure);
}

#[rstest]
#[case::pbf("map.osm.pbf")]
#[case::xml("map.xml")]
fn unsupported_extensions_are_rejected(database: Connection, #[case] name: &str) {
    let err = ingest_osm_file(
        Utf8Path::new(name),
        &database,
        "map",
        &mut NoProgress,
        &IngestOptions::default(),
    )
    .expect_err("unsupported container");
    assert!(matches!(err, IngestError::UnsupportedFormat { .. }), "got {err:?}");
}

#[rstest]
fn missing_file_reports_the_path(database: Connection) {
    let path = fixture_path("missing.osm");
    let err = ingest_osm_file(
        &path,
        &database,
        "map",
        &mut NoProgress,
        &IngestOptions::default(),
    )
    .expect_err("missing file");
    match err {
        IngestError::Open { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("expected an open failure, got {other:?}"),
    }
}

#[rstest]
#[case::node_without_latitude(r#"<osm><node id="1" lon="0"/></osm>"#)]
#[case::infinite_longitude(r#"<osm><node id="1" lat="0" lon="inf"/></osm>"#)]
#[case::unknown_member_type(
    r#"<osm><relation id="1"><member type="area" ref="2"/></relation></osm>"#
)]
#[case::unterminated_way(r#"<osm><way id="1"><nd ref="2"/>"#)]
#[case::broken_markup(r#"<osm><node id="1" lat="0" lon="0"></way></osm>"#)]
fn malformed_documents_are_rejected(database: Connection, #[case] xml: &str) {
    let input = write_input(xml.as_bytes(), ".osm");
    let err = ingest_osm_file(
        utf8(&input),
        &database,
        "bad",
        &mut NoProgress,
        &IngestOptions::default(),
    )
    .expect_err("malformed input");
    assert_eq!(err.kind(), FailureKind::MalformedInput, "got {err:?}");
}
