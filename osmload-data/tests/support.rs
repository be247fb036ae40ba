use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::{Connection, types::Value};
use std::{fs, io::Write};
use tempfile::{Builder, TempPath};

/// Row counts of the sample fixture, in canonical table order.
pub const SAMPLE_ROW_COUNTS: [i64; 10] = [3, 3, 1, 2, 4, 1, 1, 1, 1, 1];

/// Path of a checked-in fixture.
pub fn fixture_path(name: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Raw bytes of a checked-in fixture.
pub fn fixture_bytes(name: &str) -> Vec<u8> {
    let path = fixture_path(name);
    fs::read(&path).unwrap_or_else(|err| panic!("failed to read fixture {path}: {err}"))
}

/// Write `contents` to a temporary file whose name ends in `suffix`.
pub fn write_input(contents: &[u8], suffix: &str) -> TempPath {
    let mut file = Builder::new()
        .prefix("osmload")
        .suffix(suffix)
        .tempfile()
        .unwrap_or_else(|err| panic!("failed to create temporary {suffix} file: {err}"));
    file.write_all(contents)
        .unwrap_or_else(|err| panic!("failed to write temporary {suffix} file: {err}"));
    file.flush()
        .unwrap_or_else(|err| panic!("failed to flush temporary {suffix} file: {err}"));
    file.into_temp_path()
}

/// Gzip-compress `contents`.
pub fn gzip_bytes(contents: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(contents)
        .unwrap_or_else(|err| panic!("gzip failed: {err}"));
    encoder
        .finish()
        .unwrap_or_else(|err| panic!("gzip failed: {err}"))
}

/// Bzip2-compress `contents`.
pub fn bzip2_bytes(contents: &[u8]) -> Vec<u8> {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder
        .write_all(contents)
        .unwrap_or_else(|err| panic!("bzip2 failed: {err}"));
    encoder
        .finish()
        .unwrap_or_else(|err| panic!("bzip2 failed: {err}"))
}

/// View a temporary path as UTF-8.
pub fn utf8(path: &TempPath) -> &Utf8Path {
    Utf8Path::from_path(path.as_ref()).expect("temporary paths are UTF-8")
}

/// Number of rows in `table`.
pub fn row_count(connection: &Connection, table: &str) -> i64 {
    connection
        .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
            row.get(0)
        })
        .unwrap_or_else(|err| panic!("failed to count rows of {table}: {err}"))
}

/// Every row of `table` in insertion order, rendered as text.
pub fn dump_table(connection: &Connection, table: &str) -> Vec<String> {
    let mut statement = connection
        .prepare(&format!("SELECT * FROM \"{table}\" ORDER BY rowid"))
        .unwrap_or_else(|err| panic!("failed to query {table}: {err}"));
    let columns = statement.column_count();
    let rows = statement
        .query_map([], |row| {
            (0..columns)
                .map(|index| row.get::<_, Value>(index).map(|value| format!("{value:?}")))
                .collect::<Result<Vec<_>, _>>()
                .map(|values| values.join("|"))
        })
        .unwrap_or_else(|err| panic!("failed to query {table}: {err}"));
    rows.collect::<Result<Vec<_>, _>>()
        .unwrap_or_else(|err| panic!("failed to read {table}: {err}"))
}
