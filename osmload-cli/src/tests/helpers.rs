//! Test helpers for composing ingest CLI datasets and layered overrides.

use super::*;
use crate::ingest::IngestOutcome;
use camino::{Utf8Path, Utf8PathBuf};
use osmload_core::CancellationToken;
use std::fs;
use tempfile::TempDir;

pub(super) const SMALL_OSM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6">
  <node id="1" lat="51.5007" lon="-0.1246">
    <tag k="name" v="Big Ben"/>
  </node>
  <node id="2" lat="51.5014" lon="-0.1419"/>
  <way id="3">
    <nd ref="1"/>
    <nd ref="2"/>
    <tag k="highway" v="footway"/>
  </way>
</osm>
"#;

#[derive(Debug, Clone, Default)]
pub(super) struct LayerOverrides {
    pub(super) input: Option<Utf8PathBuf>,
    pub(super) database: Option<Utf8PathBuf>,
    pub(super) table_name: Option<String>,
}

#[derive(Debug)]
pub(super) struct DatasetFiles {
    _dir: TempDir,
    cli_input: Utf8PathBuf,
    config_input: Utf8PathBuf,
    cli_database: Utf8PathBuf,
    config_database: Utf8PathBuf,
    env_database: Utf8PathBuf,
}

impl DatasetFiles {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root =
            Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
        let cli_input = root.join("cli.osm");
        let config_input = root.join("config.osm");
        for path in [&cli_input, &config_input] {
            fs::write(path, SMALL_OSM).expect("write OSM file");
        }
        Self {
            cli_database: root.join("out/cli.sqlite"),
            config_database: root.join("config.sqlite"),
            env_database: root.join("env.sqlite"),
            cli_input,
            config_input,
            _dir: dir,
        }
    }

    pub(super) fn input(&self) -> &Utf8Path {
        &self.cli_input
    }

    pub(super) fn database(&self) -> &Utf8Path {
        &self.cli_database
    }

    pub(super) fn config_input(&self) -> &Utf8Path {
        &self.config_input
    }

    pub(super) fn config_database(&self) -> &Utf8Path {
        &self.config_database
    }

    pub(super) fn env_database(&self) -> &Utf8Path {
        &self.env_database
    }
}

pub(super) fn merge_layers(
    mut cli_args: IngestArgs,
    file_layer: Option<LayerOverrides>,
    env_layer: Option<LayerOverrides>,
) -> Result<IngestConfig, CliError> {
    merge_field(
        &mut cli_args.input,
        extract_field(&env_layer, |layer| &layer.input),
        extract_field(&file_layer, |layer| &layer.input),
    );
    merge_field(
        &mut cli_args.database,
        extract_field(&env_layer, |layer| &layer.database),
        extract_field(&file_layer, |layer| &layer.database),
    );
    merge_field(
        &mut cli_args.table_name,
        extract_field(&env_layer, |layer| &layer.table_name),
        extract_field(&file_layer, |layer| &layer.table_name),
    );
    resolve_ingest_config(cli_args)
}

fn merge_field<T: Clone>(target: &mut Option<T>, env_value: Option<T>, file_value: Option<T>) {
    if target.is_none()
        && let Some(value) = env_value.or(file_value)
    {
        *target = Some(value);
    }
}

fn extract_field<T: Clone>(
    layer: &Option<LayerOverrides>,
    accessor: fn(&LayerOverrides) -> &Option<T>,
) -> Option<T> {
    layer.as_ref().and_then(|entry| accessor(entry).clone())
}

/// Resolve `args` the way the binary does and run the ingestion with `token`.
pub(super) fn run_ingest(
    args: IngestArgs,
    token: CancellationToken,
) -> Result<IngestOutcome, CliError> {
    execute_ingest(resolve_ingest_config(args)?, token)
}

/// Write `contents` to `path` as a bzip2 stream.
pub(super) fn write_bzip2(path: &Utf8Path, contents: &str) {
    use bzip2::{Compression, write::BzEncoder};
    use std::io::Write;

    let mut encoder = BzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(contents.as_bytes())
        .expect("compress OSM file");
    let compressed = encoder.finish().expect("finish bzip2 stream");
    fs::write(path, compressed).expect("write compressed OSM file");
}
