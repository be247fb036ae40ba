//! Shared test harness modules for the osmload CLI.
#![expect(
    clippy::panic,
    reason = "Tests assert panic branches to surface unexpected CLI outcomes"
)]

use super::*;
use crate::ingest::{IngestConfig, default_table_name};
use helpers::run_ingest;

mod helpers;
