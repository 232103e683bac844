//! Whole-state snapshot so a finished run can be reloaded without the pipeline.
//!
//! Layout: `CVSNAP01`, a little-endian `u32` header length, the JSON header,
//! then one Arrow IPC payload per table in header order.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::PipelineSettings;
use crate::error::{Diagnostic, EtlError, EtlResult};
use crate::pipeline::PipelineState;

pub const MAGIC: &[u8; 8] = b"CVSNAP01";
pub const FORMAT_VERSION: u32 = 1;

const FULL_TABLE: &str = "table";
const RELEVANT_TABLE: &str = "relevant";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableEntry {
    name: String,
    bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotHeader {
    version: u32,
    settings: PipelineSettings,
    diagnostics: Vec<Diagnostic>,
    tables: Vec<TableEntry>,
}

fn encode_table(df: &DataFrame) -> EtlResult<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut df = df.clone();
    IpcWriter::new(&mut buffer).finish(&mut df)?;
    Ok(buffer)
}

fn decode_table(bytes: &[u8]) -> EtlResult<DataFrame> {
    Ok(IpcReader::new(Cursor::new(bytes.to_vec())).finish()?)
}

/// Serialize a finished run.
pub fn save_snapshot(state: &PipelineState) -> EtlResult<Vec<u8>> {
    let payloads = [
        (FULL_TABLE, encode_table(&state.table)?),
        (RELEVANT_TABLE, encode_table(&state.relevant)?),
    ];
    let header = SnapshotHeader {
        version: FORMAT_VERSION,
        settings: state.settings.clone(),
        diagnostics: state.diagnostics.clone(),
        tables: payloads
            .iter()
            .map(|(name, bytes)| TableEntry {
                name: name.to_string(),
                bytes: bytes.len() as u64,
            })
            .collect(),
    };
    let header = serde_json::to_vec(&header)?;
    let header_len = u32::try_from(header.len())
        .map_err(|_| EtlError::snapshot("snapshot header exceeds 4 GiB"))?;

    let mut out = Vec::with_capacity(
        MAGIC.len() + 4 + header.len() + payloads.iter().map(|(_, b)| b.len()).sum::<usize>(),
    );
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&header);
    for (_, bytes) in &payloads {
        out.extend_from_slice(bytes);
    }
    log::debug!("Snapshot encoded: {} bytes", out.len());
    Ok(out)
}

/// Rebuild the state written by [`save_snapshot`].
pub fn load_snapshot(bytes: &[u8]) -> EtlResult<PipelineState> {
    let rest = bytes
        .strip_prefix(MAGIC.as_slice())
        .ok_or_else(|| EtlError::snapshot("not a snapshot (bad magic)"))?;
    if rest.len() < 4 {
        return Err(EtlError::snapshot("truncated header length"));
    }
    let (len, rest) = rest.split_at(4);
    let header_len = u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize;
    if rest.len() < header_len {
        return Err(EtlError::snapshot("truncated header"));
    }
    let (header, mut payload) = rest.split_at(header_len);
    let header: SnapshotHeader = serde_json::from_slice(header)?;
    if header.version != FORMAT_VERSION {
        return Err(EtlError::snapshot(format!(
            "unsupported snapshot version {}",
            header.version
        )));
    }

    let mut table = None;
    let mut relevant = None;
    for entry in &header.tables {
        let size = usize::try_from(entry.bytes)
            .map_err(|_| EtlError::snapshot(format!("table '{}' too large", entry.name)))?;
        if payload.len() < size {
            return Err(EtlError::snapshot(format!("truncated table '{}'", entry.name)));
        }
        let (chunk, remaining) = payload.split_at(size);
        payload = remaining;
        match entry.name.as_str() {
            FULL_TABLE => table = Some(decode_table(chunk)?),
            RELEVANT_TABLE => relevant = Some(decode_table(chunk)?),
            other => log::warn!("Ignoring unknown snapshot table '{other}'"),
        }
    }

    Ok(PipelineState {
        settings: header.settings,
        table: table.ok_or_else(|| EtlError::snapshot("missing full table"))?,
        relevant: relevant.ok_or_else(|| EtlError::snapshot("missing relevant table"))?,
        diagnostics: header.diagnostics,
    })
}

pub fn write_snapshot_file<P: AsRef<Path>>(state: &PipelineState, path: P) -> EtlResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, save_snapshot(state)?)?;
    log::info!("Snapshot written to {}", path.display());
    Ok(())
}

pub fn read_snapshot_file<P: AsRef<Path>>(path: P) -> EtlResult<PipelineState> {
    load_snapshot(&fs::read(path)?)
}

/// Write a table as comma-separated text with a header row.
pub fn export_csv<P: AsRef<Path>>(df: &DataFrame, path: P) -> EtlResult<()> {
    let mut file = fs::File::create(path.as_ref())?;
    let mut df = df.clone();
    CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
    Ok(())
}
