//! Package reading (spec.md §6.2 "UHC Package format"). Both variants carry
//! the same manifest fields and the same per-entity document set; this
//! module abstracts the container format behind one trait so the rest of
//! the pipeline never branches on it.

use crate::error::{IngestError, Result};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One entity document or attachment extracted from a package, by its
/// logical name (e.g. `buildings.json`, `attachments/foo.jpg`).
pub trait PackageReader {
    fn manifest_bytes(&mut self) -> Result<Vec<u8>>;

    /// Bytes of one entity document (`buildings.json`, `persons.json`, ...),
    /// or `None` if the package doesn't carry that entity kind.
    fn entity_bytes(&mut self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Attachment file names under `attachments/`, catalogued but never
    /// loaded into memory (spec.md §4.4 "extract_records").
    fn attachment_names(&mut self) -> Result<Vec<String>>;
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// SHA-256 over the concatenated entity-document bytes, in
/// [`ENTITY_DOCUMENTS`] order, skipping documents the package doesn't
/// carry. This is the "data stream" `manifest.checksum` is verified
/// against (spec.md §6.2) — the manifest itself is excluded since it
/// carries the checksum value being verified.
pub fn data_stream_checksum(reader: &mut dyn PackageReader) -> Result<String> {
    let mut hasher = Sha256::new();
    for (filename, _) in ENTITY_DOCUMENTS {
        if let Some(bytes) = reader.entity_bytes(filename)? {
            hasher.update(&bytes);
        }
    }
    Ok(hex::encode(hasher.finalize()))
}

/// ZIP-archive realization of [`PackageReader`]: `manifest.json` plus one
/// JSON document per entity kind plus `attachments/*`.
pub struct ZipPackageReader {
    archive: zip::ZipArchive<std::fs::File>,
}

impl ZipPackageReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let archive = zip::ZipArchive::new(file)?;
        Ok(Self { archive })
    }

    fn read_entry(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        match self.archive.by_name(name) {
            Ok(mut entry) => {
                let mut buf = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut buf)?;
                Ok(Some(buf))
            }
            Err(zip::result::ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(IngestError::Zip(e)),
        }
    }
}

impl PackageReader for ZipPackageReader {
    fn manifest_bytes(&mut self) -> Result<Vec<u8>> {
        self.read_entry("manifest.json")?
            .ok_or_else(|| IngestError::Fatal("manifest.json missing from package".into()))
    }

    fn entity_bytes(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        self.read_entry(name)
    }

    fn attachment_names(&mut self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for i in 0..self.archive.len() {
            let entry = self.archive.by_index(i)?;
            if entry.name().starts_with("attachments/") && !entry.is_dir() {
                out.push(entry.name().to_string());
            }
        }
        Ok(out)
    }
}

/// Column names whose SQLite storage type is `INTEGER` (0/1) but whose
/// document shape is a JSON boolean; every other integer column passes
/// through as a JSON number.
const BOOL_COLUMNS: &[(&str, &str)] = &[("persons", "contact"), ("documents", "verified")];

fn sqlite_value_to_json(table: &str, column: &str, value: ValueRef) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => {
            if BOOL_COLUMNS.contains(&(table, column)) {
                Value::Bool(i != 0)
            } else {
                Value::Number(i.into())
            }
        }
        ValueRef::Real(f) => {
            serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
        }
        ValueRef::Text(bytes) => {
            let s = String::from_utf8_lossy(bytes).into_owned();
            // Nested columns (point, polygon, phone_numbers, vocab_versions, ...)
            // are stored as JSON text; scalar columns are plain strings.
            match s.trim_start().chars().next() {
                Some('{') | Some('[') => serde_json::from_str(&s).unwrap_or(Value::String(s)),
                _ => Value::String(s),
            }
        }
        ValueRef::Blob(_) => Value::Null,
    }
}

/// Embedded tabular-database realization of [`PackageReader`] (spec.md §6.2
/// "Embedded DB variant"): a SQLite file carrying a `manifest` table and one
/// table per entity plus `attachments`, mirroring
/// `uhc_importer.py`'s `_parse_sqlite_manifest` / `_extract_from_sqlite`.
pub struct EmbeddedDbReader {
    conn: Connection,
    path: PathBuf,
}

impl EmbeddedDbReader {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self { conn, path: path.to_path_buf() })
    }

    fn table_exists(&self, name: &str) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [name],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn table_rows_as_json(&self, table: &str) -> Result<Vec<Value>> {
        let mut stmt = self.conn.prepare(&format!("SELECT * FROM {table}"))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let rows = stmt.query_map([], |row| {
            let mut obj = serde_json::Map::with_capacity(columns.len());
            for (i, name) in columns.iter().enumerate() {
                obj.insert(name.clone(), sqlite_value_to_json(table, name, row.get_ref(i)?));
            }
            Ok(Value::Object(obj))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// `manifest` table, one row (spec.md §6.2; `uhc_importer.py`'s primary
    /// SQLite manifest path).
    fn manifest_from_table(&self) -> Result<Vec<u8>> {
        let manifest = self.conn.query_row("SELECT * FROM manifest LIMIT 1", [], |row| {
            let vocab_versions: String = row.get("vocab_versions").unwrap_or_default();
            let record_counts: Option<String> = row.get("record_counts").unwrap_or_default();
            let signature: Option<String> = row.get("signature").unwrap_or_default();
            Ok(serde_json::json!({
                "package_id": row.get::<_, String>("package_id")?,
                "schema_version": row.get::<_, String>("schema_version")?,
                "created_utc": row.get::<_, String>("created_utc")?,
                "device_id": row.get::<_, String>("device_id")?,
                "app_version": row.get::<_, String>("app_version")?,
                "vocab_versions": serde_json::from_str::<Value>(&vocab_versions).unwrap_or_else(|_| serde_json::json!({})),
                "form_schema_version": row.get::<_, String>("form_schema_version")?,
                "checksum": row.get::<_, String>("checksum")?,
                "signature": signature,
                "record_counts": record_counts.and_then(|s| serde_json::from_str::<Value>(&s).ok()),
            }))
        })?;
        Ok(serde_json::to_vec(&manifest)?)
    }

    /// Fallback for a `metadata(key, value)` table when no `manifest` table
    /// exists, mirroring `uhc_importer.py`'s second SQLite manifest path.
    fn manifest_from_metadata(&self) -> Result<Vec<u8>> {
        let mut stmt = self.conn.prepare("SELECT key, value FROM metadata")?;
        let mut kv: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (k, v) = row?;
            kv.insert(k, v);
        }
        let get = |key: &str, default: &str| kv.get(key).cloned().unwrap_or_else(|| default.to_string());
        let vocab_versions = kv
            .get("vocab_versions")
            .and_then(|s| serde_json::from_str::<Value>(s).ok())
            .unwrap_or_else(|| serde_json::json!({}));
        let manifest = serde_json::json!({
            "package_id": get("package_id", &Uuid::new_v4().to_string()),
            "schema_version": get("schema_version", "1.0.0"),
            "created_utc": get("created_utc", &chrono::Utc::now().to_rfc3339()),
            "device_id": get("device_id", "unknown"),
            "app_version": get("app_version", "1.0.0"),
            "vocab_versions": vocab_versions,
            "form_schema_version": get("form_schema_version", "1.0.0"),
            "checksum": get("checksum", ""),
            "signature": Value::Null,
            "record_counts": Value::Null,
        });
        Ok(serde_json::to_vec(&manifest)?)
    }

    /// Last resort when the file carries neither a `manifest` nor a
    /// `metadata` table: synthesize one from the file itself, matching
    /// `uhc_importer.py`'s final fallback.
    fn manifest_synthesized(&self) -> Result<Vec<u8>> {
        let bytes = std::fs::read(&self.path)?;
        let manifest = serde_json::json!({
            "package_id": Uuid::new_v4().to_string(),
            "schema_version": "1.0.0",
            "created_utc": chrono::Utc::now().to_rfc3339(),
            "device_id": "unknown",
            "app_version": "1.0.0",
            "vocab_versions": {},
            "form_schema_version": "1.0.0",
            "checksum": sha256_hex(&bytes),
            "signature": Value::Null,
            "record_counts": Value::Null,
        });
        Ok(serde_json::to_vec(&manifest)?)
    }
}

impl PackageReader for EmbeddedDbReader {
    fn manifest_bytes(&mut self) -> Result<Vec<u8>> {
        if self.table_exists("manifest")? {
            self.manifest_from_table()
        } else if self.table_exists("metadata")? {
            self.manifest_from_metadata()
        } else {
            self.manifest_synthesized()
        }
    }

    fn entity_bytes(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        let table = name.strip_suffix(".json").unwrap_or(name);
        if !self.table_exists(table)? {
            return Ok(None);
        }
        Ok(Some(serde_json::to_vec(&self.table_rows_as_json(table)?)?))
    }

    fn attachment_names(&mut self) -> Result<Vec<String>> {
        if !self.table_exists("attachments")? {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare("SELECT file_name FROM attachments")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names.into_iter().map(|name| format!("attachments/{name}")).collect())
    }
}

/// First 16 bytes of a well-formed SQLite database file (the "SQLite format
/// 3" magic header), used to sniff the container the way
/// `uhc_importer.py` dispatches on `zipfile.is_zipfile`.
const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

fn is_sqlite_file(path: &Path) -> Result<bool> {
    let mut buf = [0u8; 16];
    let mut file = std::fs::File::open(path)?;
    let n = file.read(&mut buf)?;
    Ok(n == 16 && &buf == SQLITE_HEADER)
}

/// Opens `path` with the reader matching its container: the embedded-DB
/// variant if the file is a SQLite database, the ZIP variant otherwise
/// (spec.md §6.2).
pub fn open_package(path: &Path) -> Result<Box<dyn PackageReader>> {
    if is_sqlite_file(path)? {
        Ok(Box::new(EmbeddedDbReader::open(path)?))
    } else {
        Ok(Box::new(ZipPackageReader::open(path)?))
    }
}

pub const ENTITY_DOCUMENTS: &[(&str, trr_core::types::EntityKind)] = &[
    ("buildings.json", trr_core::types::EntityKind::Building),
    ("property_units.json", trr_core::types::EntityKind::Unit),
    ("persons.json", trr_core::types::EntityKind::Person),
    ("households.json", trr_core::types::EntityKind::Household),
    (
        "person_unit_relations.json",
        trr_core::types::EntityKind::Relation,
    ),
    ("evidence.json", trr_core::types::EntityKind::Evidence),
    ("documents.json", trr_core::types::EntityKind::Document),
    ("claims.json", trr_core::types::EntityKind::Claim),
];
