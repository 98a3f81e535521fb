use crate::error::SinkError;
use crate::index::{IndexSummary, InvertedIndex};
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, remove_file, rename, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaFile {
    pub summary: IndexSummary,
    pub created_at: String,
    pub version: u32,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn index(&self) -> PathBuf { self.root.join("index.json") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    fn staged(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

/// Persists a finished index and returns where it went.
pub trait IndexSink: Send + Sync {
    fn persist(&self, index: &InvertedIndex, summary: &IndexSummary) -> Result<String, SinkError>;
}

/// Writes `index.json` and `meta.json` into one directory.
///
/// Both files are staged under `.tmp` names and renamed into place, `meta.json`
/// first. `index.json` appears last, so its presence means the write finished;
/// on any failure neither final file is left behind.
pub struct FileSink {
    paths: IndexPaths,
}

impl FileSink {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { paths: IndexPaths::new(root) }
    }

    pub fn paths(&self) -> &IndexPaths {
        &self.paths
    }
}

impl IndexSink for FileSink {
    fn persist(&self, index: &InvertedIndex, summary: &IndexSummary) -> Result<String, SinkError> {
        let root = &self.paths.root;
        create_dir_all(root).map_err(|source| SinkError::Io { path: root.clone(), source })?;
        let meta = MetaFile {
            summary: *summary,
            created_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
            version: FORMAT_VERSION,
        };
        if let Err(e) = self.publish(index, &meta) {
            for path in [
                IndexPaths::staged(&self.paths.index()),
                IndexPaths::staged(&self.paths.meta()),
                self.paths.meta(),
            ] {
                let _ = remove_file(path);
            }
            return Err(e);
        }
        tracing::info!(path = %self.paths.index().display(), terms = summary.term_count, "index persisted");
        Ok(self.paths.index().to_string_lossy().into_owned())
    }
}

impl FileSink {
    fn publish(&self, index: &InvertedIndex, meta: &MetaFile) -> Result<(), SinkError> {
        let (index_path, meta_path) = (self.paths.index(), self.paths.meta());
        let (index_tmp, meta_tmp) = (IndexPaths::staged(&index_path), IndexPaths::staged(&meta_path));
        write_file(&index_tmp, &index.to_json()?)?;
        write_file(&meta_tmp, serde_json::to_string_pretty(meta)?.as_bytes())?;
        rename(&meta_tmp, &meta_path).map_err(|source| SinkError::Io { path: meta_path.clone(), source })?;
        rename(&index_tmp, &index_path).map_err(|source| SinkError::Io { path: index_path.clone(), source })?;
        Ok(())
    }
}

pub fn save_index(paths: &IndexPaths, index: &InvertedIndex) -> Result<(), SinkError> {
    let bytes = index.to_json()?;
    write_file(&paths.index(), &bytes)
}

pub fn load_index(paths: &IndexPaths) -> anyhow::Result<InvertedIndex> {
    let buf = read_file(&paths.index())?;
    Ok(serde_json::from_slice(&buf)?)
}

/// Raw bytes of the serialized index, as written.
pub fn load_index_bytes(paths: &IndexPaths) -> std::io::Result<Vec<u8>> {
    read_file(&paths.index())
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<(), SinkError> {
    let json = serde_json::to_string_pretty(meta)?;
    write_file(&paths.meta(), json.as_bytes())
}

pub fn load_meta(paths: &IndexPaths) -> anyhow::Result<MetaFile> {
    let buf = read_file(&paths.meta())?;
    Ok(serde_json::from_slice(&buf)?)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), SinkError> {
    let io = |source: std::io::Error| SinkError::Io { path: path.to_path_buf(), source };
    let mut f = File::create(path).map_err(io)?;
    f.write_all(bytes).map_err(io)?;
    f.sync_all().map_err(io)?;
    Ok(())
}

fn read_file(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut f = File::open(path)?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    Ok(buf)
}
