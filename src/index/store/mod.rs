
use chrono::Utc;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{IndexError, IndexLoadError, IndexManifest, KnowledgeBase, VectorIndex};
use crate::corpus::Chunk;

pub const CURRENT_FILE: &str = "CURRENT";
pub const VERSIONS_DIR: &str = "versions";
pub const VECTORS_FILE: &str = "vectors.bin";
pub const METADATA_FILE: &str = "metadata.json";
pub const MANIFEST_FILE: &str = "manifest.json";

pub const FORMAT_VERSION: u16 = 1;
const MAGIC: [u8; 8] = *b"CRAGVEC\0";
const HEADER_LEN: usize = MAGIC.len() + 2 + 4 + 8;
const DEFAULT_KEEP_VERSIONS: usize = 2;

/// On-disk home of the published index versions.
///
/// Layout under the root:
///
/// ```text
/// CURRENT                  name of the live version
/// versions/<name>/vectors.bin
/// versions/<name>/metadata.json
/// versions/<name>/manifest.json
/// ```
///
/// A version directory is written completely before `CURRENT` is swapped to
/// it with a rename, so a reader sees either the old pair or the new one.
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
    keep_versions: usize,
}

impl IndexStore {
    #[inline]
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            keep_versions: DEFAULT_KEEP_VERSIONS,
        }
    }

    /// Number of versions left on disk after a publish, the live one included
    #[inline]
    #[must_use]
    pub fn with_keep_versions(mut self, keep_versions: usize) -> Self {
        self.keep_versions = keep_versions.max(1);
        self
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn versions_dir(&self) -> PathBuf {
        self.root.join(VERSIONS_DIR)
    }

    fn pointer_path(&self) -> PathBuf {
        self.root.join(CURRENT_FILE)
    }

    /// Write a new version and make it the live one; returns the version name
    #[inline]
    pub fn publish(
        &self,
        index: &VectorIndex,
        chunks: &[Chunk],
        manifest: &IndexManifest,
    ) -> Result<String, IndexError> {
        if index.len() != chunks.len() {
            return Err(IndexError::CardinalityMismatch {
                vectors: index.len(),
                chunks: chunks.len(),
            });
        }

        let version = new_version_name();
        let version_dir = self.versions_dir().join(&version);
        fs::create_dir_all(&version_dir).map_err(|source| IndexError::Write {
            path: version_dir.clone(),
            source,
        })?;

        write_synced(&version_dir.join(VECTORS_FILE), &encode_vectors(index))?;
        write_synced(
            &version_dir.join(METADATA_FILE),
            &serde_json::to_vec(chunks).map_err(|source| IndexError::Encode {
                what: "metadata",
                source,
            })?,
        )?;
        write_synced(
            &version_dir.join(MANIFEST_FILE),
            &serde_json::to_vec_pretty(manifest).map_err(|source| IndexError::Encode {
                what: "manifest",
                source,
            })?,
        )?;

        let pointer = self.pointer_path();
        let staged = self.root.join(format!("{}.tmp", CURRENT_FILE));
        write_synced(&staged, version.as_bytes())?;
        fs::rename(&staged, &pointer).map_err(|source| IndexError::Write {
            path: pointer.clone(),
            source,
        })?;

        info!(
            "Published index version {} ({} entries, dimension {})",
            version,
            index.len(),
            index.dimension()
        );

        self.prune(&version);
        Ok(version)
    }

    /// Name of the live version, if one was ever published
    #[inline]
    pub fn current_version(&self) -> Result<Option<String>, IndexLoadError> {
        let pointer = self.pointer_path();
        let content = match fs::read_to_string(&pointer) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(IndexLoadError::Io {
                    path: pointer,
                    source,
                });
            }
        };

        let name = content.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(IndexLoadError::InvalidPointer {
                path: pointer,
                reason: format!("'{}' is not a version name", name),
            });
        }
        Ok(Some(name.to_string()))
    }

    /// All version directories on disk, oldest first
    #[inline]
    pub fn versions(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.versions_dir()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        names.sort();
        names
    }

    /// Manifest of the live version
    #[inline]
    pub fn load_manifest(&self) -> Result<IndexManifest, IndexLoadError> {
        let version_dir = self.live_version_dir()?;
        read_json(&version_dir.join(MANIFEST_FILE))
    }

    /// Read and validate the live version
    #[inline]
    pub fn load(&self) -> Result<KnowledgeBase, IndexLoadError> {
        let version_dir = self.live_version_dir()?;
        debug!("Loading index from {}", version_dir.display());

        let vectors_path = version_dir.join(VECTORS_FILE);
        let bytes = fs::read(&vectors_path).map_err(|source| load_io_error(&vectors_path, source))?;
        let index = decode_vectors(&bytes).map_err(|reason| IndexLoadError::CorruptVectors {
            path: vectors_path.clone(),
            reason,
        })?;

        let chunks: Vec<Chunk> = read_json(&version_dir.join(METADATA_FILE))?;
        let mut knowledge = KnowledgeBase::new(index, chunks)?;

        match read_json::<IndexManifest>(&version_dir.join(MANIFEST_FILE)) {
            Ok(manifest) => {
                if manifest.entries != knowledge.len() {
                    warn!(
                        "Manifest records {} entries but {} were loaded",
                        manifest.entries,
                        knowledge.len()
                    );
                }
                knowledge = knowledge.with_manifest(manifest);
            }
            Err(e) => warn!("Ignoring index manifest: {}", e),
        }

        info!(
            "Loaded index with {} entries from {}",
            knowledge.len(),
            version_dir.display()
        );
        Ok(knowledge)
    }

    fn live_version_dir(&self) -> Result<PathBuf, IndexLoadError> {
        let version = self
            .current_version()?
            .ok_or_else(|| IndexLoadError::Missing {
                path: self.root.clone(),
            })?;
        let version_dir = self.versions_dir().join(version);
        if !version_dir.is_dir() {
            return Err(IndexLoadError::Missing { path: version_dir });
        }
        Ok(version_dir)
    }

    /// Remove the oldest versions beyond `keep_versions`; never the live one
    fn prune(&self, live: &str) {
        let versions = self.versions();
        let excess = versions.len().saturating_sub(self.keep_versions);
        for name in versions.iter().take(excess).filter(|name| *name != live) {
            let path = self.versions_dir().join(name);
            match fs::remove_dir_all(&path) {
                Ok(()) => debug!("Pruned index version {}", name),
                Err(e) => warn!("Failed to prune {}: {}", path.display(), e),
            }
        }
    }
}

/// Timestamped so that names sort in publish order
fn new_version_name() -> String {
    format!(
        "{}-{}",
        Utc::now().format("%Y%m%dT%H%M%S%.6fZ"),
        Uuid::new_v4().simple()
    )
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    let write = || -> std::io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(bytes)?;
        file.sync_all()
    };
    write().map_err(|source| IndexError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn load_io_error(path: &Path, source: std::io::Error) -> IndexLoadError {
    if source.kind() == std::io::ErrorKind::NotFound {
        IndexLoadError::Missing {
            path: path.to_path_buf(),
        }
    } else {
        IndexLoadError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, IndexLoadError> {
    let content = fs::read(path).map_err(|source| load_io_error(path, source))?;
    serde_json::from_slice(&content).map_err(|source| IndexLoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Header (magic, format version, dimension, count) followed by little-endian rows
#[inline]
pub fn encode_vectors(index: &VectorIndex) -> Vec<u8> {
    let raw = index.raw();
    let mut bytes = Vec::with_capacity(HEADER_LEN + raw.len() * 4);
    bytes.extend_from_slice(&MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&(index.dimension() as u32).to_le_bytes());
    bytes.extend_from_slice(&(index.len() as u64).to_le_bytes());
    for value in raw {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

#[inline]
pub fn decode_vectors(bytes: &[u8]) -> Result<VectorIndex, String> {
    let mut reader = ByteReader { bytes, offset: 0 };

    if reader.take(MAGIC.len())? != MAGIC.as_slice() {
        return Err("bad magic".to_string());
    }
    let version = u16::from_le_bytes(reader.array()?);
    if version != FORMAT_VERSION {
        return Err(format!(
            "format version {} is not supported (expected {})",
            version, FORMAT_VERSION
        ));
    }
    let dimension = u32::from_le_bytes(reader.array()?) as usize;
    let count = usize::try_from(u64::from_le_bytes(reader.array()?))
        .map_err(|_| "vector count does not fit in memory".to_string())?;

    let expected = count
        .checked_mul(dimension)
        .and_then(|values| values.checked_mul(4))
        .ok_or_else(|| "vector count overflows".to_string())?;
    let body = reader.rest();
    if body.len() != expected {
        return Err(format!(
            "expected {} bytes of vector data for {} x {}, found {}",
            expected,
            count,
            dimension,
            body.len()
        ));
    }

    let data: Vec<f32> = body
        .chunks_exact(4)
        .map(|chunk| {
            let mut word = [0_u8; 4];
            word.copy_from_slice(chunk);
            f32::from_le_bytes(word)
        })
        .collect();
    VectorIndex::from_raw(dimension, data).map_err(|e| e.to_string())
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], String> {
        let end = self.offset + len;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or_else(|| format!("file truncated at byte {}", self.offset))?;
        self.offset = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], String> {
        let mut out = [0_u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn rest(&self) -> &'a [u8] {
        self.bytes.get(self.offset..).unwrap_or_default()
    }
}
