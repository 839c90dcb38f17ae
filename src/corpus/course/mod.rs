use glob::MatchOptions;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{Chunk, SourceReadError, display_source, long_enough};

/// Every file below `dir` with one of `extensions`, sorted by path
#[inline]
pub fn discover_course_files(
    dir: &Path,
    extensions: &[String],
) -> Result<Vec<PathBuf>, SourceReadError> {
    if !dir.is_dir() {
        return Err(SourceReadError::Walk {
            path: dir.to_path_buf(),
            message: "not a directory".to_string(),
        });
    }

    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };
    let root = glob::Pattern::escape(&dir.display().to_string());

    let mut paths = Vec::new();
    for ext in extensions {
        let pattern = format!("{}/**/*.{}", root.trim_end_matches('/'), ext);
        let entries =
            glob::glob_with(&pattern, options).map_err(|source| SourceReadError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;

        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => paths.push(path),
                Ok(path) => debug!("Ignoring non-file entry {}", path.display()),
                Err(e) => warn!("Could not inspect {}: {}", e.path().display(), e.error()),
            }
        }
    }

    paths.sort();
    paths.dedup();
    debug!("Found {} course files under {}", paths.len(), dir.display());
    Ok(paths)
}

/// Read course files into chunks; unreadable files are reported, not fatal
#[inline]
pub fn load_course_files(
    paths: &[PathBuf],
    base_dir: &Path,
    min_chars: usize,
) -> (Vec<Chunk>, Vec<SourceReadError>) {
    let mut chunks = Vec::new();
    let mut skipped = Vec::new();

    for path in paths {
        match fs::read(path) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                if long_enough(&text, min_chars) {
                    chunks.push(Chunk::new(text, display_source(path, base_dir)));
                } else {
                    debug!("Dropping near-empty file {}", path.display());
                }
            }
            Err(source) => {
                let error = SourceReadError::Io {
                    path: path.clone(),
                    source,
                };
                warn!("Could not read course file: {}", error);
                skipped.push(error);
            }
        }
    }

    (chunks, skipped)
}
