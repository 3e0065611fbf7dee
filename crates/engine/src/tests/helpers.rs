use std::fs;
use std::path::{Path, PathBuf};

/// Segment files in `dir`, ascending by name (oldest first).
pub fn segment_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("seg-") && !n.ends_with(".tmp"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

pub fn wal_len(dir: &Path) -> u64 {
    fs::metadata(dir.join("wal")).map(|m| m.len()).unwrap_or(0)
}
