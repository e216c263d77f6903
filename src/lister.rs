//! Sorted, resumable recursive walk of the hashed blob tree.

use crate::basedir::BaseDir;
use crate::blob_id::BlobId;
use crate::error::ListError;
use crate::path_mapper::HashLayout;

pub const MAX_RESULTS: usize = 1000;

/// Lists up to `max` ids strictly greater than `marker`, in ascending
/// order. `marker` is the canonical encoding of the last-seen id, or
/// empty to start from the beginning.
pub fn list(basedir: &BaseDir, layout: HashLayout, marker: &str, max: usize) -> Result<Vec<String>, ListError> {
    let mut out = Vec::new();
    visit(&basedir.root().to_path_buf(), "", 0, layout, marker, max, &mut out)?;
    Ok(out)
}

fn visit(
    fs_dir: &std::path::Path,
    id_prefix: &str,
    depth: usize,
    layout: HashLayout,
    marker: &str,
    max: usize,
    out: &mut Vec<String>,
) -> Result<(), ListError> {
    if out.len() >= max {
        return Ok(());
    }

    let entries = std::fs::read_dir(fs_dir).map_err(ListError::ReadDir)?;

    let mut files = Vec::new();
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(ListError::ReadDir)?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with('.') {
            continue;
        }
        let file_type = entry.file_type().map_err(ListError::ReadDir)?;
        if file_type.is_dir() {
            if name.len() == layout.width && depth < layout.depth {
                dirs.push(name.to_string());
            }
        } else if file_type.is_file() {
            let candidate = format!("{}{}", id_prefix, name);
            if BlobId::decode(&candidate).is_ok() {
                files.push(candidate);
            }
        }
    }

    files.sort();
    for id in files {
        if out.len() >= max {
            return Ok(());
        }
        if id.as_str() > marker {
            out.push(id);
        }
    }

    dirs.sort();
    for name in dirs {
        if out.len() >= max {
            return Ok(());
        }
        let should_descend = marker.is_empty() || name.as_str() > marker || marker.starts_with(&name);
        if !should_descend {
            continue;
        }
        let child_fs = fs_dir.join(&name);
        let child_prefix = format!("{}{}", id_prefix, name);
        visit(&child_fs, &child_prefix, depth + 1, layout, marker, max, out)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_blob(root: &std::path::Path, layout: HashLayout, id: &BlobId) {
        let rel = crate::path_mapper::relative_path(layout, id);
        let full = root.join(&rel);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, b"x").unwrap();
    }

    #[test]
    fn lists_in_sorted_order_with_marker() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = HashLayout { width: 1, depth: 1 };
        for content in ["aa", "ab", "ac"] {
            make_blob(tmp.path(), layout, &BlobId { content: content.to_string(), part: "00".into(), position: 0 });
        }
        let basedir = BaseDir::open(tmp.path()).unwrap();

        let all = list(&basedir, layout, "", MAX_RESULTS).unwrap();
        assert_eq!(all, vec!["aa,00,0", "ab,00,0", "ac,00,0"]);

        let after = list(&basedir, layout, "aa,00,0", MAX_RESULTS).unwrap();
        assert_eq!(after, vec!["ab,00,0", "ac,00,0"]);
    }

    #[test]
    fn respects_max_results() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = HashLayout { width: 1, depth: 1 };
        for content in ["aa", "ab", "ac"] {
            make_blob(tmp.path(), layout, &BlobId { content: content.to_string(), part: "00".into(), position: 0 });
        }
        let basedir = BaseDir::open(tmp.path()).unwrap();
        let limited = list(&basedir, layout, "", 2).unwrap();
        assert_eq!(limited.len(), 2);
    }
}
