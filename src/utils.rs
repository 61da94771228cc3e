use anyhow::Result;
use std::path::{Path, PathBuf};
use url::Url;

/// Last path segment of the URL, or a generated name when there is none.
pub fn get_filename_from_url(url_str: &str) -> Result<String> {
    let url = Url::parse(url_str)?;

    if let Some(segments) = url.path_segments() {
        if let Some(filename) = segments.last() {
            if !filename.is_empty() {
                return Ok(filename.to_string());
            }
        }
    }

    // Fallback if no filename found in path
    Ok(format!("download_{}", uuid::Uuid::new_v4()))
}

pub fn sanitize_filename(filename: &str) -> String {
    filename.replace(
        |c: char| !c.is_alphanumeric() && c != '.' && c != '-' && c != '_',
        "_",
    )
}

/// Destination rules: nothing given means the inferred name in the current
/// directory; an existing directory gets the inferred name inside it;
/// anything else is taken verbatim as the target file.
pub fn resolve_destination_path(raw: &Path, inferred: &str) -> PathBuf {
    if raw.as_os_str().is_empty() {
        PathBuf::from(inferred)
    } else if raw.is_dir() {
        raw.join(inferred)
    } else {
        raw.to_path_buf()
    }
}

/// Extension allow-list check the caller runs before starting a download.
/// Matching is case-insensitive and understands compound suffixes such as
/// "tar.gz".
pub fn is_allowed_file_type(filename: &str, allow_list: &[String]) -> bool {
    let lowered = filename.to_lowercase();
    allow_list.iter().any(|ext| {
        let ext = ext.trim().trim_start_matches('.').to_lowercase();
        !ext.is_empty() && lowered.ends_with(&format!(".{ext}"))
    })
}
