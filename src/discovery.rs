use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// `true` when the file name ends with `.pdf`, ignoring case.
///
/// ```
/// assert!(pdfprobe::is_pdf_name("reports/Q3.PDF".as_ref()));
/// assert!(!pdfprobe::is_pdf_name("notes.pdf.txt".as_ref()));
/// ```
pub fn is_pdf_name(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().to_ascii_lowercase().ends_with(".pdf"))
        .unwrap_or(false)
}

/// Every regular file below `root`, at any depth, whose name ends in `.pdf`.
///
/// With `sorted` the entries of each directory are visited in file-name
/// order; otherwise in whatever order the file system yields them. Entries
/// that cannot be read are logged and skipped.
pub fn pdf_files_under(root: &Path, sorted: bool) -> impl Iterator<Item = PathBuf> {
    let walker = if sorted {
        WalkDir::new(root).sort_by_file_name()
    } else {
        WalkDir::new(root)
    };

    walker.into_iter().filter_map(|entry| match entry {
        // `Path::is_file` follows symlinks, so linked PDFs are scanned too.
        Ok(entry) if is_pdf_name(entry.path()) && entry.path().is_file() => {
            Some(entry.into_path())
        }
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, "skipping unreadable directory entry");
            None
        }
    })
}
