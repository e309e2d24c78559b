//! Packs a source directory into a single zip archive.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use walkdir::WalkDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::{Result, VaultError};

use super::filter::FileFilter;

/// Write every file of `source` selected by `filter` into a new archive at `dest`.
///
/// Symlinks are followed. Entries are written in sorted order so the same
/// input produces the same entry list. Returns the number of files archived.
pub fn archive_dir(source: &Path, dest: &Path, filter: &FileFilter) -> Result<usize> {
    let file = fs::File::create(dest).map_err(|e| VaultError::io(dest, e))?;
    let mut zip = ZipWriter::new(io::BufWriter::new(file));
    let base = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let mut count = 0;

    for entry in WalkDir::new(source)
        .follow_links(true)
        .sort_by_file_name()
        .min_depth(1)
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source).to_path_buf();
            VaultError::io(path, io::Error::other(e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = match entry.path().strip_prefix(source) {
            Ok(rel) => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => continue,
        };
        if !filter.matches(&relative) {
            continue;
        }

        let options = with_permissions(base, entry.path());
        zip.start_file(relative.as_str(), options)
            .map_err(|source| archive_error(dest, source))?;
        let mut input = fs::File::open(entry.path()).map_err(|e| VaultError::io(entry.path(), e))?;
        io::copy(&mut input, &mut zip).map_err(|e| VaultError::io(entry.path(), e))?;
        count += 1;
    }

    let mut writer = zip.finish().map_err(|source| archive_error(dest, source))?;
    writer.flush().map_err(|e| VaultError::io(dest, e))?;
    Ok(count)
}

#[cfg(unix)]
fn with_permissions(options: SimpleFileOptions, path: &Path) -> SimpleFileOptions {
    use std::os::unix::fs::PermissionsExt;
    match fs::metadata(path) {
        Ok(meta) => options.unix_permissions(meta.permissions().mode()),
        Err(_) => options,
    }
}

#[cfg(not(unix))]
fn with_permissions(options: SimpleFileOptions, _path: &Path) -> SimpleFileOptions {
    options
}

fn archive_error(path: &Path, source: zip::result::ZipError) -> VaultError {
    VaultError::Archive {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create_dir_all should succeed in test temp dirs");
        }
        fs::write(path, content).expect("write should succeed in test temp dirs");
    }

    fn entry_names(archive: &Path) -> Vec<String> {
        let file = fs::File::open(archive).unwrap();
        let zip = zip::ZipArchive::new(file).unwrap();
        zip.file_names().map(String::from).collect()
    }

    #[test]
    fn archives_selected_files() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write_file(&src.join("bin").join("java"), "bin");
        write_file(&src.join("lib").join("rt.jar"), "jar");
        write_file(&src.join("docs").join("index.html"), "doc");
        write_file(&src.join(".git").join("HEAD"), "ref");

        let filter = FileFilter::new(&["bin/, lib/".to_string()], &[]).unwrap();
        let dest = temp.path().join("out.zip");
        let count = archive_dir(&src, &dest, &filter).unwrap();

        assert_eq!(count, 2);
        let mut names = entry_names(&dest);
        names.sort();
        assert_eq!(names, vec!["bin/java", "lib/rt.jar"]);
    }

    #[test]
    fn empty_source_produces_valid_empty_archive() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();

        let filter = FileFilter::new(&[], &[]).unwrap();
        let dest = temp.path().join("out.zip");
        assert_eq!(archive_dir(&src, &dest, &filter).unwrap(), 0);
        assert!(entry_names(&dest).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn keeps_executable_bit() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let tool = src.join("bin").join("tool");
        write_file(&tool, "#!/bin/sh\n");
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        let filter = FileFilter::new(&[], &[]).unwrap();
        let dest = temp.path().join("out.zip");
        archive_dir(&src, &dest, &filter).unwrap();

        let mut zip = zip::ZipArchive::new(fs::File::open(&dest).unwrap()).unwrap();
        let entry = zip.by_name("bin/tool").unwrap();
        assert_eq!(entry.unix_mode().unwrap() & 0o777, 0o755);
    }
}
