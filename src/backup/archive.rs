// medbackup/src/backup/archive.rs
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::Builder;
use walkdir::WalkDir;

/// Creates a GZipped TAR archive from a source directory.
///
/// Entries inside the archive are rooted at the directory's own name, so
/// archiving `/tmp/backups/images_backup_X` yields entries like
/// `images_backup_X/manifest.json`. Unpacking next to other backups then
/// recreates the staging directory instead of spilling files around it.
///
/// # Arguments
/// * `source_dir` - The directory whose contents will be archived.
/// * `archive_dest_path` - The full path where the `.tar.gz` archive will be created.
///
/// # Returns
/// Path to the created archive file.
pub fn create_tar_gz_archive(source_dir: &Path, archive_dest_path: &Path) -> Result<PathBuf> {
    if !source_dir.is_dir() {
        return Err(anyhow::anyhow!(
            "Source for archival is not a directory: {}",
            source_dir.display()
        ));
    }
    if let Some(parent) = archive_dest_path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "Failed to create parent directory for archive: {}",
                    parent.display()
                )
            })?;
        }
    }
    let archive_root: PathBuf = source_dir
        .file_name()
        .map(PathBuf::from)
        .with_context(|| format!("Source directory {} has no name", source_dir.display()))?;

    println!(
        "🗜 Creating tar.gz archive from {} to {}",
        source_dir.display(),
        archive_dest_path.display()
    );

    let archive_file = File::create(archive_dest_path).with_context(|| {
        format!(
            "Failed to create archive file: {}",
            archive_dest_path.display()
        )
    })?;
    let enc = GzEncoder::new(archive_file, Compression::default());
    let mut tar_builder = Builder::new(enc);

    for entry in WalkDir::new(source_dir) {
        let entry = entry
            .with_context(|| format!("Failed to walk directory: {}", source_dir.display()))?;
        let path = entry.path();
        let relative = path.strip_prefix(source_dir).with_context(|| {
            format!(
                "Failed to strip prefix {} from {}",
                source_dir.display(),
                path.display()
            )
        })?;

        if relative.as_os_str().is_empty() {
            // The root directory itself; entries below carry its name.
            continue;
        }
        let name = archive_root.join(relative);

        if path.is_dir() {
            tar_builder.append_dir(&name, path).with_context(|| {
                format!("Failed to append directory {} to archive", path.display())
            })?;
        } else if path.is_file() {
            tar_builder.append_path_with_name(path, &name).with_context(|| {
                format!(
                    "Failed to append file {} as {} to archive",
                    path.display(),
                    name.display()
                )
            })?;
        }
    }

    let encoder = tar_builder.into_inner().with_context(|| {
        format!(
            "Failed to get inner encoder from tar builder for archive: {}",
            archive_dest_path.display()
        )
    })?;

    encoder.finish().with_context(|| {
        format!(
            "Failed to finish Gzip encoding for archive: {}",
            archive_dest_path.display()
        )
    })?;

    println!(
        "✓ Tar.gz archive created successfully at {}",
        archive_dest_path.display()
    );
    Ok(archive_dest_path.to_path_buf())
}

/// Compresses a single file with gzip, writing `<source>.gz` next to it.
/// The source file is left in place for the caller to dispose of.
pub fn gzip_file(source_path: &Path) -> Result<PathBuf> {
    let mut dest_os = source_path.as_os_str().to_os_string();
    dest_os.push(".gz");
    let dest_path = PathBuf::from(dest_os);

    let mut input = File::open(source_path)
        .with_context(|| format!("Failed to open file for compression: {}", source_path.display()))?;
    let output = File::create(&dest_path).with_context(|| {
        format!(
            "Failed to create compressed file: {}",
            dest_path.display()
        )
    })?;

    let mut encoder = GzEncoder::new(output, Compression::default());
    std::io::copy(&mut input, &mut encoder)
        .with_context(|| format!("Failed to compress {}", source_path.display()))?;
    encoder.finish().with_context(|| {
        format!(
            "Failed to finish Gzip encoding for {}",
            dest_path.display()
        )
    })?;

    Ok(dest_path)
}
