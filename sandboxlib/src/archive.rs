use crate::error::{Error, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Packs a workspace into a single zip archive.
///
/// Entries are named by their `/`-separated path relative to the workspace, so
/// files sharing a base name in different subdirectories are all kept.
#[derive(Clone, Copy, Debug, Default)]
pub struct ArchiveBuilder;

impl ArchiveBuilder {
    pub async fn build(&self, dir: &Path, archive: &Path) -> Result<PathBuf> {
        let (dir, archive) = (dir.to_path_buf(), archive.to_path_buf());
        tokio::task::spawn_blocking(move || write_archive(&dir, &archive))
            .await
            .map_err(|err| Error::Archive(err.to_string()))?
    }
}

fn write_archive(dir: &Path, archive: &Path) -> Result<PathBuf> {
    let mut files = Vec::new();
    collect_files(dir, &mut files).map_err(|err| Error::Archive(err.to_string()))?;
    files.sort();

    let out = File::create(archive).map_err(|err| Error::Archive(err.to_string()))?;
    let mut zip = ZipWriter::new(out);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for file in files.iter().filter(|file| file.as_path() != archive) {
        let name = entry_name(dir, file);
        zip.start_file(name, options)?;
        let mut src = File::open(file).map_err(|err| Error::Archive(err.to_string()))?;
        io::copy(&mut src, &mut zip).map_err(|err| Error::Archive(err.to_string()))?;
    }
    zip.finish()?;

    tracing::debug!(archive = %archive.display(), entries = files.len(), "wrote archive");
    Ok(archive.to_path_buf())
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&path, files)?;
        } else if file_type.is_file() {
            files.push(path);
        } else if file_type.is_symlink() {
            // linked files are stored by content, linked directories are not descended into
            match std::fs::metadata(&path) {
                Ok(target) if target.is_file() => files.push(path),
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "skipping dangling symlink")
                }
            }
        }
    }
    Ok(())
}

fn entry_name(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file);
    relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn read_entry(archive: &Path, name: &str) -> String {
        let mut zip = zip::ZipArchive::new(File::open(archive).unwrap()).unwrap();
        let mut entry = zip.by_name(name).unwrap();
        let mut contents = String::new();
        entry.read_to_string(&mut contents).unwrap();
        contents
    }

    #[tokio::test]
    async fn every_file_is_retrievable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("log.txt"), "done\n").unwrap();
        std::fs::create_dir_all(dir.path().join("out/plots")).unwrap();
        std::fs::write(dir.path().join("out/plots/a.csv"), "1,2\n").unwrap();

        let archive = dir.path().join("output.zip");
        let built = ArchiveBuilder.build(dir.path(), &archive).await.unwrap();

        assert_eq!(built, archive);
        assert_eq!(read_entry(&archive, "log.txt"), "done\n");
        assert_eq!(read_entry(&archive, "out/plots/a.csv"), "1,2\n");
    }

    #[tokio::test]
    async fn same_base_name_in_subdirectories_does_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a")).unwrap();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        std::fs::write(dir.path().join("a/result.txt"), "from a").unwrap();
        std::fs::write(dir.path().join("b/result.txt"), "from b").unwrap();

        let archive = dir.path().join("output.zip");
        ArchiveBuilder.build(dir.path(), &archive).await.unwrap();

        assert_eq!(read_entry(&archive, "a/result.txt"), "from a");
        assert_eq!(read_entry(&archive, "b/result.txt"), "from b");
    }

    #[tokio::test]
    async fn symlinked_files_are_archived_by_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("repo_a/docs")).unwrap();
        std::fs::write(dir.path().join("repo_a/README.md"), "readme").unwrap();
        std::os::unix::fs::symlink("README.md", dir.path().join("repo_a/README")).unwrap();
        std::os::unix::fs::symlink("docs", dir.path().join("repo_a/docs-link")).unwrap();
        std::os::unix::fs::symlink("missing", dir.path().join("repo_a/dangling")).unwrap();

        let archive = dir.path().join("output.zip");
        ArchiveBuilder.build(dir.path(), &archive).await.unwrap();

        assert_eq!(read_entry(&archive, "repo_a/README"), "readme");
        assert_eq!(read_entry(&archive, "repo_a/README.md"), "readme");
        let zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        assert_eq!(zip.len(), 2);
    }

    #[tokio::test]
    async fn archive_does_not_contain_itself() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("script.py"), "print(1)").unwrap();

        let archive = dir.path().join("output.zip");
        ArchiveBuilder.build(dir.path(), &archive).await.unwrap();

        let zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let names: Vec<_> = zip.file_names().collect();
        assert_eq!(names, vec!["script.py"]);
    }

    #[tokio::test]
    async fn unwritable_destination_is_an_archive_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ArchiveBuilder
            .build(dir.path(), Path::new("/nonexistent/dir/output.zip"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Archive(_)));
    }
}
