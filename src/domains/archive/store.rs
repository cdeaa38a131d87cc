//! ZIP container holding one Parquet entry per table.

use crate::domains::archive::readers::decode_snapshot;
use crate::domains::archive::types::{ArchiveConfig, TableSnapshot};
use crate::domains::archive::writers::encode_snapshot;
use crate::errors::{ArchiveError, ArchiveResult};
use std::fs::{self, File, Permissions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

/// File extension of table entries inside the container
pub const ENTRY_EXTENSION: &str = ".parquet";

/// Reject identifiers that cannot be used as a flat entry name.
pub fn validate_identifier(table: &str) -> ArchiveResult<()> {
    let invalid = table.is_empty()
        || table == "."
        || table == ".."
        || table.contains(|c: char| matches!(c, '/' | '\\' | '\0'));
    if invalid {
        return Err(ArchiveError::InvalidIdentifier(table.to_string()));
    }
    Ok(())
}

fn entry_name(table: &str) -> String {
    format!("{}{}", table, ENTRY_EXTENSION)
}

/// A table archive at a fixed path
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    path: PathBuf,
    config: ArchiveConfig,
}

impl ArchiveStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_config(path, ArchiveConfig::default())
    }

    pub fn with_config(path: impl Into<PathBuf>, config: ArchiveConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Table identifiers in container order.
    pub fn table_names(&self) -> ArchiveResult<Vec<String>> {
        let mut archive = self.open()?;
        let mut names = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive.by_index(i).map_err(|e| self.read_err(e))?;
            if let Some(table) = entry.name().strip_suffix(ENTRY_EXTENSION) {
                names.push(table.to_string());
            }
        }
        Ok(names)
    }

    pub fn contains(&self, table: &str) -> ArchiveResult<bool> {
        validate_identifier(table)?;
        let mut archive = self.open()?;
        let found = match archive.by_name(&entry_name(table)) {
            Ok(_) => true,
            Err(ZipError::FileNotFound) => false,
            Err(e) => return Err(self.read_err(e)),
        };
        Ok(found)
    }

    /// Write `snapshot` as the entry for `table`, replacing any previous entry
    /// of that name and copying every other entry unchanged. The new container
    /// is built in a temporary file next to the archive and renamed over it.
    /// A symlinked archive is updated at its target.
    pub fn save(&self, table: &str, snapshot: &TableSnapshot) -> ArchiveResult<()> {
        validate_identifier(table)?;
        let destination = self.resolve_destination()?;
        if destination.is_dir() {
            return Err(self.write_err("destination is a directory"));
        }

        let encoded = encode_snapshot(snapshot, &self.config).map_err(|e| self.write_err(e))?;
        let target = entry_name(table);

        let dir = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = NamedTempFile::new_in(dir).map_err(|e| self.write_err(e))?;

        let existing = self.open_existing(&destination)?;

        {
            let mut zip = ZipWriter::new(temp.as_file_mut());
            let table_options = FileOptions::default()
                .compression_method(zip::CompressionMethod::Stored)
                .large_file(true);
            let mut written = false;

            if let Some(mut archive) = existing {
                for i in 0..archive.len() {
                    let entry = archive.by_index_raw(i).map_err(|e| self.read_err(e))?;

                    if entry.name() == target {
                        drop(entry);
                        self.write_entry(&mut zip, &target, &encoded, table_options)?;
                        written = true;
                        continue;
                    }

                    // compressed bytes, timestamps and mode are carried as they are
                    zip.raw_copy_file(entry).map_err(|e| self.write_err(e))?;
                }
            }

            if !written {
                self.write_entry(&mut zip, &target, &encoded, table_options)?;
            }

            zip.finish().map_err(|e| self.write_err(e))?;
        }

        let created = !destination.exists();
        let permissions = if created {
            // a plain create picks up the process umask, unlike the temp file
            File::create(&destination)
                .and_then(|file| file.metadata())
                .map_err(|e| self.write_err(e))?
                .permissions()
        } else {
            fs::metadata(&destination).map_err(|e| self.write_err(e))?.permissions()
        };

        if let Err(e) = self.replace_with(temp, &destination, permissions) {
            if created {
                let _ = fs::remove_file(&destination);
            }
            return Err(e);
        }

        log::debug!(
            "Saved {} rows as '{}' in {}",
            snapshot.num_rows(),
            table,
            destination.display()
        );
        Ok(())
    }

    /// Decode the entry for `table`.
    pub fn load(&self, table: &str) -> ArchiveResult<TableSnapshot> {
        validate_identifier(table)?;
        let mut archive = self.open()?;

        let mut entry = match archive.by_name(&entry_name(table)) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Err(ArchiveError::not_found(table, &self.path)),
            Err(e) => return Err(self.read_err(e)),
        };

        // The Parquet reader needs random access, so spill the entry to an anonymous file.
        let mut scratch = tempfile::tempfile().map_err(|e| self.read_err(e))?;
        io::copy(&mut entry, &mut scratch).map_err(|e| self.read_err(e))?;

        let snapshot = decode_snapshot(scratch).map_err(|e| self.read_err(format!("table '{}': {}", table, e)))?;
        log::debug!(
            "Loaded {} rows from '{}' in {}",
            snapshot.num_rows(),
            table,
            self.path.display()
        );
        Ok(snapshot)
    }

    fn open(&self) -> ArchiveResult<ZipArchive<File>> {
        let file = File::open(&self.path).map_err(|e| self.read_err(e))?;
        ZipArchive::new(file).map_err(|e| self.read_err(e))
    }

    /// The file a save replaces: the archive path with symlinks resolved, or
    /// the path itself when nothing exists there yet.
    fn resolve_destination(&self) -> ArchiveResult<PathBuf> {
        match fs::canonicalize(&self.path) {
            Ok(resolved) => Ok(resolved),
            Err(e) if e.kind() == io::ErrorKind::NotFound => match fs::read_link(&self.path) {
                // dangling link: create the file it names
                Ok(link) => Ok(match self.path.parent() {
                    Some(parent) => parent.join(link),
                    None => link,
                }),
                Err(_) => Ok(self.path.clone()),
            },
            Err(e) => Err(self.write_err(e)),
        }
    }

    fn replace_with(&self, temp: NamedTempFile, destination: &Path, permissions: Permissions) -> ArchiveResult<()> {
        temp.as_file().sync_all().map_err(|e| self.write_err(e))?;
        fs::set_permissions(temp.path(), permissions).map_err(|e| self.write_err(e))?;
        temp.persist(destination).map_err(|e| self.write_err(e.error))?;
        Ok(())
    }

    /// `None` when there is nothing to carry over: no file yet, or an empty one.
    fn open_existing(&self, destination: &Path) -> ArchiveResult<Option<ZipArchive<File>>> {
        match fs::metadata(destination) {
            Ok(meta) if meta.len() == 0 => Ok(None),
            Ok(_) => {
                let file = File::open(destination).map_err(|e| self.read_err(e))?;
                ZipArchive::new(file).map(Some).map_err(|e| self.read_err(e))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.write_err(e)),
        }
    }

    fn write_entry<W: Write + io::Seek>(
        &self,
        zip: &mut ZipWriter<W>,
        name: &str,
        data: &[u8],
        options: FileOptions,
    ) -> ArchiveResult<()> {
        zip.start_file(name, options).map_err(|e| self.write_err(e))?;
        zip.write_all(data).map_err(|e| self.write_err(e))
    }

    fn read_err(&self, reason: impl ToString) -> ArchiveError {
        ArchiveError::read_failure(&self.path, reason)
    }

    fn write_err(&self, reason: impl ToString) -> ArchiveError {
        ArchiveError::write_failure(&self.path, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use std::io::Read;
    use tempfile::tempdir;

    fn snapshot(values: &[i64]) -> TableSnapshot {
        TableSnapshot::from_records(values.iter().map(|v| record! { "v" => *v }).collect()).unwrap()
    }

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("Measurements").is_ok());
        assert!(validate_identifier("with space").is_ok());
        for bad in ["", ".", "..", "a/b", "a\\b", "nul\0"] {
            assert!(
                matches!(validate_identifier(bad), Err(ArchiveError::InvalidIdentifier(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_save_creates_archive_and_lists_tables() {
        let dir = tempdir().unwrap();
        let store = ArchiveStore::new(dir.path().join("out.store"));

        store.save("A", &snapshot(&[1, 2])).unwrap();
        store.save("B", &snapshot(&[3])).unwrap();

        assert_eq!(store.table_names().unwrap(), vec!["A".to_string(), "B".to_string()]);
        assert!(store.contains("A").unwrap());
        assert!(!store.contains("C").unwrap());
    }

    #[test]
    fn test_overwrite_keeps_position_and_other_tables() {
        let dir = tempdir().unwrap();
        let store = ArchiveStore::new(dir.path().join("out.store"));

        store.save("A", &snapshot(&[1])).unwrap();
        store.save("B", &snapshot(&[2])).unwrap();
        store.save("A", &snapshot(&[9, 9, 9])).unwrap();

        assert_eq!(store.table_names().unwrap(), vec!["A".to_string(), "B".to_string()]);
        assert_eq!(store.load("A").unwrap(), snapshot(&[9, 9, 9]));
        assert_eq!(store.load("B").unwrap(), snapshot(&[2]));
    }

    #[test]
    fn test_missing_table_is_not_found() {
        let dir = tempdir().unwrap();
        let store = ArchiveStore::new(dir.path().join("out.store"));
        store.save("A", &snapshot(&[1])).unwrap();

        let err = store.load("nonexistent").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_missing_file_is_read_failure() {
        let store = ArchiveStore::new("/path/does/not/exist");
        assert!(matches!(store.load("A"), Err(ArchiveError::ReadFailure { .. })));
        assert!(matches!(store.table_names(), Err(ArchiveError::ReadFailure { .. })));
    }

    #[test]
    fn test_corrupt_file_is_read_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.store");
        fs::write(&path, b"not a zip archive").unwrap();
        let store = ArchiveStore::new(&path);

        assert!(matches!(store.load("A"), Err(ArchiveError::ReadFailure { .. })));
        assert!(matches!(store.save("A", &snapshot(&[1])), Err(ArchiveError::ReadFailure { .. })));
        // a failed save must not touch the file
        assert_eq!(fs::read(&path).unwrap(), b"not a zip archive");
    }

    #[test]
    fn test_empty_file_is_treated_as_new_archive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.store");
        File::create(&path).unwrap();
        let store = ArchiveStore::new(&path);

        store.save("A", &snapshot(&[1])).unwrap();
        assert_eq!(store.load("A").unwrap(), snapshot(&[1]));
    }

    #[test]
    fn test_unwritable_destination_is_write_failure() {
        let dir = tempdir().unwrap();
        let store = ArchiveStore::new(dir.path().join("no_such_dir").join("out.store"));
        assert!(matches!(store.save("A", &snapshot(&[1])), Err(ArchiveError::WriteFailure { .. })));

        let store = ArchiveStore::new(dir.path());
        assert!(matches!(store.save("A", &snapshot(&[1])), Err(ArchiveError::WriteFailure { .. })));
    }

    #[test]
    fn test_foreign_entries_survive_and_are_not_listed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mixed.store");
        {
            let file = File::create(&path).unwrap();
            let mut zip = ZipWriter::new(file);
            zip.start_file("README.txt", FileOptions::default()).unwrap();
            zip.write_all(b"hello").unwrap();
            zip.finish().unwrap();
        }

        let store = ArchiveStore::new(&path);
        store.save("A", &snapshot(&[1])).unwrap();
        assert_eq!(store.table_names().unwrap(), vec!["A".to_string()]);

        let mut archive = ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let mut readme = String::new();
        archive.by_name("README.txt").unwrap().read_to_string(&mut readme).unwrap();
        assert_eq!(readme, "hello");
    }

    #[test]
    fn test_kept_entries_keep_their_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mixed.store");
        let stamp = zip::DateTime::from_date_and_time(2001, 2, 3, 4, 5, 6).unwrap();
        {
            let mut zip = ZipWriter::new(File::create(&path).unwrap());
            let options = FileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated)
                .last_modified_time(stamp)
                .unix_permissions(0o600);
            zip.start_file("notes.txt", options).unwrap();
            zip.write_all(b"keep me as I am").unwrap();
            zip.finish().unwrap();
        }

        let store = ArchiveStore::new(&path);
        store.save("A", &snapshot(&[1])).unwrap();
        store.save("A", &snapshot(&[2])).unwrap();

        let mut archive = ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let mut notes = archive.by_name("notes.txt").unwrap();
        let modified = notes.last_modified();
        assert_eq!(
            (modified.year(), modified.month(), modified.day()),
            (2001, 2, 3)
        );
        assert_eq!(
            (modified.hour(), modified.minute(), modified.second()),
            (4, 5, 6)
        );
        assert_eq!(notes.unix_mode().map(|mode| mode & 0o777), Some(0o600));
        assert_eq!(notes.compression(), zip::CompressionMethod::Deflated);

        let mut text = String::new();
        notes.read_to_string(&mut text).unwrap();
        assert_eq!(text, "keep me as I am");
    }

    #[test]
    fn test_table_entries_are_written_as_zip64() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.store");
        let store = ArchiveStore::new(&path);
        store.save("Wide", &snapshot(&[1, 2, 3])).unwrap();

        // the local header of a zip64 entry defers both sizes to the extra field
        let bytes = fs::read(&path).unwrap();
        let name = b"Wide.parquet";
        let name_at = bytes.windows(name.len()).position(|w| w == name).unwrap();
        let header = &bytes[name_at - 30..name_at];
        assert_eq!(&header[..4], b"PK\x03\x04");
        assert_eq!(&header[18..22], &[0xffu8; 4]);
        assert_eq!(&header[22..26], &[0xffu8; 4]);

        assert_eq!(store.load("Wide").unwrap(), snapshot(&[1, 2, 3]));
    }

    #[cfg(unix)]
    #[test]
    fn test_save_through_symlink_updates_target() {
        let dir = tempdir().unwrap();
        let real = dir.path().join("real.store");
        let link = dir.path().join("link.store");

        ArchiveStore::new(&real).save("A", &snapshot(&[1])).unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();
        ArchiveStore::new(&link).save("B", &snapshot(&[2])).unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(
            ArchiveStore::new(&real).table_names().unwrap(),
            vec!["A".to_string(), "B".to_string()]
        );
        assert_eq!(ArchiveStore::new(&link).load("B").unwrap(), snapshot(&[2]));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_creates_its_target() {
        let dir = tempdir().unwrap();
        let real = dir.path().join("real.store");
        let link = dir.path().join("link.store");
        std::os::unix::fs::symlink("real.store", &link).unwrap();

        ArchiveStore::new(&link).save("A", &snapshot(&[1])).unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(ArchiveStore::new(&real).load("A").unwrap(), snapshot(&[1]));
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_of_new_and_existing_archives() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let reference = dir.path().join("reference");
        File::create(&reference).unwrap();
        let default_mode = fs::metadata(&reference).unwrap().permissions().mode() & 0o777;

        let path = dir.path().join("new.store");
        let store = ArchiveStore::new(&path);
        store.save("A", &snapshot(&[1])).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, default_mode);

        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();
        store.save("B", &snapshot(&[2])).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o640);
    }
}
