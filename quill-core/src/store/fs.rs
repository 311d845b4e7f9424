//! Directory-of-files durable store.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use super::DurableStore;
use crate::codec::id_component;
use crate::error::{QuillError, Result, StoreKind};
use crate::types::DocumentId;

/// One human-readable text file per document under `root`.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    extension: String,
}

impl FsStore {
    /// Store documents under `root` with the given file extension.
    pub fn new(root: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            root: root.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    /// Directory holding the records.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File extension, without the dot.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    fn id_suffix(&self, id: &DocumentId) -> String {
        format!("_{}.{}", id_component(id), self.extension)
    }

    fn is_record(&self, name: &str) -> bool {
        !name.starts_with('.')
            && Path::new(name)
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }

    fn records_for(&self, id: &DocumentId) -> Result<Vec<String>> {
        let suffix = self.id_suffix(id);
        Ok(self
            .list_names()?
            .into_iter()
            .filter(|name| name.ends_with(&suffix))
            .collect())
    }
}

fn unavailable(err: std::io::Error, path: &Path) -> QuillError {
    QuillError::unavailable(StoreKind::Durable, format!("{}: {err}", path.display()))
}

impl DurableStore for FsStore {
    fn provision(&self) -> Result<()> {
        // create_dir_all succeeds when the directory already exists.
        fs::create_dir_all(&self.root).map_err(|e| unavailable(e, &self.root))
    }

    fn list_names(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.root).map_err(|e| unavailable(e, &self.root))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| unavailable(e, &self.root))?;
            if !entry.file_type().is_ok_and(|t| t.is_file()) {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) if self.is_record(&name) => names.push(name),
                Ok(_) => {}
                Err(raw) => warn!(name = ?raw, "Skipping file with non UTF-8 name"),
            }
        }
        names.sort();
        Ok(names)
    }

    fn read(&self, name: &str) -> Result<String> {
        let path = self.root.join(name);
        Ok(fs::read_to_string(path)?)
    }

    fn write(&self, id: &DocumentId, name: &str, contents: &str) -> Result<()> {
        self.provision()?;

        // Atomic write: temp file in the same directory, then rename.
        let target = self.root.join(name);
        let tmp = self.root.join(format!(".{name}.{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, contents).map_err(|e| unavailable(e, &tmp))?;
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(unavailable(e, &target));
        }

        // A renamed document leaves its old file behind; drop it.
        for stale in self.records_for(id)? {
            if stale != name {
                debug!(stale = %stale, current = %name, "Removing superseded record");
                fs::remove_file(self.root.join(&stale)).map_err(|e| unavailable(e, &self.root))?;
            }
        }
        Ok(())
    }

    fn remove(&self, id: &DocumentId) -> Result<bool> {
        let mut removed = false;
        for name in self.records_for(id)? {
            fs::remove_file(self.root.join(&name)).map_err(|e| unavailable(e, &self.root))?;
            removed = true;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FsStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsStore::new(dir.path().join("docs"), ".md");
        (dir, store)
    }

    #[test]
    fn provision_is_idempotent() {
        let (_dir, store) = store();
        store.provision().expect("first");
        store.provision().expect("second");
        assert!(store.root().is_dir());
        assert_eq!(store.extension(), "md");
    }

    #[test]
    fn listing_a_missing_directory_is_unavailable() {
        let (_dir, store) = store();
        let err = store.list_names().expect_err("missing dir");
        assert!(matches!(
            err,
            QuillError::StoreUnavailable { store: StoreKind::Durable, .. }
        ));
    }

    #[test]
    fn write_replaces_record_for_renamed_document() {
        let (_dir, store) = store();
        let id = DocumentId::from("doc-1");
        store.write(&id, "old-title_doc-1.md", "v1").expect("write v1");
        store.write(&id, "new-title_doc-1.md", "v2").expect("write v2");

        assert_eq!(store.list_names().expect("list"), vec!["new-title_doc-1.md"]);
        assert_eq!(store.read("new-title_doc-1.md").expect("read"), "v2");
    }

    #[test]
    fn listing_ignores_temp_and_foreign_files() {
        let (_dir, store) = store();
        store.provision().expect("provision");
        fs::write(store.root().join(".half.md.tmp"), "x").expect("tmp");
        fs::write(store.root().join("notes.txt"), "x").expect("txt");
        fs::create_dir(store.root().join("nested.md")).expect("dir");
        fs::write(store.root().join("a_1.md"), "x").expect("record");

        assert_eq!(store.list_names().expect("list"), vec!["a_1.md"]);
    }

    #[test]
    fn remove_reports_whether_anything_was_deleted() {
        let (_dir, store) = store();
        let id = DocumentId::from("abc");
        store.write(&id, "t_abc.md", "body").expect("write");
        // Another id that merely ends with the same characters is untouched.
        store.write(&DocumentId::from("xabc"), "t_xabc.md", "body").expect("write");

        assert!(store.remove(&id).expect("remove"));
        assert!(!store.remove(&id).expect("remove again"));
        assert_eq!(store.list_names().expect("list"), vec!["t_xabc.md"]);
    }

    #[test]
    fn write_fails_when_root_is_a_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, "not a directory").expect("write blocker");
        let store = FsStore::new(&blocker, "md");

        let err = store
            .write(&DocumentId::from("a"), "a_a.md", "x")
            .expect_err("should fail");
        assert!(matches!(err, QuillError::StoreUnavailable { .. }));
    }
}
