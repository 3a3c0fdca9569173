use object_store::path::Path;

const BLOB_PATH: &str = "blob";
const BLOB_MANIFEST_PATH: &str = "blob_manifest";
const SHADOW_PATH: &str = "shadow";

/// Resolves object-store paths for blob files, blob manifest edits, and
/// shadow index files under a common root.
#[derive(Clone, Debug)]
pub(crate) struct PathResolver {
    root_path: Path,
}

impl PathResolver {
    pub(crate) fn new<P: Into<Path>>(root_path: P) -> Self {
        Self {
            root_path: root_path.into(),
        }
    }

    pub(crate) fn blob_file_path(&self, file_number: u64) -> Path {
        Path::from(format!(
            "{}/{}/{:020}.blob",
            &self.root_path, BLOB_PATH, file_number
        ))
    }

    pub(crate) fn manifest_path(&self, id: u64) -> Path {
        Path::from(format!(
            "{}/{}/{:020}.edit",
            &self.root_path, BLOB_MANIFEST_PATH, id
        ))
    }

    pub(crate) fn manifest_dir(&self) -> Path {
        Path::from(format!("{}/{}/", &self.root_path, BLOB_MANIFEST_PATH))
    }

    pub(crate) fn shadow_file_path(&self, file_number: u64, level: usize) -> Path {
        Path::from(format!(
            "{}/{}/{:020}_{}.sst",
            &self.root_path, SHADOW_PATH, file_number, level
        ))
    }

    /// Parses the manifest edit id out of a manifest object path.
    pub(crate) fn parse_manifest_id(&self, path: &Path) -> Option<u64> {
        let mut suffix_iter = path.prefix_match(&self.root_path)?;
        if suffix_iter.next()?.as_ref() != BLOB_MANIFEST_PATH {
            return None;
        }
        suffix_iter
            .next()
            .and_then(|part| part.as_ref().split('.').next().map(str::to_owned))
            .and_then(|id| id.parse::<u64>().ok())
    }
}
