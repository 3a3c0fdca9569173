use std::path::Path;

use figment::providers::{Env, Format, Json, Toml};
use figment::{Figment, Metadata, Provider};
use serde::{Deserialize, Serialize};

use crate::error::BlobDbError;

/// Whether live values found by garbage collection are rewritten into new
/// blob files or reinlined into the LSM.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobRunMode {
    /// Rewrite live records into new blob files and point the LSM at them.
    Normal,
    /// Write live values back into the LSM inline. Used to migrate a column
    /// family out of blob storage: once every blob file is collected, no
    /// external values remain.
    Fallback,
}

/// Configuration options for blobdb.
///
/// Options can be built in code, loaded from a TOML/JSON file with
/// [`Settings::from_file`], or read from the environment with
/// [`Settings::from_env`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Settings {
    /// Cap on bytes per garbage-collection output blob file. When the current
    /// output reaches this size it is finalized and a new file is opened.
    pub blob_file_target_size: u64,

    /// Run mode for garbage collection rewrites. See [`BlobRunMode`].
    pub blob_run_mode: BlobRunMode,

    /// When true, garbage collection writes the relocated blob indices into
    /// per-level side-car index files instead of through the LSM write path.
    /// The two targets are mutually exclusive and fixed per job.
    pub rewrite_shadow: bool,

    /// Roll threshold for side-car index files when `rewrite_shadow` is set.
    pub shadow_target_size: u64,
}

impl Settings {
    /// Loads Settings from a configuration file, with the format chosen by
    /// the file extension (`.toml` or `.json`).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Settings, BlobDbError> {
        let path = path.as_ref();
        let Some(ext) = path.extension() else {
            return Err(BlobDbError::UnknownConfigurationFormat(path.into()));
        };

        let mut builder = Figment::from(Settings::default());
        match ext.to_str().unwrap_or_default() {
            "json" => builder = builder.merge(Json::file(path)),
            "toml" => builder = builder.merge(Toml::file(path)),
            _ => return Err(BlobDbError::UnknownConfigurationFormat(path.into())),
        }
        builder.extract().map_err(BlobDbError::from)
    }

    /// Loads Settings from environment variables with the given prefix, e.g.
    /// `BLOBDB_BLOB_FILE_TARGET_SIZE` for `blob_file_target_size` with the
    /// prefix `"BLOBDB_"`.
    pub fn from_env(prefix: &str) -> Result<Settings, BlobDbError> {
        Figment::from(Settings::default())
            .merge(Env::prefixed(prefix))
            .extract()
            .map_err(BlobDbError::from)
    }

    /// Loads Settings by merging, in order: defaults, `BlobDb.toml`,
    /// `BlobDb.json`, then `BLOBDB_`-prefixed environment variables.
    pub fn load() -> Result<Settings, BlobDbError> {
        Figment::from(Settings::default())
            .merge(Toml::file("BlobDb.toml"))
            .merge(Json::file("BlobDb.json"))
            .admerge(Env::prefixed("BLOBDB_"))
            .extract()
            .map_err(BlobDbError::from)
    }
}

impl Provider for Settings {
    fn metadata(&self) -> figment::Metadata {
        Metadata::named("BlobDb configuration options")
    }

    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        figment::providers::Serialized::defaults(Settings::default()).data()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            blob_file_target_size: 256 * 1024 * 1024,
            blob_run_mode: BlobRunMode::Normal,
            rewrite_shadow: false,
            shadow_target_size: 64 * 1024 * 1024,
        }
    }
}

/// The effective garbage-collection options for one job, resolved from
/// [`Settings`] when the job is constructed.
#[derive(Clone, Debug)]
pub struct GcOptions {
    pub blob_file_target_size: u64,
    pub blob_run_mode: BlobRunMode,
    pub rewrite_shadow: bool,
    pub shadow_target_size: u64,
}

impl From<&Settings> for GcOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            blob_file_target_size: settings.blob_file_target_size,
            blob_run_mode: settings.blob_run_mode,
            rewrite_shadow: settings.rewrite_shadow,
            shadow_target_size: settings.shadow_target_size,
        }
    }
}

impl Default for GcOptions {
    fn default() -> Self {
        GcOptions::from(&Settings::default())
    }
}
