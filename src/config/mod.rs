//! Pipeline configuration: defaults, optional YAML file, environment overrides.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::archive::CompressionMethod;
use crate::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_COMPRESSION_LEVEL, DEFAULT_DESTINATION_PREFIX,
    DEFAULT_WINDOW_CHUNKS, ENV_ARCHIVE_FOLDER, ENV_AWS_REGION, ENV_CHUNK_SIZE_KB,
    ENV_COMPRESSION_LEVEL, ENV_DESTINATION_PREFIX, ENV_PART_SIZE_MB, ENV_PROFILE, ENV_REGION,
    ENV_WINDOW_CHUNKS, S3_UPLOAD_PART_SIZE_MB,
};
use crate::pipeline::{ArchiveFormat, ArchiveOptions, PipelineOptions, UploadOptions};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// AWS region; the rusoto default chain is used when absent.
    pub region: Option<String>,
    pub profile: Option<String>,
    /// Folder prefix of the entry name inside the archive.
    pub archive_folder_path: String,
    /// Key prefix under which archives are written.
    pub destination_prefix: String,
    pub part_size_mb: usize,
    pub chunk_size_kb: usize,
    pub window_chunks: usize,
    /// Deflate level 0-9; 0 stores entries uncompressed.
    pub compression_level: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            region: None,
            profile: None,
            archive_folder_path: String::new(),
            destination_prefix: DEFAULT_DESTINATION_PREFIX.to_string(),
            part_size_mb: S3_UPLOAD_PART_SIZE_MB,
            chunk_size_kb: DEFAULT_CHUNK_SIZE / 1024,
            window_chunks: DEFAULT_WINDOW_CHUNKS,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML file. Missing fields take their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: PipelineConfig =
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Defaults, overlaid by `path` if given, overlaid by the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Applies overrides from `lookup`, typically the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(region) = lookup(ENV_REGION).or_else(|| lookup(ENV_AWS_REGION)) {
            self.region = Some(region);
        }
        if let Some(profile) = lookup(ENV_PROFILE) {
            self.profile = Some(profile);
        }
        if let Some(folder) = lookup(ENV_ARCHIVE_FOLDER) {
            self.archive_folder_path = folder;
        }
        if let Some(prefix) = lookup(ENV_DESTINATION_PREFIX) {
            self.destination_prefix = prefix;
        }
        override_number(&lookup, ENV_PART_SIZE_MB, &mut self.part_size_mb)?;
        override_number(&lookup, ENV_CHUNK_SIZE_KB, &mut self.chunk_size_kb)?;
        override_number(&lookup, ENV_WINDOW_CHUNKS, &mut self.window_chunks)?;
        override_number(&lookup, ENV_COMPRESSION_LEVEL, &mut self.compression_level)?;
        Ok(())
    }

    /// Per-stage options derived from this configuration.
    pub fn stage_options(&self) -> PipelineOptions {
        let level = self.compression_level.min(9);
        let compression_method = if level == 0 {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        };

        PipelineOptions {
            archive: ArchiveOptions {
                format: ArchiveFormat::Zip,
                compression_method,
                compression_level: level,
                chunk_size: self.chunk_size_kb.max(1) * 1024,
                window_chunks: self.window_chunks.max(1),
            },
            upload: UploadOptions::for_s3(self.part_size_mb, self.window_chunks.max(1)),
        }
    }
}

fn override_number<F, T>(lookup: &F, name: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(value) = lookup(name) {
        *target = value
            .trim()
            .parse()
            .context(format!("Invalid value for {}: {}", name, value))?;
    }
    Ok(())
}
