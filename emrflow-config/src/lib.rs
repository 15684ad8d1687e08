//! Settings for connecting to EMR Serverless and for tracking job runs.
//!
//! Settings are layered with [`figment`]: files are merged in a fixed order
//! and `EMRFLOW_*` environment variables are applied on top. Every settings
//! type is built through its builder when constructed in code.

use std::path::Path;
use std::path::PathBuf;

use anyhow::bail;
use bon::Builder;
use figment::Figment;
use figment::providers::Env;
use figment::providers::Format;
use figment::providers::Json;
use figment::providers::Toml;
use serde::Deserialize;
use serde::Serialize;

pub mod package;
pub mod tracking;

/// The file name used when looking for configuration files for emrflow.
pub const FILE_NAME: &str = "emrflow.toml";

/// The environment variable pointing at an additional configuration file.
pub const CONFIG_ENV: &str = "EMRFLOW_CONFIG";

/// The prefix for environment variables that override configuration values.
pub const ENV_PREFIX: &str = "EMRFLOW_";

/// The connection configuration for emrflow.
///
/// When loading, the default sources that are automatically included are:
///
/// * `<CONFIG DIR>/emrflow/emrflow.toml`.
/// * `<CWD>/emrflow.toml`.
/// * If the environment variable is present, the file pointed to by
///   `EMRFLOW_CONFIG`.
///
/// Environment variables prefixed with `EMRFLOW_` are applied last (nested
/// keys are separated with a double underscore, e.g.
/// `EMRFLOW_TRACKING__POLL_INTERVAL`).
///
/// Notably, a configuration object may not be valid. You'll need to use the
/// [`validate()`](Config::validate) method to ensure the config is valid.
#[derive(Builder, Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
#[builder(builder_type = Builder)]
pub struct Config {
    /// The id of the EMR Serverless application jobs are submitted to.
    #[serde(alias = "application_id")]
    #[builder(into)]
    application_id: String,

    /// The ARN of the role job runs execute as.
    #[serde(alias = "job_role")]
    #[builder(into)]
    job_role: String,

    /// The AWS region, if it differs from the ambient one.
    #[builder(into)]
    region: Option<String>,

    /// Settings for job tracking and artifact upload.
    #[serde(default)]
    #[builder(default)]
    tracking: tracking::Config,
}

impl Config {
    /// Validates the configuration object.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.application_id.trim().is_empty() {
            bail!("an application id must be configured");
        }

        if self.job_role.trim().is_empty() {
            bail!("a job role must be configured");
        }

        self.tracking.validate()
    }

    /// Gets the application id.
    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    /// Gets the job role.
    pub fn job_role(&self) -> &str {
        &self.job_role
    }

    /// Gets the region (if it was configured).
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref().filter(|region| !region.is_empty())
    }

    /// Gets the tracking configuration.
    pub fn tracking(&self) -> &tracking::Config {
        &self.tracking
    }

    /// Gets the files that are always consulted, lowest precedence first.
    ///
    /// Files that don't exist are skipped when loading.
    pub fn default_paths() -> Vec<PathBuf> {
        let user = if cfg!(target_os = "macos") {
            dirs::home_dir().map(|home| home.join(".config"))
        } else {
            dirs::config_dir()
        };

        user.map(|dir| dir.join("emrflow").join(FILE_NAME))
            .into_iter()
            .chain(std::env::current_dir().ok().map(|cwd| cwd.join(FILE_NAME)))
            .chain(std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .collect()
    }

    /// Gets a [`Figment`] with every default file merged in.
    pub fn default_sources() -> Figment {
        Self::default_paths()
            .iter()
            .fold(Figment::new(), |figment, path| merge_file(figment, path))
    }

    /// Loads the configuration from the default files and the environment.
    pub fn load() -> figment::Result<Self> {
        Self::load_with_paths(std::iter::empty::<&Path>())
    }

    /// Loads the configuration with extra files layered over the defaults.
    ///
    /// Precedence, from lowest to highest: [`default_paths()`](Self::default_paths),
    /// `paths` in order, then `EMRFLOW_*` variables. Files ending in `.json`
    /// are read as JSON and anything else as TOML.
    pub fn load_with_paths<I, S>(paths: I) -> figment::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        let mut builder = Self::default_sources();

        for path in paths {
            tracing::debug!("loading configuration from `{}`", path.as_ref().display());
            builder = merge_file(builder, path.as_ref());
        }

        builder
            .admerge(
                Env::prefixed(ENV_PREFIX)
                    .ignore(&["CONFIG"])
                    .map(|key| key.as_str().replace("__", ".").replace('_', "-").into()),
            )
            .extract()
    }

    /// Loads a config from a file under `test/fixtures/config`.
    #[cfg(test)]
    pub fn fixture(name: &str) -> figment::Result<Self> {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("test")
            .join("fixtures")
            .join("config")
            .join(name);

        merge_file(Figment::new(), &path).extract()
    }
}

/// Merges a configuration file into a [`Figment`], choosing the format from
/// the file's extension.
fn merge_file(figment: Figment, path: &Path) -> Figment {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => figment.admerge(Json::file(path)),
        _ => figment.admerge(Toml::file(path)),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn loading_file_returns_valid_config() {
        let config = Config::fixture("example.toml").unwrap();
        config.validate().unwrap();

        assert_eq!(config.application_id(), "00fabcd1234efgh5");
        assert_eq!(config.region(), Some("us-east-1"));
        assert_eq!(config.tracking().poll_interval(), Duration::from_secs(15));
        assert_eq!(config.tracking().max_uploads(), 8);
        assert_eq!(
            config.tracking().dashboard_interval(),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn legacy_json_keys_are_accepted() {
        let config = Config::fixture("legacy.json").unwrap();
        config.validate().unwrap();

        assert_eq!(
            config.job_role(),
            "arn:aws:iam::123456789012:role/emr-serverless-job-role"
        );
        assert_eq!(config.region(), Some("eu-west-1"));
        assert_eq!(config.tracking().poll_interval(), Duration::from_secs(30));
    }

    #[test]
    fn missing_role() {
        let config = Config::fixture("missing_role.toml").unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "a job role must be configured");
    }

    #[test]
    fn the_working_directory_is_consulted_after_the_user_directory() {
        let paths = Config::default_paths();
        let cwd = std::env::current_dir().unwrap().join(FILE_NAME);

        let position = paths.iter().position(|path| *path == cwd).unwrap();
        assert!(
            paths[..position]
                .iter()
                .all(|path| path.ends_with(Path::new("emrflow").join(FILE_NAME)))
        );
    }

    #[test]
    fn empty_region_is_ignored() {
        let config = Config::builder()
            .application_id("app")
            .job_role("role")
            .region("")
            .build();

        config.validate().unwrap();
        assert_eq!(config.region(), None);
    }
}
