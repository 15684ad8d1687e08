//! Configuration related to packaging a project and its runtime environment.
//!
//! Packaging is entirely driven by shell scripts rendered from the templates
//! in [`templates`]; this module only decides _what_ gets rendered.

use std::path::Path;
use std::path::PathBuf;

use bon::Builder;
use handlebars::Handlebars;
use handlebars::RenderError;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;

pub mod templates;

/// The file name of the zipped project sources.
pub const PROJECT_ARCHIVE: &str = "project-dependency-src.zip";

/// The file name of the packed runtime environment.
pub const ENV_ARCHIVE: &str = "pyspark_deps.tar.gz";

/// The command used to check that Docker is available.
pub const DOCKER_CHECK: &str = "docker --version";

/// The kind of runtime environment to build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvKind {
    /// Build the environment with a local conda installation.
    #[default]
    Conda,

    /// Build the environment inside a Docker image.
    Docker,
}

impl std::fmt::Display for EnvKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvKind::Conda => write!(f, "conda"),
            EnvKind::Docker => write!(f, "docker"),
        }
    }
}

impl std::str::FromStr for EnvKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "conda" => Ok(EnvKind::Conda),
            "docker" => Ok(EnvKind::Docker),
            _ => Err(format!("unknown environment kind `{s}`; expected `conda` or `docker`")),
        }
    }
}

/// A packaging request.
#[derive(Builder, Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
#[builder(builder_type = Builder)]
pub struct Config {
    /// The directory the bundles are written to.
    #[builder(into)]
    output_dir: PathBuf,

    /// Whether to zip the project sources.
    #[builder(default)]
    package_project: bool,

    /// The directories and files included in the bundles.
    #[builder(into, default)]
    include_paths: Vec<String>,

    /// Whether to build and pack a runtime environment.
    #[builder(default)]
    package_env: bool,

    /// The kind of runtime environment.
    #[builder(default)]
    env_kind: EnvKind,

    /// The commands run inside the environment to install libraries.
    #[builder(into, default)]
    exec_commands: Vec<String>,

    /// The Python version of the environment.
    #[builder(into, default = String::from("3.9"))]
    python_version: String,

    /// The proxy endpoint used while building.
    #[builder(into, default)]
    proxy: String,
}

impl Config {
    /// Gets the output directory.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Whether the project sources are packaged.
    pub fn package_project(&self) -> bool {
        self.package_project
    }

    /// Gets the include paths.
    pub fn include_paths(&self) -> &[String] {
        &self.include_paths
    }

    /// Whether a runtime environment is packaged.
    pub fn package_env(&self) -> bool {
        self.package_env
    }

    /// Gets the kind of environment.
    pub fn env_kind(&self) -> EnvKind {
        self.env_kind
    }

    /// Gets the install commands.
    pub fn exec_commands(&self) -> &[String] {
        &self.exec_commands
    }

    /// Gets the Python version.
    pub fn python_version(&self) -> &str {
        &self.python_version
    }

    /// Gets the proxy endpoint.
    pub fn proxy(&self) -> &str {
        &self.proxy
    }

    /// Gets the path of the Dockerfile written for Docker builds.
    pub fn dockerfile_path(&self) -> PathBuf {
        self.output_dir.join("Dockerfile")
    }

    /// Renders the script that zips the project sources.
    pub fn project_script(&self) -> Result<String, RenderError> {
        render(
            templates::PROJECT,
            &json!({
                "output_dir": self.output_dir.display().to_string(),
                "archive": PROJECT_ARCHIVE,
                "include_paths": self.include_paths.join(" "),
            }),
        )
    }

    /// Renders the script that builds and packs a conda environment.
    pub fn conda_script(&self) -> Result<String, RenderError> {
        render(
            templates::CONDA,
            &json!({
                "output_dir": self.output_dir.display().to_string(),
                "archive": ENV_ARCHIVE,
                "proxy": self.proxy,
                "python_version": self.python_version,
                "exec_commands": self.exec_commands,
                "search_paths": self.search_paths().join(":"),
            }),
        )
    }

    /// Renders the Dockerfile that builds and exports the environment.
    pub fn dockerfile(&self) -> Result<String, RenderError> {
        render(
            templates::DOCKERFILE,
            &json!({
                "archive": ENV_ARCHIVE,
                "proxy": self.proxy,
                "python_version": self.python_version,
                "exec_commands": self.exec_commands,
                "include_paths": self.include_paths.join(" "),
            }),
        )
    }

    /// Renders the command that builds the Dockerfile and exports the packed
    /// environment into the output directory.
    pub fn docker_build_command(&self) -> Result<String, RenderError> {
        render(
            templates::DOCKER_BUILD,
            &json!({
                "dockerfile": self.dockerfile_path().display().to_string(),
                "output_dir": self.output_dir.display().to_string(),
            }),
        )
    }

    /// The directories added to `PATH` while building a conda environment.
    ///
    /// Files contribute their parent directory.
    fn search_paths(&self) -> Vec<String> {
        self.include_paths
            .iter()
            .map(|path| {
                let p = Path::new(path);
                if p.is_dir() {
                    path.clone()
                } else {
                    p.parent()
                        .map(|parent| parent.display().to_string())
                        .unwrap_or_default()
                }
            })
            .collect()
    }
}

/// Renders a template with HTML escaping disabled.
///
/// Strict mode is enabled so that a missing value is an error instead of an
/// empty string inside a shell script.
fn render(template: &str, data: &serde_json::Value) -> Result<String, RenderError> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    registry.register_escape_fn(handlebars::no_escape);
    registry.render_template(template, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::builder()
            .output_dir("dist")
            .include_paths(vec![String::from("src"), String::from("main.py")])
            .exec_commands(vec![
                String::from("pip install poetry==1.7.1"),
                String::from("poetry install"),
            ])
            .proxy("http://proxy:3128")
            .build()
    }

    #[test]
    fn defaults() {
        let config = Config::builder().output_dir("dist").build();
        assert_eq!(config.python_version(), "3.9");
        assert_eq!(config.env_kind(), EnvKind::Conda);
        assert!(!config.package_project());
        assert!(!config.package_env());
    }

    #[test]
    fn project_script_zips_include_paths() {
        let script = config().project_script().unwrap();
        assert!(script.contains("for path in src main.py; do"));
        assert!(script.contains("zip -r dist/project-dependency-src.zip src main.py"));
        assert!(script.contains("-x \"*__pycache__*\""));
    }

    #[test]
    fn conda_script_runs_each_command_in_the_environment() {
        let script = config().conda_script().unwrap();
        assert!(script.contains("conda create -n emr_runner python=3.9 -y;"));
        assert!(script.contains("conda run -n emr_runner pip install poetry==1.7.1;"));
        assert!(script.contains("conda run -n emr_runner poetry install;"));
        assert!(script.contains("export HTTPS_PROXY=http://proxy:3128"));
        assert!(script.contains("-o dist/pyspark_deps.tar.gz;"));
    }

    #[test]
    fn dockerfile_copies_include_paths() {
        let dockerfile = config().dockerfile().unwrap();
        assert!(dockerfile.contains("COPY src main.py ."));
        assert!(dockerfile.contains("RUN conda run -n runner-emr-env poetry install;"));
        assert!(dockerfile.contains("RUN conda create -n runner-emr-env python=3.9 -y --force"));
    }

    #[test]
    fn docker_build_command() {
        assert_eq!(
            config().docker_build_command().unwrap(),
            "docker buildx build -f dist/Dockerfile --output type=local,dest=dist ."
        );
    }

    #[test]
    fn env_kind_parses_case_insensitively() {
        assert_eq!("Docker".parse::<EnvKind>().unwrap(), EnvKind::Docker);
        assert!("venv".parse::<EnvKind>().is_err());
    }
}
