//! Building the bundles a job depends on.
//!
//! Each bundle is built by a bash script rendered from the packaging
//! configuration. The scripts inherit the standard streams so their output
//! shows up as they run.

use std::process::Stdio;

use emrflow_config::package::Config;
use emrflow_config::package::EnvKind;
use tokio::process::Command;
use tracing::debug;
use tracing::info;
use tracing::trace;

use crate::Error;
use crate::Result;

/// Runs a script with `bash -c`.
async fn run_script(step: &'static str, script: &str) -> Result<()> {
    trace!("executing `{step}` script:\n{script}");

    let status = Command::new("/usr/bin/env")
        .args(["bash", "-c", script])
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| Error::Package {
            step,
            reason: format!("failed to spawn bash: {e}"),
        })?;

    if !status.success() {
        return Err(Error::Package {
            step,
            reason: format!("the script exited with {status}"),
        });
    }

    debug!("packaging step `{step}` succeeded");
    Ok(())
}

/// Renders a template for a step.
fn rendered<E: std::fmt::Display>(
    step: &'static str,
    result: std::result::Result<String, E>,
) -> Result<String> {
    result.map_err(|e| Error::Package {
        step,
        reason: format!("failed to render the script: {e}"),
    })
}

/// Builds a Docker image that packs the environment and exports it into the
/// output directory.
async fn build_docker_env(config: &Config) -> Result<()> {
    run_script("docker", emrflow_config::package::DOCKER_CHECK).await?;

    let dockerfile = rendered("docker", config.dockerfile())?;
    let path = config.dockerfile_path();

    tokio::fs::create_dir_all(config.output_dir())
        .await
        .map_err(|e| Error::Package {
            step: "docker",
            reason: format!(
                "failed to create `{}`: {e}",
                config.output_dir().display()
            ),
        })?;

    tokio::fs::write(&path, dockerfile)
        .await
        .map_err(|e| Error::Package {
            step: "docker",
            reason: format!("failed to write `{}`: {e}", path.display()),
        })?;

    run_script("docker", &rendered("docker", config.docker_build_command())?).await
}

/// Builds the bundles requested by `config`.
///
/// The project sources are zipped first, then the runtime environment is
/// built and packed.
pub async fn build_package(config: &Config) -> Result<()> {
    if !config.package_project() && !config.package_env() {
        info!("nothing to package");
        return Ok(());
    }

    if config.package_project() {
        info!(
            "packaging the project into `{}`",
            config.output_dir().display()
        );
        run_script("project", &rendered("project", config.project_script())?).await?;
    }

    if config.package_env() {
        info!("building and packing a {} environment", config.env_kind());
        match config.env_kind() {
            EnvKind::Conda => {
                run_script("conda", &rendered("conda", config.conda_script())?).await?
            }
            EnvKind::Docker => build_docker_env(config).await?,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nothing_requested() {
        let config = Config::builder().output_dir("dist").build();
        build_package(&config).await.unwrap();
    }

    #[tokio::test]
    async fn missing_include_paths_fail_the_project_step() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::builder()
            .output_dir(dir.path().join("dist"))
            .package_project(true)
            .include_paths(vec![
                dir.path().join("does-not-exist").display().to_string(),
            ])
            .build();

        match build_package(&config).await {
            Err(Error::Package { step, .. }) => assert_eq!(step, "project"),
            other => panic!("expected a packaging error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failing_scripts_are_errors() {
        let err = run_script("check", "exit 3").await.unwrap_err();
        assert!(err.to_string().starts_with("packaging step `check` failed"));

        run_script("check", "true").await.unwrap();
    }
}
