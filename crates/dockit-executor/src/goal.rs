//! The Docker goal state machine.
//!
//! Stages run strictly in order, each gated on the previous one:
//! 1. Builder check
//! 2. Registry discovery
//! 3. Login (docker only)
//! 4. Build
//! 5. Push (docker only, conditional)
//! 6. Run (run variant only)
//! 7. Image link notification
//!
//! The first stage that fails becomes the goal's result; nothing after it runs.

use dockit_core::image::flatten_references;
use dockit_core::{
    BuildOptions, Builder, DockerfileLocator, Error, ExecutionResult, ExternalUrl, GoalInvocation,
    ImageLink, ImageLinker, ImageNameCreator, ImageReference, ProcessRunner, ProcessSpec,
    RegistryCredential, Result,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::naming::{DefaultDockerfile, FixedDockerfile};
use crate::process::check_builder;
use crate::registry::RegistryResolver;

const DOCKER_CONFIG_ENV: &str = "DOCKER_CONFIG";

/// What the goal does after building.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum GoalVariant {
    /// Build, push and link.
    #[default]
    Build,
    /// Additionally run the image.
    Run(RunSpec),
}

/// Arguments for the run variant.
///
/// In this variant `builder_args` are the `docker run` flags rather than
/// extra `docker build` arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSpec {
    /// Run this image instead of building one; build and push are skipped.
    pub image: Option<String>,
    /// Arguments passed to the container after the image.
    pub program_args: Vec<String>,
}

/// Executes Docker goals.
///
/// Holds no per-invocation state, so one executor can serve many
/// concurrent invocations.
pub struct DockerGoalExecutor {
    runner: Arc<dyn ProcessRunner>,
    resolver: RegistryResolver,
    names: Arc<dyn ImageNameCreator>,
    linker: Arc<dyn ImageLinker>,
    dockerfile: Option<Arc<dyn DockerfileLocator>>,
}

impl DockerGoalExecutor {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        resolver: RegistryResolver,
        names: Arc<dyn ImageNameCreator>,
        linker: Arc<dyn ImageLinker>,
    ) -> Self {
        Self {
            runner,
            resolver,
            names,
            linker,
            dockerfile: None,
        }
    }

    /// Override the Dockerfile location for every invocation.
    ///
    /// Without an override, the `dockerfile` option is used, falling back
    /// to `Dockerfile` in the project root.
    pub fn with_dockerfile_locator(mut self, locator: Arc<dyn DockerfileLocator>) -> Self {
        self.dockerfile = Some(locator);
        self
    }

    /// Run one goal invocation to completion and return its single result.
    pub async fn execute(
        &self,
        options: &BuildOptions,
        variant: &GoalVariant,
        invocation: &GoalInvocation,
    ) -> ExecutionResult {
        info!(
            invocation = %invocation.id,
            repo = %invocation.revision.slug(),
            sha = %invocation.revision.sha,
            builder = %options.builder,
            "Starting docker goal"
        );

        let result = match self.execute_stages(options, variant, invocation).await {
            Ok(urls) => ExecutionResult::success().with_external_urls(urls),
            Err(e) => {
                error!(invocation = %invocation.id, error = %e, "Docker goal failed");
                invocation.log.system(&format!("Error: {}", e));
                ExecutionResult::from(e)
            }
        };

        self.cleanup(invocation).await;

        if result.is_success() {
            info!(invocation = %invocation.id, "Docker goal succeeded");
        } else {
            warn!(
                invocation = %invocation.id,
                code = result.code,
                message = result.message.as_deref().unwrap_or_default(),
                "Docker goal finished with failure"
            );
        }
        result
    }

    async fn execute_stages(
        &self,
        options: &BuildOptions,
        variant: &GoalVariant,
        invocation: &GoalInvocation,
    ) -> Result<Vec<ExternalUrl>> {
        // 1. Builder check
        check_builder(
            self.runner.as_ref(),
            options,
            invocation.log.as_ref(),
            &invocation.cancel,
        )
        .await?;

        // 2. Registry discovery, once per invocation
        let registries = self.resolver.resolve(options, invocation).await?;
        let options = options.clone().with_registries(registries);

        self.prepare_docker_config(&options, invocation).await?;

        // 3. Login
        if options.builder == Builder::Docker {
            self.login(&options, invocation).await?;
        }

        let explicit_image = match variant {
            GoalVariant::Run(RunSpec {
                image: Some(image), ..
            }) => Some(image.clone()),
            _ => None,
        };

        let (images, built) = match explicit_image {
            Some(image) => {
                invocation
                    .log
                    .system(&format!("Using image {}; skipping build and push", image));
                (vec![image], Vec::new())
            }
            None => {
                let built = self
                    .names
                    .create_names(&invocation.project, &invocation.revision, &options)
                    .await?;
                let images = flatten_references(&built);
                if images.is_empty() {
                    return Err(Error::Configuration(
                        "image name creator returned no images".to_string(),
                    ));
                }

                // 4. Build
                self.build(&options, variant, &images, invocation).await?;

                // 5. Push
                self.push(&options, &images, invocation).await?;

                (images, built)
            }
        };

        let image = images
            .first()
            .cloned()
            .ok_or_else(|| Error::Internal("no image to link".to_string()))?;

        // 6. Run
        if let GoalVariant::Run(spec) = variant {
            self.run_image(&options, &image, spec, invocation).await?;
        }

        // 7. Notify
        self.notify(&image, invocation).await?;

        Ok(external_urls(&built, &options.registries))
    }

    /// Create the invocation's `DOCKER_CONFIG` directory and write any raw
    /// docker config into it.
    async fn prepare_docker_config(
        &self,
        options: &BuildOptions,
        invocation: &GoalInvocation,
    ) -> Result<()> {
        let dir = invocation.docker_config_dir();
        tokio::fs::create_dir_all(&dir).await?;

        if let Some(config) = &options.config {
            tokio::fs::write(dir.join("config.json"), config).await?;
            invocation.log.system("Wrote docker config.json from configuration");
        }
        Ok(())
    }

    async fn login(
        &self,
        options: &BuildOptions,
        invocation: &GoalInvocation,
    ) -> Result<()> {
        let registries: Vec<&RegistryCredential> =
            options.registries.iter().filter(|r| r.has_login()).collect();

        if registries.is_empty() {
            info!(invocation = %invocation.id, "Skipping docker login");
            invocation
                .log
                .system("Skipping 'docker login' because user and password are not configured");
            return Ok(());
        }

        for registry in registries {
            let user = registry.user.clone().unwrap_or_default();
            let secret = registry.secret.clone().unwrap_or_default();

            let mut spec = self
                .command(options, invocation)
                .args(["login", "--username", user.as_str(), "--password", secret.as_str()])
                .secret(secret.as_str());
            if registry.is_custom_host() {
                spec = spec.arg(registry.host.as_str());
            }

            info!(registry = %registry.host, user = %user, "Logging in to registry");
            self.run(&spec, invocation).await?;
        }

        Ok(())
    }

    async fn build(
        &self,
        options: &BuildOptions,
        variant: &GoalVariant,
        images: &[String],
        invocation: &GoalInvocation,
    ) -> Result<()> {
        match options.builder {
            Builder::Docker => {}
            Builder::Kaniko => {
                return Err(Error::Unimplemented(
                    "building images with the kaniko builder is not supported".to_string(),
                ));
            }
        }

        let dockerfile = self.locate_dockerfile(options, invocation).await?;
        let dockerfile_arg = dockerfile.to_string_lossy().into_owned();
        let mut spec = self
            .command(options, invocation)
            .args(["build", ".", "-f", dockerfile_arg.as_str()]);
        for image in images {
            spec = spec.args(["-t", image.as_str()]);
        }
        if matches!(variant, GoalVariant::Build) {
            spec = spec.args(options.builder_args.iter().map(String::as_str));
        }

        info!(images = ?images, dockerfile = %dockerfile.display(), "Building image");
        self.run(&spec, invocation).await
    }

    async fn push(
        &self,
        options: &BuildOptions,
        images: &[String],
        invocation: &GoalInvocation,
    ) -> Result<()> {
        if !options.push_enabled(invocation.mode) {
            info!(invocation = %invocation.id, "Skipping docker push");
            invocation.log.system("Skipping 'docker push' as push is disabled");
            return Ok(());
        }

        let missing = missing_push_fields(&options.registries);
        if !missing.is_empty() {
            return Err(Error::Configuration(format!(
                "Required configuration missing for pushing docker image: {}",
                missing.join(", ")
            )));
        }

        for image in images {
            let spec = self.command(options, invocation).args(["push", image.as_str()]);
            info!(image = %image, "Pushing image");
            self.run(&spec, invocation).await?;
        }

        Ok(())
    }

    async fn run_image(
        &self,
        options: &BuildOptions,
        image: &str,
        run: &RunSpec,
        invocation: &GoalInvocation,
    ) -> Result<()> {
        if options.builder != Builder::Docker {
            return Err(Error::Unimplemented(format!(
                "running images with the {} builder is not supported",
                options.builder
            )));
        }

        let spec = self
            .command(options, invocation)
            .arg("run")
            .args(options.builder_args.iter().map(String::as_str))
            .arg(image)
            .args(run.program_args.iter().map(String::as_str));

        info!(image = %image, "Running image");
        self.run(&spec, invocation).await
    }

    async fn notify(&self, image: &str, invocation: &GoalInvocation) -> Result<()> {
        let revision = &invocation.revision;
        let link = ImageLink {
            owner: revision.owner.clone(),
            repo: revision.repo.clone(),
            sha: revision.sha.clone(),
            image: image.to_string(),
            workspace_id: invocation.workspace_id.clone(),
        };

        invocation.log.system(&format!(
            "Linking image {} to {}@{}",
            image,
            revision.slug(),
            revision.sha
        ));

        match self.linker.link_image(&link).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::NotificationFailed("Image link failed".to_string())),
            Err(e) => {
                warn!(error = %e, image = %image, "Image link call failed");
                Err(Error::NotificationFailed("Image link failed".to_string()))
            }
        }
    }

    async fn locate_dockerfile(
        &self,
        options: &BuildOptions,
        invocation: &GoalInvocation,
    ) -> Result<std::path::PathBuf> {
        match (&self.dockerfile, &options.dockerfile) {
            (Some(locator), _) => locator.locate(&invocation.project).await,
            (None, Some(path)) => FixedDockerfile::new(path).locate(&invocation.project).await,
            (None, None) => DefaultDockerfile.locate(&invocation.project).await,
        }
    }

    /// Base builder command for this invocation.
    fn command(&self, options: &BuildOptions, invocation: &GoalInvocation) -> ProcessSpec {
        ProcessSpec::new(options.builder_path())
            .env(
                DOCKER_CONFIG_ENV,
                invocation.docker_config_dir().to_string_lossy(),
            )
            .current_dir(invocation.project_root())
    }

    /// Run one builder command; a nonzero exit fails the stage.
    async fn run(&self, spec: &ProcessSpec, invocation: &GoalInvocation) -> Result<()> {
        let result = self
            .runner
            .run(spec, invocation.log.as_ref(), &invocation.cancel)
            .await?;
        if result.is_success() {
            return Ok(());
        }
        Err(Error::ProcessFailed {
            command: spec.display(),
            code: result.code,
            message: result
                .message
                .unwrap_or_else(|| format!("{} failed", spec.display())),
        })
    }

    async fn cleanup(&self, invocation: &GoalInvocation) {
        let dir = invocation.docker_config_dir();
        let Some(scope) = dir.parent() else {
            return;
        };
        remove_scope(scope).await;
    }
}

async fn remove_scope(scope: &Path) {
    match tokio::fs::remove_dir_all(scope).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %scope.display(), error = %e, "Failed to remove docker config"),
    }
}

/// Fields missing across all registries, in `registry, user, password` order.
fn missing_push_fields(registries: &[RegistryCredential]) -> Vec<&'static str> {
    if registries.is_empty() {
        return vec!["registry", "user", "password"];
    }

    let mut missing = Vec::new();
    for field in registries.iter().flat_map(|r| r.missing_push_fields()) {
        if !missing.contains(&field) {
            missing.push(field);
        }
    }
    missing
}

fn external_urls(images: &[ImageReference], registries: &[RegistryCredential]) -> Vec<ExternalUrl> {
    images
        .iter()
        .filter_map(|image| {
            let registry = registries
                .iter()
                .find(|r| Some(r.host.as_str()) == image.registry.as_deref())?;
            registry.display.then(|| ExternalUrl {
                label: registry.label.clone(),
                url: image.browse_url(),
            })
        })
        .collect()
}
