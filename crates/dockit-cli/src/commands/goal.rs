//! Local execution of Docker goals.

use anyhow::{Context, Result};
use clap::Args;
use dockit_config::{DockitConfig, load_config};
use dockit_core::{
    BuildOptions, BuildOptionsOverlay, Builder, CredentialStore, ExecutionMode, ExecutionResult,
    GoalInvocation, ImageLinker, LogLine, LogSink, LogStream, Project, Revision, VersionSource,
};
use dockit_executor::{
    ChannelSink, DefaultImageNameCreator, DockerGoalExecutor, GoalVariant, LocalImageLinker,
    LocalVersionSource, OrchestratorClient, ProgressReporter, RegistryResolver, RunSpec,
    TokioProcessRunner, TracingSink,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const CONFIG_FILE: &str = "dockit.kdl";

#[derive(Args, Debug)]
pub struct GoalArgs {
    /// Project directory containing the Dockerfile
    #[arg(default_value = ".")]
    pub project: PathBuf,

    /// Configuration file (defaults to dockit.kdl in the project directory)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Project name used for the image; defaults to the directory name
    #[arg(long)]
    pub name: Option<String>,

    /// Repository owner
    #[arg(long, env = "DOCKIT_OWNER", default_value = "local")]
    pub owner: String,

    /// Repository name; defaults to the project name
    #[arg(long, env = "DOCKIT_REPO")]
    pub repo: Option<String>,

    /// Commit SHA being built
    #[arg(long, env = "DOCKIT_SHA", default_value = "")]
    pub sha: String,

    /// Branch being built
    #[arg(long, env = "DOCKIT_BRANCH", default_value = "main")]
    pub branch: String,

    /// Orchestrator workspace id
    #[arg(long, env = "DOCKIT_WORKSPACE")]
    pub workspace: Option<String>,

    /// Run in local mode; images are not pushed unless --push is given
    #[arg(long)]
    pub local: bool,

    /// Push images after building
    #[arg(long, overrides_with = "no_push")]
    pub push: bool,

    /// Never push images
    #[arg(long)]
    pub no_push: bool,

    /// Builder to use (docker or kaniko)
    #[arg(long)]
    pub builder: Option<Builder>,

    /// Path to the builder executable
    #[arg(long)]
    pub builder_path: Option<String>,

    /// Extra builder argument; may be repeated
    #[arg(long = "builder-arg", allow_hyphen_values = true)]
    pub builder_args: Vec<String>,

    /// Dockerfile path relative to the project directory
    #[arg(long, short = 'f')]
    pub dockerfile: Option<PathBuf>,

    /// Registry to push to
    #[arg(long, env = "DOCKIT_REGISTRY")]
    pub registry: Option<String>,

    /// Registry user
    #[arg(long, env = "DOCKIT_REGISTRY_USER")]
    pub user: Option<String>,

    /// Registry password
    #[arg(long, env = "DOCKIT_REGISTRY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Directory for per-invocation docker config
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,
}

impl GoalArgs {
    /// Options set on the command line; these win over the configuration file.
    fn overlay(&self) -> BuildOptionsOverlay {
        let push = match (self.push, self.no_push) {
            (_, true) => Some(false),
            (true, false) => Some(true),
            (false, false) => None,
        };

        BuildOptionsOverlay {
            push,
            registry: self.registry.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            builder: self.builder,
            builder_args: (!self.builder_args.is_empty()).then(|| self.builder_args.clone()),
            builder_path: self.builder_path.clone(),
            dockerfile: self.dockerfile.clone(),
            ..Default::default()
        }
    }

    fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| self.project.join(CONFIG_FILE))
    }
}

/// Build and push the project's image. Returns the goal's exit code.
pub async fn build(args: GoalArgs, json: bool) -> Result<i32> {
    execute(args, GoalVariant::Build, json).await
}

/// Build (or take) an image and run it. Returns the goal's exit code.
pub async fn run(
    args: GoalArgs,
    image: Option<String>,
    program_args: Vec<String>,
    json: bool,
) -> Result<i32> {
    let variant = GoalVariant::Run(RunSpec {
        image,
        program_args,
    });
    execute(args, variant, json).await
}

async fn execute(args: GoalArgs, variant: GoalVariant, json: bool) -> Result<i32> {
    let config = read_config(&args.config_path(), args.config.is_some())?;

    let root = args
        .project
        .canonicalize()
        .with_context(|| format!("Failed to resolve project directory: {}", args.project.display()))?;
    let name = project_name(&args, &config, &root);

    let options = BuildOptions::default().merge(config.build.clone().then(args.overlay()));

    let revision = Revision {
        owner: args.owner.clone(),
        repo: args.repo.clone().unwrap_or_else(|| name.clone()),
        sha: args.sha.clone(),
        branch: args.branch.clone(),
    };

    let (resolver, versions, linker, workspace) = collaborators(&args, &config)?;
    let mode = if args.local || config.orchestrator.is_none() {
        ExecutionMode::Local
    } else {
        ExecutionMode::Managed
    };

    let executor = DockerGoalExecutor::new(
        Arc::new(TokioProcessRunner),
        resolver,
        Arc::new(DefaultImageNameCreator::new(versions)),
        linker,
    );

    let cancel = CancellationToken::new();
    spawn_ctrl_c(cancel.clone());

    let (sink, rx) = if json {
        let sink: Arc<dyn LogSink> = Arc::new(TracingSink);
        (sink, None)
    } else {
        let (sink, rx) = ChannelSink::new();
        let sink: Arc<dyn LogSink> = Arc::new(sink);
        (sink, Some(rx))
    };
    let printer = rx.map(|rx| tokio::spawn(print_lines(rx)));

    let mut invocation = GoalInvocation::new(
        revision,
        Project::new(name.clone(), root),
        Arc::new(ProgressReporter::new(sink)),
    )
    .with_workspace(workspace.unwrap_or_default())
    .with_mode(mode)
    .with_cancel(cancel);
    if let Some(dir) = &args.scratch_dir {
        invocation = invocation.with_scratch_dir(dir);
    }

    info!(project = %name, mode = ?mode, "Executing docker goal");
    let result = executor.execute(&options, &variant, &invocation).await;

    // Closes the channel so the printer drains and exits.
    drop(invocation);
    if let Some(printer) = printer {
        printer.await.context("Log printer task failed")?;
    }

    print_summary(&result);
    Ok(result.code)
}

fn read_config(path: &Path, explicit: bool) -> Result<DockitConfig> {
    if !explicit && !path.exists() {
        return Ok(DockitConfig::default());
    }
    load_config(path).with_context(|| format!("Failed to load config file: {}", path.display()))
}

fn project_name(args: &GoalArgs, config: &DockitConfig, root: &Path) -> String {
    args.name
        .clone()
        .or_else(|| config.project.clone())
        .or_else(|| {
            root.file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "app".to_string())
}

type Collaborators = (
    RegistryResolver,
    Arc<dyn VersionSource>,
    Arc<dyn ImageLinker>,
    Option<String>,
);

/// Orchestrator-backed collaborators when configured, local stand-ins otherwise.
fn collaborators(args: &GoalArgs, config: &DockitConfig) -> Result<Collaborators> {
    let Some(orchestrator) = &config.orchestrator else {
        let versions: Arc<dyn VersionSource> = Arc::new(LocalVersionSource::default());
        let linker: Arc<dyn ImageLinker> = Arc::new(LocalImageLinker);
        return Ok((
            RegistryResolver::static_only(),
            versions,
            linker,
            args.workspace.clone(),
        ));
    };

    let workspace = args
        .workspace
        .clone()
        .or_else(|| orchestrator.workspace.clone())
        .context("An orchestrator is configured but no workspace id was given")?;

    let mut client =
        OrchestratorClient::new(orchestrator.graphql_url.clone(), orchestrator.webhook_url.clone());
    if let Some(token) = &orchestrator.token {
        client = client.with_token(token.clone());
    }
    let client = Arc::new(client);
    let store: Arc<dyn CredentialStore> = client.clone();
    let versions: Arc<dyn VersionSource> = client.clone();
    let linker: Arc<dyn ImageLinker> = client;

    Ok((RegistryResolver::new(store), versions, linker, Some(workspace)))
}

fn spawn_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling goal");
            cancel.cancel();
        }
    });
}

async fn print_lines(mut rx: mpsc::UnboundedReceiver<LogLine>) {
    let mut phase = None;
    while let Some(line) = rx.recv().await {
        if line.stream == LogStream::System {
            if let Some(next) = ProgressReporter::classify(&line.content) {
                if phase != Some(next) {
                    println!("▶ {}", next);
                    phase = Some(next);
                }
            }
        }

        let marker = match line.stream {
            LogStream::Stdout => " ",
            LogStream::Stderr => "!",
            LogStream::System => "*",
        };
        println!("  {} {}", marker, line.content);
    }
}

fn print_summary(result: &ExecutionResult) {
    if result.is_success() {
        println!("\n✓ Goal succeeded");
        for url in &result.external_urls {
            match &url.label {
                Some(label) => println!("  {}: {}", label, url.url),
                None => println!("  {}", url.url),
            }
        }
    } else {
        println!(
            "\n✗ Goal failed with code {}: {}",
            result.code,
            result.message.as_deref().unwrap_or("no message")
        );
        if result.retry_feasible {
            println!("  (retry may succeed)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        goal: GoalArgs,
    }

    fn parse(args: &[&str]) -> GoalArgs {
        let argv = std::iter::once("dockit").chain(args.iter().copied());
        TestCli::parse_from(argv).goal
    }

    #[test]
    fn test_overlay_from_flags() {
        let args = parse(&[
            "--no-push",
            "--builder",
            "kaniko",
            "--builder-arg",
            "--pull",
            "--registry",
            "ghcr.io",
        ]);
        let overlay = args.overlay();

        assert_eq!(overlay.push, Some(false));
        assert_eq!(overlay.builder, Some(Builder::Kaniko));
        assert_eq!(overlay.builder_args, Some(vec!["--pull".to_string()]));
        assert_eq!(overlay.registry.as_deref(), Some("ghcr.io"));
    }

    #[test]
    fn test_push_unset_by_default() {
        let args = parse(&[]);
        assert_eq!(args.overlay().push, None);
        assert!(args.overlay().builder_args.is_none());
        assert_eq!(args.config_path(), PathBuf::from(".").join(CONFIG_FILE));
    }

    #[test]
    fn test_flags_override_config_file() {
        let config = dockit_config::parse_config(
            r#"
            docker {
                build {
                    push #true
                    registry "registry.example.com"
                    user "bot"
                }
            }
            "#,
        )
        .unwrap();
        let args = parse(&["--no-push", "--user", "ci"]);

        let options = BuildOptions::default().merge(config.build.then(args.overlay()));

        assert_eq!(options.push, Some(false));
        assert_eq!(options.registries[0].host, "registry.example.com");
        assert_eq!(options.registries[0].user.as_deref(), Some("ci"));
    }

    #[test]
    fn test_missing_default_config_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = read_config(&dir.path().join(CONFIG_FILE), false).unwrap();
        assert!(config.orchestrator.is_none());
        assert!(read_config(&dir.path().join(CONFIG_FILE), true).is_err());
    }

    #[test]
    fn test_project_name_fallbacks() {
        let config = DockitConfig {
            project: Some("from-config".to_string()),
            ..Default::default()
        };
        let root = Path::new("/work/checkout");

        assert_eq!(project_name(&parse(&["--name", "cli"]), &config, root), "cli");
        assert_eq!(project_name(&parse(&[]), &config, root), "from-config");
        assert_eq!(
            project_name(&parse(&[]), &DockitConfig::default(), root),
            "checkout"
        );
    }
}
