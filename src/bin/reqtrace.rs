// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use reqtrace::{
    baseline::BaselineDiff,
    bridge::{
        spawn_host,
        vault::{KeyringVault, TokenClient, GIT_TOKEN_KEY},
        Host,
    },
    codec::artifact_to_markdown,
    config::{Backend, Environment, Settings},
    fs::{FileSystem, MemoryFs, MemoryStore, NativeFs},
    git::{BridgedGit, EmbeddedGit, GitBackend, PullOutcome},
    model::{ArtifactKind, LinkType},
    path::{default_config_path, default_workspace_dir},
    workspace::{Scope, Workspace},
};

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Confirm, Password};
use std::{
    path::{Path, PathBuf},
    process::exit,
    sync::Arc,
    time::Duration,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "reqtrace [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Workspace directory to use instead of the configured one.
    #[arg(short, long, global = true, value_name = "path")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Initialize workspace.
    Init,

    /// Manage projects.
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Create new artifact.
    #[command(override_usage = "reqtrace add [options] <kind> <title>")]
    Add(AddOptions),

    /// Edit artifact, creating its next revision.
    Edit(EditOptions),

    /// Print artifact as stored.
    Show(IdOptions),

    /// List artifacts of one kind.
    List(ListOptions),

    /// Mark artifact deleted, or remove it for good.
    Delete(DeleteOptions),

    /// Show commits that touched artifact.
    History(HistoryOptions),

    /// Show uncommitted changes in every repository.
    Status,

    /// Commit every uncommitted change.
    Commit(CommitOptions),

    /// Link two artifacts.
    #[command(override_usage = "reqtrace link [options] <source> <target>")]
    Link(LinkOptions),

    /// Manage project baselines.
    #[command(subcommand)]
    Baseline(BaselineCommand),

    /// Manage remotes.
    #[command(subcommand)]
    Remote(RemoteCommand),

    /// Pull then push repository.
    Sync(SyncOptions),

    /// Manage the access token used for remotes.
    #[command(subcommand)]
    Token(TokenCommand),
}

#[derive(Debug, Clone, Subcommand)]
enum ProjectCommand {
    /// Create new project.
    Create {
        name: String,

        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// List projects.
    List,

    /// Delete project along with its history.
    Delete {
        id: String,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Args, Clone, Debug)]
struct AddOptions {
    /// Artifact kind, e.g. `requirement` or `REQ`.
    pub kind: ArtifactKind,

    pub title: String,

    /// Main text of the artifact.
    #[arg(short, long, default_value = "")]
    pub body: String,

    /// Project to add artifact to.
    #[arg(short, long, value_name = "project_id")]
    pub project: Option<String>,
}

#[derive(Args, Clone, Debug)]
struct EditOptions {
    pub id: String,

    #[arg(short, long)]
    pub title: Option<String>,

    #[arg(short, long)]
    pub body: Option<String>,

    #[arg(short, long)]
    pub status: Option<String>,

    #[arg(short, long)]
    pub priority: Option<String>,
}

#[derive(Args, Clone, Debug)]
struct IdOptions {
    pub id: String,
}

#[derive(Args, Clone, Debug)]
struct ListOptions {
    pub kind: ArtifactKind,

    /// Only list members of project.
    #[arg(short, long, value_name = "project_id")]
    pub project: Option<String>,

    /// Include soft deleted artifacts.
    #[arg(short, long)]
    pub all: bool,

    /// Glob pattern ids or titles must match.
    #[arg(short, long, value_name = "pattern")]
    pub r#match: Option<String>,
}

#[derive(Args, Clone, Debug)]
struct DeleteOptions {
    pub id: String,

    /// Remove file, links, and memberships instead of marking deleted.
    #[arg(long)]
    pub permanent: bool,

    /// Skip confirmation prompt.
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Clone, Debug)]
struct HistoryOptions {
    pub id: String,

    #[arg(short, long)]
    pub depth: Option<usize>,
}

#[derive(Args, Clone, Debug)]
struct CommitOptions {
    #[arg(short, long)]
    pub message: String,
}

#[derive(Args, Clone, Debug)]
struct LinkOptions {
    pub source: String,
    pub target: String,

    #[arg(short = 't', long = "type", default_value_t = LinkType::default())]
    pub link_type: LinkType,

    /// Projects link is visible in, every project when omitted.
    #[arg(short, long, value_name = "project_id")]
    pub project: Vec<String>,
}

#[derive(Debug, Clone, Subcommand)]
enum BaselineCommand {
    /// Freeze current state of project.
    Create {
        project: String,
        name: String,

        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// List baselines of project.
    List { project: String },

    /// Compare baseline against the one before it.
    Diff {
        project: String,

        /// Baseline version, latest when omitted.
        version: Option<String>,
    },
}

#[derive(Debug, Clone, Subcommand)]
enum RemoteCommand {
    /// Add remote to repository.
    Add {
        remote: String,
        url: String,

        #[arg(short, long, value_name = "project_id")]
        project: Option<String>,
    },

    /// List remotes of repository.
    List {
        #[arg(short, long, value_name = "project_id")]
        project: Option<String>,
    },
}

#[derive(Args, Clone, Debug)]
struct SyncOptions {
    #[arg(default_value = "origin")]
    pub remote: String,

    #[arg(short, long, value_name = "project_id")]
    pub project: Option<String>,
}

#[derive(Debug, Clone, Subcommand)]
enum TokenCommand {
    /// Store access token in the system keyring.
    Set,

    /// Forget stored access token.
    Remove,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    let root = absolute(&settings.workspace.root)?;
    let bridge = spawn_host(Host::new(root.clone(), Arc::new(KeyringVault::default())));

    if let Command::Token(command) = &cli.command {
        return run_token(TokenClient::new(bridge), command).await;
    }

    match Environment::detect(settings.workspace.backend) {
        Environment::Desktop => {
            let fs = NativeFs::new(bridge.clone());
            let root = fs
                .select_directory()
                .await?
                .unwrap_or_else(|| root.display().to_string());
            let workspace = Workspace::new(fs, BridgedGit::new(bridge), root, settings.options());
            dispatch(cli.command, workspace).await
        }
        Environment::Browser => {
            warn!("memory backend keeps nothing once reqtrace exits");
            let fs = MemoryFs::new(MemoryStore::new());
            let workspace = Workspace::new(
                fs.clone(),
                EmbeddedGit::new(fs),
                root.display().to_string(),
                settings.options(),
            );
            workspace.init().await?;
            dispatch(cli.command, workspace).await
        }
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };

    let mut settings = match std::fs::read_to_string(&path) {
        Ok(data) => data.parse::<Settings>()?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound && cli.config.is_none() => {
            info!("no configuration at {}, using defaults", path.display());
            let mut settings = Settings::default();
            settings.workspace.root = default_workspace_dir()?;
            settings.workspace.backend = Backend::Native;
            settings
        }
        Err(err) => bail!("cannot read {}: {err}", path.display()),
    };

    if let Some(root) = &cli.root {
        settings.workspace.root = root.clone();
    }

    Ok(settings)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    match path.is_absolute() {
        true => Ok(path.to_path_buf()),
        false => Ok(std::env::current_dir()?.join(path)),
    }
}

fn confirm(question: &str, skip: bool) -> Result<bool> {
    if skip {
        return Ok(true);
    }

    Ok(Confirm::new(question).with_default(false).prompt()?)
}

fn spinner(message: String) -> Result<ProgressBar> {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{elapsed_precise:.green}  {spinner}  {msg}")?);
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    Ok(bar)
}

async fn run_token(client: TokenClient, command: &TokenCommand) -> Result<()> {
    match command {
        TokenCommand::Set => {
            let token = Password::new("access token")
                .without_confirmation()
                .prompt()?;
            client.set_token(GIT_TOKEN_KEY, &token).await?;
            info!("stored access token");
        }
        TokenCommand::Remove => {
            client.remove_token(GIT_TOKEN_KEY).await?;
            info!("removed access token");
        }
    }

    Ok(())
}

async fn dispatch<F, G>(command: Command, workspace: Workspace<F, G>) -> Result<()>
where
    F: FileSystem,
    G: GitBackend,
{
    match command {
        Command::Init => workspace.init().await?,
        Command::Project(command) => run_project(&workspace, command).await?,
        Command::Add(opts) => {
            let artifact = workspace
                .create_artifact(opts.kind, &opts.title, &opts.body, opts.project.as_deref())
                .await?;
            println!("{}", artifact.id());
        }
        Command::Edit(opts) => {
            let Some(mut artifact) = workspace.get_artifact(&opts.id).await? else {
                bail!("artifact {} does not exist", opts.id);
            };
            if let Some(body) = opts.body {
                artifact.set_body(body);
            }
            let header = artifact.header_mut();
            if let Some(title) = opts.title {
                header.title = title;
            }
            if let Some(status) = opts.status {
                header.status = status;
            }
            if let Some(priority) = opts.priority {
                header.priority = priority;
            }
            let artifact = workspace.update_artifact(artifact).await?;
            println!("{} rev {}", artifact.id(), artifact.header().revision);
        }
        Command::Show(opts) => match workspace.get_artifact(&opts.id).await? {
            Some(artifact) => print!("{}", artifact_to_markdown(&artifact.into())),
            None => bail!("artifact {} does not exist", opts.id),
        },
        Command::List(opts) => {
            let pattern = opts.r#match.as_deref().map(glob::Pattern::new).transpose()?;
            for artifact in workspace
                .list_artifacts(opts.kind, opts.project.as_deref(), opts.all)
                .await?
            {
                let header = artifact.header();
                if pattern
                    .as_ref()
                    .is_some_and(|pattern| !pattern.matches(&header.id) && !pattern.matches(&header.title))
                {
                    continue;
                }
                let deleted = if header.is_deleted { "  (deleted)" } else { "" };
                println!("{}  rev {}  {}  {}{deleted}", header.id, header.revision, header.status, header.title);
            }
        }
        Command::Delete(opts) => {
            if !opts.permanent {
                workspace.soft_delete(&opts.id).await?;
            } else if confirm(&format!("permanently delete {} and its links?", opts.id), opts.yes)? {
                workspace.delete_permanently(&opts.id).await?;
            }
        }
        Command::History(opts) => {
            for commit in workspace.history(&opts.id, opts.depth).await? {
                let when = chrono::DateTime::from_timestamp(commit.timestamp, 0)
                    .map(|when| when.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                let summary = commit.message.lines().next().unwrap_or_default();
                println!("{}  {when}  {}  {summary}", &commit.hash[..7.min(commit.hash.len())], commit.author);
            }
        }
        Command::Status => {
            for (scope, change) in workspace.pending_changes().await? {
                println!("{scope}  {:?}  {}", change.change, change.path);
            }
        }
        Command::Commit(opts) => {
            for (scope, oid) in workspace.commit_all(&opts.message).await? {
                println!("{scope}  {oid}");
            }
        }
        Command::Link(opts) => {
            let link = workspace
                .create_link(&opts.source, &opts.target, opts.link_type, &opts.project)
                .await?;
            println!("{}", link.id);
        }
        Command::Baseline(command) => run_baseline(&workspace, command).await?,
        Command::Remote(command) => match command {
            RemoteCommand::Add {
                remote,
                url,
                project,
            } => {
                let scope = Scope::from(project.as_deref());
                workspace.add_remote(&scope, &remote, &url).await?;
            }
            RemoteCommand::List { project } => {
                let scope = Scope::from(project.as_deref());
                for remote in workspace.list_remotes(&scope).await? {
                    println!("{}  {}", remote.remote, remote.url);
                }
            }
        },
        Command::Sync(opts) => {
            let scope = Scope::from(opts.project.as_deref());
            let bar = spinner(format!("syncing {scope} with {}", opts.remote))?;
            let outcome = workspace.sync(&scope, &opts.remote).await;
            bar.finish_and_clear();

            match outcome? {
                PullOutcome::Conflicts { paths } => {
                    warn!("resolve conflicts before syncing again:");
                    for path in paths {
                        warn!("  {path}");
                    }
                }
                outcome => info!("synced {scope}: {outcome:?}"),
            }
        }
        Command::Token(_) => {}
    }

    Ok(())
}

async fn run_project<F, G>(workspace: &Workspace<F, G>, command: ProjectCommand) -> Result<()>
where
    F: FileSystem,
    G: GitBackend,
{
    match command {
        ProjectCommand::Create { name, description } => {
            let project = workspace.create_project(&name, &description).await?;
            println!("{}", project.id);
        }
        ProjectCommand::List => {
            for project in workspace.list_projects().await? {
                println!("{}  {}  ({} artifacts)", project.id, project.name, project.all_members().len());
            }
        }
        ProjectCommand::Delete { id, yes } => {
            if confirm(&format!("delete project {id} and all of its history?"), yes)? {
                workspace.delete_project(&id).await?;
            }
        }
    }

    Ok(())
}

async fn run_baseline<F, G>(workspace: &Workspace<F, G>, command: BaselineCommand) -> Result<()>
where
    F: FileSystem,
    G: GitBackend,
{
    match command {
        BaselineCommand::Create {
            project,
            name,
            description,
        } => {
            let baseline = workspace.create_baseline(&project, &name, &description).await?;
            println!("{} v{}", baseline.id, baseline.version);
        }
        BaselineCommand::List { project } => {
            for baseline in workspace.list_baselines(&project).await? {
                println!(
                    "v{}  {}  {}  ({} artifacts)",
                    baseline.version,
                    baseline.id,
                    baseline.name,
                    baseline.artifact_commits.len()
                );
            }
        }
        BaselineCommand::Diff { project, version } => {
            let comparison = workspace.compare_baselines(&project, version.as_deref()).await?;
            match &comparison.diff {
                BaselineDiff::First { artifacts } => {
                    println!("v{} is the first baseline of {project}", comparison.current.version);
                    for id in artifacts {
                        println!("  {id}");
                    }
                }
                BaselineDiff::Compared {
                    added,
                    removed,
                    modified,
                } => {
                    for id in added {
                        println!("+ {id}");
                    }
                    for id in removed {
                        println!("- {id}");
                    }
                    for artifact in modified {
                        println!("~ {}", artifact.id);
                    }
                }
            }

            for revisions in &comparison.revisions {
                println!("{}:", revisions.id);
                for point in &revisions.points {
                    let revision = point.revision.as_deref().unwrap_or("??");
                    println!("  rev {revision}  {}", point.commit.message.trim());
                }
            }
        }
    }

    Ok(())
}
