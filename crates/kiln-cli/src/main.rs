use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use kiln_build::{
    ArtifactResolutionFailure, ArtifactState, BepBuildResultHelper, BuildInvoker, BuildOptions,
    BuildOutcome, BuildRequest, BuildResultHelper, DefaultCommandRunner, HandlerRegistry,
    HelperOptions, Label, OutputArtifact, OutputGroupArtifacts, ParseOptions, TargetKind,
};
use kiln_config::KilnConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "kiln", version, about = "Kiln CLI (Bazel builds and build artifacts)")]
struct Cli {
    /// Workspace root (defaults to the Bazel workspace containing the current directory)
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Log level or `EnvFilter` directives; overrides `logging.level`
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the flags a build must carry for artifact resolution
    Flags(FlagsArgs),
    /// Resolve artifacts from an existing build event file
    Artifacts(ArtifactsArgs),
    /// Build targets and print the artifacts they produced
    Build(BuildArgs),
}

#[derive(Args)]
struct FlagsArgs {
    /// Use this event file instead of a fresh temporary one
    #[arg(long)]
    bep_file: Option<PathBuf>,
}

#[derive(Args)]
struct ArtifactsArgs {
    /// File written by `--build_event_json_file`
    #[arg(long)]
    bep_file: PathBuf,
    /// Only artifacts produced by this target
    #[arg(long, conflicts_with_all = ["output_group", "by_group"])]
    target: Option<String>,
    /// Only artifacts of this output group
    #[arg(long, conflicts_with = "by_group")]
    output_group: Option<String>,
    /// Group artifacts by output group
    #[arg(long)]
    by_group: bool,
    /// Print a content digest per artifact, hashing local files Bazel reported none for
    #[arg(long, conflicts_with = "by_group")]
    state: bool,
    /// Accept streams that end without Bazel's final event
    #[arg(long)]
    allow_truncated: bool,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct BuildArgs {
    /// Targets or target patterns to build (`//pkg:t`, `//pkg/...`, `//pkg:all`)
    #[arg(required = true)]
    targets: Vec<String>,
    /// Rule class of the targets (e.g. `java_binary`), used to pick output groups
    #[arg(long)]
    kind: Option<String>,
    /// Extra build flag; repeatable
    #[arg(long = "flag", allow_hyphen_values = true)]
    flags: Vec<String>,
    /// Output group to request; repeatable
    #[arg(long = "output-group")]
    output_groups: Vec<String>,
    /// Overrides `build.timeout_secs`
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct BuildReport {
    status: kiln_build::BuildStatus,
    exit_code: Option<i32>,
    timed_out: bool,
    cancelled: bool,
    failed_targets: Vec<String>,
    artifacts: Vec<OutputArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    let workspace_root = workspace_root(cli.workspace)?;
    let (mut config, config_path) = kiln_config::load_for_workspace(&workspace_root)
        .with_context(|| format!("failed to load config for {}", workspace_root.display()))?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    kiln_config::init_tracing(&config.logging);
    tracing::debug!(
        target = "kiln.cli",
        workspace = %workspace_root.display(),
        config = ?config_path,
        "starting"
    );

    match cli.command {
        Command::Flags(args) => {
            let options = helper_options(&config);
            let flags = match args.bep_file {
                Some(path) => BepBuildResultHelper::for_event_file(path, &options).build_flags(),
                None => {
                    let helper = BepBuildResultHelper::new(&options)
                        .context("failed to create build event file")?;
                    let flags = helper.build_flags();
                    // The printed path is used by a build this process does not run.
                    helper
                        .persist()
                        .context("failed to keep build event file")?;
                    flags
                }
            };
            for flag in flags {
                println!("{flag}");
            }
            Ok(0)
        }
        Command::Artifacts(args) => artifacts(&workspace_root, &config, args),
        Command::Build(args) => build(&workspace_root, &config, args),
    }
}

fn workspace_root(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(root) = explicit {
        return Ok(root);
    }
    let cwd = std::env::current_dir().context("failed to determine current directory")?;
    Ok(kiln_core::bazel_workspace_root(&cwd).unwrap_or(cwd))
}

fn helper_options(config: &KilnConfig) -> HelperOptions {
    HelperOptions {
        bep_dir: config.build.bep_dir.clone(),
        extra_flags: config.build.extra_flags.clone(),
        parse: ParseOptions {
            require_last_message: config.build.require_last_message,
        },
    }
}

fn parse_label(raw: &str) -> Result<Label> {
    Label::parse(raw).with_context(|| format!("invalid target `{raw}`"))
}

fn artifacts(workspace_root: &Path, config: &KilnConfig, args: ArtifactsArgs) -> Result<i32> {
    let mut options = helper_options(config);
    if args.allow_truncated {
        options.parse.require_last_message = false;
    }
    let target = args.target.as_deref().map(parse_label).transpose()?;

    let mut helper = BepBuildResultHelper::for_event_file(&args.bep_file, &options);
    helper.build_finished();

    let code = if args.by_group {
        report(helper.per_output_group_artifacts(), args.json, print_groups)?
    } else {
        let resolved = match (&target, &args.output_group) {
            (Some(target), _) => helper.build_artifacts_for_target(target),
            (None, Some(group)) => helper.artifacts_for_output_group(group),
            (None, None) => helper.build_artifacts(),
        };
        if args.state {
            let states = match resolved {
                Ok(artifacts) => Ok(artifact_states(workspace_root, &artifacts)?),
                Err(failure) => Err(failure),
            };
            report(states, args.json, |states: &Vec<ArtifactState>| {
                for state in states {
                    println!("{}  {}", state.digest, state.relative_path);
                }
            })?
        } else {
            report(resolved, args.json, |artifacts: &Vec<OutputArtifact>| {
                print_artifacts(artifacts)
            })?
        }
    };
    helper.close();
    Ok(code)
}

fn artifact_states(
    workspace_root: &Path,
    artifacts: &[OutputArtifact],
) -> Result<Vec<ArtifactState>> {
    artifacts
        .iter()
        .map(|artifact| {
            artifact.to_artifact_state(workspace_root).with_context(|| {
                format!("failed to read artifact `{}`", artifact.relative_path())
            })
        })
        .collect()
}

/// Prints a resolved view; a resolution failure goes to stderr with exit code 1.
fn report<T: Serialize>(
    resolved: Result<T, ArtifactResolutionFailure>,
    json: bool,
    print_human: impl Fn(&T),
) -> Result<i32> {
    match resolved {
        Ok(value) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print_human(&value);
            }
            Ok(0)
        }
        Err(failure) => {
            eprintln!("error: {failure}");
            Ok(1)
        }
    }
}

fn print_artifacts(artifacts: &[OutputArtifact]) {
    for artifact in artifacts {
        println!("{}", artifact.relative_path());
    }
}

fn print_groups(groups: &OutputGroupArtifacts) {
    for (name, artifacts) in groups.iter() {
        println!("{name}:");
        for artifact in artifacts {
            println!("  {}", artifact.relative_path());
        }
    }
}

fn build(workspace_root: &Path, config: &KilnConfig, args: BuildArgs) -> Result<i32> {
    // Patterns go to Bazel as typed; anything else must be a valid label.
    let mut labels = Vec::new();
    for target in &args.targets {
        if !kiln_core::is_wildcard_pattern(target) {
            labels.push(parse_label(target)?);
        }
    }

    let mut flags = args.flags;
    let mut output_groups = args.output_groups;
    if let Some(kind) = &args.kind {
        let handler =
            HandlerRegistry::with_builtin_handlers().find(&TargetKind::new(kind.as_str()));
        flags.extend(handler.build_flags());
        if output_groups.is_empty() {
            output_groups = handler.output_groups();
        }
    }
    if output_groups.is_empty() {
        output_groups = config.build.output_groups.clone();
    }

    let request = BuildRequest {
        targets: args.targets,
        flags,
        output_groups,
    };
    let options = BuildOptions {
        timeout: args
            .timeout_secs
            .map(std::time::Duration::from_secs)
            .or(config.build.timeout()),
        max_bytes: config.build.max_output_bytes,
        cancellation: None,
    };

    let mut helper = BepBuildResultHelper::new(&helper_options(config))
        .context("failed to create build event file")?;
    let invoker = BuildInvoker::new(workspace_root, DefaultCommandRunner)
        .with_program(config.build.program.clone());
    let outcome = invoker.build(&request, &mut helper, options)?;

    let resolved = match (labels.as_slice(), request.targets.len()) {
        ([single], 1) => helper.build_artifacts_for_target(single),
        _ => helper.build_artifacts(),
    };
    let failed_targets = helper
        .failed_targets()
        .iter()
        .map(ToString::to_string)
        .collect();
    helper.close();

    print_build_report(&outcome, failed_targets, resolved, args.json)
}

fn print_build_report(
    outcome: &BuildOutcome,
    failed_targets: Vec<String>,
    resolved: Result<Vec<OutputArtifact>, ArtifactResolutionFailure>,
    json: bool,
) -> Result<i32> {
    let exit = if outcome.success() && resolved.is_ok() { 0 } else { 1 };
    let (artifacts, error) = match resolved {
        Ok(artifacts) => (artifacts, None),
        Err(failure) => (Vec::new(), Some(failure.to_string())),
    };

    if json {
        let report = BuildReport {
            status: outcome.status,
            exit_code: outcome.exit_code,
            timed_out: outcome.timed_out,
            cancelled: outcome.cancelled,
            failed_targets,
            artifacts,
            error,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(exit);
    }

    if !outcome.success() {
        eprint!("{}", outcome.stderr);
        eprintln!("build finished with status {:?}", outcome.status);
        for target in &failed_targets {
            eprintln!("  failed: {target}");
        }
    }
    if let Some(error) = error {
        eprintln!("error: {error}");
    }
    print_artifacts(&artifacts);
    Ok(exit)
}
