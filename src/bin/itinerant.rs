// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use itinerant::{
    archive::Archiver,
    config::Settings,
    manifest::MatchRule,
    path::{default_settings_path, default_store_path},
    run::{self, Mode, RunConfig},
    scan::ScanOptions,
    store::ItineraryStore,
    sync::{report::FileOpResult, SyncOptions, Synchronizer},
};

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;
use std::{path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "itinerant [options] <command> <target> [--source <path>]",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let context = Context::resolve(&self.global)?;
        match self.command {
            Command::Copy(opts) => run_mode(&context, Mode::Copy, opts),
            Command::Delete(opts) => run_mode(&context, Mode::Delete, opts.into()),
            Command::Dry(opts) => run_mode(&context, Mode::Dry, opts),
            Command::Add(opts) => run_mode(&context, Mode::AddManifest, opts.into()),
            Command::RemoveSource(opts) => run_mode(&context, Mode::RemoveManifest, opts.into()),
            Command::Forget(opts) => run_mode(&context, Mode::RemoveItinerary, opts.into()),
            Command::Prune(opts) => run_mode(&context, Mode::Prune, opts.into()),
            Command::Redeploy(opts) => run_redeploy(&context, opts),
            Command::Clean(opts) => run_clean(&context, opts),
            Command::Strip(opts) => run_strip(&context, opts),
            Command::Status => run_status(&context),
        }
    }
}

#[derive(Debug, Clone, Args)]
struct GlobalOptions {
    /// Path to settings file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Path to itinerary store file.
    #[arg(long, global = true, value_name = "path")]
    pub store: Option<PathBuf>,

    /// Keep going after a path fails to synchronize.
    #[arg(short, long, global = true)]
    pub ignore_errors: bool,

    /// Follow symbolic links while scanning sources.
    #[arg(short = 'L', long, global = true)]
    pub follow_links: bool,

    /// Rule deciding when two manifests count as the same source.
    #[arg(long, global = true, value_name = "rule")]
    pub match_rule: Option<MatchRuleArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MatchRuleArg {
    /// Same relative paths, regardless of source directory.
    Content,

    /// Same source directory, regardless of relative paths.
    Root,
}

impl From<MatchRuleArg> for MatchRule {
    fn from(arg: MatchRuleArg) -> Self {
        match arg {
            MatchRuleArg::Content => MatchRule::Content,
            MatchRuleArg::Root => MatchRule::Root,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Track source, then copy everything tracked into target.
    #[command(override_usage = "itinerant copy [options] <target> [--source <path>]")]
    Copy(SourceOptions),

    /// Delete everything tracked from target, then forget target.
    #[command(override_usage = "itinerant delete [options] <target>")]
    Delete(TargetOptions),

    /// Show what would be tracked for target without touching anything.
    #[command(override_usage = "itinerant dry [options] <target> [--source <path>]")]
    Dry(SourceOptions),

    /// Track source for target without copying anything.
    #[command(override_usage = "itinerant add [options] <target> --source <path>")]
    Add(RequiredSourceOptions),

    /// Stop tracking source for target.
    #[command(override_usage = "itinerant remove-source [options] <target> --source <path>")]
    RemoveSource(RequiredSourceOptions),

    /// Forget target without touching it.
    #[command(override_usage = "itinerant forget [options] <target>")]
    Forget(TargetOptions),

    /// Remove empty directories from target.
    #[command(override_usage = "itinerant prune [options] <target>")]
    Prune(TargetOptions),

    /// Delete, prune, then copy everything tracked into target again.
    #[command(override_usage = concat!(
        "itinerant redeploy [options] <target> ",
        "[--source <path> | --archives <path>]",
    ))]
    Redeploy(RedeployOptions),

    /// Remove everything from target that source does not have.
    #[command(override_usage = "itinerant clean [options] <target> --source <path>")]
    Clean(CleanOptions),

    /// Remove everything sources have from target, tracked or not.
    #[command(override_usage = "itinerant strip [options] <target> --source <path>...")]
    Strip(StripOptions),

    /// Show status information about itinerary store.
    #[command(override_usage = "itinerant status [options]")]
    Status,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct TargetOptions {
    /// Directory to synchronize into.
    #[arg(required = true, value_name = "target")]
    pub target: PathBuf,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SourceOptions {
    /// Directory to synchronize into.
    #[arg(required = true, value_name = "target")]
    pub target: PathBuf,

    /// Directory to synchronize from.
    #[arg(short, long, value_name = "path")]
    pub source: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RequiredSourceOptions {
    /// Directory to synchronize into.
    #[arg(required = true, value_name = "target")]
    pub target: PathBuf,

    /// Directory to synchronize from.
    #[arg(short, long, required = true, value_name = "path")]
    pub source: PathBuf,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RedeployOptions {
    /// Directory to synchronize into.
    #[arg(required = true, value_name = "target")]
    pub target: PathBuf,

    /// Directory to synchronize from.
    #[arg(short, long, group = "from", value_name = "path")]
    pub source: Option<PathBuf>,

    /// Directory of archives to unpack and synchronize from.
    #[arg(short, long, group = "from", value_name = "path")]
    pub archives: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CleanOptions {
    /// Directory to clean up.
    #[arg(required = true, value_name = "target")]
    pub target: PathBuf,

    /// Directory holding everything target should keep.
    #[arg(short, long, required = true, value_name = "path")]
    pub source: PathBuf,

    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct StripOptions {
    /// Directory to strip.
    #[arg(required = true, value_name = "target")]
    pub target: PathBuf,

    /// Directories whose contents should leave target.
    #[arg(short, long, required = true, value_name = "path")]
    pub source: Vec<PathBuf>,

    /// Name of the removal plan.
    #[arg(short, long, value_name = "name")]
    pub name: Option<String>,

    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub yes: bool,
}

impl From<TargetOptions> for SourceOptions {
    fn from(opts: TargetOptions) -> Self {
        Self {
            target: opts.target,
            source: None,
        }
    }
}

impl From<RequiredSourceOptions> for SourceOptions {
    fn from(opts: RequiredSourceOptions) -> Self {
        Self {
            target: opts.target,
            source: Some(opts.source),
        }
    }
}

/// Settings file merged with command line flags.
struct Context {
    settings: Settings,
    store_path: PathBuf,
    sync: SyncOptions,
    scan: ScanOptions,
    match_rule: MatchRule,
}

impl Context {
    fn resolve(global: &GlobalOptions) -> Result<Self> {
        let settings_path = match &global.config {
            Some(path) => path.clone(),
            None => default_settings_path()?,
        };
        let settings = Settings::load(settings_path)?;

        let store_path = match (&global.store, &settings.store_path) {
            (Some(path), _) | (None, Some(path)) => path.clone(),
            (None, None) => default_store_path()?,
        };

        Ok(Self {
            store_path,
            sync: SyncOptions {
                ignore_errors: global.ignore_errors || settings.ignore_errors,
            },
            scan: ScanOptions {
                follow_links: global.follow_links || settings.follow_links,
            },
            match_rule: global
                .match_rule
                .map(MatchRule::from)
                .unwrap_or(settings.match_rule),
            settings,
        })
    }

    fn run_config(&self, mode: Mode, opts: SourceOptions) -> RunConfig {
        let mut config = RunConfig::new(mode, opts.target, &self.store_path);
        config.source = opts.source;
        config.sync = self.sync;
        config.scan = self.scan;
        config.match_rule = self.match_rule;
        config
    }

    fn synchronizer(&self) -> Result<Synchronizer> {
        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<20}  [{wide_bar:.yellow/blue}] {pos}/{len}",
        )?
        .progress_chars("-Cco.");
        let bar = ProgressBar::new(0).with_style(style);

        Ok(Synchronizer::new(self.sync).with_progress(bar))
    }
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_mode(context: &Context, mode: Mode, opts: SourceOptions) -> Result<()> {
    let config = context.run_config(mode, opts);
    let sync = context.synchronizer()?;
    let outcome = run::execute_with(&config, &sync);
    sync_finished(&sync);

    let outcome = outcome?;
    report(&outcome.results);
    if let Some(itinerary) = &outcome.itinerary {
        info!("{itinerary}");
    }
    if outcome.changed {
        info!("updated store {:?}", config.store_path.display());
    }

    Ok(())
}

fn run_redeploy(context: &Context, opts: RedeployOptions) -> Result<()> {
    let Some(archives) = opts.archives else {
        let opts = SourceOptions {
            target: opts.target,
            source: opts.source,
        };
        return run_mode(context, Mode::Redeploy, opts);
    };

    let archiver = Archiver::from_settings(&context.settings.archiver)?;
    let sync = context.synchronizer()?;
    let result = run::redeploy_archives(&archiver, &archives, &opts.target, context.scan, &sync);
    sync_finished(&sync);

    let (itinerary, results) = result?;
    report(&results);
    info!("{itinerary}");

    Ok(())
}

fn run_clean(context: &Context, opts: CleanOptions) -> Result<()> {
    let mut plan = run::plan_clean(&opts.source, &opts.target, context.scan)?;
    let count = plan.num_paths();
    if count == 0 {
        info!("nothing in {:?} to clean up", opts.target.display());
        return Ok(());
    }

    if !opts.yes {
        let confirmed = Confirm::new(&format!(
            "really remove {count} paths from {:?} not found in {:?}?",
            opts.target.display(),
            opts.source.display()
        ))
        .with_default(false)
        .prompt()?;
        if !confirmed {
            info!("leave {:?} alone", opts.target.display());
            return Ok(());
        }
    }

    let sync = context.synchronizer()?;
    let results = run::clean(&mut plan, &sync);
    sync_finished(&sync);
    report(&results?);

    Ok(())
}

fn run_strip(context: &Context, opts: StripOptions) -> Result<()> {
    let mut plan = run::plan_remove_sources(
        &opts.source,
        &opts.target,
        opts.name.as_deref(),
        context.scan,
    )?;
    let count = plan.num_paths();
    if count == 0 {
        info!("sources hold nothing to remove from {:?}", opts.target.display());
        return Ok(());
    }

    if !opts.yes {
        let confirmed = Confirm::new(&format!(
            "really remove {count} paths of {} from {:?}?",
            plan.key(),
            opts.target.display()
        ))
        .with_default(false)
        .prompt()?;
        if !confirmed {
            info!("leave {:?} alone", opts.target.display());
            return Ok(());
        }
    }

    let sync = context.synchronizer()?;
    let results = run::clean(&mut plan, &sync);
    sync_finished(&sync);
    report(&results?);

    Ok(())
}

fn run_status(context: &Context) -> Result<()> {
    let store = ItineraryStore::try_load(&context.store_path)?;
    info!("{store}");
    for itinerary in store.iter() {
        info!("{itinerary}");
        if let Some(last) = itinerary.results().last() {
            info!("  last run {}: {last}", last.completed_at());
        }
    }

    Ok(())
}

fn report(results: &[FileOpResult]) {
    for result in results.iter().filter(|result| !result.is_success()) {
        for (path, reason) in result.failed() {
            error!("{} failed on {path:?}: {reason}", result.kind());
        }
    }
}

fn sync_finished(sync: &Synchronizer) {
    sync.progress().finish_and_clear();
}
