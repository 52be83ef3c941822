#![forbid(unsafe_code)]

mod config;

use std::collections::BTreeSet;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use tessera_archive::{build_path_archive, Archive, ModuleId, PathArchiveOptions};
use tessera_compiler::{LineScriptCompiler, PluginTable, ResourceCompiler};
use tessera_loader::{Loader, LoaderConfig, UpdateReport};
use tessera_namespace::PackageFilter;
use tessera_poller::{Poller, PollConsumer, Registration};
use tessera_repo::{FilesystemRepository, JarFilesystemRepository, Repository};

use config::{ProjectConfig, RepositoryKind, RepositorySection};

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(name = "tessera", about = "A dynamic code-module runtime")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a new tessera project: a `tessera.toml` plus a starter repository
    Init {
        /// Project directory name (defaults to the current directory's name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Build archives from a directory (one subdirectory per archive) and load them once
    Load {
        /// Directory with one subdirectory per archive
        repo: PathBuf,
        /// Print every committed, skipped, and failed module id
        #[arg(long)]
        verbose: bool,
    },
    /// Register a configured repository with the poller and report its first delta
    Poll {
        /// Path to `tessera.toml`
        #[arg(long, default_value = "tessera.toml")]
        config: PathBuf,
        /// Which configured `[[repository]]` to poll (defaults to the first one)
        #[arg(long)]
        repository: Option<String>,
    },
    /// Print a repository's summary and archive list
    Inspect {
        /// Repository root directory
        repo: PathBuf,
        /// "filesystem" or "jar"
        #[arg(long, default_value = "filesystem")]
        kind: String,
        /// Where `getScriptArchives` would materialize archives (unused by inspect itself)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Init { name } => cmd_init(name),
        Command::Load { repo, verbose } => cmd_load(&repo, verbose),
        Command::Poll { config, repository } => cmd_poll(&config, repository.as_deref()),
        Command::Inspect {
            repo,
            kind,
            output_dir,
        } => cmd_inspect(&repo, &kind, output_dir),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

fn cmd_init(name: Option<String>) -> CliResult {
    let cwd = std::env::current_dir()?;
    let project_name = name.unwrap_or_else(|| {
        cwd.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("my-modules")
            .to_owned()
    });
    let project_dir = cwd.join(&project_name);

    let repo_dir = project_dir.join("repo");
    let hello_dir = repo_dir.join("hello.v1");
    tessera_util::fs::ensure_dir(&hello_dir)?;
    std::fs::write(
        hello_dir.join("moduleSpec.json"),
        b"{\n  \"moduleId\": \"hello.v1\",\n  \"compilerPluginIds\": [\"resource\"]\n}\n",
    )?;
    std::fs::write(hello_dir.join("Hello.txt"), b"hello, tessera")?;

    let manifest = format!(
        "[loader]\napp_package_filter = [\"*\"]\n\n[[loader.plugin]]\nplugin_id = \"resource\"\n\n\
         [[loader.plugin]]\nplugin_id = \"line-script\"\n\n[[repository]]\nid = \"main\"\n\
         kind = \"filesystem\"\nroot = \"repo\"\noutput_dir = \"out\"\npoll_interval_secs = 10\n\
         wait_for_initial_poll = true\n"
    );
    std::fs::write(project_dir.join("tessera.toml"), manifest)?;

    eprintln!("    Created project `{project_name}` at {}", project_dir.display());
    eprintln!();
    eprintln!("  To get started:");
    eprintln!("    cd {project_name}");
    eprintln!("    tessera load repo");
    Ok(())
}

/// Build one archive per immediate subdirectory of `repo_dir`.
fn build_archives_from_dir(repo_dir: &Path) -> Result<Vec<Archive>, Box<dyn Error>> {
    let mut archives = Vec::new();
    let entries = std::fs::read_dir(repo_dir)?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let archive = build_path_archive(&path, &PathArchiveOptions::default())?;
        archives.push(archive);
    }
    archives.sort_by(|a, b| a.module_id().cmp(b.module_id()));
    Ok(archives)
}

fn default_plugin_table() -> PluginTable {
    let mut table = PluginTable::new();
    table.register(Arc::new(ResourceCompiler));
    table.register(Arc::new(LineScriptCompiler));
    table
}

fn plugin_table_from_section(section: &config::LoaderSection) -> PluginTable {
    if section.plugins.is_empty() {
        return default_plugin_table();
    }
    let mut table = PluginTable::new();
    for plugin in &section.plugins {
        match plugin.plugin_id.as_str() {
            tessera_compiler::resource::PLUGIN_ID => table.register(Arc::new(ResourceCompiler)),
            tessera_compiler::line_script::PLUGIN_ID => table.register(Arc::new(LineScriptCompiler)),
            _ => {} // validated at config-parse time; unreachable here
        }
    }
    table
}

fn build_loader(app_package_filter: &[String], plugins: PluginTable) -> Loader {
    Loader::new(LoaderConfig {
        platform_symbols: std::collections::BTreeMap::new(),
        app_package_filter: PackageFilter::new(app_package_filter.to_vec()),
        plugins,
    })
}

fn print_update_report(report: &UpdateReport, verbose: bool) {
    eprintln!(
        "    committed {} skipped (stale) {} skipped (no compiler) {} failures {} relink failures {}",
        report.committed.len(),
        report.skipped_stale.len(),
        report.skipped_no_compiler.len(),
        report.failures.len(),
        report.relink_failures.len()
    );
    if !verbose {
        return;
    }
    for id in &report.committed {
        eprintln!("      + {id}");
    }
    for failure in &report.failures {
        eprintln!("      ! {} — {}", failure.module_id, failure.error);
    }
    for failure in &report.relink_failures {
        eprintln!("      ~ {} failed to relink — {}", failure.module_id, failure.error);
    }
}

fn cmd_load(repo: &Path, verbose: bool) -> CliResult {
    let archives = build_archives_from_dir(repo)?;
    if archives.is_empty() {
        eprintln!("no archives found under {}", repo.display());
        return Ok(());
    }

    let loader = build_loader(&["*".to_owned()], default_plugin_table());
    let report = loader.update_archives(archives)?;
    print_update_report(&report, verbose);

    if !report.is_fully_successful() {
        return Err(format!(
            "{} archive(s) failed to load cleanly",
            report.failures.len() + report.relink_failures.len()
        )
        .into());
    }
    Ok(())
}

/// Bridges poller ticks into loader updates/removals, printing a one-line
/// summary of each tick's effect on the loader's revision table.
struct LoaderConsumer {
    loader: Arc<Loader>,
    verbose: bool,
}

impl PollConsumer for LoaderConsumer {
    fn on_poll(&self, repository_id: &str, archives: Vec<Archive>, removed: BTreeSet<ModuleId>) {
        if !archives.is_empty() {
            match self.loader.update_archives(archives) {
                Ok(report) => {
                    eprintln!("[{repository_id}] poll tick:");
                    print_update_report(&report, self.verbose);
                }
                Err(err) => eprintln!("[{repository_id}] update rejected: {err}"),
            }
        }
        for module_id in &removed {
            let report = self.loader.remove_module(module_id);
            eprintln!(
                "[{repository_id}] removed {module_id}, cascaded to {} dependent(s)",
                report.removed.len().saturating_sub(1)
            );
        }
    }
}

fn open_repository(section: &RepositorySection) -> Result<Arc<dyn Repository>, Box<dyn Error>> {
    let repository: Arc<dyn Repository> = match section.kind {
        RepositoryKind::Filesystem => {
            Arc::new(FilesystemRepository::open(section.root.clone(), section.output_dir.clone())?)
        }
        RepositoryKind::Jar => {
            Arc::new(JarFilesystemRepository::open(section.root.clone(), section.output_dir.clone())?)
        }
    };
    Ok(repository)
}

fn cmd_poll(config_path: &Path, repository_id: Option<&str>) -> CliResult {
    let config = ProjectConfig::from_path(config_path)?;
    let section = match repository_id {
        Some(id) => config
            .repositories
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| format!("no repository `{id}` in {}", config_path.display()))?,
        None => config
            .repositories
            .first()
            .ok_or_else(|| format!("no [[repository]] configured in {}", config_path.display()))?,
    };

    let loader = Arc::new(build_loader(
        &config.loader.app_package_filter,
        plugin_table_from_section(&config.loader),
    ));
    let repository = open_repository(section)?;
    let consumer = Arc::new(LoaderConsumer {
        loader: loader.clone(),
        verbose: true,
    });

    let poller = Poller::new(consumer);
    poller.register(Registration {
        repository_id: section.id.clone(),
        repository,
        interval: Duration::from_secs(section.poll_interval_secs),
        wait_for_initial_poll: true,
    });

    eprintln!("loaded modules after first poll:");
    for (module_id, module) in loader.modules() {
        eprintln!("  {module_id} (revision {})", module.revision());
    }

    poller.shutdown();
    Ok(())
}

fn cmd_inspect(repo: &Path, kind: &str, output_dir: Option<PathBuf>) -> CliResult {
    let output_dir = output_dir.unwrap_or_else(|| std::env::temp_dir().join("tessera-inspect"));
    let repository: Box<dyn Repository> = match kind {
        "filesystem" => Box::new(FilesystemRepository::open(repo.to_path_buf(), output_dir)?),
        "jar" => Box::new(JarFilesystemRepository::open(repo.to_path_buf(), output_dir)?),
        other => return Err(format!("unknown repository kind `{other}` (expected \"filesystem\" or \"jar\")").into()),
    };

    let view = repository.get_default_view()?;
    let summary = view.repository_summary();
    eprintln!(
        "{} module(s), latest update {}",
        summary.module_count, summary.latest_update_time
    );
    for archive in view.archive_summaries() {
        eprintln!(
            "  {} — create_time {} content_hash {}",
            archive.module_id, archive.create_time, archive.content_hash
        );
    }
    Ok(())
}
