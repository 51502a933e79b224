//! Thin CLI layer: parse args, styled output, and call into compo-core.
//! Crash-proof: panic caught and reported; all errors return Result.

use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use compo_core::{
    logging, resolve_versions, Config, DirectoryRegistry, Manifest, SolveResult, SourceRegistry, SystemCache,
    Version, VersionConstraint,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::env;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

const DEFAULT_MANIFEST: &str = "package.json";

// ---- UI helpers (no-op when stdout isn't a TTY) ----

fn use_color() -> bool {
    std::io::stdout().is_terminal() && env::var("NO_COLOR").unwrap_or_default().is_empty()
}

fn success(msg: &str) {
    if use_color() {
        println!("{}", msg.green());
    } else {
        println!("{}", msg);
    }
}

fn error(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.red());
    } else {
        eprintln!("{}", msg);
    }
}

fn warning(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.yellow());
    } else {
        eprintln!("{}", msg);
    }
}

fn dim(msg: &str) {
    if use_color() {
        println!("{}", msg.dimmed());
    } else {
        println!("{}", msg);
    }
}

/// Run `f` on a worker thread, ticking a spinner on stderr until it is done.
fn run_with_spinner<T, F>(message: &str, show: bool, f: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, String> + Send + 'static,
{
    if !show {
        return f();
    }
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = f();
        let _ = tx.send(result);
    });
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⠈⠐⠠⠰⠸⠹")
        .template("{spinner:.dim} {msg}")
    {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    let tick = Duration::from_millis(80);
    loop {
        match rx.try_recv() {
            Ok(res) => {
                spinner.finish_and_clear();
                return res;
            }
            Err(mpsc::TryRecvError::Disconnected) => {
                spinner.finish_and_clear();
                return Err("Version solving stopped unexpectedly.".to_string());
            }
            Err(mpsc::TryRecvError::Empty) => {}
        }
        spinner.tick();
        thread::sleep(tick);
    }
}

/// Split `name@version`; the leading `@` of a scoped name is not a separator.
fn parse_pin(spec: &str) -> Result<(String, String), String> {
    match spec.rfind('@') {
        Some(at) if at > 0 && at + 1 < spec.len() => Ok((spec[..at].to_string(), spec[at + 1..].to_string())),
        _ => Err(format!("Invalid --lock \"{}\": expected NAME@VERSION", spec)),
    }
}

fn print_result(result: &SolveResult, json_out: bool) {
    if json_out {
        let packages: Vec<_> = result
            .packages
            .iter()
            .filter(|id| !id.is_root())
            .map(|id| {
                json!({
                    "name": id.name(),
                    "version": id.version.to_string(),
                    "newest": result.newest_available(id.name()).map(|v| v.to_string()),
                })
            })
            .collect();
        let out = json!({
            "root": result.packages.first().map(|id| id.name()),
            "packages": packages,
            "attemptedSolutions": result.attempted_solutions,
        });
        println!("{}", out);
        return;
    }

    for id in result.packages.iter().filter(|id| !id.is_root()) {
        match result.newest_available(id.name()) {
            Some(newest) if *newest != id.version && Version::prioritize(newest, &id.version).is_gt() => {
                println!("{} {} {}", id.name(), id.version, format!("({} available)", newest).dimmed());
            }
            _ => println!("{} {}", id.name(), id.version),
        }
    }
    let count = result.packages.iter().filter(|id| !id.is_root()).count();
    success(&format!(
        "Resolved {} package{} (tried {} solution{}).",
        count,
        if count == 1 { "" } else { "s" },
        result.attempted_solutions,
        if result.attempted_solutions == 1 { "" } else { "s" },
    ));
}

fn resolve(sub_m: &ArgMatches, cwd: &Path) -> Result<(), String> {
    let quiet = sub_m.get_flag("quiet");
    let json_out = sub_m.get_flag("json");

    let mut config = Config::load(cwd).map_err(|e| e.to_string())?.with_env();
    logging::init(if quiet { Some("quiet") } else { config.log.as_deref() });

    if let Some(dir) = sub_m.get_one::<String>("registry") {
        config.registry = Some(PathBuf::from(dir));
    }
    if sub_m.get_flag("downgrade") {
        config.downgrade = Some(true);
    }
    if let Some(pins) = sub_m.get_many::<String>("lock") {
        for pin in pins {
            let (name, version) = parse_pin(pin)?;
            config.locked.insert(name, version);
        }
    }

    let registry_dir = config
        .registry
        .clone()
        .ok_or("No registry configured: pass --registry DIR or set COMPO_REGISTRY.")?;
    if !registry_dir.is_dir() {
        return Err(format!("Registry directory {} does not exist.", registry_dir.display()));
    }
    let client = DirectoryRegistry::new(cwd.join(registry_dir));
    let sources = SourceRegistry::hosted(&config.registry_url(), Arc::new(client));

    let manifest_path = cwd.join(
        sub_m
            .get_one::<String>("manifest")
            .map(String::as_str)
            .unwrap_or(DEFAULT_MANIFEST),
    );
    let body = fs::read_to_string(&manifest_path)
        .map_err(|e| format!("Failed to read {}: {}", manifest_path.display(), e))?;
    let manifest = Manifest::parse_root(&body, &sources).map_err(|e| e.to_string())?;
    let options = config.solve_options(&sources).map_err(|e| e.to_string())?;
    let prefetch_depth = config.prefetch_depth.unwrap_or(0);

    let show_spinner = !quiet && !json_out && std::io::stderr().is_terminal();
    let result = run_with_spinner(&format!("Resolving {}…", manifest.name), show_spinner, move || {
        let cache = SystemCache::new(sources);
        if prefetch_depth > 0 {
            log::info!("prefetched {} manifests", cache.prefetch(&manifest, prefetch_depth));
        }
        resolve_versions(&cache, &manifest, &options).map_err(|e| e.to_string())
    })?;

    if !quiet || json_out {
        print_result(&result, json_out);
    }
    Ok(())
}

fn constraint(sub_m: &ArgMatches) -> Result<(), String> {
    let expr = sub_m
        .get_one::<String>("expr")
        .ok_or("Missing constraint expression.")?;
    let parsed = VersionConstraint::parse(expr).map_err(|e| e.to_string())?;
    println!("{}", parsed);

    let versions = sub_m.get_many::<String>("version").into_iter().flatten();
    for text in versions {
        match Version::parse(text) {
            Ok(version) if parsed.allows(&version) => success(&format!("{} allowed", version)),
            Ok(version) => dim(&format!("{} not allowed", version)),
            Err(e) => warning(&e.to_string()),
        }
    }
    Ok(())
}

fn run() -> Result<(), String> {
    let matches = Command::new("compo")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Dependency version resolver for on-demand front-end component bundles")
        .after_help(
            "Examples:\n  compo resolve --registry ./packuments\n  compo resolve --lock o-grid@5.0.0 --json\n  compo constraint '^1.2.0' 1.2.3 2.0.0",
        )
        .subcommand(
            Command::new("resolve")
                .about("Pick one version of every component the manifest needs")
                .arg(
                    Arg::new("manifest")
                        .long("manifest")
                        .short('m')
                        .value_name("PATH")
                        .help("Root manifest (default: package.json)"),
                )
                .arg(
                    Arg::new("registry")
                        .long("registry")
                        .value_name("DIR")
                        .help("Directory of packuments to resolve against (or set COMPO_REGISTRY)"),
                )
                .arg(
                    Arg::new("downgrade")
                        .long("downgrade")
                        .action(ArgAction::SetTrue)
                        .help("Prefer the oldest allowed versions"),
                )
                .arg(
                    Arg::new("lock")
                        .long("lock")
                        .value_name("NAME@VERSION")
                        .action(ArgAction::Append)
                        .help("Keep NAME at VERSION whenever the constraints allow it"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Machine-readable output"),
                )
                .arg(
                    Arg::new("quiet")
                        .short('q')
                        .long("quiet")
                        .action(ArgAction::SetTrue)
                        .help("Only report errors"),
                ),
        )
        .subcommand(
            Command::new("constraint")
                .about("Normalise a version constraint and test versions against it")
                .arg(Arg::new("expr").required(true).help("Constraint, e.g. '>=1.0.0 <2.0.0'"))
                .arg(Arg::new("version").num_args(0..).help("Versions to test")),
        )
        .get_matches();

    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    match matches.subcommand() {
        Some(("resolve", sub_m)) => resolve(sub_m, &cwd),
        Some(("constraint", sub_m)) => constraint(sub_m),
        _ => {
            if use_color() {
                println!("{}", "compo".bright_cyan().bold());
            } else {
                println!("compo");
            }
            dim("Dependency version resolver for front-end component bundles.");
            dim("\nRun `compo --help` for details.");
            Ok(())
        }
    }
}

fn main() {
    if !use_color() {
        colored::control::set_override(false);
    }

    let code = match std::panic::catch_unwind(run) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error(e.trim_end());
            1
        }
        Err(_) => {
            error("An unexpected error occurred. Please report this issue.");
            1
        }
    };
    std::process::exit(code);
}
