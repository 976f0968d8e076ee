//! prefctl - inspect and edit a file-backed preference store

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use prefs_backend::{migrate_legacy_file, Edit, FileBackend, KeyValueBackend, Primitive};
use prefs_core::PreferencesConfig;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const KINDS: [&str; 5] = ["bool", "int", "float", "string", "string-set"];

fn cli() -> Command {
    Command::new("prefctl")
        .version(prefs_core::VERSION)
        .about("Inspect and edit a file-backed preference store")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML store configuration (directory and name)"),
        )
        .arg(
            Arg::new("dir")
                .long("dir")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Directory holding the store document"),
        )
        .arg(
            Arg::new("name")
                .long("name")
                .global(true)
                .help("Store name (document stem)"),
        )
        .subcommand(
            Command::new("list").about("List every key").arg(
                Arg::new("json")
                    .long("json")
                    .action(ArgAction::SetTrue)
                    .help("Output as JSON"),
            ),
        )
        .subcommand(
            Command::new("get")
                .about("Print one value")
                .arg(Arg::new("key").required(true)),
        )
        .subcommand(
            Command::new("set")
                .about("Store one value")
                .arg(Arg::new("key").required(true))
                .arg(Arg::new("value").required(true))
                .arg(
                    Arg::new("type")
                        .long("type")
                        .short('t')
                        .default_value("string")
                        .value_parser(KINDS)
                        .help("Stored kind; string sets are comma separated"),
                ),
        )
        .subcommand(
            Command::new("remove")
                .about("Delete one key")
                .arg(Arg::new("key").required(true)),
        )
        .subcommand(
            Command::new("migrate-legacy")
                .about("Rename a store saved under an old name")
                .arg(Arg::new("old-name").required(true)),
        )
}

/// Store location from `--config`, overridden by `--dir` / `--name`
fn resolve_config(matches: &ArgMatches) -> Result<PreferencesConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => PreferencesConfig::load(path)?,
        None => PreferencesConfig::new(),
    };
    if let Some(dir) = matches.get_one::<PathBuf>("dir") {
        config = config.with_directory(dir);
    }
    if let Some(name) = matches.get_one::<String>("name") {
        config = config.with_name(name);
    }
    if config.directory.is_none() {
        config = config.with_directory(".");
    }
    config.validate()?;
    Ok(config)
}

fn parse_value(kind: &str, raw: &str) -> Result<Primitive> {
    let value = match kind {
        "bool" => Primitive::Bool(raw.parse().with_context(|| format!("not a bool: {raw}"))?),
        "int" => Primitive::Int(raw.parse().with_context(|| format!("not an int: {raw}"))?),
        "float" => Primitive::Float(raw.parse().with_context(|| format!("not a float: {raw}"))?),
        "string" => Primitive::String(raw.to_string()),
        "string-set" => Primitive::StringSet(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect::<BTreeSet<_>>(),
        ),
        other => bail!("unknown kind {other}"),
    };
    Ok(value)
}

fn run(matches: &ArgMatches) -> Result<()> {
    let config = resolve_config(matches)?;
    let dir = config.directory.clone().unwrap_or_else(|| PathBuf::from("."));

    if let Some(("migrate-legacy", args)) = matches.subcommand() {
        let old = args.get_one::<String>("old-name").context("old name required")?;
        if migrate_legacy_file(&dir, old, &config.name)? {
            println!("renamed {old} -> {}", config.name);
        } else {
            println!("nothing to rename");
        }
        return Ok(());
    }

    let store = FileBackend::open_in(&dir, &config.name)
        .with_context(|| format!("opening store {} in {}", config.name, dir.display()))?;
    tracing::debug!(path = %store.path().display(), "store opened");

    match matches.subcommand() {
        Some(("list", args)) => {
            let snapshot = store.snapshot();
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                for (key, value) in &snapshot {
                    println!("{key} = {value} ({})", value.kind());
                }
            }
        }
        Some(("get", args)) => {
            let key = args.get_one::<String>("key").context("key required")?;
            match store.get(key) {
                Some(value) => println!("{value}"),
                None => bail!("{key} is not set"),
            }
        }
        Some(("set", args)) => {
            let key = args.get_one::<String>("key").context("key required")?;
            let raw = args.get_one::<String>("value").context("value required")?;
            let kind = args.get_one::<String>("type").context("type required")?;
            let value = parse_value(kind, raw)?;

            let mut edit = Edit::new();
            edit.put(key.as_str(), value);
            store.commit(edit)?;
        }
        Some(("remove", args)) => {
            let key = args.get_one::<String>("key").context("key required")?;
            if !store.contains(key) {
                bail!("{key} is not set");
            }
            let mut edit = Edit::new();
            edit.remove(key.as_str());
            store.commit(edit)?;
        }
        _ => unreachable!("subcommand is required"),
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    run(&matches)
}
