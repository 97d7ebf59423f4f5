use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::json;

use gatecheck::checker::{AllowRules, BlockRules, BlocklistFile, MalwareFeed};
use gatecheck::config::Config;
use gatecheck::domain::{Domain, DomainTables, PublicSuffixTable, TopLevelDomainTable};
use gatecheck::engine::{max_severity, CheckOptions, UrlCheckerService};
use gatecheck::models::{Detection, Reason};
use gatecheck::rules::RuleService;
use gatecheck::store::{RuleTable, SqliteRuleStore, TableSource};

const USAGE: &str = "\
usage: gatecheck [--config <file>] <command>

commands:
  check <url> [--allow-all] [--no-fail-fast] [--ignore <reason,...>]
  domain <name>
  allow <url>
  load-blocklist <file>
  load-feed [--replace] <file>
";

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();

    let config_path = take_option(&mut args, "--config")?.unwrap_or_else(|| "config.toml".to_string());

    if args.is_empty() {
        bail!("no command given\n{USAGE}");
    }
    let command = args.remove(0);

    let config = Config::from_file(&config_path)
        .with_context(|| format!("failed to load config from '{config_path}'"))?;

    match command.as_str() {
        "check" => check(&config, args),
        "domain" => domain(&config, args),
        "allow" => allow(&config, args),
        "load-blocklist" => load_blocklist(&config, args),
        "load-feed" => load_feed(&config, args),
        other => bail!("unknown command '{other}'\n{USAGE}"),
    }
}

fn check(config: &Config, mut args: Vec<String>) -> Result<()> {
    let allow_all = take_flag(&mut args, "--allow-all");
    let fail_fast = !take_flag(&mut args, "--no-fail-fast");
    let ignore_reasons = take_option(&mut args, "--ignore")?
        .map(|value| value.split(',').map(Reason::parse).collect())
        .unwrap_or_default();

    let url = single_argument(args, "check <url>")?;

    let store = open_store(config)?;
    let service = build_service(&store);

    let options = CheckOptions {
        allow_all,
        fail_fast,
        ignore_reasons,
    };
    let mut detections = service.check_url(&url, &options)?;

    // The file based blocklist sits outside the hashed rule stores
    if let Some(path) = &config.blocklist.path {
        let blocklist = BlocklistFile::new(path);
        for reason in blocklist.check_url(&url)? {
            detections.push(Detection::new(reason, gatecheck::Source::BlockList));
        }
        detections.sort_by_key(|detection| {
            (
                std::cmp::Reverse(detection.severity()),
                detection.reason.priority(),
            )
        });
        detections.dedup();
    }

    print_detections(&detections)?;
    Ok(())
}

fn domain(config: &Config, args: Vec<String>) -> Result<()> {
    let name = single_argument(args, "domain <name>")?;

    let tables = load_tables(config)?;
    let report = tables.classify(&Domain::new(&name));

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn allow(config: &Config, args: Vec<String>) -> Result<()> {
    let url = single_argument(args, "allow <url>")?;

    let store = open_store(config)?;
    let service = RuleService::new(Arc::new(build_service(&store)), store.clone());

    let record = service.add_to_allow_list(&url)?;
    tracing::info!(rule = %record.rule, "Added rule to the allow list");
    println!("{}", serde_json::to_string_pretty(&record)?);

    Ok(())
}

fn load_blocklist(config: &Config, args: Vec<String>) -> Result<()> {
    let path = single_argument(args, "load-blocklist <file>")?;
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read block list '{path}'"))?;

    let store = open_store(config)?;
    let written = store.bulk_upsert(RuleTable::Block, &BlockRules::records_from_blocklist(&text))?;

    tracing::info!(written, "Updated block rules");
    Ok(())
}

fn load_feed(config: &Config, mut args: Vec<String>) -> Result<()> {
    let replace = take_flag(&mut args, "--replace");
    let path = single_argument(args, "load-feed <file>")?;
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read feed file '{path}'"))?;

    let urls = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'));

    let store = open_store(config)?;
    if replace {
        let deleted = store.delete_all(RuleTable::Feed)?;
        tracing::info!(deleted, "Cleared malware feed rules for a full resync");
    }
    let written = store.bulk_upsert(RuleTable::Feed, &MalwareFeed::records_from_feed(urls))?;

    tracing::info!(written, "Updated malware feed rules");
    Ok(())
}

fn open_store(config: &Config) -> Result<Arc<SqliteRuleStore>> {
    let store = SqliteRuleStore::open(&config.storage.db_path)
        .with_context(|| format!("failed to open rule store '{}'", config.storage.db_path))?;

    Ok(Arc::new(store))
}

fn build_service(store: &Arc<SqliteRuleStore>) -> UrlCheckerService {
    UrlCheckerService::new(
        Box::new(MalwareFeed::new(Box::new(TableSource::new(
            store.clone(),
            RuleTable::Feed,
        )))),
        Box::new(BlockRules::new(Box::new(TableSource::new(
            store.clone(),
            RuleTable::Block,
        )))),
        Box::new(AllowRules::new(Box::new(TableSource::new(
            store.clone(),
            RuleTable::Allow,
        )))),
    )
}

fn load_tables(config: &Config) -> Result<DomainTables> {
    let public_suffix = PublicSuffixTable::from_file(Path::new(&config.data.public_suffix_list))
        .with_context(|| {
            format!(
                "failed to load public suffix list '{}'",
                config.data.public_suffix_list
            )
        })?;
    let top_level = TopLevelDomainTable::from_file(Path::new(&config.data.top_level_domains))
        .with_context(|| {
            format!(
                "failed to load top level domains '{}'",
                config.data.top_level_domains
            )
        })?;

    Ok(DomainTables::new(public_suffix, top_level))
}

/// Render detections as a JSON:API document, worst first.
fn print_detections(detections: &[Detection]) -> Result<()> {
    let data: Vec<_> = detections
        .iter()
        .enumerate()
        .map(|(pos, detection)| {
            json!({
                "type": "detection",
                "id": format!(
                    "{}_{}_{pos}",
                    detection.source.as_str(),
                    detection.reason.as_str()
                ),
                "attributes": {
                    "source": detection.source.as_str(),
                    "reason": detection.reason.as_str(),
                    "severity": detection.severity().as_str(),
                },
            })
        })
        .collect();

    let body = json!({
        "data": data,
        "meta": {
            "maxSeverity": max_severity(detections).map(|severity| severity.as_str()),
        },
    });

    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn single_argument(args: Vec<String>, usage: &str) -> Result<String> {
    match args.as_slice() {
        [value] => Ok(value.clone()),
        _ => bail!("expected exactly one argument: {usage}"),
    }
}

fn take_flag(args: &mut Vec<String>, name: &str) -> bool {
    match args.iter().position(|arg| arg == name) {
        Some(pos) => {
            args.remove(pos);
            true
        }
        None => false,
    }
}

fn take_option(args: &mut Vec<String>, name: &str) -> Result<Option<String>> {
    let Some(pos) = args.iter().position(|arg| arg == name) else {
        return Ok(None);
    };

    if pos + 1 >= args.len() {
        bail!("option {name} needs a value");
    }

    args.remove(pos);
    Ok(Some(args.remove(pos)))
}
