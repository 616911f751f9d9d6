//! `finz taxonomy`
//!
//! - `finz taxonomy check` - verify every legacy alias points at a canonical id
//! - `finz taxonomy resolve <ID>...` - show how raw ids canonicalize

use crate::{EXIT_INFRA_ERROR, EXIT_OK, EXIT_WARNINGS, print_json};
use clap::{Parser, Subcommand};
use finz_engine::taxonomy::MatchKind;
use finz_engine::{FinzConfig, Resolution, Taxonomy};
use serde::Serialize;

#[derive(Debug, Parser)]
pub struct TaxonomyCli {
    #[command(subcommand)]
    pub command: TaxonomySubcommand,
}

#[derive(Debug, Subcommand)]
pub enum TaxonomySubcommand {
    /// Verify the alias map is closed over the canonical table
    Check(CheckArgs),

    /// Canonicalize raw rubro ids
    Resolve(ResolveArgs),
}

#[derive(Debug, Parser)]
pub struct CheckArgs {
    /// Output as JSON for automation
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct ResolveArgs {
    /// Raw ids as they appear in baselines or spend records
    #[arg(value_name = "ID", required = true)]
    pub ids: Vec<String>,

    /// Output as JSON for automation
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct CheckOutput {
    source: String,
    entries: usize,
    legacy_aliases: usize,
    broken_aliases: Vec<(String, String)>,
}

#[derive(Debug, Serialize)]
struct ResolveOutput<'a> {
    raw_id: &'a str,
    #[serde(flatten)]
    resolution: Resolution,
}

impl TaxonomyCli {
    pub fn run(self, cfg: &FinzConfig) -> anyhow::Result<i32> {
        // Loaded without the closure check so `check` can report what is broken.
        let (taxonomy, source) = match cfg.resolved_taxonomy_path() {
            Some(path) => (Taxonomy::load(&path)?, path.display().to_string()),
            None => (Taxonomy::embedded()?, "embedded".to_string()),
        };
        match self.command {
            TaxonomySubcommand::Check(args) => run_check(&taxonomy, source, &args),
            TaxonomySubcommand::Resolve(args) => run_resolve(&taxonomy, &args),
        }
    }
}

fn run_check(taxonomy: &Taxonomy, source: String, args: &CheckArgs) -> anyhow::Result<i32> {
    let output = CheckOutput {
        source,
        entries: taxonomy.len(),
        legacy_aliases: taxonomy.legacy_aliases().count(),
        broken_aliases: taxonomy
            .check_closure()
            .into_iter()
            .map(|b| (b.legacy_id, b.target))
            .collect(),
    };

    if args.json {
        print_json(&output)?;
    } else {
        println!(
            "Taxonomy ({}): {} canonical ids, {} legacy aliases",
            output.source, output.entries, output.legacy_aliases
        );
        for (legacy, target) in &output.broken_aliases {
            println!("  broken alias: {legacy} -> {target} (no such canonical id)");
        }
        if output.broken_aliases.is_empty() {
            println!("All legacy aliases resolve.");
        }
    }

    Ok(if output.broken_aliases.is_empty() {
        EXIT_OK
    } else {
        EXIT_INFRA_ERROR
    })
}

fn run_resolve(taxonomy: &Taxonomy, args: &ResolveArgs) -> anyhow::Result<i32> {
    let resolved: Vec<ResolveOutput<'_>> = args
        .ids
        .iter()
        .map(|raw_id| ResolveOutput {
            raw_id,
            resolution: taxonomy.canonicalize(raw_id),
        })
        .collect();

    if args.json {
        print_json(&resolved)?;
    } else {
        for item in &resolved {
            let how = match item.resolution.matched {
                MatchKind::Canonical => "canonical",
                MatchKind::LegacyAlias => "legacy alias",
                MatchKind::Unresolved => "unresolved, kept as written",
            };
            let detail = taxonomy
                .entry(&item.resolution.canonical_id)
                .filter(|_| item.resolution.found)
                .map(|e| format!(" [{}] {}", e.category, e.description))
                .unwrap_or_default();
            println!(
                "{} -> {} ({how}){detail}",
                item.raw_id, item.resolution.canonical_id
            );
        }
    }

    Ok(if resolved.iter().all(|r| r.resolution.found) {
        EXIT_OK
    } else {
        EXIT_WARNINGS
    })
}
