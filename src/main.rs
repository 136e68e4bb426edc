//! `vmfmerge`: the VMF Merge Tool command line.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use vmf_merge::diff::diff;
use vmf_merge::driver::{choose_parent, do_merge, load_maps, MergeOptions};
use vmf_merge::merge::merge_delta_lists;
use vmf_merge::resolve::create_conflict_resolution_deltas;
use vmf_merge::Delta;

#[derive(Parser, Debug)]
#[command(name = "vmfmerge", version, about = "VMF Merge Tool")]
struct Cli {
    /// The name of a *.vmf file, or the path to a *.vmf file.
    #[arg(value_name = "vmf", required = true)]
    vmfs: Vec<PathBuf>,

    /// Do not try to automatically figure out which VMF is the parent.
    /// Instead, simply assume that the first VMF in the argument list is
    /// the parent. (Can be dangerous -- use with care!)
    #[arg(short = 'n', long)]
    no_auto_parent: bool,

    /// Instead of merging, output a list of individual per-file deltas to
    /// stdout.
    #[arg(short = 'i', long)]
    dump_individual: bool,

    /// Instead of merging, output a list of all proposed merge deltas to
    /// stdout.
    #[arg(short = 'p', long)]
    dump_proposed: bool,

    /// Enable aggressive conflict resolution. (Reserved, currently a no-op.)
    #[arg(short = 'A', long)]
    aggressive: bool,

    /// Noisily display progress messages throughout the procedure.
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    if cli.dump_individual && cli.dump_proposed {
        eprintln!("ERROR: --dump-individual and --dump-proposed are mutually exclusive!");
        return ExitCode::from(1);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ERROR: {:#}", err);
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let start = Instant::now();

    println!("Loading VMFs...");
    let mut maps = load_maps(&cli.vmfs).context("failed to load VMFs")?;

    let parent_index = if cli.no_auto_parent {
        0
    } else {
        choose_parent(&maps)
    };
    let mut parent = maps.remove(parent_index);
    let children = maps;

    if cli.dump_individual {
        for child in &children {
            println!("Deltas for {}:", child.filename());
            for delta in diff(&mut parent, child) {
                println!("{}", delta);
            }
            println!();
        }
        return Ok(());
    }

    if cli.dump_proposed {
        let mut delta_lists = Vec::with_capacity(children.len());
        for (index, child) in children.iter().enumerate() {
            let mut deltas = diff(&mut parent, child);
            for delta in &mut deltas {
                delta.origin = Some(index);
            }
            delta_lists.push(deltas);
        }

        let merged: Vec<Delta> = match merge_delta_lists(delta_lists, cli.aggressive) {
            Ok(merged) => merged,
            Err(conflict) => {
                let mut merged = conflict.partial;
                let resolution = create_conflict_resolution_deltas(
                    &mut parent,
                    &conflict.conflicted,
                    &merged,
                    &children,
                )?;
                merged.extend(resolution);
                merged
            }
        };
        println!("Merged deltas:");
        for delta in &merged {
            println!("{}", delta);
        }
        return Ok(());
    }

    let options = MergeOptions {
        aggressive: cli.aggressive,
        backup_parent: true,
        ..MergeOptions::default()
    };
    let report = do_merge(&mut parent, &children, &options, |update| {
        println!("{}", update.message);
    })?;

    if !report.conflicted.is_empty() {
        println!();
        println!("Conflicted deltas:");
        for delta in &report.conflicted {
            let origin = delta
                .origin
                .and_then(|index| children.get(index))
                .map(|child| child.filename())
                .unwrap_or_else(|| "(unknown)".to_string());
            println!("From {}: {}", origin, delta);
        }
        println!();
        println!(
            "WARNING: {} conflicted delta(s); the merged map contains Manual Merge VisGroups.",
            report.conflicted.len()
        );
    }
    if let Some(path) = &report.output_path {
        println!("Merged VMF written to {}", path.display());
    }
    println!("Total time: {:.2?}", start.elapsed());
    Ok(())
}
