// Command line utility for running COPRA community detection

use anyhow::{Context, Error};
use clap::{value_parser, Arg, ArgAction, Command};
use copra::edgelist::{load_batch, load_edges};
use copra::{
    affected_vertices_delta_screening, affected_vertices_frontier, vertex_weights, Copra, CopraOptions, Labelset,
    SweepMode,
};
use log::info;
use std::fs::{create_dir, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Command::new("copra-cmd")
        .arg(
            Arg::new("INPUT")
                .help("edge list to cluster, one `u v [w]` edge per line (may be gzipped)")
                .required(true)
                .index(1)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("OUT_DIR")
                .help("Output directory")
                .short('o')
                .long("out_dir")
                .default_value(".")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("MAX_MEMBERSHIP")
                .help("Maximum number of communities per vertex")
                .short('m')
                .long("max_membership")
                .default_value("8")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("MAX_ITERATIONS")
                .help("Maximum number of sweeps")
                .short('i')
                .long("max_iterations")
                .default_value("20")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("TOLERANCE")
                .help("Stop once fewer than this fraction of vertices change community in a sweep")
                .short('t')
                .long("tolerance")
                .default_value("0.05")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("REPEAT")
                .help("Number of timed repetitions")
                .short('r')
                .long("repeat")
                .default_value("1")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("SWEEP")
                .help("Sweep mode")
                .long("sweep")
                .default_value("sync")
                .value_parser(["sync", "async"]),
        )
        .arg(
            Arg::new("STRICT")
                .help("Break ties in scan order")
                .long("strict")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("SEED")
                .help("Random seed for asynchronous sweeps")
                .long("seed")
                .default_value("0")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("BATCH")
                .help("Edge updates to apply after the first run, `- u v` or `+ u v [w]` per line")
                .short('b')
                .long("batch")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("BELONGING")
                .help("Belonging coefficient threshold of delta-screening")
                .long("belonging")
                .default_value("0.1")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("DETECTOR")
                .help("Affected vertex detector used for the batch")
                .long("detector")
                .default_value("delta")
                .value_parser(["delta", "frontier"]),
        )
        .get_matches();

    let input: &PathBuf = matches.get_one("INPUT").unwrap();
    let out_dir: &PathBuf = matches.get_one("OUT_DIR").unwrap();
    let sweep: SweepMode = matches.get_one::<String>("SWEEP").unwrap().parse()?;
    let options = CopraOptions::default()
        .with_max_membership(*matches.get_one::<usize>("MAX_MEMBERSHIP").unwrap())
        .with_max_iterations(*matches.get_one::<usize>("MAX_ITERATIONS").unwrap())
        .with_tolerance(*matches.get_one::<f64>("TOLERANCE").unwrap())
        .with_repeat(*matches.get_one::<usize>("REPEAT").unwrap())
        .with_sweep(sweep)
        .with_strict(matches.get_flag("STRICT"))
        .with_seed(*matches.get_one::<u64>("SEED").unwrap());
    let mut copra = Copra::new(options)?;

    let mut network = load_edges(input)?;
    info!("loaded {} vertices and {} edges", network.nodes(), network.edges());

    if !out_dir.exists() {
        create_dir(out_dir).with_context(|| out_dir.display().to_string())?;
    }

    let result = copra.run(&network);
    info!(
        "{} iterations in {:?}, {} communities",
        result.iterations,
        result.time,
        count_communities(&result.membership)
    );
    membership_to_tsv(&result.membership, out_dir.join("membership.tsv"))?;

    let Some(batch_path) = matches.get_one::<PathBuf>("BATCH") else {
        return Ok(());
    };
    let batch = load_batch(batch_path)?.undirected();
    network.apply_batch(&batch)?;
    info!(
        "applied {} deletions and {} insertions",
        batch.deletions.len(),
        batch.insertions.len()
    );

    let mut labelsets = result.labelsets;
    labelsets.extend((labelsets.len()..network.nodes()).map(Labelset::singleton));

    let frontier = matches.get_one::<String>("DETECTOR").unwrap() == "frontier";
    let affected = if frontier {
        affected_vertices_frontier(&network, &batch.deletions, &batch.insertions, &labelsets)
    } else {
        let belonging = *matches.get_one::<f64>("BELONGING").unwrap();
        affected_vertices_delta_screening(
            &network,
            &batch.deletions,
            &batch.insertions,
            &labelsets,
            &vertex_weights(&network),
            belonging,
            copra.options().selection(),
        )
    };

    let updated = copra.run_dynamic(&network, &labelsets, &affected, frontier)?;
    info!(
        "{} iterations in {:?}, {} communities",
        updated.iterations,
        updated.time,
        count_communities(&updated.membership)
    );
    membership_to_tsv(&updated.membership, out_dir.join("membership_updated.tsv"))?;

    Ok(())
}

fn count_communities(membership: &[usize]) -> usize {
    let mut seen = vec![false; membership.len()];
    membership.iter().filter(|&&c| !std::mem::replace(&mut seen[c], true)).count()
}

pub fn membership_to_tsv(membership: &[usize], path: impl AsRef<Path>) -> Result<(), Error> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path).with_context(|| path.display().to_string())?);
    for (vertex, community) in membership.iter().enumerate() {
        writeln!(writer, "{vertex}\t{community}")?;
    }
    writer.flush()?;
    Ok(())
}
