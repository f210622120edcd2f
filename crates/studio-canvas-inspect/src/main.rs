//! Studio Canvas snapshot inspector
//!
//! Loads the most recent persisted snapshot of a project and prints the graph
//! it contains as JSON.

use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use studio_canvas_core::storage::{FileStorage, SnapshotStore};
use studio_canvas_core::{Edge, GraphDocument, NodeInstance};

/// Print the latest persisted graph of a studio canvas project
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Project whose snapshot should be loaded
    project_id: String,

    /// Snapshot directory (defaults to the platform data directory)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// List stored snapshots instead of printing the graph
    #[arg(long)]
    list: bool,
}

#[derive(Serialize)]
struct GraphReport {
    project_id: String,
    node_count: usize,
    edge_count: usize,
    bounds: Option<[f64; 4]>,
    nodes: Vec<NodeInstance>,
    edges: Vec<Edge>,
}

#[derive(Serialize)]
struct SnapshotSummary {
    id: String,
    created_at: u64,
    update_bytes: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let storage = match cli.dir {
        Some(dir) => FileStorage::new(dir)?,
        None => FileStorage::default_location()?,
    };
    log::debug!("Reading snapshots from {}", storage.base_path().display());

    if cli.list {
        let summaries: Vec<SnapshotSummary> = pollster::block_on(storage.list_snapshots(&cli.project_id))?
            .into_iter()
            .map(|record| SnapshotSummary {
                id: record.id.to_string(),
                created_at: record.created_at,
                update_bytes: record.update.len(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    let Some(update) = pollster::block_on(storage.load_latest_snapshot(&cli.project_id))? else {
        eprintln!("No snapshot found for project '{}'", cli.project_id);
        std::process::exit(1);
    };

    let document = GraphDocument::from_snapshot(&update)?;
    let report = GraphReport {
        node_count: document.node_count(),
        edge_count: document.edge_count(),
        bounds: document.bounds().map(|r| [r.x0, r.y0, r.x1, r.y1]),
        nodes: document.nodes(),
        edges: document.edges(),
        project_id: cli.project_id,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
