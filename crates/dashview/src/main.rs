mod cli;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use dashview_core::{
    CacheEntry, ConfigStore, ExpansionController, MetadataStore, StaticCatalog, build_tree,
    expandable_ids, render_text,
};
use log::{debug, info, warn};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_filter()))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_store = match &cli.config {
        Some(path) => ConfigStore::at(path),
        None => ConfigStore::new()?,
    };
    let config = config_store.load()?;

    let catalog_path = cli.catalog_path(&config)?;
    let catalog = StaticCatalog::from_path(&catalog_path)
        .with_context(|| format!("Failed to load catalog {}", catalog_path.display()))?;
    info!("Loaded catalog from {}", catalog_path.display());

    let store = Arc::new(MetadataStore::with_config(Arc::new(catalog), &config));
    store.load_sources().await;

    for name in &cli.test_connection {
        let snapshot = store.snapshot();
        let source = snapshot
            .sources()
            .and_then(CacheEntry::loaded)
            .and_then(|sources| sources.iter().find(|s| &s.name == name))
            .with_context(|| format!("Unknown source: {}", name))?;

        store.test_connection(&source.config()).await;
    }

    let controller = ExpansionController::new(store.clone());

    for raw in &cli.expand {
        let id = cli::resolve_node(&store, raw).await?;

        let mut next = controller.expanded();
        next.insert(id.to_string());

        for skipped in controller.toggle(next).await.skipped {
            warn!("Nothing to load for {}", skipped);
        }
    }

    if cli.expand_all {
        expand_all(&controller, config.expand_all_depth).await;
    }

    let tree = build_tree(&store.snapshot(), &controller.expanded());

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
    } else {
        print!("{}", render_text(&tree));
    }

    Ok(())
}

/// Expands every visible expandable node, one tree level per pass.
async fn expand_all(controller: &ExpansionController<MetadataStore>, depth: usize) {
    for pass in 0..depth {
        let tree = build_tree(&controller.loader().snapshot(), &controller.expanded());
        let pending = expandable_ids(&tree);

        if pending.is_empty() {
            break;
        }

        debug!("Expand-all pass {}: {} nodes", pass + 1, pending.len());

        let mut next = controller.expanded();
        next.extend(pending);
        controller.toggle(next).await;
    }
}
