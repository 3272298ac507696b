use anyhow::Context;
use colored::Colorize;
use pdl_storage::{Provider, StorageConfig};
use pdl_types::{BlockAndPvtData, BlockchainInfo, PvtNsCollFilter};
use serde_json::{json, Value};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = resolve_config(&cli)?;
    let provider = Provider::new(&config);
    let result = match cli.command {
        Command::Ledgers => cmd_ledgers(&provider, &cli.format),
        Command::Info(args) => cmd_info(&provider, args, &cli.format),
        Command::Show(args) => cmd_show(&provider, args, &cli.format),
    };
    provider.close();
    result
}

/// Config file (or defaults), then `--root` on top.
fn resolve_config(cli: &Cli) -> anyhow::Result<StorageConfig> {
    let mut config = match &cli.config {
        Some(path) => StorageConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => StorageConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.root_dir = root.clone();
    }
    Ok(config)
}

fn cmd_ledgers(provider: &Provider, format: &OutputFormat) -> anyhow::Result<()> {
    let ledgers = provider.list()?;
    match format {
        OutputFormat::Json => println!("{}", json!(ledgers)),
        OutputFormat::Text if ledgers.is_empty() => println!("No ledgers."),
        OutputFormat::Text => {
            for id in &ledgers {
                println!("{}", id.bold());
            }
        }
    }
    Ok(())
}

fn cmd_info(provider: &Provider, args: InfoArgs, format: &OutputFormat) -> anyhow::Result<()> {
    if !provider.exists(&args.ledger)? {
        anyhow::bail!("ledger {} does not exist", args.ledger);
    }
    let store = provider
        .open(&args.ledger)
        .with_context(|| format!("failed to open ledger {}", args.ledger))?;
    let info = store.blockchain_info()?;
    let pvt_height = store.pvt_data_store().height()?;

    match format {
        OutputFormat::Json => println!("{}", info_json(&args.ledger, &info, pvt_height)),
        OutputFormat::Text => {
            println!("Ledger {}", args.ledger.bold());
            println!("  Block height:        {}", info.height.to_string().bold());
            println!("  Private data height: {}", pvt_height.to_string().bold());
            if info.height > 0 {
                println!("  Tip: {}", info.current_block_hash.to_hex().yellow());
            }
        }
    }
    Ok(())
}

/// Opening a ledger reconciles its stores, so both heights always agree here.
fn info_json(ledger: &str, info: &BlockchainInfo, pvt_height: u64) -> Value {
    json!({
        "ledger": ledger,
        "height": info.height,
        "pvt_data_height": pvt_height,
        "current_block_hash": info.current_block_hash.to_hex(),
        "previous_block_hash": info.previous_block_hash.to_hex(),
    })
}

fn cmd_show(provider: &Provider, args: ShowArgs, format: &OutputFormat) -> anyhow::Result<()> {
    if !provider.exists(&args.ledger)? {
        anyhow::bail!("ledger {} does not exist", args.ledger);
    }
    let store = provider.open(&args.ledger)?;
    let filter: PvtNsCollFilter = args.filters.into_iter().collect();
    let data = store
        .get_pvt_data_and_block_by_num(args.block, Some(&filter))
        .with_context(|| format!("block {} of ledger {}", args.block, args.ledger))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&block_json(&data))?),
        OutputFormat::Text => print_block(&data),
    }
    Ok(())
}

fn block_json(data: &BlockAndPvtData) -> Value {
    let header = &data.block.header;
    let pvt: Vec<Value> = data
        .block_pvt_data
        .values()
        .map(|entry| {
            let namespaces: Vec<Value> = entry
                .write_set
                .ns_pvt_rwset
                .iter()
                .map(|ns| {
                    let collections: Vec<Value> = ns
                        .collection_pvt_rwset
                        .iter()
                        .map(|coll| json!({ "collection": coll.collection_name, "rwset": hex::encode(&coll.rwset) }))
                        .collect();
                    json!({ "namespace": ns.namespace, "collections": collections })
                })
                .collect();
            json!({ "seq_in_block": entry.seq_in_block, "namespaces": namespaces })
        })
        .collect();

    json!({
        "number": header.number,
        "hash": data.block.hash().to_hex(),
        "previous_hash": header.previous_hash.to_hex(),
        "data_hash": header.data_hash.to_hex(),
        "tx_count": data.block.tx_count(),
        "pvt_data": pvt,
    })
}

fn print_block(data: &BlockAndPvtData) {
    let block = &data.block;
    println!("Block {}  {}", block.number().to_string().bold(), block.hash().short_hex().yellow());
    println!("  Previous: {}", block.header.previous_hash.short_hex().dimmed());
    println!("  Transactions: {}", block.tx_count());
    if data.block_pvt_data.is_empty() {
        println!("  No private data.");
        return;
    }
    for entry in data.block_pvt_data.values() {
        println!("  tx {}", entry.seq_in_block.to_string().cyan());
        if entry.write_set.ns_pvt_rwset.is_empty() {
            println!("    {}", "(filtered)".dimmed());
        }
        for ns in &entry.write_set.ns_pvt_rwset {
            for coll in &ns.collection_pvt_rwset {
                println!("    {}/{}  {} bytes", ns.namespace, coll.collection_name.green(), coll.rwset.len());
            }
        }
    }
}
