use clap::Parser;
use flow_map::config::TomlConfig;
use flow_map::core::filter::FacetOptions;
use flow_map::core::ConfigProvider;
use flow_map::utils::{logger, validation::Validate};
use flow_map::{CliConfig, FlowMapEngine, FlowMapError, FlowMapPipeline, LocalStorage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("🚀 Starting flow-map");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let config = match cli.resolve().and_then(|config| {
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(e) => exit_with(&e),
    };

    if cli.dry_run {
        display_config_summary(&config);
        return Ok(());
    }

    let cache = LocalStorage::new(config.cache_dir().to_string());
    let output = LocalStorage::new(config.output_path().to_string());
    let pipeline = FlowMapPipeline::new(cache, output, config);
    let engine = FlowMapEngine::new(pipeline);

    if cli.list_options {
        match engine.facet_options().await {
            Ok(options) => print_facet_options(&options),
            Err(e) => exit_with(&e),
        }
        return Ok(());
    }

    match engine.run().await {
        Ok(outcome) => {
            println!("{}", outcome.table);
            if let Some(message) = outcome.message.as_deref().filter(|m| *m != outcome.table) {
                println!("ℹ️ {}", message);
            }
            if outcome.summary.skipped_rows > 0 {
                println!(
                    "⚠️ {} malformed rows were skipped while loading",
                    outcome.summary.skipped_rows
                );
            }
            println!("📁 Map saved to: {}", outcome.output_path);
        }
        Err(e) => exit_with(&e),
    }

    Ok(())
}

fn exit_with(e: &FlowMapError) -> ! {
    tracing::error!(
        "❌ flow-map failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());

    std::process::exit(e.severity().exit_code());
}

fn display_config_summary(config: &TomlConfig) {
    let selection = config.selection();
    let list = |codes: &std::collections::BTreeSet<String>| {
        if codes.is_empty() {
            "all".to_string()
        } else {
            codes.iter().cloned().collect::<Vec<_>>().join(", ")
        }
    };

    println!("📋 Configuration Summary:");
    println!("  Source: {}", config.base_url().unwrap_or("(cache only)"));
    println!("  Cache: {}", config.cache_dir());
    println!("  Files: {}", config.source_files().names().join(" | "));
    println!("  Output: {}", config.output_path());
    println!("  Origins: {}", list(&selection.origins));
    println!("  Destinations: {}", list(&selection.destinations));
    println!(
        "  Sectors: {} -> {}",
        String::from(selection.origin_sector.clone()),
        String::from(selection.destination_sector.clone())
    );
    println!("  Top N: {}", selection.top_n);
    println!(
        "  Missing coordinates: {:?}",
        config.render_options().missing_coordinates
    );
}

fn print_facet_options(options: &FacetOptions) {
    let join = |values: &std::collections::BTreeSet<String>| {
        values.iter().cloned().collect::<Vec<_>>().join(", ")
    };
    println!("Origins: {}", join(&options.origins));
    println!("Destinations: {}", join(&options.destinations));
    let sectors = |codes: &std::collections::BTreeSet<String>| {
        codes
            .iter()
            .map(|code| options.sector_label(code))
            .collect::<Vec<_>>()
            .join(", ")
    };
    println!("Origin sectors: {}", sectors(&options.origin_sectors));
    println!("Destination sectors: {}", sectors(&options.destination_sectors));
}
