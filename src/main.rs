// src/main.rs — ActionLens entry point

use clap::Parser;

use actionlens::chat::ChatSessionManager;
use actionlens::cli::{analyze, chat, reports, Cli, Commands};
use actionlens::infra::config::Config;
use actionlens::infra::logger;
use actionlens::provider::resolver;
use actionlens::report::ReportStore;

#[tokio::main]
async fn main() {
    // Initialize logging (respects RUST_LOG)
    logger::init_logging("warn");

    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config (falls back to defaults if no config.toml)
    let mut config = if let Some(ref path) = cli.config {
        Config::load_from(std::path::Path::new(path))?
    } else {
        Config::load()?
    };
    let store = ReportStore::new(config.reports.resolved_dir());

    // Subcommands that don't need a provider
    match &cli.command {
        Commands::Reports => return reports::list_reports(&store),
        Commands::Show {
            filename,
            summary_only,
        } => return reports::show_report(&store, filename, *summary_only),
        _ => {}
    }

    match cli.command {
        Commands::File {
            path,
            interval,
            model,
            concurrency,
        } => {
            apply_analysis_overrides(&mut config, interval, model);
            if let Some(n) = concurrency {
                config.analysis.max_concurrency = n;
            }
            let provider = resolver::build_provider(&config)?;
            analyze::run_file(provider, &config, &path, cli.quiet).await
        }
        Commands::Live {
            duration,
            interval,
            model,
            device,
        } => {
            apply_analysis_overrides(&mut config, interval, model);
            if let Some(secs) = duration {
                config.live.duration_secs = secs;
            }
            if let Some(device) = device {
                config.live.device = device;
            }
            let provider = resolver::build_provider(&config)?;
            analyze::run_live(provider, &config, cli.quiet).await
        }
        Commands::Ask { report, message } => {
            let provider = resolver::build_provider(&config)?;
            let manager = ChatSessionManager::new(provider, store, config.chat.clone());
            chat::run_ask(&manager, report.as_deref(), &message.join(" ")).await
        }
        Commands::Chat { report } => {
            let provider = resolver::build_provider(&config)?;
            let manager = ChatSessionManager::new(provider, store, config.chat.clone());
            chat::run_chat(&manager, report.as_deref()).await
        }
        Commands::Reports | Commands::Show { .. } => Ok(()),
    }
}

fn apply_analysis_overrides(config: &mut Config, interval: Option<u32>, model: Option<String>) {
    if let Some(k) = interval {
        config.analysis.frame_interval = k;
    }
    if let Some(model) = model {
        config.analysis.model = model;
    }
}
