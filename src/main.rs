use clap::Parser;
use tracing_subscriber::EnvFilter;

use chatbridge::BridgeConfig;
use chatbridge::cli::{
    Cli, Command, generate_completions, run_cache_command, run_convert_command, run_inspect_command,
    run_normalize_command, run_render_command,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Command::Completion { shell } = &cli.command {
        return generate_completions(shell);
    }

    init_tracing(cli.log_json);

    let mut config = BridgeConfig::from_env()?;
    if let Some(dir) = cli.cache_dir {
        config.cache.dir = dir;
    }
    tracing::debug!(cache = %config.cache.dir.display(), "Configuration loaded");

    match cli.command {
        Command::Normalize { from, file } => run_normalize_command(&config, from, &file).await,
        Command::Render {
            from,
            chat,
            private,
            file,
        } => run_render_command(&config, from, &chat, private, &file).await,
        Command::Convert { input, to, variant } => run_convert_command(&config, &input, to, variant).await,
        Command::Inspect { file } => run_inspect_command(&file).await,
        Command::Cache(cmd) => run_cache_command(&config, cmd).await,
        Command::Completion { .. } => Ok(()),
    }
}

/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chatbridge=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
