//! Shell completion generation.

use clap::CommandFactory;
use clap_complete::Shell;

/// Generate shell completion scripts.
pub fn generate_completions(shell: &str) -> anyhow::Result<()> {
    let shell = match shell.to_lowercase().as_str() {
        "bash" => Shell::Bash,
        "zsh" => Shell::Zsh,
        "fish" => Shell::Fish,
        "powershell" | "ps" => Shell::PowerShell,
        "elvish" => Shell::Elvish,
        _ => anyhow::bail!(
            "Unsupported shell: {}. Supported: bash, zsh, fish, powershell, elvish",
            shell
        ),
    };

    let mut cmd = crate::cli::Cli::command();
    let bin_name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, &bin_name, &mut std::io::stdout());
    Ok(())
}
