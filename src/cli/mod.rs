//! CLI command handling.
//!
//! Provides subcommands for:
//! - Normalizing a native message into the unified model (`normalize`)
//! - Rendering a native message for the other platform (`render`)
//! - Converting a media file through the cache (`convert`)
//! - Sniffing a media file's format (`inspect`)
//! - Managing the conversion cache (`cache stats`, `cache show`, `cache invalidate`, `cache sweep`)
//! - Shell completion generation (`completion`)

mod cache;
mod completion;
mod media;
mod message;

pub use cache::{CacheCommand, run_cache_command};
pub use completion::generate_completions;
pub use media::{run_convert_command, run_inspect_command};
pub use message::{run_normalize_command, run_render_command};

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::media::TargetCodec;
use crate::message::Platform;

#[derive(Parser, Debug)]
#[command(name = "chatbridge")]
#[command(about = "Message normalization and media conversion for a QQ/Telegram bridge")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Override the conversion cache directory
    #[arg(long, global = true, env = "BRIDGE_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the unified form of a native message (JSON file)
    Normalize {
        /// Platform the message comes from (qq, telegram)
        #[arg(short, long)]
        from: Platform,

        /// Path to the native message JSON
        file: PathBuf,
    },

    /// Convert a native message into send calls for the other platform
    Render {
        /// Platform the message comes from (qq, telegram)
        #[arg(short, long)]
        from: Platform,

        /// Destination chat (QQ group/user id or Telegram chat id)
        #[arg(short, long)]
        chat: String,

        /// Destination is a private QQ chat
        #[arg(long)]
        private: bool,

        /// Path to the native message JSON
        file: PathBuf,
    },

    /// Convert a media file and print the cached artifact path
    Convert {
        /// Input media file
        input: PathBuf,

        /// Target codec (silk, ogg, gif, png, or raw-<ext> to copy unchanged)
        #[arg(short, long)]
        to: TargetCodec,

        /// Variant tag kept apart in the cache (e.g. a size)
        #[arg(long)]
        variant: Option<String>,
    },

    /// Detect the format of a media file
    Inspect {
        /// Media file to inspect
        file: PathBuf,
    },

    /// Manage the conversion cache
    #[command(subcommand)]
    Cache(CacheCommand),

    /// Generate shell completions
    Completion {
        /// Shell to generate for (bash, zsh, fish, powershell, elvish)
        shell: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalize() {
        let cli = Cli::try_parse_from(["chatbridge", "normalize", "--from", "qq", "msg.json"]).unwrap();
        match cli.command {
            Command::Normalize { from, file } => {
                assert_eq!(from, Platform::Qq);
                assert_eq!(file, PathBuf::from("msg.json"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parse_render_private() {
        let cli = Cli::try_parse_from([
            "chatbridge", "render", "-f", "tg", "--chat", "10001", "--private", "msg.json",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Render { from: Platform::Telegram, private: true, .. }
        ));
    }

    #[test]
    fn parse_convert_target() {
        let cli = Cli::try_parse_from(["chatbridge", "convert", "in.webm", "--to", "gif", "--variant", "s512"]).unwrap();
        match cli.command {
            Command::Convert { to, variant, .. } => {
                assert_eq!(to, TargetCodec::Gif);
                assert_eq!(variant.as_deref(), Some("s512"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parse_unknown_platform_fails() {
        assert!(Cli::try_parse_from(["chatbridge", "normalize", "--from", "irc", "msg.json"]).is_err());
    }

    #[test]
    fn parse_cache_invalidate() {
        let cli = Cli::try_parse_from(["chatbridge", "cache", "invalidate", "ab12:ogg"]).unwrap();
        assert!(matches!(cli.command, Command::Cache(CacheCommand::Invalidate { .. })));
    }

    #[test]
    fn parse_global_log_json() {
        let cli = Cli::try_parse_from(["chatbridge", "inspect", "a.tgs", "--log-json"]).unwrap();
        assert!(cli.log_json);
    }
}
