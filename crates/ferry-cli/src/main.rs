//! Ferry CLI - copy resource groups between tenants.

use clap::{Args, Parser, Subcommand};
use ferry_migrate::{RemoteId, ResourceKind};
use std::path::PathBuf;

mod commands;
mod logging;
mod settings;

use logging::LogFormat;

/// Ferry - cross-tenant resource migration
#[derive(Parser, Debug)]
#[command(name = "ferry")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", global = true)]
    log_format: LogFormat,

    /// Configuration file (defaults to ./ferry.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the platform base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy groups and their items from the source tenant to the target
    Migrate(MigrateArgs),

    /// Check a credential against the identity endpoint
    Validate {
        /// Raw tenant token
        #[arg(long, env = "FERRY_TOKEN", hide_env_values = true)]
        token: String,
        /// Skip the token cache
        #[arg(long)]
        force: bool,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version information
    Version,
}

/// Arguments of `ferry migrate`.
#[derive(Args, Debug)]
pub(crate) struct MigrateArgs {
    /// Resource kind: tag, faq or voice
    #[arg(short, long)]
    kind: ResourceKind,

    /// Source group id; repeat to migrate several groups in order
    #[arg(short, long = "group", required = true)]
    groups: Vec<RemoteId>,

    /// Prefix added to migrated names
    #[arg(long)]
    add_prefix: Option<String>,

    /// Literal text stripped from migrated names
    #[arg(long)]
    remove_prefix: Option<String>,

    /// Copy from the target tenant back to the source tenant
    #[arg(long)]
    reverse: bool,

    /// Source tenant token
    #[arg(long, env = "FERRY_SOURCE_TOKEN", hide_env_values = true)]
    source_token: Option<String>,

    /// Target tenant token
    #[arg(long, env = "FERRY_TARGET_TOKEN", hide_env_values = true)]
    target_token: Option<String>,

    /// Print the outcome as JSON instead of a summary
    #[arg(long)]
    json: bool,

    /// Disable the progress bar
    #[arg(long)]
    no_progress: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::init_logging(logging::level_for(cli.verbose), cli.log_format);

    let result = run(cli).await;

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Commands::Version => {
            println!("ferry {}", env!("CARGO_PKG_VERSION"));
            println!("ferry-migrate {}", ferry_migrate::VERSION);
            Ok(0)
        }
        Commands::Migrate(args) => {
            let config = load_config(cli.config, cli.base_url)?;
            commands::migrate(config, args).await
        }
        Commands::Validate { token, force, json } => {
            let config = load_config(cli.config, cli.base_url)?;
            commands::validate(config, &token, force, json).await
        }
    }
}

fn load_config(
    path: Option<PathBuf>,
    base_url: Option<String>,
) -> anyhow::Result<ferry_migrate::EngineConfig> {
    let mut config = settings::load(path.as_deref(), settings::environment())?;
    if let Some(base_url) = base_url {
        config.base_url = base_url;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_migrate() {
        let cli = Cli::try_parse_from([
            "ferry",
            "migrate",
            "--kind",
            "faq",
            "--group",
            "12",
            "--group",
            "g-7",
            "--remove-prefix",
            "OLD_",
            "--source-token",
            "s",
            "--target-token",
            "t",
            "--reverse",
        ])
        .unwrap();

        let Commands::Migrate(args) = cli.command else {
            panic!("expected migrate");
        };
        assert_eq!(args.kind, ResourceKind::Faq);
        assert_eq!(args.groups, vec![RemoteId::Num(12), RemoteId::Str("g-7".into())]);
        assert_eq!(args.remove_prefix.as_deref(), Some("OLD_"));
        assert!(args.reverse);
    }

    #[test]
    fn test_migrate_requires_a_group() {
        let result = Cli::try_parse_from(["ferry", "migrate", "--kind", "tag"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let result = Cli::try_parse_from(["ferry", "migrate", "--kind", "video", "--group", "1"]);
        assert!(result.is_err());
    }
}
