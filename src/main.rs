use anyhow::Result;
use bitlink::commands::{LinkOptions, config::Config};
use bitlink::link::DEFAULT_SCOPE;
use clap::Parser;
use std::path::PathBuf;

/// bitlink - component link generator
///
/// Generates the redirect modules, entry points, node_modules symlinks and
/// manifest updates that let tracked components import each other as packages.
///
/// Components are read from `.bitmap.json` at the project root.
///
/// Examples:
///   bitlink link                        # Link every imported or authored component
///   bitlink link utils/is-string --npm  # Link one component with CommonJS redirects
///   bitlink link --dry-run              # Show what would be written
///   bitlink link-all                    # Recreate node_modules entries
#[derive(Parser, Debug)]
#[command(author, version = env!("BITLINK_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root containing .bitmap.json (defaults to the current directory)
    #[arg(
        long = "project",
        short = 'p',
        env = "BITLINK_PROJECT",
        value_name = "PATH",
        global = true
    )]
    pub project: Option<PathBuf>,

    /// Package scope components are exposed under in node_modules
    #[arg(
        long = "scope",
        env = "BITLINK_SCOPE",
        value_name = "SCOPE",
        default_value = DEFAULT_SCOPE,
        global = true
    )]
    pub scope: String,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Link components and re-link their dependents
    Link(LinkArgs),

    /// Recreate node_modules entries for every tracked component
    LinkAll,
}

#[derive(clap::Args, Debug)]
pub struct LinkArgs {
    /// Components to link, in "box/name" form (defaults to all imported and authored ones)
    #[arg(value_name = "ID")]
    pub ids: Vec<String>,

    /// Generate CommonJS redirects consumable from npm packages
    #[arg(long)]
    pub npm: bool,

    /// Point manifest "main" at build output instead of generating entry points
    #[arg(long = "patch-main")]
    pub patch_main: bool,

    /// Print the changes without writing anything
    #[arg(long = "dry-run", short = 'n')]
    pub dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = bitlink::runtime::RealRuntime;
    let config = Config::new(runtime, cli.project, &cli.scope)?;

    match cli.command {
        Commands::Link(args) => {
            let options = LinkOptions {
                npm_style: args.npm,
                patch_manifest_main: args.patch_main,
                dry_run: args.dry_run,
            };
            bitlink::commands::link(config, &args.ids, options).await?
        }
        Commands::LinkAll => bitlink::commands::link_all(config).await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_link_parsing() {
        let cli = Cli::try_parse_from(["bitlink", "link", "utils/is-string", "--npm"]).unwrap();
        match cli.command {
            Commands::Link(args) => {
                assert_eq!(args.ids, ["utils/is-string"]);
                assert!(args.npm);
                assert!(!args.patch_main);
                assert!(!args.dry_run);
            }
            _ => panic!("Expected Link command"),
        }
        assert_eq!(cli.project, None);
    }

    #[test]
    fn test_cli_link_without_ids() {
        let cli = Cli::try_parse_from(["bitlink", "link", "--patch-main", "-n"]).unwrap();
        match cli.command {
            Commands::Link(args) => {
                assert!(args.ids.is_empty());
                assert!(args.patch_main);
                assert!(args.dry_run);
            }
            _ => panic!("Expected Link command"),
        }
    }

    #[test]
    fn test_cli_global_project_and_scope() {
        let cli = Cli::try_parse_from([
            "bitlink",
            "--project",
            "/tmp/project",
            "link-all",
            "--scope",
            "@org",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::LinkAll));
        assert_eq!(cli.project, Some(PathBuf::from("/tmp/project")));
        assert_eq!(cli.scope, "@org");
    }

    #[test]
    fn test_cli_no_subcommand_fails() {
        assert!(Cli::try_parse_from(["bitlink", "utils/is-string"]).is_err());
    }
}
