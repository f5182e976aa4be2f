use clap::Parser;
use gallerist::commands::{self, Context, DispatchError};
use gallerist::config::{self, SitePaths};
use gallerist::output;
use gallerist::plugins::Registry;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "gallerist")]
#[command(version)]
#[command(about = "Plugin-driven static site and photo gallery generator")]
#[command(long_about = "\
Plugin-driven static site and photo gallery generator

Site structure:

  site.toml                  # Site config (optional)
  content/
  ├── index.md               # Home page (gets the root listing)
  ├── 010-Landscapes/
  │   ├── 001-dawn.jpg       # Gallery entry, metadata from EXIF/IPTC
  │   ├── 001-dawn.toml      # Sidecar: overrides any embedded field
  │   └── 001-dawn.txt       # Sidecar: description
  └── about.md               # Page, YAML front matter optional
  templates/
  ├── style.css              # Inlined into every page
  └── footer.html
  plugins/
  └── raw.toml               # External command/handler/template-helper

Metadata resolution (later wins):
  embedded EXIF/IPTC → .txt sidecar → .toml sidecar
  missing title: filename (010-Grey-Wolf.jpg → \"Grey Wolf\")
  missing date:  file modification time

Commands:
  add, build, build-documentation, clean, publish, serve, tests, watch
  plus any command units found in the plugins directory.")]
struct Cli {
    /// Site root (the directory holding site.toml)
    #[arg(long, default_value = ".", global = true)]
    site: PathBuf,

    /// Plugins directory (default: [paths].plugins from site.toml)
    #[arg(long, global = true)]
    plugins: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Command to run
    command: String,

    /// Arguments passed to the command
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let root = std::fs::canonicalize(&cli.site)?;
    let site_config = config::load_config(&root)?;
    let plugins_dir = cli
        .plugins
        .unwrap_or_else(|| SitePaths::resolve(&root, &site_config).plugins);
    let registry = Registry::discover(Some(&plugins_dir))?;

    let context = Context::new(&root, site_config, registry).with_args(cli.args);
    match commands::dispatch(&cli.command, &context) {
        Ok(status) => Ok(status.into()),
        Err(DispatchError::UnknownCommand { name, available }) => {
            output::print_unknown_command(&name, &available);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            output::print_error(&e);
            Ok(ExitCode::FAILURE)
        }
    }
}
