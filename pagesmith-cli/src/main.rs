//! Pagesmith CLI - generate pages from the terminal or serve the editor

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use pagesmith_core::{
    Config, CredentialStatus, GenerationClient, InMemoryEventBus, UnconfiguredClient,
};
use pagesmith_editor::EditorSession;
use pagesmith_gemini::GeminiClient;
use pagesmith_server::{AppState, PreviewServer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn, Level};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Generate {
        instruction: String,
        image: Option<PathBuf>,
        from: Option<PathBuf>,
        output: Option<PathBuf>,
    },
    Serve {
        hostname: Option<String>,
        port: Option<u16>,
    },
    ValidateConfig,
}

/// CLI arguments structure
#[derive(Debug, Clone)]
pub struct Args {
    pub config_file: Option<PathBuf>,
    pub dev_mode: bool,
    pub action: Action,
}

fn build_command() -> Command {
    Command::new("pagesmith")
        .version("0.1.0")
        .about("Conversational HTML page generator with a visual editor")
        .long_about(
            "Pagesmith turns plain-language instructions into complete HTML pages. \
            Pages can be refined turn by turn, edited visually in the browser, and \
            rolled back to any earlier request.",
        )
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .global(true)
                .help("Path to configuration file (JSON format)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("dev-mode")
                .long("dev-mode")
                .global(true)
                .help("Enable debug logging with targets and line numbers")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("generate")
                .about("Generate a page from one instruction and print it")
                .arg(
                    Arg::new("instruction")
                        .help("What the page should contain or how to change it")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("image")
                        .long("image")
                        .help("Reference image sent along with the instruction")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("from")
                        .long("from")
                        .help("Existing HTML file to modify instead of starting empty")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("Write the page to this file instead of stdout")
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("serve")
                .about("Serve the editor over HTTP")
                .arg(
                    Arg::new("hostname")
                        .short('H')
                        .long("hostname")
                        .help("Hostname or IP address to bind the server to"),
                )
                .arg(
                    Arg::new("port")
                        .short('p')
                        .long("port")
                        .help("Port number to bind the server to (1-65535)")
                        .value_parser(clap::value_parser!(u16)),
                ),
        )
        .subcommand(Command::new("validate-config").about("Validate configuration and exit"))
        .after_help(
            "EXAMPLES:\n    \
            pagesmith generate \"A landing page for a bakery\" -o bakery.html\n    \
            pagesmith generate \"Make the header red\" --from bakery.html -o bakery.html\n    \
            pagesmith serve -p 8080\n    \
            pagesmith validate-config --config pagesmith.json",
        )
}

impl Args {
    pub fn parse() -> Result<Self> {
        Self::from_matches(&build_command().get_matches())
    }

    fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let action = match matches.subcommand() {
            Some(("generate", sub)) => Action::Generate {
                instruction: sub
                    .get_one::<String>("instruction")
                    .cloned()
                    .unwrap_or_default(),
                image: sub.get_one::<PathBuf>("image").cloned(),
                from: sub.get_one::<PathBuf>("from").cloned(),
                output: sub.get_one::<PathBuf>("output").cloned(),
            },
            Some(("serve", sub)) => Action::Serve {
                hostname: sub.get_one::<String>("hostname").cloned(),
                port: sub.get_one::<u16>("port").copied(),
            },
            Some(("validate-config", _)) => Action::ValidateConfig,
            _ => bail!("no command given, see `pagesmith --help`"),
        };

        Ok(Self {
            config_file: matches.get_one::<PathBuf>("config").cloned(),
            dev_mode: matches.get_flag("dev-mode"),
            action,
        })
    }

    /// Configuration file (or defaults) overlaid with the environment, then
    /// with the command-line flags
    pub fn load_config(&self) -> Result<Config> {
        let config = match &self.config_file {
            Some(path) => {
                let mut config = read_config_file(path)?;
                config.apply_environment_overrides(&Config::environment())?;
                config
            }
            None => Config::from_env()?,
        };
        self.apply_flags(config)
    }

    fn apply_flags(&self, mut config: Config) -> Result<Config> {
        if let Action::Serve { hostname, port } = &self.action {
            if let Some(hostname) = hostname {
                config.server.hostname = hostname.clone();
            }
            if let Some(port) = port {
                config.server.port = *port;
            }
        }
        config.set_global_setting("dev_mode".to_string(), self.dev_mode)?;
        Ok(config)
    }
}

fn read_config_file(path: &Path) -> Result<Config> {
    info!("Loading configuration from: {}", path.display());
    Config::from_file(path).with_context(|| {
        format!(
            "Failed to load configuration file {}\n\
            You can check it with: pagesmith validate-config --config {}",
            path.display(),
            path.display()
        )
    })
}

fn init_logging(dev_mode: bool) {
    let log_level = if dev_mode { Level::DEBUG } else { Level::INFO };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(dev_mode)
        .with_line_number(dev_mode)
        .with_file(dev_mode)
        .with_writer(std::io::stderr);

    if dev_mode {
        subscriber.with_ansi(true).pretty().init();
        info!("Development mode enabled");
    } else {
        subscriber.with_ansi(true).init();
    }
}

/// Remote client, or one that fails closed when no credential is set
fn generation_client(config: &Config) -> Arc<dyn GenerationClient> {
    match config.credential_status() {
        CredentialStatus::Configured => Arc::new(GeminiClient::timed(config.generation.clone())),
        CredentialStatus::Missing => {
            warn!("PAGESMITH_API_KEY is not set; generation requests will be refused");
            Arc::new(UnconfiguredClient)
        }
    }
}

async fn run_generate(
    config: &Config,
    instruction: &str,
    image: Option<&PathBuf>,
    from: Option<&PathBuf>,
    output: Option<&PathBuf>,
) -> Result<()> {
    let client = generation_client(config);
    let mut session = EditorSession::new(config, Arc::new(InMemoryEventBus::new()));

    if let Some(path) = from {
        let document = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        session.import_document(&document).await?;
    }

    let attachments = match image {
        Some(path) => vec![session
            .attach_file(path)
            .await
            .with_context(|| format!("Cannot use {} as a reference image", path.display()))?],
        None => Vec::new(),
    };

    let outcome = session
        .submit(client.as_ref(), instruction, attachments)
        .await?;
    eprintln!("{}", outcome.reply);
    if !outcome.success {
        bail!("generation failed: {}", outcome.reply);
    }

    match output {
        Some(path) => {
            tokio::fs::write(path, session.document())
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Page written to {}", path.display());
        }
        None => println!("{}", session.document()),
    }
    Ok(())
}

async fn run_serve(config: &Config) -> Result<()> {
    let state = AppState::new(config, generation_client(config)).await?;
    if let Some(banner) = state.session.read().await.banner() {
        eprintln!("{}", banner);
    }

    let mut server = PreviewServer::new(config.server.clone(), state);
    let addr = server.start().await?;
    println!("Pagesmith editor: http://{}", addr);
    println!("Press Ctrl+C to stop.");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
    server.shutdown().await;
    info!("Pagesmith shutdown complete");
    Ok(())
}

fn run_validate_config(args: &Args) -> Result<()> {
    let config = args.load_config()?;
    let result = config.validate_comprehensive()?;

    if let Some(path) = &args.config_file {
        println!("Configuration file: {}", path.display());
    }
    println!("Model: {} ({})", config.generation.model, config.generation.endpoint);
    println!("Timeout: {}s", config.generation.timeout_secs);
    println!(
        "Server: {}:{} (CORS {})",
        config.server.hostname,
        config.server.port,
        if config.server.cors_enabled { "on" } else { "off" }
    );
    println!("Credential: {:?}", config.credential_status());

    for warning in &result.warnings {
        println!("warning: {}: {}", warning.field_path, warning.message);
        if let Some(suggestion) = &warning.suggestion {
            println!("  hint: {}", suggestion);
        }
    }
    println!("Configuration is valid");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse()?;
    init_logging(args.dev_mode);

    let config = args.load_config()?;

    match &args.action {
        Action::Generate {
            instruction,
            image,
            from,
            output,
        } => {
            config.validate()?;
            run_generate(&config, instruction, image.as_ref(), from.as_ref(), output.as_ref())
                .await
        }
        Action::Serve { .. } => {
            config.validate()?;
            run_serve(&config).await
        }
        Action::ValidateConfig => run_validate_config(&args),
    }
}
