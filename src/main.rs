use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use petpal::PetPalError;
use petpal::cli::{CommandContext, Output, OutputFormat, commands};
use petpal::flows::{NameRequest, SymptomRequest};
use petpal::types::PetType;

fn parse_pet_type(s: &str) -> Result<PetType, String> {
    s.parse()
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    s.parse()
}

fn parse_age(s: &str) -> Result<f64, String> {
    match s.trim().parse::<f64>() {
        Ok(age) if age.is_finite() => Ok(age),
        _ => Err(format!("Invalid age '{}'. Expected a number of years", s)),
    }
}

#[derive(Parser)]
#[command(name = "petpal")]
#[command(version, about = "AI pet-care assistant: symptoms, breeds, names and questions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check what a pet's symptoms may indicate
    Symptoms {
        #[arg(long, value_parser = parse_pet_type, help = "Pet type: dog, cat")]
        pet_type: PetType,
        #[arg(long, help = "Description of the symptoms")]
        symptoms: String,
        #[arg(long, help = "Breed of the pet")]
        breed: Option<String>,
        #[arg(long, value_parser = parse_age, help = "Age in years")]
        age: Option<f64>,
        #[arg(short = 'f', long, default_value = "text", value_parser = parse_format, help = "Output format: text, json")]
        format: OutputFormat,
    },

    /// Identify a pet's breed from a photo
    Breed {
        #[arg(required_unless_present = "data_uri", help = "Image file (jpg, png, webp, gif)")]
        image: Option<PathBuf>,
        #[arg(long, conflicts_with = "image", help = "Image as a data URI")]
        data_uri: Option<String>,
        #[arg(short = 'f', long, default_value = "text", value_parser = parse_format, help = "Output format: text, json")]
        format: OutputFormat,
    },

    /// Suggest names for a pet
    Names {
        #[arg(long, value_parser = parse_pet_type, help = "Pet type: dog, cat")]
        pet_type: PetType,
        #[arg(long, help = "Style preference (e.g. funny, classic)")]
        style: Option<String>,
        #[arg(long, help = "Number of names, 1-20 (default: 10)")]
        count: Option<u32>,
        #[arg(short = 'f', long, default_value = "text", value_parser = parse_format, help = "Output format: text, json")]
        format: OutputFormat,
    },

    /// Ask a pet-care question
    Ask {
        #[arg(help = "Your question")]
        query: String,
        #[arg(short = 'f', long, default_value = "text", value_parser = parse_format, help = "Output format: text, json")]
        format: OutputFormat,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(short = 'f', long, default_value = "text", value_parser = parse_format, help = "Output format: text (TOML), json")]
        format: OutputFormat,
    },
    /// Show configuration file paths
    Path,
    /// Create the global configuration file
    Init {
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
    /// Check that the configured backend is reachable
    Check,
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mPetPal encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Default hook prints the backtrace when RUST_BACKTRACE=1
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

/// Input errors list every violation; everything else is one line
fn report_error(err: &anyhow::Error) {
    let output = Output::new();
    match err.downcast_ref::<PetPalError>() {
        Some(PetPalError::InvalidInput(violations)) => {
            output.error("Invalid input:");
            for violation in violations {
                eprintln!("  - {}", violation);
            }
        }
        _ => output.error(&format!("Error: {:#}", err)),
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Symptoms {
            pet_type,
            symptoms,
            breed,
            age,
            format,
        } => {
            let ctx = CommandContext::load(format, cli.verbose)?;
            commands::symptoms::run(
                &ctx,
                &SymptomRequest {
                    symptoms,
                    pet_type,
                    breed,
                    age,
                },
            )?;
        }
        Commands::Breed {
            image,
            data_uri,
            format,
        } => {
            let ctx = CommandContext::load(format, cli.verbose)?;
            commands::breed::run(&ctx, image.as_deref(), data_uri)?;
        }
        Commands::Names {
            pet_type,
            style,
            count,
            format,
        } => {
            let ctx = CommandContext::load(format, cli.verbose)?;
            commands::names::run(
                &ctx,
                &NameRequest {
                    pet_type,
                    style,
                    count,
                },
            )?;
        }
        Commands::Ask { query, format } => {
            let ctx = CommandContext::load(format, cli.verbose)?;
            commands::ask::run(&ctx, &query)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { format } => commands::config::show(format)?,
            ConfigAction::Path => commands::config::path()?,
            ConfigAction::Init { force } => commands::config::init(force)?,
            ConfigAction::Check => commands::config::check()?,
        },
    }

    Ok(())
}
