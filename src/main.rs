use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use weather_agent::config::ProviderArgs;
use weather_agent::orchestrator::Orchestrator;
use weather_agent::server::{self, AppState};
use weather_agent::upstream::{Location, Units};

/// Weather Agent: caching proxy for OpenWeather with optional AI insights.
///
/// Examples:
///   weather-agent serve --port 5000
///   weather-agent geocode "Ha Noi"
///   weather-agent weather --lat 21.0278 --lon 105.8342 --units imperial
#[derive(Parser)]
#[command(name = "weather-agent", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    providers: ProviderArgs,

    /// Address to bind when serving.
    #[arg(long, global = true, env = "HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, short = 'p', global = true, env = "PORT", default_value_t = 5000)]
    port: u16,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Run the HTTP server (default).
    Serve,

    /// Resolve a place name and print it as JSON.
    Geocode {
        query: String,
    },

    /// Fetch weather for a coordinate and print it as JSON.
    Weather {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// metric, imperial or standard.
        #[arg(long)]
        units: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: cannot read .env: {}", e);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("weather_agent=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let settings = match cli.providers.into_settings() {
        Ok(s) => s,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let orchestrator = Orchestrator::from_settings(&settings);

    let (host, port) = (cli.host, cli.port);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            if !orchestrator.ai_status().enabled {
                warn!("OPENAI_API_KEY not set, AI routes will answer 503");
            }
            let sweepers = orchestrator.spawn_sweepers(settings.sweep_interval);
            let state = Arc::new(AppState::new(orchestrator));
            let served = server::start(state, &host, port).await;
            for sweeper in sweepers {
                sweeper.abort();
            }
            if let Err(e) = served {
                error!("server error on {}:{}: {}", host, port, e);
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Command::Geocode { query } => match orchestrator.geocode(&query).await {
            Ok(location) => print_json(&*location),
            Err(e) => {
                error!("{}", e);
                ExitCode::FAILURE
            }
        },
        Command::Weather { lat, lon, units } => {
            let units = Units::parse_or_default(units.as_deref());
            let result = match Location::new(lat, lon) {
                Ok(location) => orchestrator.weather(&location, units).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(snapshot) => print_json(&*snapshot),
                Err(e) => {
                    error!("{}", e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("cannot encode output: {}", e);
            ExitCode::FAILURE
        }
    }
}
