use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use genblocks::validation::require_non_empty;
use genblocks::{logging, AppError, GenerationContext, GenerationRequest, Services};

/// Generate Gutenberg block markup from a natural-language description.
#[derive(Debug, Parser)]
#[command(name = "genblocks", version, about)]
struct Cli {
    /// TOML settings file. `GENBLOCKS_*` environment variables override it.
    #[arg(long, value_parser = parse_config_path)]
    config: Option<PathBuf>,

    /// Page context as a JSON object, e.g. '{"tone":"playful"}'.
    #[arg(long, value_parser = parse_context)]
    context: Option<GenerationContext>,

    /// Print the block tree as JSON instead of block markup.
    #[arg(long)]
    json: bool,

    /// Check the configured provider's models endpoint and exit.
    #[arg(long)]
    test_connection: bool,

    /// Block description.
    #[arg(trailing_var_arg = true, required_unless_present = "test_connection")]
    prompt: Vec<String>,
}

fn parse_config_path(raw: &str) -> Result<PathBuf, String> {
    require_non_empty("--config", raw).map_err(|e| e.to_string())?;
    Ok(PathBuf::from(raw))
}

fn parse_context(raw: &str) -> Result<GenerationContext, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid context JSON: {}", e))
}

fn main() -> ExitCode {
    // .env may carry SENTRY_DSN. Sentry goes up before logging so startup panics are captured.
    let _ = dotenvy::dotenv();
    let _sentry_guard = sentry::init(sentry_options());
    logging::init();

    let args = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => return fail(&AppError::Io(e)),
    };
    match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}

async fn run(args: Cli) -> Result<(), AppError> {
    let services = Services::load(args.config.as_deref())?;

    if args.test_connection {
        services.generator.client().test_connection().await?;
        println!("Connection OK");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling generation");
            on_interrupt.cancel();
        }
    });

    let request = GenerationRequest {
        prompt: args.prompt.join(" "),
        context: args.context.unwrap_or_default(),
        user_id: 0,
    };
    let generated = services
        .generator
        .generate_cancellable(&request, cancel)
        .await;
    services.generator.flush_usage().await;
    let generated = generated?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&generated)?);
    } else {
        println!("{}", genblocks::serialize(&generated.block));
    }
    Ok(())
}

fn fail(err: &AppError) -> ExitCode {
    match serde_json::to_string(err) {
        Ok(json) => eprintln!("{}", json),
        Err(_) => eprintln!("{}", err),
    }
    ExitCode::FAILURE
}

fn sentry_options() -> sentry::ClientOptions {
    sentry::ClientOptions {
        dsn: std::env::var("SENTRY_DSN").ok().and_then(|s| s.parse().ok()),
        release: Some(env!("CARGO_PKG_VERSION").into()),
        traces_sample_rate: 0.0,
        send_default_pii: false,
        before_send: Some(std::sync::Arc::new(|mut event| {
            // Prompts may contain customer copy.
            if let Some(ref mut request) = event.request {
                request.data = None;
            }
            Some(event)
        })),
        ..Default::default()
    }
}
