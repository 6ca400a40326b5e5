mod cli;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use octopod_core::{
    load_config, validate_config, ApiError, Authenticator, BulkTransfer, Config, ConfigError,
    Credentials, ErrorKind, HttpOctopodClient, OctopodApi, Orchestrator, OrchestratorError,
    ProcessRequest, SanitizedConfig, SessionManager, SftpTransfer, TransportError, WaitRequest,
};

use cli::{Command, ConfigCommand, LogFormat, RootArgs, WaitOptions};

/// Exit status after Ctrl-C.
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    let args = RootArgs::parse();
    init_tracing(args.log_format);

    let code = tokio::select! {
        result = run(args) => match result {
            Ok(()) => 0,
            Err(e) => {
                error!("{:#}", e);
                if error_kind(&e).is_some_and(|kind| kind.is_retryable()) {
                    info!("The failure may be temporary, running the command again can succeed");
                }
                exit_code(&e)
            }
        },
        _ = signal::ctrl_c() => {
            warn!("Interrupted, remote orders keep running");
            EXIT_INTERRUPTED
        }
    };
    std::process::exit(code);
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let json = format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

/// Class of the first classified error in the chain.
fn error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<OrchestratorError>() {
            Some(e.kind())
        } else if let Some(e) = cause.downcast_ref::<TransportError>() {
            Some(e.kind())
        } else if let Some(e) = cause.downcast_ref::<ApiError>() {
            Some(e.kind())
        } else if cause.downcast_ref::<ConfigError>().is_some() {
            Some(ErrorKind::Configuration)
        } else {
            None
        }
    })
}

/// Map an error chain to the process exit status.
fn exit_code(err: &anyhow::Error) -> i32 {
    match error_kind(err) {
        Some(ErrorKind::Configuration) => 2,
        Some(ErrorKind::Authentication) => 3,
        Some(ErrorKind::ValidationFailed) => 4,
        Some(ErrorKind::OrderFailed | ErrorKind::OrderCancelled) => 5,
        Some(ErrorKind::Timeout) => 6,
        _ => 1,
    }
}

async fn run(args: RootArgs) -> Result<()> {
    let config = load(&args.config)?;

    if let Command::Config(ConfigCommand::Show) = &args.command {
        let sanitized = SanitizedConfig::from(&config);
        println!("{}", serde_json::to_string_pretty(&sanitized)?);
        return Ok(());
    }

    let credentials = credentials(&config, args.username, args.password)?;
    let orchestrator = build_orchestrator(&config, credentials)?;

    match args.command {
        Command::Process(process) => {
            check_overrides(&process.wait)?;
            let request = ProcessRequest::new(
                &process.file,
                &process.model,
                &process.wait.download_folder,
            )
            .with_polling(
                poll_interval(&config, &process.wait),
                timeout(&config, &process.wait),
            )
            .with_result(process.wait.selection())
            .with_tags(process.tags)
            .reuse_existing(process.check_if_file_exists);

            let outcome = orchestrator.process(&request).await?;
            println!("file_id: {}", outcome.file.file_id);
            println!("order_id: {}", outcome.order.order_id);
            for path in &outcome.written {
                println!("result: {}", path.display());
            }
        }
        Command::Upload(upload) => {
            let file = orchestrator
                .upload(&upload.file, upload.check_if_file_exists)
                .await?;
            info!(origin = %file.origin, "Upload finished");
            println!("{}", file.file_id);
        }
        Command::Wait(wait) => {
            check_overrides(&wait.wait)?;
            let request = WaitRequest {
                order_id: wait.order.clone(),
                download_folder: wait.wait.download_folder.clone(),
                poll_interval: poll_interval(&config, &wait.wait),
                timeout: timeout(&config, &wait.wait),
                result: wait.wait.selection(),
            };

            let outcome = orchestrator.wait(&request).await?;
            for path in &outcome.written {
                println!("result: {}", path.display());
            }
        }
        Command::Status(status) => {
            let order = orchestrator.status(&status.order).await?;
            println!("{}", serde_json::to_string_pretty(&order)?);
        }
        Command::Config(ConfigCommand::Show) => {}
    }

    Ok(())
}

fn load(path: &Path) -> Result<Config> {
    info!("Loading configuration from {:?}", path);
    let config =
        load_config(path).with_context(|| format!("Failed to load config from {:?}", path))?;
    validate_config(&config).context("Configuration validation failed")?;
    Ok(config)
}

fn credentials(
    config: &Config,
    username: Option<String>,
    password: Option<String>,
) -> Result<Credentials> {
    let username = username.or_else(|| config.credentials.username.clone());
    let password = password.or_else(|| config.credentials.password.clone());

    match (username, password) {
        (Some(username), Some(password)) => Ok(Credentials::new(username, password)),
        _ => Err(ConfigError::ValidationError(
            "credentials missing: set [credentials] or pass --username and --password".to_string(),
        ))
        .context("Cannot authenticate"),
    }
}

fn build_orchestrator(config: &Config, credentials: Credentials) -> Result<Orchestrator> {
    let client = Arc::new(
        HttpOctopodClient::new(config.api.clone()).context("Failed to create API client")?,
    );
    info!("Using Octopod API at {}", config.api.base_url);

    let sessions = Arc::new(SessionManager::new(
        Arc::clone(&client) as Arc<dyn Authenticator>,
        credentials,
    ));
    let mut orchestrator = Orchestrator::new(
        client as Arc<dyn OctopodApi>,
        sessions,
        config.transport.clone(),
        config.polling.clone(),
    );

    match &config.sftp {
        Some(sftp) => {
            info!("Bulk uploads via SFTP to {}:{}", sftp.host, sftp.port);
            let transfer = SftpTransfer::new(sftp.clone());
            let folder = transfer.default_folder().to_string();
            orchestrator =
                orchestrator.with_bulk(Arc::new(transfer) as Arc<dyn BulkTransfer>, folder);
        }
        None => info!(
            "No [sftp] section, files above {} bytes will be refused",
            config.transport.size_threshold_bytes
        ),
    }

    Ok(orchestrator)
}

fn poll_interval(config: &Config, options: &WaitOptions) -> Duration {
    Duration::from_secs(
        options
            .poll_interval
            .unwrap_or(config.polling.poll_interval_secs),
    )
}

fn timeout(config: &Config, options: &WaitOptions) -> Duration {
    Duration::from_secs(options.timeout.unwrap_or(config.polling.timeout_secs))
}

/// Reject zero-second overrides the config validator would have caught.
fn check_overrides(options: &WaitOptions) -> Result<()> {
    if options.poll_interval == Some(0) {
        bail!(ConfigError::ValidationError(
            "--poll-interval must be at least 1 second".to_string()
        ));
    }
    Ok(())
}
