use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

use fintrack::{
    api::routes::build_router,
    auth::AuthService,
    cli::{output::Output, Cli, Commands},
    db::StoreBackend,
    mailer::LogMailer,
    utils::config::Config,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();
    let out = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    match cli.command {
        Some(Commands::Openapi) => {
            println!("{}", fintrack::api::ApiDoc::openapi().to_pretty_json()?);
            Ok(())
        }
        Some(Commands::GenerateSecret) => {
            generate_secret(&out);
            Ok(())
        }
        Some(Commands::Serve { host, port }) => serve(&out, cli.verbose, host, port).await,
        None => serve(&out, cli.verbose, None, None).await,
    }
}

fn generate_secret(out: &Output) {
    let secret = fintrack::auth::secrets::random_hex(32);
    out.success("Generated a 256-bit secret");
    println!("{secret}");
    out.hint("Add it to your environment as JWT_SECRET");
}

fn init_tracing(verbose: bool, json: bool) {
    let default_directive = if verbose {
        "fintrack=debug,tower_http=debug,info"
    } else {
        "info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn serve(
    out: &Output,
    verbose: bool,
    host_override: Option<String>,
    port_override: Option<u16>,
) -> anyhow::Result<()> {
    let mut config = Config::from_env()?;
    if let Some(host) = host_override {
        config.server.host = host;
    }
    if let Some(port) = port_override {
        config.server.port = port;
    }

    // Production logs as JSON lines; everything else stays human-readable.
    init_tracing(verbose, config.server.is_production());

    out.banner();

    let backend = StoreBackend::from_env();
    let store_label = match &backend {
        StoreBackend::Memory => "in-memory (data is lost on restart)".to_string(),
        StoreBackend::Local { path } => format!("local file {path}"),
        StoreBackend::Remote { url, .. } => format!("remote {url}"),
    };

    out.kv("Environment", &config.server.environment);
    out.kv("Database", &store_label);
    out.info("Mail delivery is log-only; message bodies appear at debug level");

    let store = backend.create_store().await?;
    let mailer = Arc::new(LogMailer);
    let auth = Arc::new(AuthService::new(
        store.clone(),
        mailer,
        config.auth.clone(),
        config.mail.clone(),
    ));
    let state = AppState {
        config: Arc::new(config),
        store,
        auth,
    };

    let app = build_router(state.clone());

    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    out.success(&format!("Listening on http://{addr}"));
    if state.config.server.cors_origin.is_none() {
        out.warning("CORS_ORIGIN is not set; running with a permissive CORS policy");
    }
    #[cfg(feature = "swagger-ui")]
    out.hint("Interactive API docs: /swagger-ui/");

    tracing::info!(%addr, environment = %state.config.server.environment, "server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    out.info("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
