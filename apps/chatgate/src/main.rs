use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use chatgate_core::{Anonymous, Collaborators, Core, IdentityResolver, JwtSessionResolver};
use chatgate_provider_impl::WreqTransport;
use chatgate_storage::{
    EventWriter, MemoryLedger, MemoryStore, QueuedEventSink, QuotaLedger, RestKv,
    RestStreamWriter, TracingWriter, UserStore,
};

mod cli;
mod settings;

use crate::cli::{Cli, LogFormat};
use crate::settings::Settings;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    if let Err(err) = run(cli).await {
        eprintln!("chatgate failed: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::load(&cli)?;
    let Settings {
        server,
        kv,
        events,
        gate,
    } = settings;

    let (ledger, store): (Arc<dyn QuotaLedger>, Arc<dyn UserStore>) = match (&kv.url, &kv.token) {
        (Some(url), Some(token)) => {
            let kv = Arc::new(RestKv::new(url.clone(), token.clone()).context("kv client")?);
            info!(url = %url, "kv ledger configured");
            let ledger: Arc<dyn QuotaLedger> = kv.clone();
            let store: Arc<dyn UserStore> = kv;
            (ledger, store)
        }
        _ => {
            warn!("kv not configured, quotas and user storage are in-memory");
            (Arc::new(MemoryLedger::new()), Arc::new(MemoryStore::new()))
        }
    };

    let writer: Arc<dyn EventWriter> = match &events.url {
        Some(url) => {
            let writer = RestStreamWriter::new(
                url.clone(),
                events.username.as_deref().unwrap_or_default(),
                events.password.as_deref().unwrap_or_default(),
            )
            .context("event stream client")?;
            info!(url = %url, "event stream configured");
            Arc::new(writer)
        }
        None => {
            warn!("event stream not configured, transactions go to the log");
            Arc::new(TracingWriter)
        }
    };
    let (event_sink, event_worker) = QueuedEventSink::spawn(writer, events.capacity);

    let identity: Arc<dyn IdentityResolver> = match gate.session.jwt_secret.as_deref() {
        Some(secret) if !secret.is_empty() => Arc::new(JwtSessionResolver::new(secret, &gate.session)),
        _ => {
            if gate.access.require_session {
                warn!("require_session is set but no session secret is configured; every proxy call will be refused");
            }
            Arc::new(Anonymous)
        }
    };

    let transport = WreqTransport::from_config(&gate.upstream).context("upstream client")?;
    info!(
        backend = ?gate.upstream.backend,
        timeout_secs = gate.upstream.timeout_secs,
        retrieval = gate.retrieval.url.is_some(),
        upload = gate.upload.access_key.is_some(),
        "gate configured"
    );

    let core = Core::new(
        gate,
        Collaborators {
            identity,
            ledger,
            store,
            events: Arc::new(event_sink),
            transport: Arc::new(transport),
        },
    );
    let app = core.router().layer(TraceLayer::new_for_http());

    let bind = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(addr = %bind, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Last sender goes with the router state; the worker then drains and exits.
    drop(core);
    match tokio::time::timeout(DRAIN_TIMEOUT, event_worker).await {
        Ok(Ok(())) => info!("event queue drained"),
        Ok(Err(err)) => warn!(error = %err, "event worker failed"),
        Err(_) => warn!("event queue drain timed out"),
    }
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("chatgate=info,tower_http=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received ctrl-c"),
        () = terminate => info!("received SIGTERM"),
    }
}
