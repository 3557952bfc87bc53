mod args;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use args::Args;
use clap::Parser;
use futures_util::StreamExt;
use relay_config::Config;
use relay_llm::{ChatRequest, ProviderRegistry, emit};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args.config)?;

    relay_telemetry::init(&config.telemetry)?;

    let mut request = read_request(&args.request).await?;
    if let Some(model) = args.model {
        request.model = model;
    }

    tracing::info!(
        config_path = %args.config.display(),
        model = %request.model,
        "starting relay"
    );

    let limiter = Arc::new(relay_ratelimit::create_provider_limiter(&config.llm.retry)?);
    let registry = ProviderRegistry::from_config(&config.llm, &limiter)?;

    // Abort the stream on Ctrl-C
    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    let mut stdout = tokio::io::stdout();

    let mut frames = match registry.stream_messages(&request).await {
        Ok(events) => emit::encode_stream(events),
        Err(e) => {
            stdout.write_all(emit::serialize_error(&e).as_bytes()).await?;
            stdout.flush().await?;
            return Err(e.into());
        }
    };

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                tracing::info!("stream cancelled");
                break;
            }
            frame = frames.next() => {
                let Some(frame) = frame else { break };
                stdout.write_all(frame.as_bytes()).await?;
                stdout.flush().await?;
            }
        }
    }

    // Dropping the frame stream releases the upstream connection
    drop(frames);

    tracing::info!("relay stopped");
    Ok(())
}

/// Read the chat request from a file or stdin
async fn read_request(path: &Path) -> anyhow::Result<ChatRequest> {
    let raw = if path.as_os_str() == "-" {
        let mut raw = String::new();
        tokio::io::stdin()
            .read_to_string(&mut raw)
            .await
            .context("failed to read request from stdin")?;
        raw
    } else {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read request {}", path.display()))?
    };

    serde_json::from_str(&raw).context("failed to parse chat request")
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
