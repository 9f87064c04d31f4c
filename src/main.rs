use std::io::Write;
use std::sync::Arc;

use reqwest::{Method, Url};
use sabr_ump::common::{HttpClient, logger, relay_url, types::AnyResult};
use sabr_ump::configs::Config;
use sabr_ump::sabr::{MemorySegmentCache, STREAMING_CONTEXT_HEADER, SegmentCache, parse_response};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> AnyResult<()> {
    let config = Config::load()?;
    logger::init(&config);

    let fetch = &config.fetch;
    let Some(url) = fetch.url.as_deref() else {
        return Err("[fetch] url is not set".into());
    };

    let headers: Vec<(String, String)> = fetch
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let request_url = match &config.relay {
        Some(relay) => relay_url(url, &relay.host, &headers)?,
        None => Url::parse(url)?,
    };

    let client = HttpClient::new(&config.http)?;
    let method = Method::from_bytes(fetch.method.to_ascii_uppercase().as_bytes())?;
    let mut request = client.request(method, request_url.clone());
    for (name, value) in &headers {
        request = request.header(name, value);
    }
    if let Some(path) = &fetch.body_path {
        request = request.body(std::fs::read(path)?);
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, abandoning the response body");
            interrupt.cancel();
        }
    });

    info!("Fetching {} ({:?})", request_url, fetch.request_kind);
    let res = request.send().await?.error_for_status()?;

    let cache: Arc<dyn SegmentCache> = Arc::new(MemorySegmentCache::new());
    let envelope = match parse_response(
        res,
        request_url.as_str(),
        fetch.request_kind,
        fetch.context.clone(),
        cancel,
        Some(cache),
    )
    .await
    {
        Ok(envelope) => envelope,
        Err(e) => {
            error!(
                "Parse failed: {} (severity={:?}, category={:?})",
                e,
                e.severity(),
                e.category()
            );
            if let Some(failure) = e.server_failure() {
                if let Some(value) = failure.response.headers.get(STREAMING_CONTEXT_HEADER) {
                    info!("{}: {}", STREAMING_CONTEXT_HEADER, value);
                }
            }
            return Err(e.into());
        }
    };

    if let Some(ctx) = envelope.streaming_context() {
        let ctx = ctx?;
        if let Some(redirect) = &ctx.stream_info.redirect {
            info!("Server redirected the session to {}", redirect.url);
        }
        if let Some(header) = &ctx.stream_info.media_header {
            info!(
                "Segment itag={} seq={:?} duration={:?}ms",
                header.itag, header.sequence_number, header.duration_ms
            );
        }
    }
    if let Some(value) = envelope.headers.get(STREAMING_CONTEXT_HEADER) {
        info!("{}: {}", STREAMING_CONTEXT_HEADER, value);
    }

    match &fetch.output {
        Some(path) => {
            std::fs::write(path, &envelope.body)?;
            info!("Wrote {} bytes to {}", envelope.body.len(), path.display());
        }
        None => std::io::stdout().write_all(&envelope.body)?,
    }

    Ok(())
}
