#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::io::Write;
use std::sync::Arc;

use aihttp_config::Config;
use aihttp_llm::transport::{ReqwestTransport, Transport};
use aihttp_llm::{CompletionRequest, LlmClient, Message, ProviderRegistry, StreamChunk, TracingErrorListener};
use args::{Args, Command};
use clap::Parser;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    aihttp_telemetry::init(config.logging.as_ref(), "warn")?;

    tracing::debug!(config_path = %args.config.display(), "loaded configuration");

    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new());
    let client = LlmClient::from_config_with(
        &config.llm,
        &ProviderRegistry::with_defaults(),
        &transport,
        Some(Arc::new(TracingErrorListener)),
    )?;

    match args.command {
        Command::Send {
            provider,
            prompt,
            model,
            stream,
            system,
            max_tokens,
            temperature,
        } => {
            let mut messages = Vec::new();
            if let Some(system) = system {
                messages.push(Message::system(system));
            }
            messages.push(Message::user(prompt));

            let mut request = CompletionRequest::new(messages);
            request.model = model;
            request.params.max_tokens = max_tokens;
            request.params.temperature = temperature;

            if stream {
                stream_completion(&client, &provider, &request).await?;
            } else {
                let response = client.send(&provider, &request).await?;
                println!("{}", response.content);
                for call in &response.tool_calls {
                    println!("tool call {} {}({})", call.id, call.name, call.arguments);
                }
                tracing::info!(
                    model = %response.model,
                    finish_reason = ?response.finish_reason,
                    total_tokens = response.usage.total_tokens,
                    "completion finished"
                );
            }
        }
        Command::Models { provider } => {
            for (id, name) in client.list_models(&provider).await? {
                println!("{id}\t{name}");
            }
        }
        Command::Test { provider } => {
            let result = client.test_connection(&provider).await?;
            println!("{}", result.message);
            if !result.success {
                anyhow::bail!("connection test for '{provider}' failed");
            }
        }
    }

    Ok(())
}

/// Print chunks as they arrive; Ctrl+C stops the stream
async fn stream_completion(client: &LlmClient, provider: &str, request: &CompletionRequest) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling stream");
            cancel_on_signal.cancel();
        }
    });

    let mut stdout = std::io::stdout();
    let response = client
        .send_streaming_with_cancel(provider, request, &cancel, &mut |chunk: &StreamChunk| {
            if let StreamChunk::Content { text } = chunk {
                let _ = write!(stdout, "{text}");
                let _ = stdout.flush();
            }
        })
        .await?;
    println!();

    tracing::info!(
        model = %response.model,
        finish_reason = ?response.finish_reason,
        total_tokens = response.usage.total_tokens,
        "stream finished"
    );
    Ok(())
}
