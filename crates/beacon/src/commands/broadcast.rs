//! `beacon broadcast`: send an operator broadcast over the push channel.

use std::sync::Arc;
use std::time::Duration;

use beacon_core::{BroadcastRequest, ChannelState, Engine, SilentPlayer};

use crate::cli::{BroadcastArgs, GlobalOpts, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output;

pub async fn handle(args: BroadcastArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut resolved = config::resolve(global)?;
    if !resolved.engine.push_enabled {
        return Err(CliError::PushUnavailable);
    }
    resolved.engine.sound_enabled = false;

    let engine = Engine::connect(resolved.engine, Arc::new(SilentPlayer))?;
    let result = send(&engine, args).await;
    engine.shutdown().await;

    let ack = result?;
    let rendered = match global.output {
        OutputFormat::Json => serde_json::to_string_pretty(&ack)?,
        OutputFormat::JsonCompact => serde_json::to_string(&ack)?,
        OutputFormat::Table | OutputFormat::Plain => ack
            .message
            .unwrap_or_else(|| "Broadcast delivered".into()),
    };
    output::print_output(&rendered, global.quiet);
    Ok(())
}

async fn send(
    engine: &Engine,
    args: BroadcastArgs,
) -> Result<beacon_core::BroadcastAck, CliError> {
    let wait = Duration::from_secs(args.connect_timeout);
    let mut state = engine.health().subscribe();
    let settled = tokio::time::timeout(
        wait,
        state.wait_for(|s| {
            matches!(
                s,
                ChannelState::Connected | ChannelState::Failed | ChannelState::Error { .. }
            )
        }),
    )
    .await
    .map_err(|_| CliError::Timeout {
        millis: u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
    })?
    .map(|s| s.clone())
    .map_err(|_| CliError::PushUnavailable)?;

    match settled {
        ChannelState::Connected => {}
        ChannelState::Error { message } => {
            return Err(CliError::ConnectionFailed {
                url: format!(" at {}", engine.config().server_url),
                reason: message,
            });
        }
        _ => return Err(CliError::PushUnavailable),
    }

    let request = BroadcastRequest {
        title: args.title,
        message: args.message,
        kind: args.kind,
        targets: args.targets,
    };
    Ok(engine.broadcast(&request).await?)
}
