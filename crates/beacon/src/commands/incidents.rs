//! `beacon incidents`: one pull, printed and exited.

use tokio_util::sync::CancellationToken;

use beacon_api::IncidentClient;
use beacon_core::{CoreError, HttpIncidentSource, IncidentSource};

use crate::cli::{GlobalOpts, IncidentsArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

pub async fn handle(args: &IncidentsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = config::resolve(global)?;
    let engine = resolved.engine;
    let filter = config::filter_from_args(&args.filter, &engine.initial_filter)?;

    let client = IncidentClient::new(engine.server_url.clone(), engine.token.clone(), engine.timeout)
        .map_err(CoreError::from)?;
    let source = HttpIncidentSource::new(client, engine.page_limit);

    let mut records = source.fetch(&filter, &CancellationToken::new()).await?;
    records.retain(|r| filter.matches(r));
    tracing::debug!(count = records.len(), profile = %resolved.profile, "pulled incidents");

    let rendered = output::render_incidents(
        global.output,
        &records,
        output::should_color(global.color),
    )?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}
