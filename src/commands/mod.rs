pub mod patient;
pub mod patients;
pub mod payor;

use anyhow::Result;

use crate::api::{self, FhirClient};
use crate::cli::context::RunContext;

/// Build an authenticated client from the loaded settings.
pub fn connect(ctx: &RunContext, token: Option<&str>) -> Result<FhirClient> {
    let tokens = api::resolve_token_source(token, &ctx.settings)?;
    let base_url = ctx.settings.api_base_url()?;
    FhirClient::new(
        base_url,
        ctx.settings.request.timeout,
        tokens,
    )
}
