//! `hchb-export payor`: Patient -> Account (by subject) -> guarantor -> Organization.

use anyhow::{Context, Result};
use log::debug;
use serde_json::Value;

use crate::api::{FetchOptions, FhirClient, SearchQuery};
use crate::cli::context::RunContext;
use crate::output::format::{status, OutputMode};
use crate::output::json::to_json;
use crate::output::progress::fetch_spinner;
use crate::output::table::format_patient_payor;
use crate::resolve::find_patient_payor;

pub const DEFAULT_DIR: &str = "output";

/// Pick a patient to demo with: the first one the API returns.
pub fn sample_patient_id(client: &mut FhirClient, ctx: &RunContext) -> Result<String> {
    let options = FetchOptions {
        page_size: 1,
        max_pages: Some(1),
        ..FetchOptions::from_defaults(&ctx.settings.request)
    };

    let results = client
        .search("Patient", &SearchQuery::new(), &options)
        .context("Error fetching sample patient")?;

    results
        .entries
        .iter()
        .find_map(|p| p.get("id").and_then(Value::as_str))
        .map(str::to_string)
        .context("Could not fetch sample patient")
}

pub fn run(
    client: &mut FhirClient,
    patient_id: Option<&str>,
    no_export: bool,
    ctx: &RunContext,
) -> Result<()> {
    let patient_id = match patient_id {
        Some(id) => id.to_string(),
        None => {
            status("No patient_id provided, fetching sample patient...");
            sample_patient_id(client, ctx)?
        }
    };
    debug!("Resolving payor for patient {}", patient_id);
    status(format_args!("Fetching payor for patient: {}", patient_id));

    let spinner = fetch_spinner("Resolving accounts and payors...", ctx.output_mode);
    let result = find_patient_payor(client, &patient_id);
    spinner.finish_and_clear();
    let result =
        result.with_context(|| format!("Error fetching payor for patient {}", patient_id))?;

    if result.payor_ids.is_empty() {
        status("No payors found for this patient");
        if ctx.output_mode == OutputMode::Json {
            println!("{}", to_json(&result));
        }
        return Ok(());
    }

    let exported = if ctx.settings.export_json && !no_export {
        let exporter = ctx.exporter(DEFAULT_DIR);
        Some(exporter.export(&format!("patient_payor_{}", patient_id), &result)?)
    } else {
        None
    };

    println!(
        "{}",
        ctx.output_mode.render(&result, || format_patient_payor(&result))
    );

    if let Some(path) = exported {
        status(format_args!("Exported to {}", path.display()));
    }

    Ok(())
}
