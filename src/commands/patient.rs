//! `hchb-export patient <id>`: look up one Patient.

use anyhow::{bail, Result};

use crate::api::FhirClient;
use crate::cli::context::RunContext;
use crate::output::format::status;
use crate::output::table::format_patient_detail;

use super::patients::DEFAULT_DIR;

pub fn run(client: &mut FhirClient, id: &str, no_export: bool, ctx: &RunContext) -> Result<()> {
    let Some(patient) = client.read_optional("Patient", id)? else {
        bail!("No patient found with ID '{}'", id);
    };

    let exported = if ctx.settings.export_json && !no_export {
        let exporter = ctx.exporter(DEFAULT_DIR);
        Some(exporter.export(&format!("patient_{}", id), &patient)?)
    } else {
        None
    };

    println!(
        "{}",
        ctx.output_mode.render(&patient, || format_patient_detail(&patient))
    );

    if let Some(path) = exported {
        status(format_args!("Exported to {}", path.display()));
    }

    Ok(())
}
