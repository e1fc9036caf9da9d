//! `hchb-export patients`: search Patients and export the result set.

use anyhow::{Context, Result};
use log::debug;

use crate::api::{FetchOptions, FhirClient, SearchQuery};
use crate::cli::context::RunContext;
use crate::config::max_pages_limit;
use crate::output::format::{status, OutputMode};
use crate::output::progress::fetch_spinner;
use crate::output::table::format_patient_row;

pub const DEFAULT_DIR: &str = "samples";
const EXPORT_STEM: &str = "patients";

/// Per-run overrides from the command line.
#[derive(Debug, Default)]
pub struct PatientSearch {
    pub query: SearchQuery,
    pub page_size: Option<u32>,
    pub max_pages: Option<u32>,
    pub include_inactive: bool,
    pub no_export: bool,
}

impl PatientSearch {
    fn fetch_options(&self, ctx: &RunContext) -> FetchOptions {
        let mut options = FetchOptions::from_defaults(&ctx.settings.request);
        if let Some(page_size) = self.page_size {
            options.page_size = page_size;
        }
        if let Some(max_pages) = self.max_pages {
            options.max_pages = max_pages_limit(max_pages);
        }
        if self.include_inactive {
            options.active_default = None;
        }
        options
    }
}

pub fn run(client: &mut FhirClient, search: &PatientSearch, ctx: &RunContext) -> Result<()> {
    let options = search.fetch_options(ctx);
    debug!("Patient search options: {:?}", options);

    let spinner = fetch_spinner("Fetching patients...", ctx.output_mode);
    let results = client.search("Patient", &search.query, &options);
    spinner.finish_and_clear();
    let results = results.context("Patient search failed")?;

    if results.is_empty() {
        status("No patients retrieved");
        if ctx.output_mode == OutputMode::Json {
            println!("[]");
        }
        return Ok(());
    }

    let exported = if ctx.settings.export_json && !search.no_export {
        let exporter = ctx.exporter(DEFAULT_DIR);
        debug!("Exporting {} records to {}", results.len(), exporter.dir().display());
        Some(exporter.export(EXPORT_STEM, &results.entries)?)
    } else {
        None
    };

    println!(
        "{}",
        ctx.output_mode.render(&results.entries, || {
            results
                .entries
                .iter()
                .map(format_patient_row)
                .collect::<Vec<_>>()
                .join("\n")
        })
    );

    status(format_args!(
        "Retrieved {} patients ({} page(s))",
        results.len(),
        results.pages_fetched
    ));
    if let Some(total) = results.total
        && total > results.len() as u64
    {
        status(format_args!(
            "Server reported {} matching patients; raise --max-pages to fetch more",
            total
        ));
    }
    if let Some(path) = exported {
        status(format_args!("Exported {} records to {}", results.len(), path.display()));
    }

    Ok(())
}
