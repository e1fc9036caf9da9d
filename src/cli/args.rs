use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::api::SearchQuery;

fn parse_search_param(s: &str) -> Result<(String, String), String> {
    SearchQuery::parse_pair(s)
}

#[derive(Parser, Debug)]
#[command(
    name = "hchb-export",
    version = env!("HCHB_VERSION"),
    about = "Export Patient and payor data from the HCHB FHIR API"
)]
pub struct Cli {
    /// Print results as JSON on stdout instead of a summary
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Use UTC instead of local time for export file timestamps
    #[arg(long, global = true)]
    pub utc: bool,

    /// Use a specific bearer token instead of exchanging agency credentials
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Write export files here instead of the command's default directory
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Enable verbose output for debugging API calls
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search Patients and export the results
    #[command(visible_alias = "ls")]
    Patients {
        #[command(flatten)]
        filters: PatientFilters,

        /// Results per page (defaults to HCHB_PAGE_SIZE or 100)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        page_size: Option<u32>,

        /// Maximum pages to fetch, 0 = no limit (defaults to HCHB_MAX_PAGES or 1)
        #[arg(long)]
        max_pages: Option<u32>,

        /// Include inactive patients (don't add active=true)
        #[arg(long)]
        include_inactive: bool,

        /// Don't write an export file
        #[arg(long)]
        no_export: bool,
    },

    /// Show a single Patient by FHIR ID
    Patient {
        /// Patient FHIR ID
        id: String,

        /// Don't write an export file
        #[arg(long)]
        no_export: bool,
    },

    /// Find a patient's payor organizations (Patient -> Account -> Organization)
    #[command(visible_alias = "patient-payor")]
    Payor {
        /// Patient FHIR ID (fetches a sample patient if omitted)
        #[arg(long, alias = "patient_id")]
        patient_id: Option<String>,

        /// Don't write an export file
        #[arg(long)]
        no_export: bool,
    },

    /// Print a bearer token for the API
    Token,
}

/// Patient search parameters.
#[derive(Args, Debug, Default)]
pub struct PatientFilters {
    /// Identifier, e.g. MRN
    #[arg(long)]
    pub identifier: Option<String>,

    /// Any part of the name
    #[arg(long)]
    pub name: Option<String>,

    /// Family name
    #[arg(long)]
    pub family: Option<String>,

    /// Given name
    #[arg(long)]
    pub given: Option<String>,

    /// male, female, other, unknown
    #[arg(long)]
    pub gender: Option<String>,

    /// Birth date with optional prefix [e.g., 1950-01-01, ge1950-01-01]
    #[arg(long)]
    pub birthdate: Option<String>,

    #[arg(long)]
    pub address_city: Option<String>,

    #[arg(long)]
    pub address_state: Option<String>,

    #[arg(long)]
    pub address_postalcode: Option<String>,

    /// Extra search parameter passed through as-is (repeatable) [e.g., --param _lastUpdated=ge2024-01-01]
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_search_param)]
    pub params: Vec<(String, String)>,
}

impl PatientFilters {
    /// Build the search query. Typed flags win over `--param` for the same key.
    pub fn to_query(&self) -> SearchQuery {
        let mut query: SearchQuery = self.params.iter().cloned().collect();

        let typed = [
            ("identifier", &self.identifier),
            ("name", &self.name),
            ("family", &self.family),
            ("given", &self.given),
            ("gender", &self.gender),
            ("birthdate", &self.birthdate),
            ("address-city", &self.address_city),
            ("address-state", &self.address_state),
            ("address-postalcode", &self.address_postalcode),
        ];
        for (key, value) in typed {
            if let Some(value) = value {
                query.set(key, value.as_str());
            }
        }

        query
    }
}
