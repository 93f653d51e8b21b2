use anyhow::{ensure, Context};
use clap::ArgMatches;
use sieve_core::fdr::Threshold;
use sieve_core::pipeline::{FilterBuilder, FilterParameters, Reconciliation};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Serialize)]
/// Actual filtering parameters - may include overrides or default values not set by user
pub struct Search {
    pub version: String,
    pub filter: FilterParameters,
    pub psms: String,
    pub proteins: Option<String>,
    pub output_paths: Vec<String>,

    /// Filled in once filtering has finished
    pub thresholds: Vec<Threshold>,
    pub razor_reassigned: usize,

    #[serde(skip_serializing)]
    pub output_directory: PathBuf,
}

#[derive(Deserialize, Default)]
/// Input parameters deserialized from JSON file
pub struct Input {
    /// JSON array of identification records
    pub psms: Option<String>,
    /// JSON array of protein groups, required for protein-level filtering
    pub proteins: Option<String>,
    pub output_directory: Option<String>,
    #[serde(default)]
    pub filter: FilterBuilder,
}

impl Input {
    pub fn from_arguments(matches: ArgMatches) -> anyhow::Result<Self> {
        let path = matches
            .get_one::<String>("parameters")
            .context("missing parameter file")?;
        let mut input = Input::load(path)
            .with_context(|| format!("Failed to read parameters from `{path}`"))?;

        // Handle JSON configuration overrides
        if let Some(output_directory) = matches.get_one::<String>("output_directory") {
            log::trace!("overriding `output_directory` parameter.");
            input.output_directory = Some(output_directory.into());
        }
        if let Some(psms) = matches.get_one::<String>("identifications") {
            log::trace!("overriding `psms` parameter.");
            input.psms = Some(psms.into());
        }
        if let Some(proteins) = matches.get_one::<String>("protein_groups") {
            log::trace!("overriding `proteins` parameter.");
            input.proteins = Some(proteins.into());
        }
        if let Some(tag) = matches.get_one::<String>("decoy_tag") {
            input.filter.decoy_tag = Some(tag.into());
        }

        for (arg, rate) in [
            ("psm", &mut input.filter.psm_fdr),
            ("peptide", &mut input.filter.peptide_fdr),
            ("ion", &mut input.filter.ion_fdr),
            ("protein", &mut input.filter.protein_fdr),
        ] {
            if let Some(value) = matches.get_one::<f64>(arg) {
                log::trace!("overriding `filter.{arg}_fdr` parameter.");
                *rate = Some(*value);
            }
        }

        if matches.get_flag("picked") {
            input.filter.picked = Some(true);
        }
        if matches.get_flag("razor") {
            input.filter.razor = Some(true);
        }
        if matches.get_flag("sequential") {
            input.filter.reconciliation = Some(Reconciliation::Sequential);
        }
        if matches.get_flag("2d") {
            input.filter.reconciliation = Some(Reconciliation::TwoDimensional);
        }

        ensure!(
            input.psms.is_some(),
            "`psms` must be set. For more information try '--help'"
        );

        Ok(input)
    }

    pub fn load<S: AsRef<str>>(path: S) -> anyhow::Result<Self> {
        sieve_core::read_json(path.as_ref()).map_err(anyhow::Error::from)
    }

    pub fn build(self) -> anyhow::Result<Search> {
        let filter = self.filter.make_parameters();

        let psms = self
            .psms
            .context("`psms` must be set. For more information try '--help'")?;
        ensure!(
            self.proteins.is_some() || filter.reconciliation == Reconciliation::Independent,
            "{:?} reconciliation requires `proteins`",
            filter.reconciliation
        );
        if self.proteins.is_none() && (filter.picked || filter.razor) {
            log::warn!("`picked` and `razor` have no effect without `proteins`");
        }

        let output_directory = match self.output_directory {
            Some(path) => {
                let path = PathBuf::from(path);
                std::fs::create_dir_all(&path).with_context(|| {
                    format!("Failed to create output directory `{}`", path.display())
                })?;
                path
            }
            None => std::env::current_dir()?,
        };

        Ok(Search {
            version: clap::crate_version!().into(),
            filter,
            psms,
            proteins: self.proteins,
            output_paths: Vec::new(),
            thresholds: Vec::new(),
            razor_reassigned: 0,
            output_directory,
        })
    }
}
