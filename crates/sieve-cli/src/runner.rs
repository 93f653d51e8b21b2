use super::input::Search;
use anyhow::Context;
use log::info;
use sieve_core::identification::Psm;
use sieve_core::pipeline::{FilterResults, Orchestrator};
use sieve_core::protein::ProteinGroup;
use std::path::PathBuf;
use std::time::Instant;

pub struct Runner {
    pub parameters: Search,
    psms: Vec<Psm>,
    groups: Vec<ProteinGroup>,
    start: Instant,
}

impl Runner {
    pub fn new(parameters: Search) -> anyhow::Result<Self> {
        let start = Instant::now();

        let psms: Vec<Psm> = sieve_core::read_json(&parameters.psms)
            .with_context(|| format!("Failed to read identifications from `{}`", parameters.psms))?;
        let groups: Vec<ProteinGroup> = match &parameters.proteins {
            Some(path) => sieve_core::read_json(path)
                .with_context(|| format!("Failed to read protein groups from `{}`", path))?,
            None => Vec::new(),
        };

        info!(
            "loaded {} identifications, {} protein groups in {:#?}",
            psms.len(),
            groups.len(),
            start.elapsed()
        );

        Ok(Self {
            parameters,
            psms,
            groups,
            start,
        })
    }

    // Create a path for `file_name` in the specified output directory
    pub(crate) fn make_path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        self.parameters.output_directory.join(file_name.as_ref())
    }

    fn write_outputs(&mut self, results: &FilterResults) -> anyhow::Result<()> {
        let decoy_tag = self.parameters.filter.decoy_tag.clone();
        let outputs = vec![
            self.write_psms("psm.tsv", &results.psms.accepted, &decoy_tag)?,
            self.write_psms("peptide.tsv", &results.peptides.representatives, &decoy_tag)?,
            self.write_psms("ion.tsv", &results.ions.representatives, &decoy_tag)?,
        ];
        self.parameters.output_paths.extend(outputs);

        if let Some(proteins) = &results.proteins {
            let path = self.write_proteins("protein.tsv", &proteins.accepted, &decoy_tag)?;
            self.parameters.output_paths.push(path);
        }
        if let Some(mirror) = &results.mirror {
            let path = self.write_proteins("mirror.tsv", mirror, &decoy_tag)?;
            self.parameters.output_paths.push(path);
        }
        Ok(())
    }

    pub fn run(mut self) -> anyhow::Result<Search> {
        let orchestrator = Orchestrator::new(self.parameters.filter.clone());
        let results = orchestrator
            .run(&self.psms, &self.groups)
            .context("FDR filtering failed")?;

        for threshold in &results.thresholds {
            info!(
                "discovered {} target {}s at {:.2}% FDR",
                threshold.targets,
                threshold.level,
                threshold.fdr * 100.0
            );
        }

        log::trace!("writing outputs");
        self.write_outputs(&results)?;
        self.parameters.thresholds = results.thresholds;
        self.parameters.razor_reassigned = results.reassigned;

        let path = self.make_path("results.json");
        self.parameters.output_paths.push(path.display().to_string());
        println!("{}", serde_json::to_string_pretty(&self.parameters)?);

        let bytes = serde_json::to_vec_pretty(&self.parameters)?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;

        info!("finished in {}ms", self.start.elapsed().as_millis());
        Ok(self.parameters)
    }
}
