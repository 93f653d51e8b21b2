//! Level-wise FDR filtering and reconciliation of protein- and PSM-level
//! results

use crate::decoy::is_decoy;
use crate::fdr::{filter_ions, filter_peptides, filter_proteins, filter_psms, LevelFilter, Threshold};
use crate::identification::{Level, Psm};
use crate::picked::picked_proteins;
use crate::protein::{proteins, proteins_mut, Protein, ProteinGroup};
use crate::razor::{razor_proteins, RazorSnapshot};
use crate::Error;
use fnv::{FnvHashMap, FnvHashSet};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// How protein-level results feed back into PSM-level filtering
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reconciliation {
    /// Filter every level on its own
    #[default]
    Independent,
    /// Re-filter accepted PSMs that map to accepted proteins
    Sequential,
    /// Re-filter all PSMs that map to accepted target proteins or their decoys
    TwoDimensional,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
/// Filtering options as supplied by the user; missing values take defaults
pub struct FilterBuilder {
    pub psm_fdr: Option<f64>,
    pub peptide_fdr: Option<f64>,
    pub ion_fdr: Option<f64>,
    pub protein_fdr: Option<f64>,
    /// Minimum probability of the best supporting peptide of a protein
    pub min_peptide_probability: Option<f64>,
    /// Minimum protein probability, used when razor assignment is off
    pub min_protein_probability: Option<f64>,
    /// Use this prefix for decoy proteins
    pub decoy_tag: Option<String>,
    pub picked: Option<bool>,
    pub razor: Option<bool>,
    pub reconciliation: Option<Reconciliation>,
}

fn rate(name: &str, value: Option<f64>, default: f64) -> f64 {
    match value {
        Some(v) if v.is_nan() => {
            warn!("`{}` is not a number, using {}", name, default);
            default
        }
        Some(v) if !(0.0..=1.0).contains(&v) => {
            warn!("`{}` = {} is outside of [0, 1], clamping", name, v);
            v.clamp(0.0, 1.0)
        }
        Some(v) => v,
        None => default,
    }
}

impl FilterBuilder {
    pub fn make_parameters(self) -> FilterParameters {
        FilterParameters {
            psm_fdr: rate("psm_fdr", self.psm_fdr, 0.01),
            peptide_fdr: rate("peptide_fdr", self.peptide_fdr, 0.01),
            ion_fdr: rate("ion_fdr", self.ion_fdr, 0.01),
            protein_fdr: rate("protein_fdr", self.protein_fdr, 0.01),
            min_peptide_probability: rate(
                "min_peptide_probability",
                self.min_peptide_probability,
                0.7,
            ),
            min_protein_probability: rate(
                "min_protein_probability",
                self.min_protein_probability,
                0.5,
            ),
            decoy_tag: self.decoy_tag.unwrap_or_else(|| "rev_".into()),
            picked: self.picked.unwrap_or(false),
            razor: self.razor.unwrap_or(false),
            reconciliation: self.reconciliation.unwrap_or_default(),
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct FilterParameters {
    pub psm_fdr: f64,
    pub peptide_fdr: f64,
    pub ion_fdr: f64,
    pub protein_fdr: f64,
    pub min_peptide_probability: f64,
    pub min_protein_probability: f64,
    pub decoy_tag: String,
    pub picked: bool,
    pub razor: bool,
    pub reconciliation: Reconciliation,
}

impl Default for FilterParameters {
    fn default() -> Self {
        FilterBuilder::default().make_parameters()
    }
}

#[derive(Clone, Debug)]
pub struct FilterResults {
    pub psms: LevelFilter<Psm>,
    pub peptides: LevelFilter<Psm>,
    pub ions: LevelFilter<Psm>,
    pub proteins: Option<LevelFilter<Protein>>,
    /// Protein groups annotated with picked/razor flags
    pub protein_groups: Vec<ProteinGroup>,
    /// Target proteins and their decoys used by two-dimensional filtering.
    /// Decoys missing from the input are synthesized as placeholders, so
    /// this is not necessarily a subset of the input.
    pub mirror: Option<Vec<Protein>>,
    pub razor: Option<RazorSnapshot>,
    /// PSMs moved to their razor protein
    pub reassigned: usize,
    /// Every threshold found, in the order it was computed
    pub thresholds: Vec<Threshold>,
}

struct Levels {
    psms: LevelFilter<Psm>,
    peptides: LevelFilter<Psm>,
    ions: LevelFilter<Psm>,
}

impl Levels {
    fn thresholds(&self) -> [Threshold; 3] {
        [
            self.psms.threshold,
            self.peptides.threshold,
            self.ions.threshold,
        ]
    }
}

struct ProteinStage {
    groups: Vec<ProteinGroup>,
    filtered: LevelFilter<Protein>,
    razor: Option<RazorSnapshot>,
}

/// Move every record whose peptide has a razor protein onto that protein.
/// The displaced protein becomes an alternative, and the razor protein is
/// no longer listed as one. Returns how many records changed.
pub fn apply_razor_assignment(
    records: &mut [Psm],
    snapshot: Option<&RazorSnapshot>,
) -> Result<usize, Error> {
    let snapshot = snapshot.ok_or(Error::MissingRazorSnapshot)?;
    let mut reassigned = 0;
    for psm in records.iter_mut() {
        let owner = match snapshot.owner(&psm.peptide) {
            Some(owner) if owner != psm.protein => owner,
            _ => continue,
        };
        let displaced = std::mem::replace(&mut psm.protein, owner.to_string());
        *psm.alternative_proteins.entry(displaced).or_insert(0) += 1;
        psm.alternative_proteins.remove(owner);
        reassigned += 1;
    }
    Ok(reassigned)
}

/// Keep PSMs whose primary or any alternative protein is in `names`
fn retain_mapped(psms: &[Psm], names: &FnvHashSet<&str>) -> Vec<Psm> {
    psms.iter()
        .filter(|psm| psm.protein_names().any(|name| names.contains(name)))
        .cloned()
        .collect()
}

pub struct Orchestrator {
    pub parameters: FilterParameters,
}

impl Orchestrator {
    pub fn new(parameters: FilterParameters) -> Self {
        Orchestrator { parameters }
    }

    fn filter_levels(&self, psms: &[Psm]) -> Result<Levels, Error> {
        let p = &self.parameters;
        let (psm, (peptide, ion)) = rayon::join(
            || filter_psms(psms, &p.decoy_tag, p.psm_fdr),
            || {
                rayon::join(
                    || filter_peptides(psms, &p.decoy_tag, p.peptide_fdr),
                    || filter_ions(psms, &p.decoy_tag, p.ion_fdr),
                )
            },
        );
        Ok(Levels {
            psms: psm?,
            peptides: peptide?,
            ions: ion?,
        })
    }

    /// Does a protein enter the protein-level FDR population?
    fn select(&self, protein: &Protein) -> bool {
        let p = &self.parameters;
        let admitted = match (p.razor, p.picked) {
            (true, true) => protein.picked && protein.has_razor,
            (true, false) => protein.has_razor,
            (false, true) => protein.picked && protein.probability >= p.min_protein_probability,
            (false, false) => protein.probability >= p.min_protein_probability,
        };
        admitted && protein.top_peptide_probability >= p.min_peptide_probability
    }

    fn protein_stage(&self, groups: &[ProteinGroup]) -> Result<ProteinStage, Error> {
        let p = &self.parameters;
        let mut groups = groups.to_vec();

        if p.picked {
            picked_proteins(&mut groups, &p.decoy_tag);
        }
        let razor = match p.razor {
            true => Some(razor_proteins(&mut groups)),
            false => {
                for protein in proteins_mut(&mut groups) {
                    protein.top_peptide_probability = protein.top_ion_probability();
                }
                None
            }
        };

        let selected = proteins(&groups)
            .filter(|protein| self.select(protein))
            .cloned()
            .collect::<Vec<_>>();
        info!(
            "{} of {} proteins eligible for protein-level FDR",
            selected.len(),
            proteins(&groups).count()
        );

        let filtered = filter_proteins(&selected, &p.decoy_tag, p.protein_fdr)?;
        Ok(ProteinStage {
            groups,
            filtered,
            razor,
        })
    }

    /// Accepted target proteins, each followed by its decoy counterpart: the
    /// decoy record from the unfiltered population when there is one, an
    /// empty placeholder otherwise
    pub fn mirror(&self, accepted: &[Protein], population: &[ProteinGroup]) -> Vec<Protein> {
        let tag = &self.parameters.decoy_tag;
        let mut decoys: FnvHashMap<&str, &Protein> = FnvHashMap::default();
        for protein in proteins(population).filter(|p| is_decoy(&p.name, tag)) {
            decoys.entry(protein.name.as_str()).or_insert(protein);
        }

        let mut seen = FnvHashSet::default();
        let mut mirror = Vec::new();
        for target in accepted.iter().filter(|p| !is_decoy(&p.name, tag)) {
            mirror.push(target.clone());
            let decoy = format!("{}{}", tag, target.name);
            if !seen.insert(decoy.clone()) {
                continue;
            }
            match decoys.get(decoy.as_str()) {
                Some(&protein) => mirror.push(protein.clone()),
                None => mirror.push(Protein::placeholder(decoy)),
            }
        }
        mirror
    }

    fn sequential(&self, levels: &Levels, stage: &ProteinStage) -> Result<Levels, Error> {
        let names = stage
            .filtered
            .accepted
            .iter()
            .map(|protein| protein.name.as_str())
            .collect::<FnvHashSet<_>>();
        let reduced = retain_mapped(&levels.psms.accepted, &names);
        info!(
            "sequential filtering: {} of {} accepted PSMs map to accepted proteins",
            reduced.len(),
            levels.psms.accepted.len()
        );
        self.filter_levels(&reduced)
    }

    fn two_dimensional(
        &self,
        psms: &[Psm],
        stage: &ProteinStage,
    ) -> Result<(Levels, Vec<Protein>, usize), Error> {
        let mirror = self.mirror(&stage.filtered.accepted, &stage.groups);
        let placeholders = mirror.iter().filter(|p| p.placeholder).count();
        let names = mirror
            .iter()
            .map(|protein| protein.name.as_str())
            .collect::<FnvHashSet<_>>();
        let reduced = retain_mapped(psms, &names);
        info!(
            "two-dimensional filtering: {} mirrored proteins ({} placeholder decoys), {} of {} PSMs",
            mirror.len(),
            placeholders,
            reduced.len(),
            psms.len()
        );

        let mut levels = self.filter_levels(&reduced)?;
        let mut reassigned = 0;
        if self.parameters.razor {
            let snapshot = stage.razor.as_ref();
            reassigned = apply_razor_assignment(&mut levels.psms.accepted, snapshot)?;
            apply_razor_assignment(&mut levels.psms.representatives, snapshot)?;
            for level in [&mut levels.peptides, &mut levels.ions] {
                apply_razor_assignment(&mut level.accepted, snapshot)?;
                apply_razor_assignment(&mut level.representatives, snapshot)?;
            }
            info!("moved {} PSMs to their razor protein", reassigned);
        }
        Ok((levels, mirror, reassigned))
    }

    /// Filter `psms` at PSM, peptide and ion level, and `groups` at protein
    /// level, then reconcile both as configured. Any failing threshold search
    /// aborts the run.
    pub fn run(&self, psms: &[Psm], groups: &[ProteinGroup]) -> Result<FilterResults, Error> {
        let time = Instant::now();
        let strategy = self.parameters.reconciliation;
        if groups.is_empty() && strategy != Reconciliation::Independent {
            return Err(Error::EmptyPopulation {
                level: Level::Protein,
            });
        }

        let (levels, stage) = rayon::join(
            || self.filter_levels(psms),
            || match groups.is_empty() {
                true => Ok(None),
                false => self.protein_stage(groups).map(Some),
            },
        );
        let levels = levels?;
        let stage = stage?;

        let mut thresholds = levels.thresholds().to_vec();
        let stage = match stage {
            Some(stage) => stage,
            None => {
                info!("filtered without proteins in {:?}ms", time.elapsed().as_millis());
                return Ok(FilterResults {
                    psms: levels.psms,
                    peptides: levels.peptides,
                    ions: levels.ions,
                    proteins: None,
                    protein_groups: Vec::new(),
                    mirror: None,
                    razor: None,
                    reassigned: 0,
                    thresholds,
                });
            }
        };
        thresholds.push(stage.filtered.threshold);

        let (levels, mirror, reassigned) = match strategy {
            Reconciliation::Independent => (levels, None, 0),
            Reconciliation::Sequential => (self.sequential(&levels, &stage)?, None, 0),
            Reconciliation::TwoDimensional => {
                let (levels, mirror, reassigned) = self.two_dimensional(psms, &stage)?;
                (levels, Some(mirror), reassigned)
            }
        };
        if strategy != Reconciliation::Independent {
            thresholds.extend(levels.thresholds());
        }

        info!("filtered in {:?}ms", time.elapsed().as_millis());
        Ok(FilterResults {
            psms: levels.psms,
            peptides: levels.peptides,
            ions: levels.ions,
            proteins: Some(stage.filtered),
            protein_groups: stage.groups,
            mirror,
            razor: stage.razor,
            reassigned,
            thresholds,
        })
    }
}
