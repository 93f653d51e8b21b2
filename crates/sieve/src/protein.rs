use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
/// Peptide-ion evidence supporting a protein
pub struct PeptideIon {
    pub sequence: String,
    pub charge: u8,
    pub initial_probability: f64,
    /// Fraction of this peptide's evidence apportioned to the protein
    pub weight: f64,
    pub group_weight: f64,
    /// Total number of peptides observed for the protein
    pub total_peptides: u32,
    pub group_sibling_id: String,
    /// Peptide maps to this protein only
    #[serde(default)]
    pub unique: bool,
    /// Other proteins this peptide is known to map to
    #[serde(default)]
    pub alternate_parents: Vec<String>,
    #[serde(default)]
    pub razor: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Protein {
    pub name: String,
    pub probability: f64,
    /// Proteins that cannot be told apart from this one by their evidence
    #[serde(default)]
    pub indistinguishable: Vec<String>,
    #[serde(default)]
    pub ions: Vec<PeptideIon>,

    #[serde(default)]
    pub top_peptide_probability: f64,
    #[serde(default)]
    pub picked: bool,
    #[serde(default)]
    pub has_razor: bool,
    /// Decoy synthesized by the two-dimensional mirror, with no evidence
    #[serde(default)]
    pub placeholder: bool,
}

impl Protein {
    /// Initial probability of the best peptide ion, or 0 without evidence
    pub fn top_ion_probability(&self) -> f64 {
        self.ions
            .iter()
            .map(|ion| ion.initial_probability)
            .fold(0.0, f64::max)
    }

    /// Empty decoy standing in for a missing counterpart
    pub fn placeholder(name: String) -> Self {
        Protein {
            name,
            placeholder: true,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
/// Cluster of competing proteins produced by protein inference
pub struct ProteinGroup {
    pub group_number: u32,
    pub probability: f64,
    pub proteins: Vec<Protein>,
}

/// Iterate over every protein of every group
pub fn proteins(groups: &[ProteinGroup]) -> impl Iterator<Item = &Protein> {
    groups.iter().flat_map(|group| group.proteins.iter())
}

pub fn proteins_mut(groups: &mut [ProteinGroup]) -> impl Iterator<Item = &mut Protein> {
    groups.iter_mut().flat_map(|group| group.proteins.iter_mut())
}
