//! Peptide-spectrum matches and the keys used to collapse them into
//! peptide and peptide-ion groups.

use crate::Error;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::Hash;
use std::str::FromStr;

/// Granularity at which an FDR threshold is searched for
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Psm,
    Peptide,
    Ion,
    Protein,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Psm => write!(f, "psm"),
            Level::Peptide => write!(f, "peptide"),
            Level::Ion => write!(f, "ion"),
            Level::Protein => write!(f, "protein"),
        }
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "psm" => Ok(Level::Psm),
            "peptide" => Ok(Level::Peptide),
            "ion" => Ok(Level::Ion),
            "protein" => Ok(Level::Protein),
            _ => Err(Error::InvalidLevel(s.into())),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
/// A single scored peptide-spectrum match, as handed over by the parser
pub struct Psm {
    pub spectrum: String,
    pub peptide: String,
    /// Primary protein assignment
    pub protein: String,
    /// Other proteins the peptide maps to, with occurrence counts
    #[serde(default)]
    pub alternative_proteins: BTreeMap<String, u32>,
    pub charge: u8,
    /// PeptideProphet-style probability, higher is better
    pub probability: f64,
    #[serde(default)]
    pub calc_neutral_mass: f64,
    #[serde(default)]
    pub precursor_neutral_mass: f64,
    #[serde(default)]
    pub retention_time: f64,
}

impl Psm {
    /// Does this PSM name `protein`, either as primary or alternative protein?
    pub fn maps_to(&self, protein: &str) -> bool {
        self.protein == protein || self.alternative_proteins.contains_key(protein)
    }

    /// All protein names carried by this PSM (primary first)
    pub fn protein_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.protein.as_str())
            .chain(self.alternative_proteins.keys().map(|s| s.as_str()))
    }
}

/// Round to 4 decimal places, the precision used for neutral masses in ion
/// keys and for comparing FDR values against a target
pub fn round4(x: f64) -> f64 {
    (x * 1e4).round() / 1e4
}

/// Peptide-ion identity: sequence, charge and neutral mass at 1e-4 Da
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IonKey {
    pub sequence: String,
    pub charge: u8,
    mass: i64,
}

impl IonKey {
    pub fn new(psm: &Psm) -> Self {
        IonKey {
            sequence: psm.peptide.clone(),
            charge: psm.charge,
            mass: (psm.calc_neutral_mass * 1e4).round() as i64,
        }
    }

    pub fn mass(&self) -> f64 {
        self.mass as f64 / 1e4
    }
}

/// Collapse `psms` by `key`. Groups are returned in order of first
/// appearance, each holding indices into `psms` in input order.
pub fn group_by<K, F>(psms: &[Psm], key: F) -> Vec<Vec<usize>>
where
    K: Eq + Hash,
    F: Fn(&Psm) -> K,
{
    let mut slots: FnvHashMap<K, usize> = FnvHashMap::default();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (ix, psm) in psms.iter().enumerate() {
        let slot = *slots.entry(key(psm)).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(ix);
    }
    groups
}

/// Index of the highest-probability member of a group; the earliest member
/// wins ties
pub fn representative(psms: &[Psm], members: &[usize]) -> usize {
    let mut best = members[0];
    for &ix in &members[1..] {
        if psms[ix].probability > psms[best].probability {
            best = ix;
        }
    }
    best
}

#[cfg(test)]
mod test {
    use super::*;

    fn psm(peptide: &str, charge: u8, mass: f64, probability: f64) -> Psm {
        Psm {
            peptide: peptide.into(),
            charge,
            calc_neutral_mass: mass,
            probability,
            ..Default::default()
        }
    }

    #[test]
    fn level_names() {
        assert_eq!("Peptide".parse::<Level>().unwrap(), Level::Peptide);
        assert_eq!(Level::Ion.to_string(), "ion");
        assert!(matches!(
            "spectrum".parse::<Level>(),
            Err(Error::InvalidLevel(s)) if s == "spectrum"
        ));
    }

    #[test]
    fn ion_keys_round_mass() {
        let a = psm("PEPTIDE", 2, 799.35993, 0.9);
        let b = psm("PEPTIDE", 2, 799.359934, 0.8);
        let c = psm("PEPTIDE", 3, 799.35993, 0.8);
        assert_eq!(IonKey::new(&a), IonKey::new(&b));
        assert_ne!(IonKey::new(&a), IonKey::new(&c));
        assert_eq!(IonKey::new(&a).mass(), 799.3599);
    }

    #[test]
    fn representatives_prefer_earliest_on_ties() {
        let psms = vec![
            psm("AAAK", 2, 400.0, 0.5),
            psm("CCCK", 2, 500.0, 0.9),
            psm("AAAK", 3, 400.0, 0.7),
            psm("AAAK", 2, 400.0, 0.7),
        ];
        let groups = group_by(&psms, |p| p.peptide.clone());
        assert_eq!(groups, vec![vec![0, 2, 3], vec![1]]);
        assert_eq!(representative(&psms, &groups[0]), 2);

        let ions = group_by(&psms, IonKey::new);
        assert_eq!(ions, vec![vec![0, 3], vec![1], vec![2]]);
        assert_eq!(representative(&psms, &ions[0]), 3);
    }
}
