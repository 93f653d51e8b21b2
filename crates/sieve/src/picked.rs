//! Picked protein FDR: each target protein competes with its own decoy and
//! only the better-scoring member of the pair is retained
//!
//! Savitski et al., https://pubmed.ncbi.nlm.nih.gov/25987413/

use crate::decoy::is_decoy;
use crate::protein::{proteins, proteins_mut, ProteinGroup};
use log::info;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Competition {
    forward: Option<f64>,
    reverse: Option<f64>,
}

impl Competition {
    /// Which members of the pair are kept: (forward, reverse)
    fn resolve(&self) -> (bool, bool) {
        match (self.forward, self.reverse) {
            (Some(fwd), Some(rev)) if fwd > rev => (true, false),
            (Some(fwd), Some(rev)) if rev > fwd => (false, true),
            _ => (true, true),
        }
    }
}

/// Resolve target/decoy pairs from name -> score indices.
///
/// Decoys are paired with the target named by stripping the decoy tag. A
/// member without a counterpart is always kept; on an exact tie both are.
pub fn compete(
    targets: &BTreeMap<String, f64>,
    decoys: &BTreeMap<String, f64>,
    decoy_tag: &str,
) -> BTreeMap<String, bool> {
    let mut pairs: BTreeMap<&str, Competition> = BTreeMap::new();
    for (name, &score) in targets {
        pairs.entry(name.as_str()).or_default().forward = Some(score);
    }
    for (name, &score) in decoys {
        let forward = name.strip_prefix(decoy_tag).unwrap_or(name);
        pairs.entry(forward).or_default().reverse = Some(score);
    }

    let mut picked = BTreeMap::new();
    for (forward, competition) in pairs {
        let (keep_forward, keep_reverse) = competition.resolve();
        if competition.forward.is_some() {
            picked.insert(forward.to_string(), keep_forward);
        }
        if competition.reverse.is_some() {
            picked.insert(format!("{}{}", decoy_tag, forward), keep_reverse);
        }
    }
    picked
}

/// Run the competition over every protein of `groups`, scoring each protein
/// by its best initial peptide-ion probability, and set the `picked` flags.
pub fn picked_proteins(groups: &mut [ProteinGroup], decoy_tag: &str) -> BTreeMap<String, bool> {
    let mut targets: BTreeMap<String, f64> = BTreeMap::new();
    let mut decoys: BTreeMap<String, f64> = BTreeMap::new();
    for protein in proteins(groups) {
        let index = match is_decoy(&protein.name, decoy_tag) {
            true => &mut decoys,
            false => &mut targets,
        };
        let score = index.entry(protein.name.clone()).or_insert(f64::MIN);
        *score = score.max(protein.top_ion_probability());
    }

    let picked = compete(&targets, &decoys, decoy_tag);
    for protein in proteins_mut(groups) {
        protein.picked = picked.get(&protein.name).copied().unwrap_or(true);
    }

    info!(
        "picked {} of {} proteins",
        picked.values().filter(|&&keep| keep).count(),
        picked.len()
    );
    picked
}
