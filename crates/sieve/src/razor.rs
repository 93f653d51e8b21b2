//! Razor peptide assignment
//!
//! A peptide shared between several proteins is credited to exactly one of
//! them, its razor protein. Every peptide sequence and every candidate
//! protein is visited in sorted order, so the assignment does not depend on
//! the order evidence was reported in.
//!
//! 1. A candidate holding the majority (> 0.5) of the peptide's weight owns it.
//! 2. Otherwise the candidate with the highest group weight wins, then the
//!    one with the most peptides, then the smallest group sibling id.

use crate::protein::{proteins, proteins_mut, ProteinGroup};
use itertools::Itertools;
use log::info;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Instant;

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub enum Evidence {
    Known {
        weight: f64,
        group_weight: f64,
        total_peptides: u32,
    },
    /// Protein only reachable through indistinguishable or alternate-parent
    /// relations; never compared by weight
    Unknown,
}

impl Evidence {
    fn cmp_known(&self, other: &Self) -> Ordering {
        match (self, other) {
            (
                Evidence::Known {
                    weight: w1,
                    group_weight: g1,
                    total_peptides: t1,
                },
                Evidence::Known {
                    weight: w2,
                    group_weight: g2,
                    total_peptides: t2,
                },
            ) => w1
                .total_cmp(w2)
                .then_with(|| g1.total_cmp(g2))
                .then_with(|| t1.cmp(t2)),
            (Evidence::Known { .. }, Evidence::Unknown) => Ordering::Greater,
            (Evidence::Unknown, Evidence::Known { .. }) => Ordering::Less,
            (Evidence::Unknown, Evidence::Unknown) => Ordering::Equal,
        }
    }
}

/// Known sibling ids sort before missing ones
fn sibling_key(sibling: &Option<String>) -> (bool, &str) {
    (sibling.is_none(), sibling.as_deref().unwrap_or_default())
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Contender {
    pub evidence: Evidence,
    pub group_sibling_id: Option<String>,
}

impl Contender {
    /// Keep the strongest evidence reported for the same protein; equal
    /// evidence keeps the smaller sibling id
    fn merge(&mut self, other: Contender) {
        let stronger = match other.evidence.cmp_known(&self.evidence) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => {
                sibling_key(&other.group_sibling_id) < sibling_key(&self.group_sibling_id)
            }
        };
        if stronger {
            *self = other;
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RazorCandidate {
    pub sequence: String,
    /// Every protein the peptide could belong to, by name
    pub contenders: BTreeMap<String, Contender>,
    pub owner: Option<String>,
}

struct Known<'a> {
    name: &'a str,
    weight: f64,
    group_weight: f64,
    total_peptides: u32,
    sibling: &'a Option<String>,
}

impl RazorCandidate {
    fn add(&mut self, protein: &str, contender: Contender) {
        match self.contenders.get_mut(protein) {
            Some(existing) => existing.merge(contender),
            None => {
                self.contenders.insert(protein.to_string(), contender);
            }
        }
    }

    /// Contenders with known evidence, in name order
    fn known(&self) -> Vec<Known<'_>> {
        self.contenders
            .iter()
            .filter_map(|(name, contender)| match contender.evidence {
                Evidence::Known {
                    weight,
                    group_weight,
                    total_peptides,
                } => Some(Known {
                    name,
                    weight,
                    group_weight,
                    total_peptides,
                    sibling: &contender.group_sibling_id,
                }),
                Evidence::Unknown => None,
            })
            .collect()
    }

    fn majority(&self) -> Option<String> {
        self.known()
            .iter()
            .filter(|c| c.weight > 0.5)
            .exactly_one()
            .ok()
            .map(|owner| owner.name.to_string())
    }

    fn plurality(&self) -> Option<String> {
        let known = self.known();
        if known.len() <= 1 {
            return known.first().map(|c| c.name.to_string());
        }

        let max_group_weight = known
            .iter()
            .map(|c| c.group_weight)
            .fold(f64::NEG_INFINITY, f64::max);
        let tied = known
            .iter()
            .filter(|c| c.group_weight == max_group_weight)
            .collect::<Vec<_>>();
        if tied.len() == 1 {
            return Some(tied[0].name.to_string());
        }

        let mut best = tied[0];
        for &candidate in &tied[1..] {
            if candidate.total_peptides > best.total_peptides {
                best = candidate;
            }
        }
        let most_peptides = tied
            .into_iter()
            .filter(|c| c.total_peptides == best.total_peptides)
            .collect::<Vec<_>>();
        if most_peptides.len() == 1 {
            return Some(best.name.to_string());
        }

        most_peptides
            .into_iter()
            .min_by_key(|c| sibling_key(c.sibling))
            .map(|c| c.name.to_string())
    }
}

/// Resolved razor assignment. Built once by [`resolve`], then only read.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RazorSnapshot {
    candidates: BTreeMap<String, RazorCandidate>,
}

impl RazorSnapshot {
    /// Razor protein of a peptide sequence, if one could be determined
    pub fn owner(&self, sequence: &str) -> Option<&str> {
        self.candidates
            .get(sequence)
            .and_then(|candidate| candidate.owner.as_deref())
    }

    pub fn candidate(&self, sequence: &str) -> Option<&RazorCandidate> {
        self.candidates.get(sequence)
    }

    /// (sequence, owner) pairs in sequence order
    pub fn owners(&self) -> impl Iterator<Item = (&str, &str)> {
        self.candidates.iter().filter_map(|(sequence, candidate)| {
            candidate
                .owner
                .as_deref()
                .map(|owner| (sequence.as_str(), owner))
        })
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Collect one candidate per distinct peptide sequence from all groups
pub fn candidates(groups: &[ProteinGroup]) -> BTreeMap<String, RazorCandidate> {
    let mut candidates: BTreeMap<String, RazorCandidate> = BTreeMap::new();
    for protein in proteins(groups) {
        for ion in &protein.ions {
            let sibling = Some(ion.group_sibling_id.clone()).filter(|s| !s.is_empty());
            let candidate = candidates
                .entry(ion.sequence.clone())
                .or_insert_with(|| RazorCandidate {
                    sequence: ion.sequence.clone(),
                    ..Default::default()
                });

            candidate.add(
                &protein.name,
                Contender {
                    evidence: Evidence::Known {
                        weight: ion.weight,
                        group_weight: ion.group_weight,
                        total_peptides: ion.total_peptides,
                    },
                    group_sibling_id: sibling.clone(),
                },
            );
            for name in &protein.indistinguishable {
                candidate.add(
                    name,
                    Contender {
                        evidence: Evidence::Unknown,
                        group_sibling_id: sibling.clone(),
                    },
                );
            }
            for name in &ion.alternate_parents {
                candidate.add(
                    name,
                    Contender {
                        evidence: Evidence::Unknown,
                        group_sibling_id: None,
                    },
                );
            }
        }
    }
    candidates
}

/// Determine the razor protein of every candidate peptide
pub fn resolve(mut candidates: BTreeMap<String, RazorCandidate>) -> RazorSnapshot {
    for candidate in candidates.values_mut() {
        candidate.owner = candidate.majority();
    }
    for candidate in candidates.values_mut().filter(|c| c.owner.is_none()) {
        candidate.owner = candidate.plurality();
    }
    RazorSnapshot { candidates }
}

/// Flag razor ions, and recompute `has_razor` and `top_peptide_probability`
/// of every protein from its razor and unique ions
pub fn assign(groups: &mut [ProteinGroup], snapshot: &RazorSnapshot) {
    for protein in proteins_mut(groups) {
        let mut top = 0.0f64;
        let mut has_razor = false;
        for ion in protein.ions.iter_mut() {
            ion.razor = snapshot.owner(&ion.sequence) == Some(protein.name.as_str());
            if ion.razor || ion.unique {
                has_razor = true;
                top = top.max(ion.initial_probability);
            }
        }
        protein.has_razor = has_razor;
        protein.top_peptide_probability = top;
    }
}

/// Resolve razor peptides over `groups`, flag them, and return the snapshot
pub fn razor_proteins(groups: &mut [ProteinGroup]) -> RazorSnapshot {
    let time = Instant::now();
    let snapshot = resolve(candidates(groups));
    assign(groups, &snapshot);
    info!(
        "assigned {} of {} peptides to razor proteins in {:?}ms",
        snapshot.owners().count(),
        snapshot.len(),
        time.elapsed().as_millis()
    );
    snapshot
}
