//! False discovery rate control by target-decoy counting
//!
//! For every distinct score, the cumulative FDR is estimated as the number of
//! decoys over the number of targets scoring at least that well. The most
//! permissive score whose FDR stays within the requested rate becomes the
//! acceptance threshold for that level (PSM, peptide, peptide-ion, protein).
//!
//! Elias & Gygi, https://pubmed.ncbi.nlm.nih.gov/17327847/

use crate::decoy::{classify_ion_group, classify_psm, is_decoy};
use crate::identification::{
    group_by, representative, round4, IonKey, Level, Psm,
};
use crate::protein::Protein;
use crate::Error;
use fnv::FnvHashMap;
use log::{debug, info};
use serde::Serialize;

/// One entry of a flattened population: the best score of a group, and
/// whether that group is a decoy
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Candidate {
    pub score: f64,
    pub decoy: bool,
}

/// Outcome of a threshold search at one level
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Threshold {
    pub level: Level,
    /// Minimum accepted score
    pub score: f64,
    /// Cumulative FDR at `score`
    pub fdr: f64,
    /// Target groups at or above `score`
    pub targets: usize,
    /// Decoy groups at or above `score`
    pub decoys: usize,
    /// `targets + decoys`, in groups
    pub total: usize,
    /// Accepted input records. At the grouped levels this counts every
    /// member scoring at or above `score`, so it may differ from `total`.
    pub records: usize,
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct Cumulative {
    score: f64,
    fdr: f64,
    targets: usize,
    decoys: usize,
}

/// Records accepted at one level
#[derive(Clone, Debug)]
pub struct LevelFilter<T> {
    pub threshold: Threshold,
    /// Every input record scoring at or above the threshold, in input order
    pub accepted: Vec<T>,
    /// Accepted group representatives, one per peptide/ion/protein
    pub representatives: Vec<T>,
}

fn ratio(decoys: usize, targets: usize) -> f64 {
    match targets {
        0 => f64::INFINITY,
        _ => decoys as f64 / targets as f64,
    }
}

/// Cumulative FDR for every distinct score, most confident first.
///
/// Candidates are visited from the lowest score upwards while removing them
/// from running totals, so each distinct score sees the counts of everything
/// scoring at least as well. Tied candidates share a single value.
fn cumulative_fdr(candidates: &[Candidate]) -> Vec<Cumulative> {
    let mut sorted = candidates.to_vec();
    // Stable: ties keep their input order
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut decoys = sorted.iter().filter(|c| c.decoy).count();
    let mut targets = sorted.len() - decoys;

    let mut cumulative: Vec<Cumulative> = Vec::new();
    let mut last = None;
    for candidate in sorted.iter().rev() {
        if last != Some(candidate.score) {
            cumulative.push(Cumulative {
                score: candidate.score,
                fdr: ratio(decoys, targets),
                targets,
                decoys,
            });
            last = Some(candidate.score);
        }
        match candidate.decoy {
            true => decoys -= 1,
            false => targets -= 1,
        }
    }
    cumulative.reverse();
    cumulative
}

/// Walk the distinct scores from most to least confident, accepting them
/// until the first one whose FDR exceeds the target.
///
/// Protein scores are sparse, so at the protein level a single overshooting
/// score may hide an admissible one right below it: when a score is already
/// selected and its FDR is strictly under the target, the next lower score is
/// tried once.
fn search(level: Level, cumulative: &[Cumulative], target_fdr: f64) -> Option<usize> {
    let admissible = |c: &Cumulative| round4(c.fdr) <= target_fdr;

    let mut selected = None;
    for (ix, score) in cumulative.iter().enumerate() {
        if admissible(score) {
            selected = Some(ix);
            continue;
        }

        if level == Level::Protein {
            let under = selected.map_or(false, |s| round4(cumulative[s].fdr) < target_fdr);
            if under {
                if let Some(next) = cumulative.get(ix + 1).filter(|&next| admissible(next)) {
                    debug!(
                        "protein FDR straddled at score {}, accepting next score {} (FDR {:.4})",
                        score.score, next.score, next.fdr
                    );
                    selected = Some(ix + 1);
                }
            }
        }
        break;
    }
    selected
}

/// Find the most permissive score threshold at which the cumulative FDR of
/// `candidates` is at most `target_fdr`
pub fn threshold(level: Level, candidates: &[Candidate], target_fdr: f64) -> Result<Threshold, Error> {
    if candidates.iter().all(|c| c.decoy) {
        return Err(Error::EmptyPopulation { level });
    }

    let cumulative = cumulative_fdr(candidates);
    let cut = search(level, &cumulative, target_fdr)
        .map(|ix| cumulative[ix])
        .ok_or(Error::ThresholdNotReached { level, target_fdr })?;

    Ok(Threshold {
        level,
        score: cut.score,
        fdr: cut.fdr,
        targets: cut.targets,
        decoys: cut.decoys,
        total: cut.targets + cut.decoys,
        records: cut.targets + cut.decoys,
    })
}

fn report(threshold: &Threshold) {
    info!(
        "{}: {} targets, {} decoys ({} records) at score >= {:.4}, FDR {:.4}",
        threshold.level,
        threshold.targets,
        threshold.decoys,
        threshold.records,
        threshold.score,
        threshold.fdr
    );
}

/// FDR filtering of individual PSMs
pub fn filter_psms(psms: &[Psm], decoy_tag: &str, target_fdr: f64) -> Result<LevelFilter<Psm>, Error> {
    let candidates = psms
        .iter()
        .map(|psm| Candidate {
            score: psm.probability,
            decoy: classify_psm(psm, decoy_tag),
        })
        .collect::<Vec<_>>();

    let mut threshold = threshold(Level::Psm, &candidates, target_fdr)?;
    let accepted = psms
        .iter()
        .filter(|psm| psm.probability >= threshold.score)
        .cloned()
        .collect::<Vec<_>>();
    threshold.records = accepted.len();
    report(&threshold);

    Ok(LevelFilter {
        threshold,
        representatives: accepted.clone(),
        accepted,
    })
}

fn filter_grouped(
    level: Level,
    psms: &[Psm],
    groups: Vec<Vec<usize>>,
    decoy_tag: &str,
    target_fdr: f64,
) -> Result<LevelFilter<Psm>, Error> {
    let representatives = groups
        .iter()
        .map(|members| representative(psms, members))
        .collect::<Vec<_>>();

    // Labelled from the representative, which always survives filtering
    let candidates = representatives
        .iter()
        .map(|&rep| Candidate {
            score: psms[rep].probability,
            decoy: classify_ion_group(psms[rep].protein_names(), decoy_tag),
        })
        .collect::<Vec<_>>();

    let mut threshold = threshold(level, &candidates, target_fdr)?;
    let accepted = psms
        .iter()
        .filter(|psm| psm.probability >= threshold.score)
        .cloned()
        .collect::<Vec<_>>();
    threshold.records = accepted.len();
    report(&threshold);

    Ok(LevelFilter {
        threshold,
        accepted,
        representatives: representatives
            .into_iter()
            .filter(|&rep| psms[rep].probability >= threshold.score)
            .map(|rep| psms[rep].clone())
            .collect(),
    })
}

/// FDR filtering of peptides, keyed by sequence
pub fn filter_peptides(psms: &[Psm], decoy_tag: &str, target_fdr: f64) -> Result<LevelFilter<Psm>, Error> {
    let groups = group_by(psms, |psm| psm.peptide.clone());
    filter_grouped(Level::Peptide, psms, groups, decoy_tag, target_fdr)
}

/// FDR filtering of peptide ions, keyed by sequence, charge and mass
pub fn filter_ions(psms: &[Psm], decoy_tag: &str, target_fdr: f64) -> Result<LevelFilter<Psm>, Error> {
    let groups = group_by(psms, IonKey::new);
    filter_grouped(Level::Ion, psms, groups, decoy_tag, target_fdr)
}

/// Dispatch PSM-derived filtering by level. Protein filtering works on
/// protein records and is rejected here.
pub fn filter_level(
    level: Level,
    psms: &[Psm],
    decoy_tag: &str,
    target_fdr: f64,
) -> Result<LevelFilter<Psm>, Error> {
    match level {
        Level::Psm => filter_psms(psms, decoy_tag, target_fdr),
        Level::Peptide => filter_peptides(psms, decoy_tag, target_fdr),
        Level::Ion => filter_ions(psms, decoy_tag, target_fdr),
        Level::Protein => Err(Error::InvalidLevel(
            "protein filtering requires protein records".into(),
        )),
    }
}

/// FDR filtering of proteins scored by `top_peptide_probability`, keeping
/// the best record per protein name
pub fn filter_proteins(
    proteins: &[Protein],
    decoy_tag: &str,
    target_fdr: f64,
) -> Result<LevelFilter<Protein>, Error> {
    let mut slots: FnvHashMap<&str, usize> = FnvHashMap::default();
    let mut best: Vec<usize> = Vec::new();
    for (ix, protein) in proteins.iter().enumerate() {
        match slots.get(protein.name.as_str()) {
            Some(&slot) => {
                if protein.top_peptide_probability > proteins[best[slot]].top_peptide_probability {
                    best[slot] = ix;
                }
            }
            None => {
                slots.insert(&protein.name, best.len());
                best.push(ix);
            }
        }
    }

    let candidates = best
        .iter()
        .map(|&ix| Candidate {
            score: proteins[ix].top_peptide_probability,
            decoy: is_decoy(&proteins[ix].name, decoy_tag),
        })
        .collect::<Vec<_>>();

    let mut threshold = threshold(Level::Protein, &candidates, target_fdr)?;
    let accepted = proteins
        .iter()
        .filter(|protein| protein.top_peptide_probability >= threshold.score)
        .cloned()
        .collect::<Vec<_>>();
    threshold.records = accepted.len();
    report(&threshold);

    Ok(LevelFilter {
        threshold,
        accepted,
        representatives: best
            .into_iter()
            .filter(|&ix| proteins[ix].top_peptide_probability >= threshold.score)
            .map(|ix| proteins[ix].clone())
            .collect(),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn psm(protein: &str, probability: f64) -> Psm {
        Psm {
            spectrum: format!("{}.{}", protein, probability),
            peptide: format!("PEP{}K", protein),
            protein: protein.into(),
            charge: 2,
            probability,
            ..Default::default()
        }
    }

    fn block(candidates: &mut Vec<Candidate>, score: f64, targets: usize, decoys: usize) {
        candidates.extend((0..targets).map(|_| Candidate { score, decoy: false }));
        candidates.extend((0..decoys).map(|_| Candidate { score, decoy: true }));
    }

    #[test]
    fn decoys_below_targets_are_excluded() {
        let mut psms = (0..90)
            .map(|i| psm(&format!("P{}", i), 0.5 + 0.5 * i as f64 / 89.0))
            .collect::<Vec<_>>();
        psms.extend((0..10).map(|i| psm(&format!("rev_P{}", i), 0.3 * i as f64 / 9.0)));

        let filtered = filter_psms(&psms, "rev_", 0.01).unwrap();
        assert!(filtered.threshold.score >= 0.3);
        assert_eq!(filtered.threshold.targets, 90);
        assert_eq!(filtered.threshold.decoys, 0);
        assert_eq!(filtered.accepted, psms[..90].to_vec());
    }

    #[test]
    fn tied_scores_share_one_fdr() {
        let candidates = vec![
            Candidate { score: 0.8, decoy: false },
            Candidate { score: 0.9, decoy: false },
            Candidate { score: 0.8, decoy: true },
            Candidate { score: 0.7, decoy: false },
        ];
        let cumulative = cumulative_fdr(&candidates);
        let scores = cumulative.iter().map(|c| (c.score, c.fdr)).collect::<Vec<_>>();
        assert_eq!(scores, vec![(0.9, 0.0), (0.8, 0.5), (0.7, 1.0 / 3.0)]);
        assert_eq!((cumulative[1].targets, cumulative[1].decoys), (2, 1));
    }

    #[test]
    fn scan_stops_at_first_failing_score() {
        let mut candidates = Vec::new();
        block(&mut candidates, 0.9, 150, 0);
        block(&mut candidates, 0.8, 0, 2);
        block(&mut candidates, 0.7, 60, 0);

        let t = threshold(Level::Psm, &candidates, 0.01).unwrap();
        assert_eq!(t.score, 0.9);
        assert_eq!((t.targets, t.decoys), (150, 0));
    }

    #[test]
    fn protein_straddle_tries_next_score() {
        let mut candidates = Vec::new();
        block(&mut candidates, 0.9, 150, 0);
        // 2 / 150 overshoots 1%
        block(&mut candidates, 0.8, 0, 2);
        // 2 / 210 is admissible again
        block(&mut candidates, 0.7, 60, 0);

        let t = threshold(Level::Protein, &candidates, 0.01).unwrap();
        assert_eq!(t.score, 0.7);
        assert_eq!((t.targets, t.decoys), (210, 2));
    }

    #[test]
    fn protein_straddle_needs_a_selection() {
        let mut candidates = Vec::new();
        block(&mut candidates, 0.9, 0, 1);
        block(&mut candidates, 0.8, 200, 0);

        for level in [Level::Psm, Level::Protein] {
            assert!(matches!(
                threshold(level, &candidates, 0.01),
                Err(Error::ThresholdNotReached { level: l, .. }) if l == level
            ));
        }
    }

    /// Known boundary case: two consecutive overshooting scores are not
    /// looked past, even though a lower score would be admissible again
    #[test]
    fn protein_straddle_is_single_step() {
        let mut candidates = Vec::new();
        block(&mut candidates, 0.9, 150, 0);
        block(&mut candidates, 0.8, 0, 2);
        block(&mut candidates, 0.75, 0, 1);
        // 3 / 350 would be admissible
        block(&mut candidates, 0.7, 200, 0);

        let t = threshold(Level::Protein, &candidates, 0.01).unwrap();
        assert_eq!(t.score, 0.9);
    }

    #[test]
    fn exact_hit_stops_the_scan() {
        let mut candidates = Vec::new();
        block(&mut candidates, 0.9, 100, 1);
        block(&mut candidates, 0.8, 0, 1);
        block(&mut candidates, 0.7, 150, 0);

        let t = threshold(Level::Protein, &candidates, 0.01).unwrap();
        assert_eq!(t.score, 0.9);
        assert_eq!(t.fdr, 0.01);
    }

    #[test]
    fn unreachable_thresholds() {
        let psms = vec![psm("rev_A", 0.99), psm("B", 0.5), psm("C", 0.4)];
        assert!(matches!(
            filter_psms(&psms, "rev_", 0.01),
            Err(Error::ThresholdNotReached { level: Level::Psm, .. })
        ));
        // The best-scoring PSM is a decoy, so no prefix of the ranking qualifies
        assert!(matches!(
            filter_psms(&psms, "rev_", 0.5),
            Err(Error::ThresholdNotReached { .. })
        ));

        let decoys = vec![psm("rev_A", 0.99), psm("rev_B", 0.5)];
        assert!(matches!(
            filter_peptides(&decoys, "rev_", 0.01),
            Err(Error::EmptyPopulation { level: Level::Peptide })
        ));
        assert!(matches!(
            filter_psms(&[], "rev_", 0.01),
            Err(Error::EmptyPopulation { level: Level::Psm })
        ));
    }

    #[test]
    fn tighter_targets_are_stricter() {
        let mut candidates = Vec::new();
        for i in 0..50 {
            block(&mut candidates, 1.0 - i as f64 * 0.0005, 1, 0);
        }
        // Each lower block carries a denser share of decoys
        for k in 0..15 {
            block(&mut candidates, 0.9 - k as f64 * 0.01, 20 - k, 1);
        }

        let targets = [0.005, 0.01, 0.02, 0.03, 0.05, 0.1];
        let thresholds = targets
            .iter()
            .map(|&fdr| threshold(Level::Psm, &candidates, fdr).unwrap())
            .collect::<Vec<_>>();

        for (t, &fdr) in thresholds.iter().zip(&targets) {
            assert!(round4(t.fdr) <= fdr);
        }
        for pair in thresholds.windows(2) {
            assert!(pair[0].fdr <= pair[1].fdr);
            assert!(pair[0].score >= pair[1].score);
        }
        assert!(thresholds[0].fdr < thresholds[5].fdr);
    }

    #[test]
    fn peptide_groups_use_best_member() {
        let psms = vec![
            Psm { peptide: "AAAK".into(), ..psm("P1", 0.95) },
            Psm { peptide: "AAAK".into(), ..psm("P1", 0.20) },
            Psm { peptide: "CCCK".into(), ..psm("P2", 0.90) },
            Psm { peptide: "DDDK".into(), ..psm("rev_P3", 0.10) },
        ];
        let filtered = filter_peptides(&psms, "rev_", 0.01).unwrap();
        assert_eq!(filtered.threshold.score, 0.90);
        assert_eq!(filtered.representatives.len(), 2);
        assert_eq!(filtered.accepted.len(), 2);
        assert_eq!(filtered.threshold.total, 2);
        assert_eq!(filtered.threshold.records, 2);

        let ions = filter_level(Level::Ion, &psms, "rev_", 0.5).unwrap();
        assert_eq!(ions.threshold.level, Level::Ion);
        assert!(matches!(
            filter_level(Level::Protein, &psms, "rev_", 0.01),
            Err(Error::InvalidLevel(_))
        ));
    }

    #[test]
    fn proteins_keep_best_record_per_name() {
        let protein = |name: &str, score: f64| Protein {
            name: name.into(),
            top_peptide_probability: score,
            ..Default::default()
        };
        let proteins = vec![
            protein("P1", 0.99),
            protein("P1", 0.10),
            protein("P2", 0.95),
            protein("rev_P2", 0.30),
        ];
        let filtered = filter_proteins(&proteins, "rev_", 0.01).unwrap();
        assert_eq!(filtered.threshold.score, 0.95);
        assert_eq!(filtered.representatives, vec![proteins[0].clone(), proteins[2].clone()]);
    }

    #[test]
    fn groups_straddling_the_threshold_refilter_identically() {
        let mut psms = (0..100)
            .map(|i| Psm {
                peptide: format!("PEP{}K", i),
                ..psm(&format!("P{}", i), 0.5 + 0.004 * i as f64)
            })
            .collect::<Vec<_>>();
        // Decoy representative with a target member far below the threshold
        psms.push(Psm { peptide: "XK".into(), ..psm("rev_Q1", 0.701) });
        psms.push(Psm { peptide: "XK".into(), ..psm("Q2", 0.1) });
        psms.extend((0..5).map(|i| Psm {
            peptide: format!("DECOY{}K", i),
            ..psm(&format!("rev_D{}", i), 0.3)
        }));

        let first = filter_peptides(&psms, "rev_", 0.05).unwrap();
        assert_eq!(first.threshold.score, 0.5);
        assert_eq!((first.threshold.targets, first.threshold.decoys), (100, 1));
        assert_eq!(first.threshold.total, 101);
        assert_eq!(first.threshold.records, 101);

        assert!(first.accepted.iter().all(|p| p.protein != "Q2"));

        let second = filter_peptides(&first.accepted, "rev_", 0.05).unwrap();
        assert_eq!(second.accepted, first.accepted);
        assert_eq!(second.threshold, first.threshold);

        let first = filter_ions(&psms, "rev_", 0.05).unwrap();
        let second = filter_ions(&first.accepted, "rev_", 0.05).unwrap();
        assert_eq!(second.accepted, first.accepted);
        assert_eq!(second.representatives, first.representatives);
    }

    #[quickcheck]
    fn grouped_filtering_is_idempotent(entries: Vec<(u8, u8, bool)>) -> bool {
        // Few distinct peptides, so groups mix targets and decoys and
        // straddle the threshold
        let psms = entries
            .iter()
            .enumerate()
            .map(|(ix, &(peptide, score, decoy))| {
                let name = format!("{}P{}", if decoy { "rev_" } else { "" }, ix);
                Psm {
                    peptide: format!("PEP{}K", peptide % 8),
                    charge: 2 + peptide % 2,
                    ..psm(&name, score as f64 / 255.0)
                }
            })
            .collect::<Vec<_>>();

        type Filter = fn(&[Psm], &str, f64) -> Result<LevelFilter<Psm>, Error>;
        let filters: [Filter; 2] = [filter_peptides, filter_ions];
        filters.iter().all(|filter| {
            match filter(&psms, "rev_", 0.2) {
                Ok(first) => match filter(&first.accepted, "rev_", 0.2) {
                    Ok(second) => {
                        second.accepted == first.accepted
                            && second.representatives.len() == first.representatives.len()
                            && second.threshold == first.threshold
                    }
                    Err(_) => false,
                },
                Err(_) => true,
            }
        })
    }

    #[quickcheck]
    fn filtering_is_idempotent(entries: Vec<(u8, bool)>) -> bool {
        let psms = entries
            .iter()
            .enumerate()
            .map(|(ix, &(score, decoy))| {
                let name = format!("{}P{}", if decoy { "rev_" } else { "" }, ix);
                psm(&name, score as f64 / 255.0)
            })
            .collect::<Vec<_>>();

        match filter_psms(&psms, "rev_", 0.05) {
            Ok(first) => match filter_psms(&first.accepted, "rev_", 0.05) {
                Ok(second) => second.accepted == first.accepted && second.threshold == first.threshold,
                Err(_) => false,
            },
            Err(_) => true,
        }
    }
}
