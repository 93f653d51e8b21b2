//! Target/decoy classification by decoy-tag prefix

use crate::identification::Psm;

pub fn is_decoy(name: &str, decoy_tag: &str) -> bool {
    name.starts_with(decoy_tag)
}

/// Classify a PSM as decoy (`true`) or target (`false`).
///
/// A PSM carrying two or more alternative proteins is rescued as a target
/// whenever any of those alternatives is a target protein, regardless of the
/// primary assignment.
pub fn classify_psm(psm: &Psm, decoy_tag: &str) -> bool {
    let decoy = is_decoy(&psm.protein, decoy_tag);
    if decoy && psm.alternative_proteins.len() >= 2 {
        let rescued = psm
            .alternative_proteins
            .keys()
            .any(|name| !is_decoy(name, decoy_tag));
        return !rescued;
    }
    decoy
}

/// A group of protein names is a decoy only if every name carries the tag
pub fn classify_ion_group<'a, I>(names: I, decoy_tag: &str) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    for name in names {
        if !is_decoy(name, decoy_tag) {
            return false;
        }
    }
    true
}
