pub mod decoy;
pub mod fdr;
pub mod identification;
pub mod picked;
pub mod pipeline;
pub mod protein;
pub mod razor;

use identification::Level;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(
        "no score threshold reaches {target_fdr} FDR at the {level} level; \
         try raising the target FDR"
    )]
    ThresholdNotReached { level: Level, target_fdr: f64 },
    #[error("unrecognized FDR level `{0}`")]
    InvalidLevel(String),
    #[error("no target identifications at the {level} level, FDR is undefined")]
    EmptyPopulation { level: Level },
    #[error("razor assignment requested before razor peptides were resolved")]
    MissingRazorSnapshot,
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub fn read_json<S, T>(path: S) -> Result<T, Error>
where
    S: AsRef<std::path::Path>,
    T: for<'de> serde::Deserialize<'de>,
{
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
