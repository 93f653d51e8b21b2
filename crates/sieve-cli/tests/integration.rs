use sieve_cli::input::Input;
use sieve_cli::runner::Runner;
use sieve_core::identification::Level;
use sieve_core::pipeline::Reconciliation;

fn output_directory(name: &str) -> String {
    std::env::temp_dir()
        .join(format!("sieve-cli-{}-{}", name, std::process::id()))
        .display()
        .to_string()
}

#[test]
fn integration() -> anyhow::Result<()> {
    let mut input = Input::load("../../tests/params.json")?;
    let directory = output_directory("2d");
    input.output_directory = Some(directory.clone());

    let search = input.build()?;
    assert_eq!(search.filter.reconciliation, Reconciliation::TwoDimensional);
    assert!(search.filter.razor);

    let search = Runner::new(search)?.run()?;
    assert_eq!(search.razor_reassigned, 1);
    assert_eq!(search.thresholds.len(), 7);
    assert_eq!(search.thresholds[3].level, Level::Protein);
    assert_eq!(search.thresholds[4].targets, 61);

    // psm, peptide, ion, protein, mirror, results.json
    assert_eq!(search.output_paths.len(), 6);
    for path in &search.output_paths {
        assert!(std::path::Path::new(path).exists(), "{} missing", path);
    }

    let psms = std::fs::read_to_string(format!("{}/psm.tsv", directory))?;
    let mut lines = psms.lines();
    assert!(lines.next().unwrap_or_default().starts_with("spectrum\tpeptide\tprotein"));
    assert_eq!(lines.clone().count(), 61);
    assert!(lines.any(|line| line.contains("SHAREDPEPTIDEK\tPROT01\tPROT02")));

    let results: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(format!("{}/results.json", directory))?)?;
    assert_eq!(results["filter"]["decoy_tag"], "rev_");
    assert_eq!(results["thresholds"][0]["level"], "psm");

    std::fs::remove_dir_all(directory)?;
    Ok(())
}

#[test]
fn missing_proteins_are_rejected() -> anyhow::Result<()> {
    let mut input = Input::load("../../tests/params.json")?;
    input.proteins = None;
    input.output_directory = Some(output_directory("missing"));
    let err = input.build().err().map(|e| e.to_string()).unwrap_or_default();
    assert!(err.contains("requires `proteins`"));
    Ok(())
}

#[test]
fn zero_fdr_and_malformed_input() -> anyhow::Result<()> {
    let mut input = Input::load("../../tests/params.json")?;
    let directory = output_directory("unreachable");
    input.output_directory = Some(directory.clone());
    input.filter.reconciliation = Some(Reconciliation::Independent);
    input.filter.psm_fdr = Some(0.0);
    input.filter.protein_fdr = Some(0.0);

    // Zero decoys above the lowest target keeps every level reachable
    let search = Runner::new(input.build()?)?.run()?;
    assert_eq!(search.thresholds.len(), 4);
    assert!(search.thresholds.iter().all(|t| t.decoys == 0));

    let mut input = Input::load("../../tests/params.json")?;
    input.output_directory = Some(directory.clone());
    input.psms = Some("../../tests/proteins.json".into());
    assert!(input.build().and_then(Runner::new).is_err());

    std::fs::remove_dir_all(directory)?;
    Ok(())
}
