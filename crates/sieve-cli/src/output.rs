use rayon::prelude::*;
use sieve_core::decoy::{classify_psm, is_decoy};
use sieve_core::identification::Psm;
use sieve_core::protein::Protein;

use crate::runner::Runner;

fn label(decoy: bool) -> &'static [u8] {
    match decoy {
        true => b"-1",
        false => b"1",
    }
}

fn flag(value: bool) -> &'static [u8] {
    match value {
        true => b"true",
        false => b"false",
    }
}

impl Runner {
    pub fn serialize_psm(&self, psm: &Psm, decoy_tag: &str) -> csv::ByteRecord {
        let alternatives = psm
            .alternative_proteins
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(";");

        let mut record = csv::ByteRecord::new();
        record.push_field(psm.spectrum.as_bytes());
        record.push_field(psm.peptide.as_bytes());
        record.push_field(psm.protein.as_bytes());
        record.push_field(alternatives.as_bytes());
        record.push_field(
            itoa::Buffer::new()
                .format(psm.alternative_proteins.len())
                .as_bytes(),
        );
        record.push_field(label(classify_psm(psm, decoy_tag)));
        record.push_field(itoa::Buffer::new().format(psm.charge).as_bytes());
        record.push_field(ryu::Buffer::new().format(psm.probability).as_bytes());
        record.push_field(ryu::Buffer::new().format(psm.calc_neutral_mass).as_bytes());
        record.push_field(
            ryu::Buffer::new()
                .format(psm.precursor_neutral_mass)
                .as_bytes(),
        );
        record.push_field(ryu::Buffer::new().format(psm.retention_time).as_bytes());
        record
    }

    pub fn write_psms(&self, file_name: &str, psms: &[Psm], decoy_tag: &str) -> anyhow::Result<String> {
        let path = self.make_path(file_name);

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(vec![]);

        let headers = csv::ByteRecord::from(vec![
            "spectrum",
            "peptide",
            "protein",
            "alternative_proteins",
            "num_alternative_proteins",
            "label",
            "charge",
            "probability",
            "calc_neutral_mass",
            "precursor_neutral_mass",
            "retention_time",
        ]);

        wtr.write_byte_record(&headers)?;
        for record in psms
            .into_par_iter()
            .map(|psm| self.serialize_psm(psm, decoy_tag))
            .collect::<Vec<_>>()
        {
            wtr.write_byte_record(&record)?;
        }

        wtr.flush()?;
        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)?;
        Ok(path.display().to_string())
    }

    pub fn serialize_protein(&self, protein: &Protein, decoy_tag: &str) -> csv::ByteRecord {
        let razor_ions = protein.ions.iter().filter(|ion| ion.razor).count();

        let mut record = csv::ByteRecord::new();
        record.push_field(protein.name.as_bytes());
        record.push_field(label(is_decoy(&protein.name, decoy_tag)));
        record.push_field(ryu::Buffer::new().format(protein.probability).as_bytes());
        record.push_field(
            ryu::Buffer::new()
                .format(protein.top_peptide_probability)
                .as_bytes(),
        );
        record.push_field(itoa::Buffer::new().format(protein.ions.len()).as_bytes());
        record.push_field(itoa::Buffer::new().format(razor_ions).as_bytes());
        record.push_field(protein.indistinguishable.join(";").as_bytes());
        record.push_field(flag(protein.picked));
        record.push_field(flag(protein.has_razor));
        record.push_field(flag(protein.placeholder));
        record
    }

    pub fn write_proteins(
        &self,
        file_name: &str,
        proteins: &[Protein],
        decoy_tag: &str,
    ) -> anyhow::Result<String> {
        let path = self.make_path(file_name);

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(vec![]);

        let headers = csv::ByteRecord::from(vec![
            "protein",
            "label",
            "probability",
            "top_peptide_probability",
            "num_ions",
            "razor_ions",
            "indistinguishable",
            "picked",
            "has_razor",
            "placeholder",
        ]);

        wtr.write_byte_record(&headers)?;
        for protein in proteins {
            wtr.write_byte_record(&self.serialize_protein(protein, decoy_tag))?;
        }

        wtr.flush()?;
        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)?;
        Ok(path.display().to_string())
    }
}
