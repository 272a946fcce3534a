//! Namespace prefixes, their system URIs, and implicit-namespace expansion.

use crate::models::SourceName;

/// System URI for each supported namespace prefix.
///
/// Uses the system URI prefix, the OBO Foundry PURL, or the source homepage,
/// in that order of preference.
const NAMESPACE_SYSTEM_URIS: &[(&str, &str)] = &[
    (
        "ncit",
        "https://ncit.nci.nih.gov/ncitbrowser/ConceptReport.jsp?dictionary=NCI_Thesaurus&code=",
    ),
    ("mondo", "https://purl.obolibrary.org/obo/"),
    ("doid", "https://disease-ontology.org/?id="),
    ("mim", "https://omim.org/MIM:"),
    (
        "oncotree",
        "https://oncotree.mskcc.org/?version=oncotree_latest_stable&field=CODE&search=",
    ),
    ("efo", "http://www.ebi.ac.uk/efo/EFO_"),
    ("gard", "https://rarediseases.info.nih.gov"),
    ("icd9.cm", "https://archive.cdc.gov/www_cdc_gov/nchs/icd/icd9cm.htm"),
    ("icd10", "https://icd.who.int/browse10/2016/en#/"),
    ("icd10.cm", "https://www.cdc.gov/nchs/icd/icd-10-cm/index.html"),
    (
        "icdo",
        "https://www.who.int/standards/classifications/other-classifications/international-classification-of-diseases-for-oncology/",
    ),
    ("imdrf", "https://www.imdrf.org/"),
    ("kegg.disease", "https://www.genome.jp/kegg/disease/"),
    (
        "meddra",
        "https://bioportal.bioontology.org/ontologies/MEDDRA?p=classes&conceptid=",
    ),
    ("medgen", "https://www.ncbi.nlm.nih.gov/medgen/"),
    ("mesh", "https://meshb.nlm.nih.gov/record/ui?ui="),
    ("orphanet", "https://www.orpha.net"),
    ("umls", "https://www.nlm.nih.gov/research/umls/index.html"),
];

/// Look up the system URI for a namespace prefix, ignoring case.
pub fn system_uri(prefix: &str) -> Option<&'static str> {
    NAMESPACE_SYSTEM_URIS
        .iter()
        .find(|(p, _)| p.eq_ignore_ascii_case(prefix))
        .map(|(_, uri)| *uri)
}

/// Candidate concept IDs for a lower-cased query that may be a bare source code.
///
/// NCIt codes (`c` followed by digits) expand to `ncit:<query>` and all-digit
/// queries expand to `MIM:<query>`.
pub fn implicit_concept_ids(query: &str) -> Vec<(SourceName, String)> {
    let mut candidates = Vec::new();
    if query.is_empty() || query.contains(':') {
        return candidates;
    }
    if let Some(rest) = query.strip_prefix('c') {
        if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) {
            candidates.push((
                SourceName::Ncit,
                format!("{}:{}", SourceName::Ncit.namespace_prefix(), query),
            ));
        }
    }
    if query.bytes().all(|b| b.is_ascii_digit()) {
        candidates.push((
            SourceName::Omim,
            format!("{}:{}", SourceName::Omim.namespace_prefix(), query),
        ));
    }
    candidates
}
