//! DDL for the relational backend.
//!
//! Every statement is safe to rerun so schema setup stays "create if missing".

/// Base tables of the relational schema.
pub const TABLES: [&str; 7] = [
    "disease_sources",
    "disease_merged",
    "disease_concepts",
    "disease_labels",
    "disease_aliases",
    "disease_xrefs",
    "disease_associations",
];

/// Materialized join over concepts and their reference tables.
pub const LOOKUP_VIEW: &str = "record_lookup_view";

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS disease_sources (
    name VARCHAR(127) PRIMARY KEY,
    data_license TEXT NOT NULL,
    data_license_url TEXT NOT NULL,
    version TEXT NOT NULL,
    data_url TEXT,
    rdp_url TEXT,
    data_license_nc BOOLEAN NOT NULL,
    data_license_attr BOOLEAN NOT NULL,
    data_license_sa BOOLEAN NOT NULL
);
CREATE TABLE IF NOT EXISTS disease_merged (
    concept_id VARCHAR(127) PRIMARY KEY,
    label TEXT,
    aliases TEXT[],
    associated_with TEXT[],
    xrefs TEXT[],
    pediatric_disease BOOLEAN,
    oncologic_disease BOOLEAN
);
CREATE TABLE IF NOT EXISTS disease_concepts (
    concept_id VARCHAR(127) PRIMARY KEY,
    source VARCHAR(127) NOT NULL,
    pediatric_disease BOOLEAN,
    oncologic_disease BOOLEAN,
    merge_ref VARCHAR(127)
);
CREATE TABLE IF NOT EXISTS disease_labels (
    id SERIAL PRIMARY KEY,
    label TEXT NOT NULL,
    concept_id VARCHAR(127) NOT NULL
);
CREATE TABLE IF NOT EXISTS disease_aliases (
    id SERIAL PRIMARY KEY,
    alias TEXT NOT NULL,
    concept_id VARCHAR(127) NOT NULL
);
CREATE TABLE IF NOT EXISTS disease_xrefs (
    id SERIAL PRIMARY KEY,
    xref TEXT NOT NULL,
    concept_id VARCHAR(127) NOT NULL
);
CREATE TABLE IF NOT EXISTS disease_associations (
    id SERIAL PRIMARY KEY,
    associated_with TEXT NOT NULL,
    concept_id VARCHAR(127) NOT NULL
);
"#;

pub const DROP_FKEYS: &str = r#"
ALTER TABLE disease_concepts DROP CONSTRAINT IF EXISTS disease_concepts_source_fkey;
ALTER TABLE disease_concepts DROP CONSTRAINT IF EXISTS disease_concepts_merge_ref_fkey;
ALTER TABLE disease_labels DROP CONSTRAINT IF EXISTS disease_labels_concept_id_fkey;
ALTER TABLE disease_aliases DROP CONSTRAINT IF EXISTS disease_aliases_concept_id_fkey;
ALTER TABLE disease_xrefs DROP CONSTRAINT IF EXISTS disease_xrefs_concept_id_fkey;
ALTER TABLE disease_associations DROP CONSTRAINT IF EXISTS disease_associations_concept_id_fkey;
"#;

pub const ADD_FKEYS: &str = r#"
ALTER TABLE disease_concepts ADD CONSTRAINT disease_concepts_source_fkey
    FOREIGN KEY (source) REFERENCES disease_sources (name);
ALTER TABLE disease_concepts ADD CONSTRAINT disease_concepts_merge_ref_fkey
    FOREIGN KEY (merge_ref) REFERENCES disease_merged (concept_id);
ALTER TABLE disease_labels ADD CONSTRAINT disease_labels_concept_id_fkey
    FOREIGN KEY (concept_id) REFERENCES disease_concepts (concept_id);
ALTER TABLE disease_aliases ADD CONSTRAINT disease_aliases_concept_id_fkey
    FOREIGN KEY (concept_id) REFERENCES disease_concepts (concept_id);
ALTER TABLE disease_xrefs ADD CONSTRAINT disease_xrefs_concept_id_fkey
    FOREIGN KEY (concept_id) REFERENCES disease_concepts (concept_id);
ALTER TABLE disease_associations ADD CONSTRAINT disease_associations_concept_id_fkey
    FOREIGN KEY (concept_id) REFERENCES disease_concepts (concept_id);
"#;

pub const CREATE_VIEW: &str = r#"
CREATE MATERIALIZED VIEW IF NOT EXISTS record_lookup_view AS
SELECT dc.concept_id,
       dl.label,
       da.aliases,
       das.associated_with,
       dx.xrefs,
       dc.source,
       dc.merge_ref,
       dc.pediatric_disease,
       dc.oncologic_disease,
       lower(dc.concept_id) AS concept_id_lowercase
FROM disease_concepts dc
LEFT JOIN (
    SELECT concept_id, min(label) AS label
    FROM disease_labels GROUP BY concept_id
) dl ON dc.concept_id = dl.concept_id
LEFT JOIN (
    SELECT concept_id, array_agg(alias ORDER BY alias) AS aliases
    FROM disease_aliases GROUP BY concept_id
) da ON dc.concept_id = da.concept_id
LEFT JOIN (
    SELECT concept_id, array_agg(associated_with ORDER BY associated_with) AS associated_with
    FROM disease_associations GROUP BY concept_id
) das ON dc.concept_id = das.concept_id
LEFT JOIN (
    SELECT concept_id, array_agg(xref ORDER BY xref) AS xrefs
    FROM disease_xrefs GROUP BY concept_id
) dx ON dc.concept_id = dx.concept_id;
"#;

pub const ADD_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_dc_concept_id_low ON disease_concepts (lower(concept_id));
CREATE INDEX IF NOT EXISTS idx_dc_source ON disease_concepts (source);
CREATE INDEX IF NOT EXISTS idx_dm_concept_id_low ON disease_merged (lower(concept_id));
CREATE INDEX IF NOT EXISTS idx_dl_label_low ON disease_labels (lower(label));
CREATE INDEX IF NOT EXISTS idx_dl_concept_id ON disease_labels (concept_id);
CREATE INDEX IF NOT EXISTS idx_da_alias_low ON disease_aliases (lower(alias));
CREATE INDEX IF NOT EXISTS idx_da_concept_id ON disease_aliases (concept_id);
CREATE INDEX IF NOT EXISTS idx_dx_xref_low ON disease_xrefs (lower(xref));
CREATE INDEX IF NOT EXISTS idx_dx_concept_id ON disease_xrefs (concept_id);
CREATE INDEX IF NOT EXISTS idx_das_associated_with_low ON disease_associations (lower(associated_with));
CREATE INDEX IF NOT EXISTS idx_das_concept_id ON disease_associations (concept_id);
CREATE INDEX IF NOT EXISTS idx_rlv_concept_id_low ON record_lookup_view (concept_id_lowercase);
"#;

/// Drops the table indexes. The view index goes with the view.
pub const DROP_INDEXES: &str = r#"
DROP INDEX IF EXISTS idx_dc_concept_id_low;
DROP INDEX IF EXISTS idx_dc_source;
DROP INDEX IF EXISTS idx_dm_concept_id_low;
DROP INDEX IF EXISTS idx_dl_label_low;
DROP INDEX IF EXISTS idx_dl_concept_id;
DROP INDEX IF EXISTS idx_da_alias_low;
DROP INDEX IF EXISTS idx_da_concept_id;
DROP INDEX IF EXISTS idx_dx_xref_low;
DROP INDEX IF EXISTS idx_dx_concept_id;
DROP INDEX IF EXISTS idx_das_associated_with_low;
DROP INDEX IF EXISTS idx_das_concept_id;
"#;

pub const REFRESH_VIEW: &str = "REFRESH MATERIALIZED VIEW record_lookup_view";

pub const DROP_ALL: &str = r#"
DROP MATERIALIZED VIEW IF EXISTS record_lookup_view;
DROP TABLE IF EXISTS
    disease_aliases,
    disease_associations,
    disease_labels,
    disease_xrefs,
    disease_concepts,
    disease_merged,
    disease_sources;
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_table_is_created_and_dropped() {
        for table in TABLES {
            assert!(
                CREATE_TABLES.contains(&format!("CREATE TABLE IF NOT EXISTS {} (", table)),
                "{} missing from CREATE_TABLES",
                table
            );
            assert!(DROP_ALL.contains(table), "{} missing from DROP_ALL", table);
        }
        assert!(DROP_ALL.contains(LOOKUP_VIEW));
    }

    #[test]
    fn test_every_added_fkey_is_dropped() {
        for line in ADD_FKEYS.lines().filter(|l| l.contains("ADD CONSTRAINT")) {
            let name = line
                .split("ADD CONSTRAINT ")
                .nth(1)
                .and_then(|rest| rest.split_whitespace().next())
                .unwrap();
            assert!(DROP_FKEYS.contains(name), "{} is never dropped", name);
        }
    }

    #[test]
    fn test_every_table_index_is_dropped() {
        for line in ADD_INDEXES.lines().filter(|l| l.contains("CREATE INDEX")) {
            let name = line.split_whitespace().nth(5).unwrap();
            if line.contains(LOOKUP_VIEW) {
                continue;
            }
            assert!(
                DROP_INDEXES.contains(&format!("DROP INDEX IF EXISTS {};", name)),
                "{} is never dropped",
                name
            );
        }
    }
}
