//! Names of every column the harmonizer reads or writes. The Python module
//! re-exports the record, pc_diff, template and decomposition groups.

// ── Canonical record columns ────────────────────────────────────────────────
pub mod record {
    pub const MODEL: &str = "model";
    pub const SCENARIO: &str = "scenario";
    pub const REGION: &str = "region";
    pub const VARIABLE: &str = "variable";
    pub const ITEM: &str = "item";
    pub const UNIT: &str = "unit";
    pub const YEAR: &str = "year";
    pub const VALUE: &str = "value";

    pub const ALL: [&str; 8] = [MODEL, SCENARIO, REGION, VARIABLE, ITEM, UNIT, YEAR, VALUE];

    /// One reported cell: everything but the value.
    pub const CELL_KEY_COLUMNS: [&str; 7] = [MODEL, SCENARIO, REGION, VARIABLE, ITEM, UNIT, YEAR];

    /// Columns listed in override / exception key files.
    pub const GROUP_KEY_COLUMNS: [&str; 6] = [MODEL, SCENARIO, REGION, VARIABLE, ITEM, UNIT];
}

// ── Percent-change columns ──────────────────────────────────────────────────
pub mod pc_diff {
    pub const PERCENT_CHANGE_BAU_REF_YEAR: &str = "percent_change_BAU_ref_year";
    pub const DIFF_BAU_REF_YEAR: &str = "diff_BAU_ref_year";
    pub const REFERENCE_YEAR_USED: &str = "reference_year_used";
    pub const PERCENT_CHANGE_BAU: &str = "percent_change_BAU";
    pub const DIFF_BAU: &str = "diff_BAU";
    pub const PERCENT_CHANGE_ELM: &str = "percent_change_ELM";
    pub const DIFF_ELM: &str = "diff_ELM";
    pub const INTERPOLATED: &str = "interpolated";
}

// ── Override file columns (headerless, positional) ──────────────────────────
pub mod overrides {
    pub const LABEL: &str = "label";
    pub const COLUMN: &str = "column";
    pub const STATUS: &str = "status";

    pub const ALL: [&str; 3] = [LABEL, COLUMN, STATUS];
}

// ── Template table columns ──────────────────────────────────────────────────
pub mod template {
    pub const VARIABLE: &str = "Variable";
    pub const UNIT: &str = "Unit";
    pub const KEEP: &str = "Keep";
}

// ── Raw-file specifics ──────────────────────────────────────────────────────
pub mod raw {
    /// Free-text column present in IMPACT submissions.
    pub const DESCRIPTION: &str = "description";
}

// ── Emissions wide-table columns ────────────────────────────────────────────
pub mod emissions {
    pub const ECH4: &str = "ECH4";
    pub const ECO2: &str = "ECO2";
    pub const EMIS: &str = "EMIS";
    pub const EN2O: &str = "EN2O";

    pub const GASES: [&str; 3] = [ECO2, ECH4, EN2O];
    pub const VARIABLES: [&str; 4] = [ECH4, ECO2, EMIS, EN2O];

    pub const EMIS_ADDED: &str = "EMIS_added";
    pub const EMIS_NON_CO2: &str = "EMIS_nonCO2";
    pub const EMIS_DIFF: &str = "EMIS_diff";
    pub const ECH4_SHARE: &str = "ECH4_share";
    pub const ECO2_SHARE: &str = "ECO2_share";
    pub const EN2O_SHARE: &str = "EN2O_share";
    pub const NON_CO2_SHARE: &str = "nonCO2_share";

    pub const ITEM: &str = "AGR";
    pub const TOTAL_UNIT: &str = "MtCO2e";
    pub const SHARE_UNIT: &str = "share";
}

// ── Land wide-table columns ─────────────────────────────────────────────────
pub mod land {
    pub const VARIABLE: &str = "LAND";

    pub const AGR: &str = "AGR";
    pub const CRP: &str = "CRP";
    pub const LSP: &str = "LSP";
    pub const GRS: &str = "GRS";
    pub const ONV: &str = "ONV";
    pub const FOR: &str = "FOR";
    pub const ECP: &str = "ECP";

    pub const ITEMS: [&str; 7] = [AGR, CRP, LSP, GRS, ONV, FOR, ECP];

    pub const AGR_ADDED: &str = "AGR_added";
    pub const AGR_DIFF: &str = "AGR_diff";
    pub const ONV_ADDED: &str = "ONV_added";
    pub const LAND_TOT: &str = "LAND_tot";
    pub const AGR_SHARE: &str = "AGR_share";
    pub const CRP_SHARE: &str = "CRP_share";
    pub const GRS_SHARE: &str = "GRS_share";
    pub const CRP_AGR_SHARE: &str = "CRP_AGR_share";
    pub const GRS_AGR_SHARE: &str = "GRS_AGR_share";
    pub const ONV_SHARE: &str = "ONV_share";

    pub const ADDED_VARIABLE: &str = "LAND_added";
    pub const SHARE_VARIABLE: &str = "LAND_share";
    pub const AREA_UNIT: &str = "1000 ha";
    pub const SHARE_UNIT: &str = "share";
}

// ── Driver decomposition columns ────────────────────────────────────────────
pub mod decomposition {
    pub const DRIVER: &str = "driver";
    pub const NORMALIZED: &str = "normalized";
    pub const BAU: &str = "BAU";
    pub const ELM: &str = "ELM";
    pub const BAU_DRIVER: &str = "BAU_driver";
    pub const ELM_DRIVER: &str = "ELM_driver";
    /// Mitigation-only alternate, `<alternate>_MITI`.
    pub const EL2: &str = "EL2";
    pub const MITIGATION_SUFFIX: &str = "MITI";
    pub const INDIVIDUAL: &str = "individual";
    pub const TOTAL: &str = "total";
    pub const INTERACTION: &str = "interaction";
    pub const PERCENT_CHANGE_INDIVIDUAL: &str = "percent_change_BAU_individual";
    pub const PERCENT_CHANGE_TOTAL: &str = "percent_change_BAU_total";
    pub const PERCENT_CHANGE_INTERACTION: &str = "percent_change_BAU_interaction";
}

// ── Wide-table index columns ────────────────────────────────────────────────
pub mod panel {
    pub const INDEX: [&str; 4] = [
        super::record::MODEL,
        super::record::SCENARIO,
        super::record::REGION,
        super::record::YEAR,
    ];
}
