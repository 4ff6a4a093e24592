/// Column-name constants for the alumina-flows tables.
/// Single source of truth - exported to Python via PyO3.

// ── Registry columns ────────────────────────────────────────────────────────
pub mod registry {
    pub const AREA_CODE: &str = "area_code";
    pub const AREA_NAME: &str = "area_name";
    pub const AREA_INDEX: &str = "area_index";
}

// ── Commodity classification columns ────────────────────────────────────────
pub mod classification {
    pub const DESCRIPTION: &str = "description";
    pub const LEVEL: &str = "level";
    pub const CLASSIFICATION: &str = "classification";
    pub const COMMODITY_CODE: &str = "commodity_code";
}

// ── Customs record columns ──────────────────────────────────────────────────
pub mod customs {
    pub const REPORTER_CODE: &str = "reporter_code";
    pub const PARTNER_CODE: &str = "partner_code";
    pub const FLOW_CODE: &str = "flow_code";
    pub const COMMODITY_CODE: &str = "commodity_code";
    pub const NET_MASS_KG: &str = "net_mass_kg";
    pub const QUANTITY_CODE: &str = "quantity_code";

    pub const ALL: [&str; 6] = [
        REPORTER_CODE,
        PARTNER_CODE,
        FLOW_CODE,
        COMMODITY_CODE,
        NET_MASS_KG,
        QUANTITY_CODE,
    ];
}

// ── Flow direction values ───────────────────────────────────────────────────
pub mod flow {
    pub const IMPORT: i64 = 1;
    pub const EXPORT: i64 = 2;
}

// ── Production columns ──────────────────────────────────────────────────────
pub mod production {
    pub const COUNTRY: &str = "country";
    pub const YEAR: &str = "year";
    pub const VALUE: &str = "value";
}

// ── Correspondence columns ──────────────────────────────────────────────────
// Every other column of the correspondence table is a region scheme.
pub mod correspondence {
    pub const AREA_NAME: &str = "area_name";
}

// ── Matrix triplet columns ──────────────────────────────────────────────────
pub mod triplet {
    pub const ROW_INDEX: &str = "row_index";
    pub const COL_INDEX: &str = "col_index";
    pub const VALUE: &str = "value";
}

// ── Reconciliation transaction columns ──────────────────────────────────────
pub mod transaction {
    pub const IMPORTER_CODE: &str = "importer_code";
    pub const EXPORTER_CODE: &str = "exporter_code";
    pub const COMMODITY_CODE: &str = "commodity_code";
    pub const REPORTED_IMPORTS: &str = "reported_imports";
    pub const REPORTED_EXPORTS: &str = "reported_exports";
    pub const ACCURACY_LEVEL: &str = "accuracy_level";
    pub const RI_IMPORTER: &str = "ri_importer";
    pub const RI_EXPORTER: &str = "ri_exporter";
    pub const VALUE: &str = "value";
}

// ── Reliability index columns ───────────────────────────────────────────────
pub mod reliability {
    pub const AREA_CODE: &str = "area_code";
    pub const ROLE: &str = "role";
    pub const COMMODITY_CODE: &str = "commodity_code";
    pub const TOTAL_REPORTED: &str = "total_reported";
    pub const RELIABILITY_INDEX: &str = "reliability_index";
}

// ── Role values ─────────────────────────────────────────────────────────────
pub mod role {
    pub const IMPORTER: &str = "importer";
    pub const EXPORTER: &str = "exporter";
}

// ── Long-form result columns ────────────────────────────────────────────────
pub mod result {
    pub const CONSUMER: &str = "consumer";
    pub const PRODUCER: &str = "producer";
    pub const QUANTITY_KG: &str = "quantity_kg";
}

// ── Summary report columns ──────────────────────────────────────────────────
pub mod report {
    pub const AREA: &str = "area";
    pub const KIND: &str = "kind";
    pub const QUANTITY_KG: &str = "quantity_kg";
    pub const DOMESTIC_PRODUCTION: &str = "domestic_production";
    pub const APPARENT_CONSUMPTION: &str = "apparent_consumption";
    pub const DOMESTIC_PRODUCTION_RATIO: &str = "domestic_production_ratio";
    pub const LOCATION: &str = "location";
    pub const SHARE: &str = "share";
}

// ── Kind values ─────────────────────────────────────────────────────────────
pub mod kind {
    pub const PRODUCTION: &str = "production";
    pub const CONSUMPTION: &str = "consumption";
}
