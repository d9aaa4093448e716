use std::{fmt, path::Path};

use ahash::AHashMap;
use anyhow::{Context, Result, anyhow, ensure};
use geo::MultiPolygon;
use log::info;
use serde_json::{Map, Value, json};

use crate::config::Config;
use crate::io::{feature, multipolygon_to_geojson, parse_multipolygon, read_csv_strings, read_features, str_values, write_features};
use crate::layout::{city_stem, country_folder};
use crate::ucdb::clean_str;

pub const COL_UC_ID: &str = "ID_UC_G0";
pub const COL_NAME: &str = "GC_UCN_MAI_2025";
pub const COL_NAMES: &str = "GC_UCN_LIS_2025";
pub const COL_COUNTRY: &str = "GC_CNT_GAD_2025";
pub const COL_COUNTRY_ISO: &str = "country_iso";
pub const COL_QUALITY: &str = "GC_PLS_SCR_2025";
pub const COL_BUILT_UP: &str = "GH_BUS_TOT_2025";

/// Urban centers need at least 1 km² of built-up area.
const MIN_BUILT_UP_M2: f64 = 1e6;
const KEEP_QUALITY: &str = "High";
const INTEGER_COLUMNS: [&str; 2] = ["GC_POP_TOT_2025", "SC_SEC_GDP_2020"];

/// Attribute columns carried into the canonical dataset, in output order.
pub const RETAINED_COLUMNS: [&str; 24] = [
    "GC_PLS_SCR_2025",      // plausibility score
    "ID_UC_G0",             // urban center id
    "GC_UCN_MAI_2025",      // main city name
    "GC_UCN_LIS_2025",      // all city names
    "GC_CNT_GAD_2025",      // country name
    "country_iso",          // ISO 3166-1 alpha-3
    "GC_DEV_USR_2025",      // UN SDG region
    "GC_POP_TOT_2025",      // population
    "GC_UCA_KM2_2025",      // area, km²
    "GH_BUS_TOT_2025",      // built-up area, m²
    "GH_BPC_TOT_2025",      // built-up area per capita, m²
    "GH_BUH_AVG_2020",      // average building height, m
    "SC_SEC_GDP_2020",      // GDP PPP
    "GC_DEV_WIG_2025",      // World Bank income group
    "SC_SEC_HDI_2020",      // human development index
    "EM_CO2_TRA_2022",      // transport CO2 emissions, t/yr
    "EM_PM2_TRA_2022",      // transport PM2.5 emissions, t/yr
    "EM_PM2_CON_2020",      // PM2.5 concentration, μg/m³
    "CL_KOP_CUR_2025",      // Köppen-Geiger class
    "GE_ELV_AVG_2025",      // average elevation, m
    "CL_B12_CUR_2010",      // annual precipitation, mm/yr
    "CL_B01_CUR_2010",      // annual mean temperature, °C
    "SD_POP_HGR_2025",      // share of population in high greenness
    "SD_LUE_LPR_2000_2020", // land use efficiency
];

/// One urban center of the canonical dataset.
#[derive(Clone)]
pub struct UrbanCenter {
    pub uc_id: i64,
    /// Cleaned main city name.
    pub name: String,
    pub names: String,
    /// Cleaned country name.
    pub country: String,
    pub country_iso: String,
    pub built_up_area: f64,
    pub quality: String,
    pub boundary: MultiPolygon<f64>,
    /// Every retained attribute, verbatim.
    pub attributes: Map<String, Value>,
}

impl UrbanCenter {
    #[inline] pub fn country_folder(&self) -> String { country_folder(&self.country, &self.country_iso) }

    #[inline] pub fn stem(&self) -> String { city_stem(&self.name, self.uc_id) }

    fn from_properties(properties: Map<String, Value>, boundary: MultiPolygon<f64>) -> Result<Self> {
        let text = |key: &str| properties.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
        let uc_id = properties.get(COL_UC_ID).and_then(as_i64)
            .ok_or_else(|| anyhow!("[ucdb] Feature without a numeric {COL_UC_ID}"))?;
        Ok(Self {
            uc_id,
            name: text(COL_NAME),
            names: text(COL_NAMES),
            country: text(COL_COUNTRY),
            country_iso: text(COL_COUNTRY_ISO),
            built_up_area: properties.get(COL_BUILT_UP).and_then(Value::as_f64).unwrap_or(0.0),
            quality: text(COL_QUALITY),
            boundary,
            attributes: properties,
        })
    }
}

impl fmt::Debug for UrbanCenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrbanCenter")
            .field("uc_id", &self.uc_id)
            .field("name", &self.name)
            .field("country", &self.country)
            .finish_non_exhaustive()
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_f64().map(|v| v as i64))
}

/// Country name to ISO alpha-3 lookup from a `name,alpha3` CSV.
fn load_iso_codes(path: &Path) -> Result<AHashMap<String, String>> {
    let df = read_csv_strings(path)?;
    let names = str_values(&df, "name")?;
    let codes = str_values(&df, "alpha3")?;
    Ok(names.into_iter().zip(codes).collect())
}

/// Filter, clean and annotate the raw urban-centers features into the
/// canonical dataset. Returns the number of urban centers kept.
pub fn prep_urban_centers(config: &Config) -> Result<usize> {
    info!("[ucdb] Loading urban centers from {}", config.uc_input_path.display());
    let features = read_features(&config.uc_input_path)?;
    let total = features.len();
    let iso_codes = load_iso_codes(&config.iso_codes_path)?;

    let mut out = Vec::new();
    for f in features {
        let mut props = f.properties;
        let built_up = props.get(COL_BUILT_UP).and_then(Value::as_f64).unwrap_or(0.0);
        let quality = props.get(COL_QUALITY).and_then(Value::as_str).unwrap_or_default();
        if built_up <= MIN_BUILT_UP_M2 || quality != KEEP_QUALITY { continue }

        for col in INTEGER_COLUMNS {
            if let Some(v) = props.get(col).and_then(as_i64) { props.insert(col.into(), json!(v)); }
        }

        let country = props.get(COL_COUNTRY).and_then(Value::as_str).unwrap_or_default().to_string();
        let iso = iso_codes.get(&country)
            .ok_or_else(|| anyhow!("[ucdb] No ISO code for country {country:?}"))?;
        props.insert(COL_COUNTRY_ISO.into(), json!(iso));

        for col in [COL_NAME, COL_COUNTRY] {
            let cleaned = clean_str(props.get(col).and_then(Value::as_str));
            props.insert(col.into(), json!(cleaned));
        }

        let boundary = parse_multipolygon(&f.geometry)
            .with_context(|| format!("[ucdb] Invalid boundary for {:?}", props.get(COL_UC_ID)))?;
        let retained: Map<String, Value> = RETAINED_COLUMNS.iter()
            .map(|&col| (col.to_string(), props.get(col).cloned().unwrap_or(Value::Null)))
            .collect();
        out.push(feature(multipolygon_to_geojson(&boundary), retained));
    }

    ensure!(!out.is_empty(), "[ucdb] No urban centers passed the filters");
    let kept = out.len();
    write_features(&config.uc_dataset_path, out)?;
    info!("[ucdb] Kept {kept} of {total} urban centers, saved to {}", config.uc_dataset_path.display());
    Ok(kept)
}

/// Read the canonical urban-centers dataset.
pub fn load_urban_centers(path: &Path) -> Result<Vec<UrbanCenter>> {
    let ucs = read_features(path)?
        .into_iter()
        .map(|f| {
            let boundary = parse_multipolygon(&f.geometry)?;
            UrbanCenter::from_properties(f.properties, boundary)
        })
        .collect::<Result<Vec<_>>>()?;
    info!("[ucdb] Loaded {} urban centers from {}", ucs.len(), path.display());
    Ok(ucs)
}
