use std::io::Cursor;

use anyhow::{Context, Result, ensure};
use log::info;
use polars::{io::json::{JsonFormat, JsonReader}, prelude::*};
use serde_json::{Map, Value, json};

use crate::config::Config;
use crate::io::{read_csv, write_csv};
use crate::ucdb::{COL_UC_ID, UrbanCenter, load_urban_centers};

/// Urban center attributes joined onto the indicators, with readable names.
pub const ATTRIBUTE_NAMES: [(&str, &str); 19] = [
    ("GC_UCN_LIS_2025", "uc_names"),
    ("GC_DEV_USR_2025", "world_region"),
    ("GC_POP_TOT_2025", "resident_pop"),
    ("GC_UCA_KM2_2025", "area_km2"),
    ("GH_BUS_TOT_2025", "built_up_area_m2"),
    ("GH_BPC_TOT_2025", "built_up_area_percap"),
    ("GH_BUH_AVG_2020", "built_height_m"),
    ("SC_SEC_GDP_2020", "gdp_ppp"),
    ("GC_DEV_WIG_2025", "world_bank_income_group"),
    ("SC_SEC_HDI_2020", "hdi"),
    ("EM_CO2_TRA_2022", "transport_co2_em"),
    ("EM_PM2_TRA_2022", "transport_pm25_em"),
    ("EM_PM2_CON_2020", "pm25_concentration"),
    ("CL_KOP_CUR_2025", "koppen_geiger"),
    ("GE_ELV_AVG_2025", "avg_elevation"),
    ("CL_B12_CUR_2010", "avg_precipitation"),
    ("CL_B01_CUR_2010", "avg_temperature"),
    ("SD_POP_HGR_2025", "pop_greenness"),
    ("SD_LUE_LPR_2000_2020", "land_use_efficiency"),
];

/// Attributes kept for analysis but left out of the published indicators.
pub const UNPUBLISHED: [&str; 14] = [
    "built_up_area_percap",
    "built_height_m",
    "gdp_ppp",
    "world_bank_income_group",
    "hdi",
    "transport_co2_em",
    "transport_pm25_em",
    "pm25_concentration",
    "koppen_geiger",
    "avg_elevation",
    "avg_precipitation",
    "avg_temperature",
    "pop_greenness",
    "land_use_efficiency",
];

/// One JSON line per urban center holding its id and the joined attributes.
fn attribute_lines(ucs: &[UrbanCenter]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for uc in ucs {
        let mut row = Map::new();
        row.insert(COL_UC_ID.into(), json!(uc.uc_id));
        for (code, _) in ATTRIBUTE_NAMES {
            row.insert(code.into(), uc.attributes.get(code).cloned().unwrap_or(Value::Null));
        }
        serde_json::to_writer(&mut out, &row)?;
        out.push(b'\n');
    }
    Ok(out)
}

/// Urban center attributes as a frame keyed by `ID_UC_G0`, columns renamed.
pub fn attributes_frame(ucs: &[UrbanCenter]) -> Result<DataFrame> {
    ensure!(!ucs.is_empty(), "[merge] No urban centers to merge with");
    let mut df = JsonReader::new(Cursor::new(attribute_lines(ucs)?))
        .with_json_format(JsonFormat::JsonLines)
        .infer_schema_len(None)
        .finish()
        .context("[merge] Failed to read urban center attributes")?;
    for (code, name) in ATTRIBUTE_NAMES {
        // attributes missing everywhere come back untyped
        if df.column(code)?.dtype() == &DataType::Null {
            let typed = df.column(code)?.cast(&DataType::String)?;
            df.with_column(typed)?;
        }
        df.rename(code, name.into())?;
    }
    Ok(df)
}

/// Inner join street indicators with urban center attributes on the urban
/// center id. Street indicator columns come first.
pub fn merge_frames(indicators: &DataFrame, attributes: &DataFrame) -> Result<DataFrame> {
    let mut left = indicators.clone();
    let key = left.column("uc_id")?.cast(&DataType::Int64)?;
    left.with_column(key)?;
    let mut right = attributes.clone();
    let key = right.column(COL_UC_ID)?.cast(&DataType::Int64)?;
    right.with_column(key)?;
    Ok(left.inner_join(&right, ["uc_id"], [COL_UC_ID])?)
}

/// Merge the street indicators with urban center attributes, saving every
/// column for analysis and the published subset. Returns the number of rows.
pub fn merge_indicators(config: &Config) -> Result<usize> {
    let ucs = load_urban_centers(&config.uc_dataset_path)?;
    let indicators = read_csv(&config.indicators_street_path)?;
    info!("[merge] Loaded indicators with shape {:?}", indicators.shape());

    let mut all = merge_frames(&indicators, &attributes_frame(&ucs)?)?;
    write_csv(&mut all, &config.indicators_all_path)?;
    info!("[merge] Saved all indicators to {}, shape {:?}", config.indicators_all_path.display(), all.shape());

    let mut published = all.drop_many(UNPUBLISHED);
    write_csv(&mut published, &config.indicators_path)?;
    info!("[merge] Saved published indicators to {}, shape {:?}", config.indicators_path.display(), published.shape());
    Ok(all.height())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{i64_values, str_values};
    use crate::testutil::{uc_feature, write_uc_inputs};
    use crate::ucdb::prep_urban_centers;

    #[test]
    fn joins_on_uc_id_and_drops_unpublished() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::under(dir.path());
        write_uc_inputs(&config, vec![
            uc_feature(1, "Lyon", "France", 5e6, "High"),
            uc_feature(2, "Nice", "France", 5e6, "High"),
        ]);
        prep_urban_centers(&config).unwrap();
        std::fs::create_dir_all(config.indicators_street_path.parent().unwrap()).unwrap();
        std::fs::write(
            &config.indicators_street_path,
            "country,country_iso,core_city,uc_id,circuity\nfrance,FRA,nice,2,1.05\nfrance,FRA,ghost,99,1.1\n",
        ).unwrap();

        assert_eq!(merge_indicators(&config).unwrap(), 1);

        let all = read_csv(&config.indicators_all_path).unwrap();
        let names: Vec<&str> = all.get_column_names().iter().map(|s| s.as_str()).collect();
        assert_eq!(&names[..5], ["country", "country_iso", "core_city", "uc_id", "circuity"]);
        assert_eq!(names.len(), 5 + ATTRIBUTE_NAMES.len());
        assert!(!names.contains(&COL_UC_ID));
        assert_eq!(i64_values(&all, "uc_id").unwrap(), [2]);
        assert_eq!(i64_values(&all, "resident_pop").unwrap(), [123456]);

        let published = read_csv(&config.indicators_path).unwrap();
        assert_eq!(published.width(), names.len() - UNPUBLISHED.len());
        assert!(published.column("hdi").is_err());
        assert_eq!(str_values(&published, "core_city").unwrap(), ["nice"]);
    }
}
