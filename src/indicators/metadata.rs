use std::collections::BTreeSet;

use anyhow::{Result, bail};
use log::info;
use polars::prelude::*;

use crate::config::Config;
use crate::io::{read_csv, write_csv};

/// Documented GraphML node attributes: name, type, description.
pub const NODE_FIELDS: [(&str, &str, &str); 9] = [
    ("osmid", "int", "Unique OSM node ID"),
    ("x", "float", "Longitude coordinate (EPSG:4326)"),
    ("y", "float", "Latitude coordinate (EPSG:4326)"),
    ("elevation", "int", "Node elevation (meters above sea level) from ASTER or SRTM"),
    ("elevation_aster", "int", "Node elevation (meters above sea level) from ASTER"),
    ("elevation_srtm", "int", "Node elevation (meters above sea level) from SRTM"),
    ("street_count", "int", "Number of physical street segments connected to this node"),
    ("bc", "float", "Normalized distance-weighted node betweenness centrality"),
    ("other attributes", "", "As defined in OSM documentation"),
];

/// Documented GraphML edge attributes: name, type, description.
pub const EDGE_FIELDS: [(&str, &str, &str); 11] = [
    ("u", "int", "Unique OSM ID of source node"),
    ("v", "int", "Unique OSM ID of destination node"),
    ("key", "int", "Unique ID if parallel edges exist between u and v"),
    ("osmid", "int", "Unique OSM way ID"),
    ("geometry", "linestring", "Edge centerline geometry (EPSG:4326)"),
    ("length", "float", "Length along the edge (meters)"),
    ("grade", "float", "Edge grade (rise over run)"),
    ("grade_abs", "float", "Absolute value of edge grade"),
    ("oneway", "boolean", "Whether edge part of a one-way street"),
    ("reversed", "boolean", "Whether edge runs opposite direction of OSM way"),
    ("other attributes", "", "As defined in OSM documentation"),
];

/// Description of every merged indicator column, in metadata order.
pub const INDICATOR_DESCRIPTIONS: [(&str, &str); 54] = [
    ("area_km2", "Area within urban center boundary polygon, km2 (GHS)"),
    ("avg_elevation", "Average elevation, meters above sea level (GHS)"),
    ("avg_precipitation", "Annual average precipitation, millimeters (GHS)"),
    ("avg_temperature", "Average temperature, celsius (GHS)"),
    ("bc_gini", "Gini coefficient of normalized distance-weighted node betweenness centralities"),
    ("bc_max", "Max normalized distance-weighted node betweenness centralities"),
    ("built_height_m", "Average height of built surfaces, meters (GHS)"),
    ("built_up_area_m2", "Built-up surface area, square meters (GHS)"),
    ("built_up_area_percap", "Built-up surface area per-capita, square meters per person (GHS)"),
    ("cc_avg_dir", "Average clustering coefficient (unweighted/directed)"),
    ("cc_avg_undir", "Average clustering coefficient (unweighted/undirected)"),
    ("cc_wt_avg_dir", "Average clustering coefficient (weighted/directed)"),
    ("cc_wt_avg_undir", "Average clustering coefficient (weighted/undirected)"),
    ("circuity", "Ratio of street lengths to straightline distances"),
    ("core_city", "Urban center core city name"),
    ("country", "Primary country name"),
    ("country_iso", "Primary country ISO 3166-1 alpha-3 code"),
    ("elev_iqr", "Interquartile range of node elevations, meters"),
    ("elev_mean", "Mean node elevation, meters"),
    ("elev_median", "Median node elevation, meters"),
    ("elev_range", "Range of node elevations, meters"),
    ("elev_std", "Standard deviation of node elevations, meters"),
    ("gdp_ppp", "Total GDP PPP, USD (GHS)"),
    ("grade_mean", "Mean absolute street grade (incline)"),
    ("grade_median", "Median absolute street grade (incline)"),
    ("hdi", "Human development index at subnational level (GHS)"),
    ("intersect_count", "Count of (undirected) edge intersections"),
    ("intersect_count_clean", "Count of street intersections (merged within 10 meters geometrically)"),
    ("intersect_count_clean_topo", "Count of street intersections (merged within 10 meters topologically)"),
    ("k_avg", "Average node degree (undirected)"),
    ("koppen_geiger", "Köppen-Geiger classification of majority of surface (GHS)"),
    ("land_use_efficiency", "Land use efficiency 1990-2015 (GHS)"),
    ("length_mean", "Mean street segment length (undirected edges), meters"),
    ("length_median", "Median street segment length (undirected edges), meters"),
    ("length_total", "Total street length (undirected edges), meters"),
    ("node_count", "Count of nodes"),
    ("orientation_entropy", "Entropy of street network bearings"),
    ("orientation_order", "Order of street network bearings, 0 for uniform and 1 for a perfect grid"),
    ("pagerank_max", "The maximum PageRank value of any node"),
    ("pm25_concentration", "Population-weighted average PM2.5 concentrations, micrograms/meter^3 (GHS)"),
    ("pop_greenness", "Land consumption rate / population growth rate (GHS)"),
    ("prop_4way", "Proportion of nodes that represent 4-way street intersections"),
    ("prop_3way", "Proportion of nodes that represent 3-way street intersections"),
    ("prop_deadend", "Proportion of nodes that represent dead-ends"),
    ("resident_pop", "Total resident population (GHS)"),
    ("self_loop_proportion", "Proportion of edges that are self-loops"),
    ("straightness", "1 / circuity"),
    ("street_segment_count", "Count of streets (undirected edges)"),
    ("transport_co2_em", "Total CO2 emissions from transport sector, tons/year (GHS)"),
    ("transport_pm25_em", "Total PM2.5 emissions from transport sector, tons/year (GHS)"),
    ("uc_id", "Urban center unique ID (GHS)"),
    ("uc_names", "List of city names within this urban center (GHS)"),
    ("world_bank_income_group", "World Bank income group"),
    ("world_region", "UN SDG geographic region"),
];

fn metadata_frame(rows: &[(&str, &str, &str)]) -> Result<DataFrame> {
    Ok(df![
        "indicator" => rows.iter().map(|r| r.0).collect::<Vec<_>>(),
        "type" => rows.iter().map(|r| r.1).collect::<Vec<_>>(),
        "description" => rows.iter().map(|r| r.2).collect::<Vec<_>>(),
    ]?)
}

/// Short type name of a column as read back from CSV.
pub fn type_name(dtype: &DataType) -> String {
    match dtype {
        dt if dt.is_integer() => "int".into(),
        dt if dt.is_float() => "float".into(),
        DataType::Boolean => "bool".into(),
        DataType::String | DataType::Null => "string".into(),
        other => other.to_string(),
    }
}

/// Type and description of every column of `indicators`, in description
/// order. Fails naming any column without a description or description
/// without a column.
pub fn describe_indicators(indicators: &DataFrame) -> Result<Vec<(&'static str, String, &'static str)>> {
    let columns: BTreeSet<&str> = indicators.get_column_names().iter().map(|s| s.as_str()).collect();
    let described: BTreeSet<&str> = INDICATOR_DESCRIPTIONS.iter().map(|d| d.0).collect();

    let undescribed: Vec<_> = columns.difference(&described).collect();
    let absent: Vec<_> = described.difference(&columns).collect();
    if !undescribed.is_empty() || !absent.is_empty() {
        bail!("[metadata] Indicator columns {undescribed:?} have no description, described {absent:?} are missing");
    }

    INDICATOR_DESCRIPTIONS.iter()
        .map(|&(name, description)| Ok((name, type_name(indicators.column(name)?.dtype()), description)))
        .collect()
}

/// Write node, edge and indicator metadata CSVs. The published indicator
/// metadata covers only the published columns.
pub fn create_metadata(config: &Config) -> Result<()> {
    write_csv(&mut metadata_frame(&NODE_FIELDS)?, &config.models_metadata_nodes_path)?;
    info!("[metadata] Saved graph nodes metadata to {}", config.models_metadata_nodes_path.display());
    write_csv(&mut metadata_frame(&EDGE_FIELDS)?, &config.models_metadata_edges_path)?;
    info!("[metadata] Saved graph edges metadata to {}", config.models_metadata_edges_path.display());

    let all = describe_indicators(&read_csv(&config.indicators_all_path)?)?;
    let all: Vec<(&str, &str, &str)> = all.iter().map(|(n, t, d)| (*n, t.as_str(), *d)).collect();
    write_csv(&mut metadata_frame(&all)?, &config.indicators_all_metadata_path)?;
    info!("[metadata] Saved all indicator metadata to {}", config.indicators_all_metadata_path.display());

    let published = read_csv(&config.indicators_path)?;
    let published: Vec<_> = all.into_iter().filter(|row| published.column(row.0).is_ok()).collect();
    write_csv(&mut metadata_frame(&published)?, &config.indicators_metadata_path)?;
    info!("[metadata] Saved published indicator metadata to {}", config.indicators_metadata_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{calculate_indicators, merge_indicators};
    use crate::io::str_values;
    use crate::testutil::{save_test_graph, street_grid, uc_feature, write_uc_inputs};
    use crate::ucdb::prep_urban_centers;

    #[test]
    fn every_indicator_is_described() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::under(dir.path());
        write_uc_inputs(&config, vec![uc_feature(1, "Lyon", "France", 5e6, "High")]);
        prep_urban_centers(&config).unwrap();
        save_test_graph(&config, "france-FRA", "lyon-1", &street_grid(3));
        calculate_indicators(&config).unwrap();
        merge_indicators(&config).unwrap();

        create_metadata(&config).unwrap();

        let nodes = read_csv(&config.models_metadata_nodes_path).unwrap();
        assert_eq!(nodes.get_column_names().iter().map(|s| s.as_str()).collect::<Vec<_>>(), ["indicator", "type", "description"]);
        assert_eq!(nodes.height(), NODE_FIELDS.len());
        assert_eq!(read_csv(&config.models_metadata_edges_path).unwrap().height(), EDGE_FIELDS.len());

        let all = read_csv(&config.indicators_all_metadata_path).unwrap();
        assert_eq!(all.height(), 54);
        let names = str_values(&all, "indicator").unwrap();
        let types = str_values(&all, "type").unwrap();
        let type_of = |name: &str| types[names.iter().position(|n| n == name).unwrap()].clone();
        assert_eq!(names[0], "area_km2");
        assert_eq!(type_of("uc_id"), "int");
        assert_eq!(type_of("circuity"), "float");
        assert_eq!(type_of("country"), "string");

        let published = read_csv(&config.indicators_metadata_path).unwrap();
        assert_eq!(published.height(), 54 - 14);
        assert!(!str_values(&published, "indicator").unwrap().contains(&"hdi".to_string()));
    }

    #[test]
    fn undescribed_columns_are_rejected() {
        let df = df!["uc_id" => [1i64], "mystery" => [2.0]].unwrap();
        let err = describe_indicators(&df).unwrap_err().to_string();
        assert!(err.contains("mystery"));
    }

    #[test]
    fn short_type_names() {
        assert_eq!(type_name(&DataType::Int64), "int");
        assert_eq!(type_name(&DataType::Float64), "float");
        assert_eq!(type_name(&DataType::Boolean), "bool");
        assert_eq!(type_name(&DataType::String), "string");
    }
}
