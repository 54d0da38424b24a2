use crate::error::Result;
use crate::join::JoinedRow;
use crate::types::{LongTable, RegionRow};
use crate::util::format_optional;
use geojson::{Feature, FeatureCollection, GeoJson};
use serde::Serialize;
use std::path::Path;
use tabled::{builder::Builder, settings::Style, Table, Tabled};

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the canonical long table: `region, year, <attributes>, <metrics>`.
/// Null metrics are written as empty cells.
pub fn write_long_csv(path: &Path, table: &LongTable) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    write_long_records(&mut wtr, table)?;
    wtr.flush()?;
    Ok(())
}

pub fn write_long_records<W: std::io::Write>(wtr: &mut csv::Writer<W>, table: &LongTable) -> Result<()> {
    let mut header = vec!["region".to_string(), "year".to_string()];
    header.extend(table.attribute_names.iter().cloned());
    header.extend(table.metric_names.iter().cloned());
    wtr.write_record(&header)?;
    for r in &table.records {
        let mut row = vec![r.region.clone(), r.year.to_string()];
        for name in &table.attribute_names {
            row.push(r.attributes.get(name).cloned().unwrap_or_default());
        }
        for name in &table.metric_names {
            row.push(r.metric(name).map(|v| v.to_string()).unwrap_or_default());
        }
        wtr.write_record(&row)?;
    }
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

/// Turn joined rows back into GeoJSON for the map renderer. Each feature
/// keeps its geometry and properties; record values are merged in, and a
/// feature without a record gets `null` for every key a record would add, so
/// all features share one property schema.
pub fn joined_feature_collection<T: RegionRow>(
    rows: &[JoinedRow<'_, T>],
    table: &LongTable,
) -> FeatureCollection {
    let keys = T::property_names(table);
    let features = rows
        .iter()
        .map(|row| {
            let mut properties = row.feature.properties.clone();
            match row.record {
                Some(record) => properties.extend(record.properties()),
                None => {
                    for name in &keys {
                        properties.insert(name.clone(), serde_json::Value::Null);
                    }
                }
            }
            Feature {
                bbox: None,
                geometry: row.feature.geometry.clone(),
                id: row.feature.id.clone(),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

pub fn write_geojson(path: &Path, collection: FeatureCollection) -> Result<()> {
    std::fs::write(path, serde_json::to_string(&GeoJson::from(collection))?)?;
    Ok(())
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().cloned().take(max_rows).collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

/// Markdown preview of the first rows of a long table.
pub fn preview_long(table: &LongTable, max_rows: usize) {
    if table.records.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let mut builder = Builder::default();
    let mut header = vec!["region".to_string(), "year".to_string()];
    header.extend(table.attribute_names.iter().cloned());
    header.extend(table.metric_names.iter().cloned());
    builder.push_record(header);
    for r in table.records.iter().take(max_rows) {
        let mut row = vec![r.region.clone(), r.year.to_string()];
        for name in &table.attribute_names {
            row.push(r.attributes.get(name).cloned().unwrap_or_default());
        }
        for name in &table.metric_names {
            row.push(format_optional(r.metric(name), 2));
        }
        builder.push_record(row);
    }
    let mut rendered = builder.build();
    rendered.with(Style::markdown());
    println!("{}\n", rendered);
}
