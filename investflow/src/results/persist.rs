//! Writing and reading the aggregated run artifacts.

use super::{CapacityTimeline, MultiStageResult, TimelineEntry};
use crate::core::CapacitySnapshot;
use crate::errors::{InvestflowResult, ParseError};
use std::path::Path;

const TOTAL_SUFFIX: &str = "_total";
const ADDED_SUFFIX: &str = "_added";

/// Writes the aggregate as pretty JSON.
pub fn write_result_json(path: &Path, result: &MultiStageResult) -> InvestflowResult<()> {
    let text = serde_json::to_string_pretty(result)?;
    std::fs::write(path, text)?;
    Ok(())
}

/// Reads an aggregate written by [`write_result_json`].
pub fn read_result_json(path: &Path) -> InvestflowResult<MultiStageResult> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Writes the timeline as `index,year,<channel>_total,<channel>_added,...,capex`.
pub fn write_timeline_csv(path: &Path, timeline: &CapacityTimeline) -> InvestflowResult<()> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec!["index".to_string(), "year".to_string()];
    for channel in &timeline.channels {
        header.push(format!("{channel}{TOTAL_SUFFIX}"));
        header.push(format!("{channel}{ADDED_SUFFIX}"));
    }
    header.push("capex".to_string());
    writer.write_record(&header)?;

    for entry in &timeline.entries {
        let mut row = vec![entry.index.to_string(), entry.year.to_string()];
        for channel in &timeline.channels {
            row.push(entry.totals.get(channel).unwrap_or(0.0).to_string());
            row.push(entry.additions.get(channel).unwrap_or(0.0).to_string());
        }
        row.push(entry.capex.to_string());
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

fn decode(column: &str, raw: &str) -> Result<f64, ParseError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ParseError::new("timeline", column, raw, "number"))
}

/// Reads a timeline written by [`write_timeline_csv`].
pub fn read_timeline_csv(path: &Path) -> InvestflowResult<CapacityTimeline> {
    let mut reader = csv::Reader::from_path(path)?;
    let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let channels: Vec<String> = header
        .iter()
        .filter_map(|h| h.strip_suffix(TOTAL_SUFFIX))
        .map(str::to_string)
        .collect();

    let mut entries = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut index = 0;
        let mut year = 0;
        let mut capex = 0.0;
        let mut totals = CapacitySnapshot::new();
        let mut additions = CapacitySnapshot::new();

        for (column, raw) in header.iter().zip(row.iter()) {
            match column.as_str() {
                "index" => {
                    index = raw
                        .parse()
                        .map_err(|_| ParseError::new("timeline", "index", raw, "integer"))?;
                }
                "year" => {
                    year = raw
                        .parse()
                        .map_err(|_| ParseError::new("timeline", "year", raw, "integer"))?;
                }
                "capex" => capex = decode(column, raw)?,
                other => {
                    if let Some(channel) = other.strip_suffix(TOTAL_SUFFIX) {
                        totals.set(channel, decode(column, raw)?);
                    } else if let Some(channel) = other.strip_suffix(ADDED_SUFFIX) {
                        additions.set(channel, decode(column, raw)?);
                    }
                }
            }
        }
        entries.push(TimelineEntry {
            index,
            year,
            totals,
            additions,
            capex,
        });
    }
    Ok(CapacityTimeline { channels, entries })
}
