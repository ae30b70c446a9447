//! The fully merged input of one stage solve.

use super::{is_identifier, ScenarioTemplate};
use crate::core::{CapacityChannel, CapacitySnapshot};
use crate::errors::SpecificationError;
use crate::evolution::ParameterSet;
use sha2::{Digest, Sha256};
use std::path::Path;

/// A complete, self-consistent parameter snapshot for one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSpecification {
    /// Stage index.
    pub index: usize,
    /// Stage year.
    pub year: i32,
    /// Stage duration in years.
    pub duration_years: u32,
    /// Floor inherited from the previous stage.
    pub carried_capacity: CapacitySnapshot,
    /// Evolved parameters merged into the records.
    pub parameters: ParameterSet,
    /// Evaluation-window emissions of the previous stage, for diagnostics.
    pub previous_emissions_kg: Option<f64>,
    /// The merged optimizer records.
    pub records: ScenarioTemplate,
}

impl StageSpecification {
    /// Serializes the records as `block,key,value` CSV.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, csv::Error> {
        let mut out = Vec::new();
        self.records.write_csv(&mut out)?;
        Ok(out)
    }

    /// Hex SHA-256 of the serialized records.
    pub fn content_hash(&self) -> Result<String, csv::Error> {
        Ok(hash_bytes(&self.to_csv_bytes()?))
    }

    /// Writes the CSV to `path` and returns its hash.
    pub fn write_csv(&self, path: &Path) -> std::io::Result<String> {
        let bytes = self.to_csv_bytes().map_err(std::io::Error::other)?;
        std::fs::write(path, &bytes)?;
        Ok(hash_bytes(&bytes))
    }

    /// Checks that every channel block is present, every identifier is
    /// well-formed and every floor is a finite non-negative number.
    pub fn validate(&self, channels: &[CapacityChannel]) -> Result<(), SpecificationError> {
        for record in self.records.records() {
            if !is_identifier(&record.block) || !is_identifier(&record.key) {
                return Err(SpecificationError::new(format!(
                    "malformed identifier '{}.{}'",
                    record.block, record.key
                ))
                .with_stage(self.index)
                .with_parameter(&record.block, &record.key));
            }
        }

        for channel in channels {
            if !self.records.has_block(&channel.block) {
                return Err(SpecificationError::new(format!(
                    "missing block '{}' for channel '{}'",
                    channel.block, channel.id
                ))
                .with_stage(self.index)
                .with_parameter(&channel.block, &channel.existing_key));
            }
            let raw = self
                .records
                .get(&channel.block, &channel.existing_key)
                .unwrap_or_default();
            let valid = raw
                .parse::<f64>()
                .is_ok_and(|v| v.is_finite() && v >= 0.0);
            if !valid {
                return Err(SpecificationError::new(format!(
                    "floor for channel '{}' must be a finite non-negative number, got {raw:?}",
                    channel.id
                ))
                .with_stage(self.index)
                .with_parameter(&channel.block, &channel.existing_key));
            }
        }
        Ok(())
    }
}

/// Hex SHA-256 of arbitrary bytes.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
