//! Sparse `block,key,value` scenario templates.

use crate::errors::{InvestflowResult, SpecificationError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern"));

/// Returns true if `name` is a valid block or key identifier.
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// One (block, key, value) parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterRecord {
    /// Entity block, e.g. `pv`.
    pub block: String,
    /// Parameter key.
    pub key: String,
    /// Raw value as written to the optimizer.
    pub value: String,
}

/// An ordered set of parameter records, the base every stage specification
/// is merged over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioTemplate {
    records: Vec<ParameterRecord>,
}

impl ScenarioTemplate {
    /// Creates a template from records.
    #[must_use]
    pub fn from_records(records: Vec<ParameterRecord>) -> Self {
        Self { records }
    }

    /// Reads a template CSV with `block` and `key` columns followed by one
    /// or more scenario columns.
    ///
    /// `column` selects a scenario column by name; the first scenario column
    /// is used when `None`.
    pub fn from_csv_path(path: impl AsRef<Path>, column: Option<&str>) -> InvestflowResult<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_reader(file, column)
    }

    /// Reads a template from any CSV source.
    pub fn from_reader<R: Read>(reader: R, column: Option<&str>) -> InvestflowResult<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers = csv_reader.headers()?.clone();

        let position = |name: &str| headers.iter().position(|h| h == name);
        let block_at = position("block")
            .ok_or_else(|| SpecificationError::new("template has no 'block' column"))?;
        let key_at = position("key")
            .ok_or_else(|| SpecificationError::new("template has no 'key' column"))?;
        let value_at = match column {
            Some(name) => position(name).ok_or_else(|| {
                SpecificationError::new(format!("template has no scenario column '{name}'"))
            })?,
            None => (0..headers.len())
                .find(|i| *i != block_at && *i != key_at)
                .ok_or_else(|| SpecificationError::new("template has no scenario columns"))?,
        };

        let mut records = Vec::new();
        for row in csv_reader.records() {
            let row = row?;
            let field = |i: usize| row.get(i).unwrap_or_default().to_string();
            records.push(ParameterRecord {
                block: field(block_at),
                key: field(key_at),
                value: field(value_at),
            });
        }
        Ok(Self { records })
    }

    /// All records in order.
    #[must_use]
    pub fn records(&self) -> &[ParameterRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the template holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Looks up a raw value.
    #[must_use]
    pub fn get(&self, block: &str, key: &str) -> Option<&str> {
        self.records
            .iter()
            .find(|r| r.block == block && r.key == key)
            .map(|r| r.value.as_str())
    }

    /// Overwrites a value, appending the record if it is absent.
    pub fn set(&mut self, block: &str, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .records
            .iter_mut()
            .find(|r| r.block == block && r.key == key)
        {
            Some(record) => record.value = value,
            None => self.records.push(ParameterRecord {
                block: block.to_string(),
                key: key.to_string(),
                value,
            }),
        }
    }

    /// Returns true if any record belongs to `block`.
    #[must_use]
    pub fn has_block(&self, block: &str) -> bool {
        self.records.iter().any(|r| r.block == block)
    }

    /// Writes the records as `block,key,value` CSV.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(["block", "key", "value"])?;
        for record in &self.records {
            csv_writer.write_record([&record.block, &record.key, &record.value])?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}
