//! Strict typed decoding of summary fields.
//!
//! Every field read from a solved artifact goes through [`FieldDecoder`].
//! Empty and `nan` values decode as absent; any other representation that
//! does not match the requested type is a [`ParseError`].

use super::SummaryTable;
use crate::errors::ParseError;

/// Typed view over a [`SummaryTable`].
#[derive(Debug, Clone, Copy)]
pub struct FieldDecoder<'a> {
    table: &'a SummaryTable,
}

impl<'a> FieldDecoder<'a> {
    /// Wraps a summary table.
    #[must_use]
    pub fn new(table: &'a SummaryTable) -> Self {
        Self { table }
    }

    fn raw(&self, block: &str, key: &str) -> Option<&'a str> {
        self.table
            .get(block, key)
            .map(str::trim)
            .filter(|raw| !raw.is_empty() && !raw.eq_ignore_ascii_case("nan"))
    }

    /// Decodes a finite number, or `None` if the field is absent.
    pub fn number(&self, block: &str, key: &str) -> Result<Option<f64>, ParseError> {
        let Some(raw) = self.raw(block, key) else {
            return Ok(None);
        };
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(Some(value)),
            _ => Err(ParseError::new(block, key, raw, "number")),
        }
    }

    /// Decodes a finite number that must be present.
    pub fn require_number(&self, block: &str, key: &str) -> Result<f64, ParseError> {
        self.number(block, key)?
            .ok_or_else(|| ParseError::new(block, key, "", "number"))
    }

    /// Decodes `true`/`false`/`1`/`0` in any case, or `None` if absent.
    pub fn flag(&self, block: &str, key: &str) -> Result<Option<bool>, ParseError> {
        let Some(raw) = self.raw(block, key) else {
            return Ok(None);
        };
        match raw.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Some(true)),
            "false" | "0" => Ok(Some(false)),
            _ => Err(ParseError::new(block, key, raw, "boolean")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SummaryTable {
        SummaryTable::from_reader(
            "Block,Key,value\n\
             scenario,npv,-1234.5\n\
             scenario,compensate_sim_prj,True\n\
             scenario,flag_zero,0\n\
             scenario,empty,\n\
             scenario,missing_value,NaN\n\
             scenario,text,abc\n\
             scenario,infinite,inf\n"
                .as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn test_numbers() {
        let table = table();
        let decoder = FieldDecoder::new(&table);
        assert_eq!(decoder.number("scenario", "npv").unwrap(), Some(-1234.5));
        assert_eq!(decoder.number("scenario", "empty").unwrap(), None);
        assert_eq!(decoder.number("scenario", "missing_value").unwrap(), None);
        assert_eq!(decoder.number("scenario", "absent").unwrap(), None);
    }

    #[test]
    fn test_boolean_text_is_not_a_number() {
        let table = table();
        let err = FieldDecoder::new(&table)
            .number("scenario", "compensate_sim_prj")
            .unwrap_err();
        assert_eq!(err.raw, "True");
        assert_eq!(err.expected, "number");
    }

    #[test]
    fn test_infinite_rejected() {
        let table = table();
        assert!(FieldDecoder::new(&table).number("scenario", "infinite").is_err());
    }

    #[test]
    fn test_require_number() {
        let table = table();
        let decoder = FieldDecoder::new(&table);
        assert_eq!(decoder.require_number("scenario", "npv").unwrap(), -1234.5);
        assert!(decoder.require_number("scenario", "empty").is_err());
    }

    #[test]
    fn test_flags() {
        let table = table();
        let decoder = FieldDecoder::new(&table);
        assert_eq!(decoder.flag("scenario", "compensate_sim_prj").unwrap(), Some(true));
        assert_eq!(decoder.flag("scenario", "flag_zero").unwrap(), Some(false));
        assert_eq!(decoder.flag("scenario", "absent").unwrap(), None);
        assert!(decoder.flag("scenario", "text").is_err());
    }
}
