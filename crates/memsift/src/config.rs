//! Scan configuration as supplied by a front-end.
//!
//! The configuration is the serialization boundary; compiling it is the
//! single validation point, so every illegal combination is rejected here
//! before a session issues any I/O.

use crate::{
    error::Error, pattern::PatternRule, predicate::ScanOp, Address, Alignment, Predicate,
    RegionFilter, Type, Value,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueInputFormat {
    #[serde(rename = "dec")]
    Decimal,
    #[serde(rename = "hex")]
    Hex,
}

impl Default for ValueInputFormat {
    fn default() -> Self {
        ValueInputFormat::Decimal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Normal,
    Pattern,
    Pointer,
}

impl Default for SearchMode {
    fn default() -> Self {
        SearchMode::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanKind {
    #[serde(rename = "exact")]
    Exact,
    #[serde(rename = "range")]
    Range,
    #[serde(rename = "greater-or-equal")]
    GreaterOrEqual,
    #[serde(rename = "less-than")]
    LessThan,
    #[serde(rename = "changed")]
    Changed,
    #[serde(rename = "unchanged")]
    Unchanged,
    #[serde(rename = "increased")]
    Increased,
    #[serde(rename = "decreased")]
    Decreased,
}

/// The full set of user-facing scan options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub value_type: Type,
    pub scan_kind: ScanKind,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub value_max: Option<String>,
    #[serde(default)]
    pub start_address: Option<Address>,
    #[serde(default)]
    pub end_address: Option<Address>,
    #[serde(default)]
    pub alignment: Alignment,
    #[serde(default)]
    pub readable: Option<bool>,
    #[serde(default)]
    pub writable: Option<bool>,
    #[serde(default)]
    pub executable: Option<bool>,
    #[serde(default)]
    pub value_format: ValueInputFormat,
    #[serde(default)]
    pub search_mode: SearchMode,
}

impl ScanConfig {
    /// Compile the configuration into a predicate and a region filter.
    ///
    /// Pointer mode drives the chain resolver instead of a scan pass and
    /// has no predicate form.
    pub fn compile(&self) -> anyhow::Result<(Predicate, RegionFilter)> {
        let filter = RegionFilter {
            addr_min: self.start_address,
            addr_max: self.end_address,
            readable: self.readable,
            writable: self.writable,
            executable: self.executable,
        };

        let op = match self.search_mode {
            SearchMode::Pointer => return Err(Error::PointerSearchMode.into()),
            SearchMode::Pattern => {
                let source = self
                    .value
                    .as_deref()
                    .ok_or(Error::MissingScanValue("value"))?;

                ScanOp::Pattern(PatternRule::compile(source)?)
            }
            SearchMode::Normal => match self.scan_kind {
                ScanKind::Exact => ScanOp::Exact(self.parse_value("value", &self.value)?),
                ScanKind::Range => ScanOp::InRange(
                    self.parse_value("value", &self.value)?,
                    self.parse_value("value_max", &self.value_max)?,
                ),
                ScanKind::GreaterOrEqual => {
                    ScanOp::Gte(self.parse_value("value", &self.value)?)
                }
                ScanKind::LessThan => ScanOp::Lt(self.parse_value("value", &self.value)?),
                ScanKind::Changed => ScanOp::Changed,
                ScanKind::Unchanged => ScanOp::Unchanged,
                ScanKind::Increased => ScanOp::Increased,
                ScanKind::Decreased => ScanOp::Decreased,
            },
        };

        let predicate = Predicate::new(op, self.value_type, self.alignment)?;
        Ok((predicate, filter))
    }

    fn parse_value(&self, field: &'static str, input: &Option<String>) -> anyhow::Result<Value> {
        let input = input.as_deref().ok_or(Error::MissingScanValue(field))?;

        let value = match self.value_format {
            ValueInputFormat::Decimal => self.value_type.parse(input)?,
            ValueInputFormat::Hex => self.value_type.parse_hex(input)?,
        };

        Ok(value)
    }
}
