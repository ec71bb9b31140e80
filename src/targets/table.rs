//! Address to station lookup table, read from a CSV export of the station
//! spreadsheet.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use tracing::{debug, warn};

use super::{is_valid_address, ResolveError, Target};

/// Header names accepted for the address column.
const ADDRESS_HEADERS: &[&str] = &["ip", "address"];
/// Header names accepted for the station label column.
const LABEL_HEADERS: &[&str] = &["estacion", "station", "label"];

/// Which rows of the table to turn into targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Addresses(Vec<String>),
}

/// Ordered address -> label rows.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    rows: Vec<Target>,
}

impl LookupTable {
    pub fn from_path(path: &Path) -> Result<Self, ResolveError> {
        let file = File::open(path).map_err(|e| ResolveError::Read {
            path: path.to_path_buf(),
            source: csv::Error::from(e),
        })?;
        Self::from_reader(file, path)
    }

    /// Parse a table; `origin` only names the source in errors.
    pub fn from_reader<R: Read>(reader: R, origin: &Path) -> Result<Self, ResolveError> {
        let read_err = |source: csv::Error| ResolveError::Read {
            path: origin.to_path_buf(),
            source,
        };

        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers().map_err(read_err)?.clone();
        let address_col =
            find_column(&headers, ADDRESS_HEADERS).ok_or_else(|| missing(origin, "IP"))?;
        let label_col =
            find_column(&headers, LABEL_HEADERS).ok_or_else(|| missing(origin, "Estacion"))?;

        let mut rows = Vec::new();
        let mut seen = HashSet::new();

        for record in reader.records() {
            let record = record.map_err(read_err)?;
            let address = record.get(address_col).unwrap_or("").trim();
            let label = record.get(label_col).unwrap_or("").trim();

            if address.is_empty() || label.is_empty() {
                continue;
            }
            if !is_valid_address(address) {
                warn!(address, "skipping lookup table row with an invalid address");
                continue;
            }
            if !seen.insert(address.to_string()) {
                debug!(address, "duplicate address in lookup table, keeping first row");
                continue;
            }
            rows.push(Target::new(address).with_label(label));
        }

        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Station label for `address`, if the table knows it.
    pub fn label_for(&self, address: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|t| t.address == address)
            .and_then(|t| t.label.as_deref())
    }

    /// Targets for the selected rows, in table order.
    ///
    /// Each target's label is looked up by its own address. Selected
    /// addresses that aren't in the table are dropped.
    pub fn resolve(&self, selection: &Selection) -> Vec<Target> {
        match selection {
            Selection::All => self.rows.clone(),
            Selection::Addresses(wanted) => {
                let wanted: HashSet<&str> = wanted.iter().map(|a| a.trim()).collect();
                for address in &wanted {
                    if self.label_for(address).is_none() {
                        debug!(address, "selected address not in lookup table");
                    }
                }
                self.rows
                    .iter()
                    .filter(|t| wanted.contains(t.address.as_str()))
                    .cloned()
                    .collect()
            }
        }
    }
}

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
}

fn missing(origin: &Path, column: &'static str) -> ResolveError {
    ResolveError::MissingColumn {
        path: PathBuf::from(origin),
        column,
    }
}
