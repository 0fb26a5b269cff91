//! Record of which requested timestamps produced data.
//!
//! The ledger is kept in memory for the whole run and the file is rewritten in
//! full after every attempt. Each rewrite goes to a temporary file in the same
//! directory which then replaces the ledger, so a crash mid-write leaves the
//! previous version intact.

use std::{fmt, io::Write, path::Path};

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Available,
    NotAvailable,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Available => write!(f, "available"),
            Status::NotAvailable => write!(f, "not_available"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityRecord {
    pub datetime_uct_str: String,
    pub status: Status,
}

#[derive(Debug, Clone, Default)]
pub struct AvailabilityLedger {
    records: Vec<AvailabilityRecord>,
}

impl AvailabilityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, datetime_uct_str: &str, status: Status) {
        self.records.push(AvailabilityRecord {
            datetime_uct_str: datetime_uct_str.to_string(),
            status,
        });
    }

    pub fn records(&self) -> &[AvailabilityRecord] {
        &self.records
    }

    pub fn count(&self, status: Status) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    /// Replaces the file at `file_path` with every record so far.
    pub fn persist(&self, file_path: &Path) -> Result<()> {
        let dir = match file_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;

        {
            let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
            // an empty ledger still gets its header
            if self.records.is_empty() {
                writer.write_record(["datetime_uct_str", "status"])?;
            }
            for record in &self.records {
                writer.serialize(record)?;
            }
            writer.flush()?;
        }
        tmp.as_file_mut().flush()?;

        tmp.persist(file_path).map_err(|e| e.error)?;

        Ok(())
    }
}

// -- Tests -------------------------------------------------------------------
