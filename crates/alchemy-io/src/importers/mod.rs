//! # Importers
//!
//! Importers turn an external description of a distribution network into a
//! [`Topology`]. The built-in [`TabularImporter`] reads a directory of CSV sheets
//! (one file per sheet) describing the MV backbone and, optionally, its LV feeders.
//!
//! Rows that reference missing elements, or that would break a topology rule, are
//! skipped: each one is logged and recorded in the [`Diagnostics`] of the
//! [`ImportResult`]. Only structural problems (missing `NETWORKS` sheet, no
//! selectable network) fail the import as a whole.

mod resolver;
pub mod sheet;
mod tabular;


pub use resolver::FeederResolver;
pub use sheet::{normalize_id, RejectedRecord, Row, Sheet, Workbook};
pub use tabular::{import_dir, import_workbook, TabularImporter, TabularImporterConfig};

use alchemy_core::{Diagnostics, Topology};
use tracing::error;

/// A topology together with the issues found while building it.
#[derive(Debug)]
pub struct ImportResult {
    pub topology: Topology,
    pub diagnostics: Diagnostics,
}

pub(crate) fn record_row_error(
    diagnostics: &mut Diagnostics,
    category: &str,
    row: &Row<'_>,
    err: &anyhow::Error,
) {
    error!(line = row.line(), "{err:#}");
    diagnostics.add_error_at_line(category, &format!("{err:#}"), row.line());
}

/// Record every record of `sheet` that could not be decoded.
pub(crate) fn record_rejected(diagnostics: &mut Diagnostics, category: &str, sheet: &Sheet) {
    for rejected in sheet.rejected() {
        diagnostics.add_error_at_line(
            category,
            &format!("{}: {}", sheet.name(), rejected.message),
            rejected.line,
        );
    }
}
