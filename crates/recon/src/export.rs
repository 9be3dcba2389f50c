use std::io::Write;

use serde::Serialize;

use crate::error::ReconError;
use crate::model::ReconciledEntity;

pub const CSV_HEADER: [&str; 5] = ["name", "latitude", "longitude", "source", "status"];

#[derive(Serialize)]
struct ExportRow<'a> {
    name: &'a str,
    latitude: String,
    longitude: String,
    source: &'static str,
    status: &'static str,
}

impl<'a> From<&'a ReconciledEntity> for ExportRow<'a> {
    fn from(e: &'a ReconciledEntity) -> Self {
        Self {
            name: &e.name,
            latitude: format_coordinate(e.position.lat),
            longitude: format_coordinate(e.position.lon),
            source: e.coverage().label(),
            status: e.status.label(),
        }
    }
}

fn format_coordinate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.6}")
    } else {
        String::new()
    }
}

/// Write entities as CSV, in the order given, header first.
pub fn write_csv<'a, W: Write>(
    out: W,
    entities: impl IntoIterator<Item = &'a ReconciledEntity>,
) -> Result<(), ReconError> {
    let mut wtr = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(out);
    let mut rows = 0usize;
    for entity in entities {
        wtr.serialize(ExportRow::from(entity))
            .map_err(|e| ReconError::Export(e.to_string()))?;
        rows += 1;
    }
    if rows == 0 {
        // serialize() emits the header lazily; an empty export still gets one.
        wtr.write_record(CSV_HEADER)
            .map_err(|e| ReconError::Export(e.to_string()))?;
    }
    wtr.flush().map_err(|e| ReconError::Export(e.to_string()))?;
    Ok(())
}

pub fn to_csv_string<'a>(
    entities: impl IntoIterator<Item = &'a ReconciledEntity>,
) -> Result<String, ReconError> {
    let mut buf = Vec::new();
    write_csv(&mut buf, entities)?;
    String::from_utf8(buf).map_err(|e| ReconError::Export(e.to_string()))
}
