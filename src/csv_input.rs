/*!
 * Load outage records from CSV files.
 *
 * The expected header is `id,provider,latitude,longitude,start,end,polygon`, in any order. Only
 * the `latitude`, `longitude`, and `start` columns are required. Times are seconds since the Unix
 * epoch, an empty `end` means the outage is ongoing, and `polygon` is optional WKT.
 *
 * Loading is forgiving, a row that can't be turned into a valid record is logged and skipped.
 */
use crate::{
    geo::Coord,
    outage::{AffectedArea, OutageRecord},
    OutageResult,
};
use csv::{ReaderBuilder, StringRecord};
use std::{fs::File, io::Read, path::Path};

struct Columns {
    id: Option<usize>,
    provider: Option<usize>,
    latitude: usize,
    longitude: usize,
    start: usize,
    end: Option<usize>,
    polygon: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> OutageResult<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let require = |name: &str| find(name).ok_or_else(|| format!("missing {} column", name));

        Ok(Columns {
            id: find("id"),
            provider: find("provider"),
            latitude: require("latitude")?,
            longitude: require("longitude")?,
            start: require("start")?,
            end: find("end"),
            polygon: find("polygon"),
        })
    }
}

/// Get a trimmed, non-empty field.
fn field(record: &StringRecord, idx: Option<usize>) -> Option<&str> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn parse_row(record: &StringRecord, cols: &Columns, row: usize) -> OutageResult<OutageRecord> {
    let number = |idx: usize, name: &str| -> OutageResult<f64> {
        let text = field(record, Some(idx)).ok_or_else(|| format!("empty {}", name))?;
        text.parse::<f64>()
            .map_err(|err| format!("bad {} '{}': {}", name, text, err).into())
    };
    let timestamp = |text: &str, name: &str| -> OutageResult<i64> {
        text.parse::<i64>()
            .map_err(|err| format!("bad {} '{}': {}", name, text, err).into())
    };

    let coord = Coord {
        lat: number(cols.latitude, "latitude")?,
        lon: number(cols.longitude, "longitude")?,
    };
    if !coord.is_finite() {
        return Err(format!("non-finite coordinate {}", coord).into());
    }

    let start = field(record, Some(cols.start)).ok_or("empty start")?;
    let start = timestamp(start, "start")?;
    let end = field(record, cols.end)
        .map(|text| timestamp(text, "end"))
        .transpose()?;

    let id = field(record, cols.id)
        .map(str::to_owned)
        .unwrap_or_else(|| format!("row-{}", row));
    let provider = field(record, cols.provider).unwrap_or("");
    let area = field(record, cols.polygon).map(|wkt| AffectedArea::Wkt(wkt.to_owned()));

    OutageRecord::from_timestamps(id, provider, coord, start, end, area)
}

/**
 * Read outage records from any CSV source.
 *
 * #Arguments
 * * source - a name for the source used in log messages.
 * * rdr - where to read the CSV text from.
 *
 * #Returns
 * The valid records in file order. Fails only if the header can't be read or is missing a
 * required column.
 */
pub fn read_outage_csv_from_reader<R: Read>(
    source: &str,
    rdr: R,
) -> OutageResult<Vec<OutageRecord>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(rdr);

    let cols = Columns::from_headers(rdr.headers()?)?;

    let mut records = Vec::with_capacity(1024);
    let mut skipped = 0;
    for (i, result) in rdr.records().enumerate() {
        // Header is line 1.
        let row = i + 2;

        let parsed = result
            .map_err(|err| err.into())
            .and_then(|record| parse_row(&record, &cols, row));

        match parsed {
            Ok(outage) => records.push(outage),
            Err(err) => {
                log::warn!("{} row {}: skipping, {}", source, row, err);
                skipped += 1;
            }
        }
    }

    log::debug!(
        "{}: loaded {} records, skipped {}",
        source,
        records.len(),
        skipped
    );

    Ok(records)
}

/// Read outage records from the CSV file at `pth`.
pub fn read_outage_csv<P: AsRef<Path>>(pth: P) -> OutageResult<Vec<OutageRecord>> {
    let pth = pth.as_ref();
    let f = File::open(pth).map_err(|err| format!("unable to open {}: {}", pth.display(), err))?;

    read_outage_csv_from_reader(&pth.display().to_string(), f)
}
