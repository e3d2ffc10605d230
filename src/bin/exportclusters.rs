use clap::Parser;
use log::{info, LevelFilter};
use outagemap::{BoundingBox, ClusterList, Coord, OutageResult, ZoomLevel};
use simple_logger::SimpleLogger;
use std::{
    fmt::{self, Display},
    path::PathBuf,
};

/*-------------------------------------------------------------------------------------------------
 *                               Parse Command Line Arguments
 *-----------------------------------------------------------------------------------------------*/
///
/// Export outage clusters into a KML or KMZ file.
///
/// The records in a CSV file are clustered for a single zoom level or threshold and every cluster
/// is drawn with its center, its enclosing circle, and its affected area.
///
#[derive(Debug, Parser)]
#[clap(bin_name = "exportclusters")]
#[clap(author, version, about)]
struct ExportClustersOptionsInit {
    /// The path to the CSV file of outage reports.
    ///
    /// If this is not specified, then the program will check for it in the "OUTAGE_CSV"
    /// environment variable.
    #[clap(short, long)]
    #[clap(env = "OUTAGE_CSV")]
    csv_file: PathBuf,

    /// The path to the output file, it must end in ".kml" or ".kmz".
    ///
    /// If this is not specified, then the program will create one automatically by replacing the
    /// file extension on the csv_file with "*.kml".
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// The map zoom level to cluster for, 0 through 20.
    #[clap(short, long)]
    #[clap(required_unless_present = "threshold", conflicts_with = "threshold")]
    zoom: Option<ZoomLevel>,

    /// A fixed clustering threshold in kilometers.
    #[clap(short, long)]
    threshold: Option<f64>,

    /// Only export clusters that reach into this map viewport.
    ///
    /// The format is "min_lat,min_lon,max_lat,max_lon".
    #[clap(short, long)]
    #[clap(parse(try_from_str=parse_bbox))]
    bbox: Option<BoundingBox>,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

/// Parse a bounding box argument.
fn parse_bbox(bbox_str: &str) -> Result<BoundingBox, String> {
    let corners = bbox_str
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|err| format!("{}: {}", v, err)))
        .collect::<Result<Vec<_>, _>>()?;

    if corners.len() != 4 {
        return Err(format!("Invalid number of coords: {}", bbox_str));
    }

    let (min_lat, min_lon, max_lat, max_lon) = (corners[0], corners[1], corners[2], corners[3]);

    if !(min_lat < max_lat && min_lon < max_lon) {
        return Err(format!(
            concat!(
                "Minimum Lat/Lon must be less than Maximum Lat/Lon:",
                " min_lat={} max_lat={} min_lon={} max_lon={}"
            ),
            min_lat, max_lat, min_lon, max_lon
        ));
    }

    if min_lat < -90.0 || max_lat > 90.0 || min_lon < -180.0 || max_lon > 180.0 {
        return Err(format!(
            concat!(
                "Lat/Lon are out of range (-90.0 to 90.0 and -180.0 to 180.0):",
                " min_lat={} max_lat={} min_lon={} max_lon={}"
            ),
            min_lat, max_lat, min_lon, max_lon
        ));
    }

    Ok(BoundingBox {
        ll: Coord {
            lat: min_lat,
            lon: min_lon,
        },
        ur: Coord {
            lat: max_lat,
            lon: max_lon,
        },
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Format {
    Kml,
    Kmz,
}

#[derive(Debug)]
struct ExportClustersOptionsChecked {
    /// The path to the CSV file.
    csv_file: PathBuf,

    /// The path to the output file.
    output: PathBuf,

    /// Which kind of file to write.
    format: Format,

    /// Zoom level, if clustering for one.
    zoom: Option<ZoomLevel>,

    /// Clustering threshold in kilometers.
    threshold_km: f64,

    /// Map viewport to limit the export to.
    bbox: Option<BoundingBox>,

    /// Verbose output
    verbose: bool,
}

impl Display for ExportClustersOptionsChecked {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        writeln!(f)?;
        writeln!(f, "     Input: {}", self.csv_file.display())?;
        writeln!(f, "    Output: {}", self.output.display())?;
        if let Some(zoom) = self.zoom {
            writeln!(f, "      Zoom: {}", zoom)?;
        }
        writeln!(f, " Threshold: {} km", self.threshold_km)?;
        if let Some(bbox) = self.bbox {
            writeln!(f, "  Viewport: {}", bbox)?;
        }

        Ok(())
    }
}

/// Get the command line arguments and check them.
fn parse_args() -> OutageResult<ExportClustersOptionsChecked> {
    let ExportClustersOptionsInit {
        csv_file,
        output,
        zoom,
        threshold,
        bbox,
        verbose,
    } = ExportClustersOptionsInit::parse();

    let output = match output {
        Some(v) => v,
        None => {
            let mut clone = csv_file.clone();
            clone.set_extension("kml");
            clone
        }
    };

    let format = match output.extension().and_then(|ex| ex.to_str()) {
        Some(ex) if ex.eq_ignore_ascii_case("kml") => Format::Kml,
        Some(ex) if ex.eq_ignore_ascii_case("kmz") => Format::Kmz,
        _ => {
            return Err(format!(
                "output file must end in .kml or .kmz: {}",
                output.display()
            )
            .into())
        }
    };

    let threshold_km = match (zoom, threshold) {
        (Some(zoom), _) => zoom.threshold_km(),
        (None, Some(km)) => km,
        (None, None) => return Err("a zoom level or threshold is required".into()),
    };

    Ok(ExportClustersOptionsChecked {
        csv_file,
        output,
        format,
        zoom,
        threshold_km,
        bbox,
        verbose,
    })
}

/*-------------------------------------------------------------------------------------------------
 *                                             MAIN
 *-----------------------------------------------------------------------------------------------*/
fn main() -> OutageResult<()> {
    let opts = parse_args()?;

    let level = if opts.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new()
        .with_level(LevelFilter::Warn)
        .with_module_level("outagemap", level)
        .with_module_level("exportclusters", level)
        .init()?;

    if opts.verbose {
        info!("{}", opts);
    }

    let records = outagemap::read_outage_csv(&opts.csv_file)?;
    let source = opts.csv_file.display().to_string();

    let mut list = match opts.zoom {
        Some(zoom) => ClusterList::for_zoom(source, &records, zoom)?,
        None => ClusterList::from_records(source, &records, opts.threshold_km)?,
    };

    if let Some(viewport) = opts.bbox {
        let dropped = list.retain_within(&viewport);
        info!("Skipped {} clusters outside of {}", dropped, viewport);
    }

    if let Some(extent) = list.bounding_box() {
        info!("Exported clusters cover {}", extent);
    }

    match opts.format {
        Format::Kml => list.save_kml(&opts.output)?,
        Format::Kmz => list.save_kmz(&opts.output)?,
    }

    info!(
        "Wrote {} clusters of {} records to {}",
        list.len(),
        list.total_records(),
        opts.output.display()
    );

    Ok(())
}
