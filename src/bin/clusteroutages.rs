//! Documentation for the binary is with the definition of `ClusterOutagesOptionsInit` below.

use clap::Parser;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, info, warn, LevelFilter};
use outagemap::{ClusterList, OutageRecord, OutageResult, ZoomLevel};
use simple_logger::SimpleLogger;
use std::{
    fmt::{self, Display},
    path::PathBuf,
    sync::Arc,
    thread::{self, JoinHandle},
};

const CHANNEL_SIZE: usize = 32;

/*-------------------------------------------------------------------------------------------------
 *                               Parse Command Line Arguments
 *-----------------------------------------------------------------------------------------------*/
///
/// Cluster outage reports and summarize the results.
///
/// Every CSV file found is clustered once for each requested zoom level, or once with a fixed
/// threshold. The number of clusters and the largest cluster for each run are logged.
///
#[derive(Debug, Parser)]
#[clap(bin_name = "clusteroutages")]
#[clap(author, version, about)]
struct ClusterOutagesOptionsInit {
    /// CSV files or directories to search for CSV files.
    ///
    /// If this is not specified, then the program will check for it in the "OUTAGE_CSV"
    /// environment variable.
    #[clap(env = "OUTAGE_CSV", required = true)]
    inputs: Vec<PathBuf>,

    /// Map zoom levels to cluster for, 0 through 20. Defaults to every level.
    #[clap(short, long, multiple_occurrences = true, use_value_delimiter = true)]
    #[clap(conflicts_with = "threshold")]
    zoom: Vec<ZoomLevel>,

    /// A fixed clustering threshold in kilometers to use instead of zoom levels.
    #[clap(short, long)]
    threshold: Option<f64>,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

/// How far apart records can be and still be linked.
#[derive(Debug, Clone)]
enum Scale {
    Zooms(Vec<ZoomLevel>),
    Threshold(f64),
}

#[derive(Debug)]
struct ClusterOutagesOptionsChecked {
    /// Files and directories to search.
    inputs: Vec<PathBuf>,

    /// The clustering scales to run for each file.
    scale: Scale,

    /// Verbose output
    verbose: bool,
}

impl Display for ClusterOutagesOptionsChecked {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        writeln!(f)?;
        for input in &self.inputs {
            writeln!(f, "     Input: {}", input.display())?;
        }
        match &self.scale {
            Scale::Threshold(km) => writeln!(f, " Threshold: {} km", km)?,
            Scale::Zooms(zooms) => {
                let zooms: Vec<String> = zooms.iter().map(ZoomLevel::to_string).collect();
                writeln!(f, "Zoom Levels: {}", zooms.join(", "))?;
            }
        }

        Ok(())
    }
}

/// Get the command line arguments and check them.
fn parse_args() -> OutageResult<ClusterOutagesOptionsChecked> {
    let ClusterOutagesOptionsInit {
        inputs,
        zoom,
        threshold,
        verbose,
    } = ClusterOutagesOptionsInit::parse();

    let scale = match threshold {
        Some(km) if km.is_finite() && km >= 0.0 => Scale::Threshold(km),
        Some(km) => return Err(format!("invalid threshold: {}", km).into()),
        None if zoom.is_empty() => Scale::Zooms(ZoomLevel::all().collect()),
        None => Scale::Zooms(zoom),
    };

    Ok(ClusterOutagesOptionsChecked {
        inputs,
        scale,
        verbose,
    })
}

/*-------------------------------------------------------------------------------------------------
 *                                            Main
 *-----------------------------------------------------------------------------------------------*/
fn main() -> OutageResult<()> {
    let opts = parse_args()?;

    let level = if opts.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .with_module_level("outagemap", level)
        .with_module_level("clusteroutages", level)
        .init()?;

    debug!(target: "startup", "{}", opts);

    let (to_load_thread, from_path_gen) = bounded(CHANNEL_SIZE);
    let (to_analysis, from_load_thread) = bounded(CHANNEL_SIZE);
    let (to_summary, from_analysis) = bounded(CHANNEL_SIZE);

    let path_gen = start_path_generation_thread(opts.inputs, to_load_thread)?;
    let load_thread = start_load_thread(from_path_gen, to_analysis, opts.scale)?;
    let analysis = start_analysis_threads(from_load_thread, to_summary)?;
    let summary = start_summary_thread(from_analysis)?;

    path_gen.join().map_err(|_| "path generation thread panicked")?;
    load_thread.join().map_err(|_| "load thread panicked")?;
    for jh in analysis {
        jh.join().map_err(|_| "analysis thread panicked")?;
    }
    let totals = summary.join().map_err(|_| "summary thread panicked")?;

    info!("");
    info!("     files - {:>9}", totals.files);
    info!("      runs - {:>9}", totals.runs);
    info!("   records - {:>9}", totals.records);
    info!("  clusters - {:>9}", totals.clusters);
    info!("");

    Ok(())
}

/*-------------------------------------------------------------------------------------------------
 *                           Threads - Functions that start threads
 *-----------------------------------------------------------------------------------------------*/
fn start_path_generation_thread(
    inputs: Vec<PathBuf>,
    to_load_thread: Sender<PathBuf>,
) -> OutageResult<JoinHandle<()>> {
    let jh = thread::Builder::new()
        .name("clusteroutages-path_gen".to_owned())
        .spawn(move || {
            let paths = inputs
                .into_iter()
                .flat_map(walkdir::WalkDir::new)
                .filter_map(|res| match res {
                    Ok(entry) => Some(entry),
                    Err(err) => {
                        warn!("{}", err);
                        None
                    }
                })
                // Ignore directories, WalkDir will take care of recursing into them.
                .filter(|entry| entry.path().is_file())
                .filter(|entry| {
                    entry
                        .path()
                        .extension()
                        .map(|ex| ex.eq_ignore_ascii_case("csv"))
                        .unwrap_or(false)
                });

            for entry in paths {
                debug!("Found {}", entry.path().display());
                if to_load_thread.send(entry.into_path()).is_err() {
                    break;
                }
            }
        })?;

    Ok(jh)
}

/// A single clustering run.
struct Job {
    source: Arc<str>,
    records: Arc<Vec<OutageRecord>>,
    threshold_km: f64,
    zoom: Option<ZoomLevel>,
}

fn start_load_thread(
    from_path_gen: Receiver<PathBuf>,
    to_analysis: Sender<Job>,
    scale: Scale,
) -> OutageResult<JoinHandle<()>> {
    let jh = thread::Builder::new()
        .name("clusteroutages-load".to_owned())
        .spawn(move || {
            for path in from_path_gen {
                let records = match outagemap::read_outage_csv(&path) {
                    Ok(records) => Arc::new(records),
                    Err(err) => {
                        warn!("Skipping {}: {}", path.display(), err);
                        continue;
                    }
                };

                let source: Arc<str> = Arc::from(path.display().to_string());
                info!("Loaded {} records from {}", records.len(), source);

                let jobs: Vec<(f64, Option<ZoomLevel>)> = match &scale {
                    Scale::Threshold(km) => vec![(*km, None)],
                    Scale::Zooms(zooms) => zooms
                        .iter()
                        .map(|zoom| (zoom.threshold_km(), Some(*zoom)))
                        .collect(),
                };

                for (threshold_km, zoom) in jobs {
                    let job = Job {
                        source: Arc::clone(&source),
                        records: Arc::clone(&records),
                        threshold_km,
                        zoom,
                    };

                    if to_analysis.send(job).is_err() {
                        return;
                    }
                }
            }
        })?;

    Ok(jh)
}

fn start_analysis_threads(
    from_load_thread: Receiver<Job>,
    to_summary: Sender<ClusterList>,
) -> OutageResult<Vec<JoinHandle<()>>> {
    let mut handles = Vec::with_capacity(num_cpus::get());

    for _ in 0..num_cpus::get() {
        let from_load_thread = from_load_thread.clone();
        let to_summary = to_summary.clone();

        let jh = thread::Builder::new()
            .name("clusteroutages-analysis".to_owned())
            .spawn(move || {
                for job in from_load_thread {
                    let result = match job.zoom {
                        Some(zoom) => ClusterList::for_zoom(&*job.source, &job.records, zoom),
                        None => {
                            ClusterList::from_records(&*job.source, &job.records, job.threshold_km)
                        }
                    };

                    match result {
                        Ok(list) => {
                            if to_summary.send(list).is_err() {
                                return;
                            }
                        }
                        Err(err) => warn!("Unable to cluster {}: {}", job.source, err),
                    }
                }
            })?;

        handles.push(jh);
    }

    Ok(handles)
}

#[derive(Debug, Default)]
struct Totals {
    files: usize,
    runs: usize,
    records: usize,
    clusters: usize,
}

fn start_summary_thread(from_analysis: Receiver<ClusterList>) -> OutageResult<JoinHandle<Totals>> {
    let jh = thread::Builder::new()
        .name("clusteroutages-summary".to_owned())
        .spawn(move || {
            let mut totals = Totals::default();
            let mut sources = rustc_hash::FxHashSet::default();

            for list in from_analysis {
                let zoom = list
                    .zoom
                    .map(|z| format!("zoom {:>2}", z))
                    .unwrap_or_else(|| "fixed".to_owned());

                match list.largest() {
                    Some(big) => info!(
                        "{} {} ({:.3} km): {} records in {} clusters, largest {} at {} r={:.2} km",
                        list.source,
                        zoom,
                        list.threshold_km,
                        list.total_records(),
                        list.len(),
                        big.count(),
                        big.center(),
                        big.radius_km(),
                    ),
                    None => info!("{} {}: no records", list.source, zoom),
                }

                if let Some(extent) = list.bounding_box() {
                    debug!("{} {} extent {}", list.source, zoom, extent);
                }

                if sources.insert(list.source.clone()) {
                    totals.files += 1;
                    totals.records += list.total_records();
                }
                totals.runs += 1;
                totals.clusters += list.len();
            }

            totals
        })?;

    Ok(jh)
}
