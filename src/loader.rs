use log::{debug, info, warn};

use epi_panel::*;
use snafu::{prelude::*, Snafu};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::loader::cache::PanelCache;
use crate::loader::config_reader::*;
use crate::loader::io_output::*;

pub mod cache;
pub mod config_reader;
pub mod io_common;
pub mod io_jhu;
pub mod io_nyt;
pub mod io_output;
pub mod io_owid;
pub mod io_population;
pub mod io_vax;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LoaderError {
    #[snafu(display("Error opening CSV file {path}"))]
    OpeningCsv { source: csv::Error, path: String },
    #[snafu(display("Error reading CSV file {path}"))]
    ReadingCsv { source: csv::Error, path: String },
    #[snafu(display("{path}: missing column {column:?}"))]
    MissingColumn { path: String, column: String },
    #[snafu(display("{path}:{lineno}: line is too short"))]
    CsvLineTooShort { path: String, lineno: usize },
    #[snafu(display("{path}:{lineno}: could not parse date {value:?}"))]
    ParsingDate {
        path: String,
        lineno: usize,
        value: String,
    },
    #[snafu(display("{path}:{lineno}: could not parse number {value:?}"))]
    ParsingNumber {
        path: String,
        lineno: usize,
        value: String,
    },
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("{path}: worksheet {sheet} is missing or empty"))]
    EmptyExcel { path: String, sheet: String },
    #[snafu(display("Error reading file {path}"))]
    ReadingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("No source is configured for {kind} data"))]
    MissingSource { kind: EntityKind },
    #[snafu(display("Provider {provider} requires the field {field}"))]
    MissingSourceField { provider: String, field: String },
    #[snafu(display("Unknown provider {provider:?}"))]
    UnknownProvider { provider: String },
    #[snafu(display("Cannot find the directory of {path}"))]
    MissingParentDir { path: String },
    #[snafu(display("Panel error: {source}"))]
    Panel { source: PanelErrors },
    #[snafu(display("Error writing output to {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error formatting the output table"))]
    WritingCsv { source: csv::Error },
    #[snafu(display("Output differs from the reference {path}"))]
    ReferenceMismatch { path: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type LoaderResult<T> = Result<T, LoaderError>;

/// The series shown when none is requested.
const DEFAULT_SERIES: [Series; 2] = [
    Series::new(Metric::Cases, Measure::DailyPerCapita),
    Series::new(Metric::Deaths, Measure::DailyPerCapita),
];

/// Reads every table configured for one entity class into a panel.
pub fn load_panel(kind: EntityKind, sources: &EntitySources, root: &Path) -> LoaderResult<Panel> {
    let provider = sources.provider()?;
    info!("load_panel: reading {} data from provider {}", kind, provider);

    let mut builder = PanelBuilder::new(kind)
        .metric(Metric::Cases, Convention::Cumulative)
        .metric(Metric::Deaths, Convention::Cumulative);
    if sources.vaccinations.is_some() {
        builder = builder.metric(Metric::Vax, Convention::Cumulative);
    }

    let resolver = match (kind, provider) {
        (EntityKind::Country, Provider::Jhu) => {
            io_vax::KeyResolver::Country(io_jhu::read_jhu(sources, root, &mut builder)?)
        }
        (EntityKind::Country, Provider::Owid) => {
            io_vax::KeyResolver::Country(io_owid::read_owid(sources, root, &mut builder)?)
        }
        (EntityKind::State, Provider::Nyt) => {
            io_vax::KeyResolver::State(io_nyt::read_nyt_states(sources, root, &mut builder)?)
        }
        (EntityKind::County, Provider::Nyt) => {
            io_vax::KeyResolver::County(io_nyt::read_nyt_counties(sources, root, &mut builder)?)
        }
        (k, p) => {
            whatever!("Provider {} cannot be used for {} data", p, k)
        }
    };

    if let Some(vs) = &sources.vaccinations {
        io_vax::read_vaccinations(&resolve_path(root, &vs.file_path), vs, &resolver, &mut builder)?;
    }

    debug!(
        "load_panel: {} observations collected",
        builder.num_observations()
    );
    let panel = builder.build();
    info!(
        "load_panel: {} panel with {} entities over {} dates",
        kind,
        panel.entities.len(),
        panel.len()
    );
    Ok(panel)
}

fn parse_series(names: &Option<Vec<String>>) -> LoaderResult<Vec<Series>> {
    match names {
        None => Ok(DEFAULT_SERIES.to_vec()),
        Some(l) if l.is_empty() => Ok(DEFAULT_SERIES.to_vec()),
        Some(l) => {
            let mut res: Vec<Series> = Vec::new();
            for name in l.iter() {
                res.push(name.parse::<Series>().context(PanelSnafu {})?);
            }
            Ok(res)
        }
    }
}

fn parse_entities(kind: EntityKind, names: &Option<Vec<String>>) -> LoaderResult<Option<Vec<EntityId>>> {
    let names = match names {
        None => return Ok(None),
        Some(l) if l.is_empty() => return Ok(None),
        Some(l) => l,
    };
    let mut res: Vec<EntityId> = Vec::new();
    for name in names.iter() {
        match EntityId::parse(kind, name) {
            Some(id) => res.push(id),
            None => {
                whatever!("{:?} is not a valid {} identifier", name, kind)
            }
        }
    }
    Ok(Some(res))
}

fn build_summary_js(kind: EntityKind, args: &Args, panel: &Panel, aligned: &[(Series, AlignedPanel)]) -> JSValue {
    let crossings: BTreeMap<String, JSValue> = aligned
        .iter()
        .map(|(s, ap)| {
            let entities: BTreeMap<String, String> = ap
                .entities
                .iter()
                .map(|(id, e)| (id.to_string(), e.crossed_on.to_string()))
                .collect();
            (s.name(), json!(entities))
        })
        .collect();
    json!({
        "kind": kind.name(),
        "entities": panel.entities.keys().map(|id| id.to_string()).collect::<Vec<String>>(),
        "firstDate": panel.dates.first().map(|d| d.to_string()),
        "lastDate": panel.dates.last().map(|d| d.to_string()),
        "threshold": args.threshold,
        "smooth": args.smooth,
        "crossings": crossings,
    })
}

/// Loads the panel described by the configuration, optionally aligns it and
/// writes the resulting table.
pub fn run_explorer(args: &Args) -> LoaderResult<()> {
    let config_p = Path::new(args.config.as_str());
    let config = read_config(config_p)?;
    info!("config: {:?}", config);
    let root = data_root(config_p, &config)?;
    let kind: EntityKind = args.kind.parse().context(PanelSnafu {})?;
    let sources = config.sources(kind)?;
    let series = parse_series(&args.series)?;
    let selection = parse_entities(kind, &args.entities)?;

    if args.align_on.is_some() && args.align_each {
        whatever!("--align-on and --align-each cannot be used together")
    }
    if args.smooth == 0 {
        return Err(PanelErrors::InvalidWindow(0)).context(PanelSnafu {});
    }

    let mut cache = PanelCache::new();
    let full_panel = cache.panel(kind, sources, &root)?;
    for s in series.iter() {
        if !full_panel.has_series(*s) {
            return Err(PanelErrors::MissingSeries(*s)).context(PanelSnafu {});
        }
    }

    let panel = match &selection {
        Some(ids) => {
            for id in ids.iter() {
                if !full_panel.entities.contains_key(id) {
                    warn!("run_explorer: {} {} is not in the data", kind, id);
                }
            }
            full_panel.select(ids)
        }
        None => full_panel.as_ref().clone(),
    };

    let mut aligned: Vec<(Series, AlignedPanel)> = Vec::new();
    let table = if let Some(name) = &args.align_on {
        let reference = name.parse::<Series>().context(PanelSnafu {})?;
        let ap = cache.aligned(kind, sources, &root, reference, args.threshold, &selection)?;
        let ap = ap.smoothed(args.smooth).context(PanelSnafu {})?;
        aligned.push((reference, ap));
        let parts: Vec<(Series, &AlignedPanel)> =
            series.iter().map(|s| (*s, &aligned[0].1)).collect();
        render_aligned(&parts)?
    } else if args.align_each {
        for s in series.iter() {
            let ap = cache.aligned(kind, sources, &root, *s, args.threshold, &selection)?;
            aligned.push((*s, ap.smoothed(args.smooth).context(PanelSnafu {})?));
        }
        let parts: Vec<(Series, &AlignedPanel)> =
            aligned.iter().map(|(s, ap)| (*s, ap)).collect();
        render_aligned(&parts)?
    } else {
        let smoothed = panel.smoothed(args.smooth).context(PanelSnafu {})?;
        render_panel(&smoothed, &series)?
    };

    let summary_js = build_summary_js(kind, args, &panel, &aligned);
    let pretty_js = serde_json::to_string_pretty(&summary_js).context(ParsingJsonSnafu {
        path: "<summary>".to_string(),
    })?;
    info!("summary: {}", pretty_js);

    write_output(&table, &args.out)?;

    if let Some(reference_p) = &args.reference {
        check_reference(&table, Path::new(reference_p))?;
    }
    Ok(())
}

fn check_reference(table: &str, reference_p: &Path) -> LoaderResult<()> {
    let display = reference_p.display().to_string();
    let expected = fs::read_to_string(reference_p).context(ReadingFileSnafu {
        path: display.clone(),
    })?;
    if expected != table {
        warn!("Found differences with the reference table {}", display);
        print_diff(expected.as_str(), table, "\n");
        return ReferenceMismatchSnafu { path: display }.fail();
    }
    info!("Output matches the reference table {}", display);
    Ok(())
}

pub fn resolve_path(root: &Path, p: &str) -> PathBuf {
    root.join(p)
}

#[cfg(test)]
pub fn write_fixture(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let p = dir.join(name);
    if let Some(parent) = p.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&p, contents).unwrap();
    p
}
