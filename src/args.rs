use clap::Parser;

/// Loads epidemic case, death and vaccination tables and aligns them by days since a threshold.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON file describing where the data tables are.
    /// Relative paths in that file are resolved against its `dataDirectory`.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (country, state or county, default country) The class of entities to load.
    #[clap(short, long, value_parser, default_value = "country")]
    pub kind: String,

    /// (identifiers, optional) The entities to keep: ISO3 codes for countries, postal
    /// abbreviations for states, "County, ST" for counties. All entities are kept otherwise.
    #[clap(short, long, value_parser)]
    pub entities: Option<Vec<String>>,

    /// (series names, default cases_pc and deaths_pc) The series to output, for example
    /// cases_cum, deaths, vax_cum_pc.
    #[clap(short, long, value_parser)]
    pub series: Option<Vec<String>>,

    /// (series name, optional) If specified, all the series are aligned on the first day this
    /// series exceeds the threshold.
    #[clap(long, value_parser)]
    pub align_on: Option<String>,

    /// If passed as an argument, every series is aligned on the first day it exceeds the
    /// threshold.
    #[clap(long, takes_value = false)]
    pub align_each: bool,

    /// (number, default 1e-6) The alignment threshold, in the unit of the reference series.
    #[clap(short, long, value_parser, default_value = "1e-6")]
    pub threshold: f64,

    /// (days, default 1) The window of the trailing rolling mean applied to the output.
    #[clap(long, value_parser, default_value = "1")]
    pub smooth: usize,

    /// (file path, 'stdout' or empty) If specified, the table is written in CSV format to the
    /// given location. It is printed to the standard output otherwise.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference table in CSV format. If provided, covprog will
    /// check that the output matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
