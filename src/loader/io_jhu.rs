// Reader for the JHU CSSE global time series.
//
// One row per country or province, one column per date:
// Province/State,Country/Region,Lat,Long,1/22/20,1/23/20,...

use crate::loader::io_common::*;
use crate::loader::io_population::{read_country_info, CountryInfo};
use crate::loader::*;

const REGION_COLUMN: &str = "Province/State";
const COUNTRY_COLUMN: &str = "Country/Region";
const SKIPPED_COLUMNS: [&str; 2] = ["Lat", "Long"];

/// Reads the cases and deaths tables. Returns the countries seen in either.
pub fn read_jhu(
    sources: &EntitySources,
    root: &Path,
    builder: &mut PanelBuilder,
) -> LoaderResult<HashSet<EntityId>> {
    let info = read_country_info(sources.population_source()?, root)?;
    let mut seen: HashSet<EntityId> = HashSet::new();
    read_wide_table(&sources.cases_path(root)?, Metric::Cases, &info, builder, &mut seen)?;
    read_wide_table(&sources.deaths_path(root)?, Metric::Deaths, &info, builder, &mut seen)?;
    for (id, pop) in info.populations.iter() {
        builder.population(id, *pop);
    }
    Ok(seen)
}

/// Transposes one wide table into observations of `metric`. Rows of the same
/// country are added together by the builder.
fn read_wide_table(
    path: &Path,
    metric: Metric,
    info: &CountryInfo,
    builder: &mut PanelBuilder,
    seen: &mut HashSet<EntityId>,
) -> LoaderResult<usize> {
    info!("Attempting to read {} file {:?}", metric.name(), path);
    let display = path.display().to_string();
    let (mut rdr, headers) = open_csv(path)?;
    let region_idx = column_index(&headers, REGION_COLUMN, path)?;
    let country_idx = column_index(&headers, COUNTRY_COLUMN, path)?;

    let mut date_cols: Vec<(usize, chrono::NaiveDate)> = Vec::new();
    for (idx, h) in headers.iter().enumerate() {
        let h = h.trim();
        if idx == region_idx || idx == country_idx || SKIPPED_COLUMNS.contains(&h) {
            continue;
        }
        date_cols.push((idx, parse_date(h, path, 1)?));
    }
    debug!("read_wide_table: {} date columns", date_cols.len());

    let mut dropped = 0;
    for (idx, line_r) in rdr.records().enumerate() {
        let lineno = idx + 2;
        let line = line_r.context(ReadingCsvSnafu {
            path: display.clone(),
        })?;
        let country = field(&line, country_idx, path, lineno)?;
        let region = field(&line, region_idx, path, lineno)?;
        let id = match info.lookup(country, region) {
            Some(id) => id,
            None => {
                debug!(
                    "{}:{}: no country code for ({:?}, {:?})",
                    display, lineno, country, region
                );
                dropped += 1;
                continue;
            }
        };
        seen.insert(id.clone());
        for (col_idx, date) in date_cols.iter() {
            if let Some(v) = parse_count(field(&line, *col_idx, path, lineno)?, path, lineno)? {
                builder
                    .add_observation(id, *date, metric, v)
                    .context(PanelSnafu {})?;
            }
        }
    }
    if dropped > 0 {
        warn!(
            "{}: dropped {} rows that could not be matched to a country",
            simplify_file_name(path),
            dropped
        );
    }
    Ok(dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::write_fixture;

    fn info() -> CountryInfo {
        let mut info = CountryInfo::default();
        info.codes.insert(
            ("Canada".to_string(), "Ontario".to_string()),
            EntityId::country("CAN").unwrap(),
        );
        info.codes.insert(
            ("Canada".to_string(), "Quebec".to_string()),
            EntityId::country("CAN").unwrap(),
        );
        info
    }

    #[test]
    fn provinces_add_up() {
        let dir = tempfile::tempdir().unwrap();
        let p = write_fixture(
            dir.path(),
            "confirmed.csv",
            "Province/State,Country/Region,Lat,Long,3/1/20,3/2/20\n\
             Ontario,Canada,51.2,-85.3,3,\n\
             Quebec,Canada,52.9,-73.5,1,4\n\
             Grand Princess,Canada,0,0,9,9\n",
        );
        let mut builder = PanelBuilder::new(EntityKind::Country).metric(Metric::Cases, Convention::Cumulative);
        let mut seen = HashSet::new();
        let dropped = read_wide_table(&p, Metric::Cases, &info(), &mut builder, &mut seen).unwrap();
        assert_eq!(dropped, 1);
        assert_eq!(seen.len(), 1);
        let panel = builder.build();
        let can = EntityId::country("CAN").unwrap();
        // Ontario has no value on 3/2: only Quebec counts.
        assert_eq!(
            panel.column(&can, "cases_cum".parse().unwrap()).unwrap(),
            &[Some(4.0), Some(4.0)]
        );
    }

    #[test]
    fn unknown_header_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = write_fixture(
            dir.path(),
            "confirmed.csv",
            "Province/State,Country/Region,Lat,Long,Admin2,3/1/20\nOntario,Canada,0,0,x,1\n",
        );
        let mut builder = PanelBuilder::new(EntityKind::Country).metric(Metric::Cases, Convention::Cumulative);
        let res = read_wide_table(&p, Metric::Cases, &info(), &mut builder, &mut HashSet::new());
        assert!(matches!(
            res,
            Err(LoaderError::ParsingDate { lineno: 1, .. })
        ));
    }
}
