// Readers for the New York Times US tables:
//   date,state,fips,cases,deaths
//   date,county,state,fips,cases,deaths

use crate::loader::io_common::*;
use crate::loader::io_population::*;
use crate::loader::*;

const METRIC_COLUMNS: [(Metric, &str); 2] = [(Metric::Cases, "cases"), (Metric::Deaths, "deaths")];

/// Reads the state table. Returns the identifier assigned to every state
/// code seen in the file.
pub fn read_nyt_states(
    sources: &EntitySources,
    root: &Path,
    builder: &mut PanelBuilder,
) -> LoaderResult<HashMap<Fips, EntityId>> {
    let states = read_state_populations(sources.population_source()?, root)?;
    let path = sources.file_path(root)?;
    info!("Attempting to read NYT state file {:?}", path);

    let mut index: HashMap<Fips, EntityId> = HashMap::new();
    let mut pops: HashMap<EntityId, Option<u64>> = HashMap::new();
    read_long_table(&path, &["fips"], "date", &METRIC_COLUMNS, builder, |keys, _| {
        let state = match Fips::state(keys[0]).and_then(|f| states.get(&f).map(|s| (f, s))) {
            Some((fips, state)) => {
                index.insert(fips, state.id.clone());
                state
            }
            None => return Ok(None),
        };
        pops.insert(state.id.clone(), state.population);
        Ok(Some(state.id.clone()))
    })?;
    for (id, pop) in pops.iter() {
        builder.population(id, *pop);
    }
    Ok(index)
}

/// Reads the county table. Counties are named after the table and the state
/// of their reference row: `King, WA`.
pub fn read_nyt_counties(
    sources: &EntitySources,
    root: &Path,
    builder: &mut PanelBuilder,
) -> LoaderResult<HashMap<Fips, EntityId>> {
    let counties = read_county_populations(sources.population_source()?, root)?;
    let path = sources.file_path(root)?;
    info!("Attempting to read NYT county file {:?}", path);

    let mut index: HashMap<Fips, EntityId> = HashMap::new();
    let mut pops: HashMap<EntityId, Option<u64>> = HashMap::new();
    read_long_table(
        &path,
        &["county", "fips"],
        "date",
        &METRIC_COLUMNS,
        builder,
        |keys, _| {
            let name = keys[0].trim();
            let fips = if name == NYC_NAME {
                Some(Fips::sentinel(NYC_FIPS))
            } else {
                Fips::county(keys[1])
            };
            let (fips, county) = match fips.and_then(|f| counties.get(&f).map(|c| (f, c))) {
                Some(x) => x,
                None => return Ok(None),
            };
            let id = match EntityId::county(name, &county.state) {
                Some(id) => id,
                None => return Ok(None),
            };
            index.insert(fips, id.clone());
            pops.insert(id.clone(), county.population);
            Ok(Some(id))
        },
    )?;
    for (id, pop) in pops.iter() {
        builder.population(id, *pop);
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::write_fixture;

    #[test]
    fn state_index_covers_matched_rows() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(
            dir.path(),
            "us-states.csv",
            "date,state,fips,cases,deaths\n\
             2020-01-21,Washington,53,1,0\n\
             2020-01-22,Washington,53,1,0\n\
             2020-03-05,Virgin Islands,78,2,0\n",
        );
        write_fixture(dir.path(), "pop.csv", "fips,abbrev,2018\n53,WA,7535591\n");
        let sources: EntitySources = serde_json::from_str(
            r#"{"provider": "nyt", "filePath": "us-states.csv", "population": {"filePath": "pop.csv"}}"#,
        )
        .unwrap();
        let mut builder = PanelBuilder::new(EntityKind::State)
            .metric(Metric::Cases, Convention::Cumulative)
            .metric(Metric::Deaths, Convention::Cumulative);
        let index = read_nyt_states(&sources, dir.path(), &mut builder).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index[&Fips::state("53").unwrap()].as_str(), "WA");
        let panel = builder.build();
        // Dropped rows add no dates.
        assert_eq!(panel.len(), 2);
        assert_eq!(
            panel.entities[&EntityId::state("WA").unwrap()].population,
            Some(7_535_591)
        );
    }

    #[test]
    fn missing_population_source() {
        let dir = tempfile::tempdir().unwrap();
        let sources: EntitySources =
            serde_json::from_str(r#"{"provider": "nyt", "filePath": "us-counties.csv"}"#).unwrap();
        let mut builder = PanelBuilder::new(EntityKind::County);
        let res = read_nyt_counties(&sources, dir.path(), &mut builder);
        assert!(matches!(
            res,
            Err(LoaderError::MissingSourceField { .. })
        ));
    }
}
