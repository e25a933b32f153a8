// Reader for the Our World in Data country table. Populations come from the
// table itself, repeated on every row.

use crate::loader::io_common::*;
use crate::loader::io_population::{dedup, DedupPolicy};
use crate::loader::*;

/// Returns the countries seen in the table.
pub fn read_owid(
    sources: &EntitySources,
    root: &Path,
    builder: &mut PanelBuilder,
) -> LoaderResult<HashSet<EntityId>> {
    let path = sources.file_path(root)?;
    info!("Attempting to read OWID file {:?}", path);
    let mut pops: Vec<(EntityId, Option<u64>)> = Vec::new();
    read_long_table(
        &path,
        &["iso_code", "population"],
        "date",
        &[(Metric::Cases, "total_cases"), (Metric::Deaths, "total_deaths")],
        builder,
        |keys, lineno| {
            // Aggregates (OWID_WRL, OWID_EUR, ...) are not ISO3 codes.
            let id = match EntityId::country(keys[0]) {
                Some(id) => id,
                None => return Ok(None),
            };
            pops.push((id.clone(), parse_population(keys[1], &path, lineno)?));
            Ok(Some(id))
        },
    )?;
    let populations = dedup(&pops, DedupPolicy::First);
    for (id, pop) in populations.iter() {
        builder.population(id, *pop);
    }
    Ok(populations.into_keys().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::write_fixture;

    #[test]
    fn first_population_wins() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(
            dir.path(),
            "owid.csv",
            "iso_code,continent,date,total_cases,total_deaths,population\n\
             FRA,Europe,2020-03-01,130,2,65273512\n\
             FRA,Europe,2020-03-02,191,3,65273513\n\
             OWID_EUR,,2020-03-01,2000,40,748000000\n",
        );
        let sources: EntitySources =
            serde_json::from_str(r#"{"provider": "owid", "filePath": "owid.csv"}"#).unwrap();
        let mut builder = PanelBuilder::new(EntityKind::Country)
            .metric(Metric::Cases, Convention::Cumulative)
            .metric(Metric::Deaths, Convention::Cumulative);
        let seen = read_owid(&sources, dir.path(), &mut builder).unwrap();
        let panel = builder.build();
        let fra = EntityId::country("FRA").unwrap();
        assert_eq!(seen, HashSet::from([fra.clone()]));
        assert_eq!(panel.entities.len(), 1);
        assert_eq!(panel.entities[&fra].population, Some(65_273_512));
        assert_eq!(
            panel.column(&fra, "deaths".parse().unwrap()).unwrap(),
            &[Some(0.0), Some(1.0)]
        );
    }

    #[test]
    fn bad_count_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(
            dir.path(),
            "owid.csv",
            "iso_code,date,total_cases,total_deaths,population\nFRA,2020-03-01,many,2,1\n",
        );
        let sources: EntitySources =
            serde_json::from_str(r#"{"provider": "owid", "filePath": "owid.csv"}"#).unwrap();
        let mut builder = PanelBuilder::new(EntityKind::Country)
            .metric(Metric::Cases, Convention::Cumulative)
            .metric(Metric::Deaths, Convention::Cumulative);
        let res = read_owid(&sources, dir.path(), &mut builder);
        assert!(matches!(
            res,
            Err(LoaderError::ParsingNumber { lineno: 2, .. })
        ));
    }
}
