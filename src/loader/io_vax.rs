// Daily vaccination reports.

use chrono::NaiveDate;

use crate::loader::io_common::*;
use crate::loader::io_population::NYC_FIPS;
use crate::loader::*;

/// Maps the key column of a vaccination table to panel identifiers.
#[derive(Debug, Clone)]
pub enum KeyResolver {
    /// ISO3 codes, limited to the countries of the panel.
    Country(HashSet<EntityId>),
    /// State FIPS codes or abbreviations, limited to the states of the panel.
    State(HashMap<Fips, EntityId>),
    /// County FIPS codes, limited to the counties of the panel.
    County(HashMap<Fips, EntityId>),
}

impl KeyResolver {
    pub fn resolve(&self, key: &str) -> Option<EntityId> {
        match self {
            KeyResolver::Country(known) => EntityId::country(key).filter(|id| known.contains(id)),
            KeyResolver::State(index) => match Fips::state(key) {
                Some(fips) => index.get(&fips).cloned(),
                None => EntityId::state(key).filter(|id| index.values().any(|x| x == id)),
            },
            KeyResolver::County(index) => {
                let fips = if key.trim() == NYC_FIPS {
                    Some(Fips::sentinel(NYC_FIPS))
                } else {
                    Fips::county(key)
                };
                fips.and_then(|f| index.get(&f).cloned())
            }
        }
    }
}

/// Reads daily doses and adds the people vaccinated to `builder` as the
/// cumulative `vax` metric.
///
/// Reports of one entity on one date are added together. Returns the number
/// of (entity, date) pairs reported under more than one key, as `06` and
/// `CA`, which are likely counted twice.
pub fn read_vaccinations(
    path: &Path,
    vs: &VaccinationSource,
    resolver: &KeyResolver,
    builder: &mut PanelBuilder,
) -> LoaderResult<usize> {
    info!("Attempting to read vaccination file {:?}", path);
    let display = path.display().to_string();
    let (mut rdr, headers) = open_csv(path)?;
    let key_idx = column_index(&headers, vs.key_column(), path)?;
    let date_idx = column_index(&headers, vs.date_column(), path)?;
    let doses_idx = column_index(&headers, vs.doses_column(), path)?;

    let mut reports: BTreeMap<EntityId, Vec<(NaiveDate, f64)>> = BTreeMap::new();
    let mut keys_seen: HashMap<(EntityId, NaiveDate), String> = HashMap::new();
    let mut conflicts = 0;
    let mut dropped = 0;
    for (idx, line_r) in rdr.records().enumerate() {
        let lineno = idx + 2;
        let line = line_r.context(ReadingCsvSnafu {
            path: display.clone(),
        })?;
        let key = field(&line, key_idx, path, lineno)?;
        let id = match resolver.resolve(key) {
            Some(id) => id,
            None => {
                debug!("{}:{}: no entity for key {:?}", display, lineno, key);
                dropped += 1;
                continue;
            }
        };
        let date = parse_date(field(&line, date_idx, path, lineno)?, path, lineno)?;
        let raw_key = key.trim();
        match keys_seen.get(&(id.clone(), date)) {
            Some(previous) if previous != raw_key => {
                warn!(
                    "{}:{}: {} on {} is also reported as {:?}, doses are added",
                    simplify_file_name(path),
                    lineno,
                    id,
                    date,
                    previous
                );
                conflicts += 1;
            }
            Some(_) => {}
            None => {
                keys_seen.insert((id.clone(), date), raw_key.to_string());
            }
        }
        if let Some(doses) = parse_count(field(&line, doses_idx, path, lineno)?, path, lineno)? {
            reports.entry(id).or_default().push((date, doses));
        }
    }
    if dropped > 0 {
        warn!(
            "{}: dropped {} rows that could not be matched to an entity",
            simplify_file_name(path),
            dropped
        );
    }

    for (id, entity_reports) in reports.iter() {
        for (date, people) in people_vaccinated(entity_reports).into_iter() {
            builder
                .add_observation(id, date, Metric::Vax, people)
                .context(PanelSnafu {})?;
        }
    }
    info!(
        "read_vaccinations: {} entities with vaccination reports",
        reports.len()
    );
    Ok(conflicts)
}
