// Population reference tables.

use std::hash::Hash;

use crate::loader::io_common::{parse_population, RawTable};
use crate::loader::*;

/// New York City is reported as one unit without a FIPS code. It gets a
/// hand-made reference row.
pub const NYC_FIPS: &str = "NYC";
pub const NYC_NAME: &str = "New York City";
pub const NYC_STATE: &str = "NY";
pub const NYC_POPULATION: u64 = 8_398_748;

/// How several rows for one identifier are folded into one population.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum DedupPolicy {
    /// Rows are sub-regions: add them. Unknown rows are skipped; the result is
    /// unknown only when every row is.
    Sum,
    /// Rows repeat one value: keep the first.
    First,
}

pub fn dedup<K: Eq + Hash + Clone + std::fmt::Debug>(
    rows: &[(K, Option<u64>)],
    policy: DedupPolicy,
) -> HashMap<K, Option<u64>> {
    let mut res: HashMap<K, Option<u64>> = HashMap::new();
    for (k, pop) in rows.iter() {
        match res.get_mut(k) {
            None => {
                res.insert(k.clone(), *pop);
            }
            Some(current) => match policy {
                DedupPolicy::First => {
                    if *current != *pop {
                        debug!("dedup: {:?}: keeping {:?} over {:?}", k, current, pop);
                    }
                }
                DedupPolicy::Sum => {
                    *current = match (*current, *pop) {
                        (Some(a), Some(b)) => Some(a + b),
                        (a, b) => a.or(b),
                    };
                }
            },
        }
    }
    res
}

fn population_column<'a>(ps: &'a PopulationSource, default: &'a str) -> &'a str {
    ps.population_column.as_deref().unwrap_or(default)
}

fn read_table(ps: &PopulationSource, root: &Path) -> LoaderResult<RawTable> {
    let p = resolve_path(root, &ps.file_path);
    info!("Attempting to read population file {:?}", p);
    RawTable::read(&p, ps.excel_worksheet_name.as_deref())
}

/// The country lookup table for the JHU time series.
#[derive(Debug, Clone, Default)]
pub struct CountryInfo {
    /// (country, region) to ISO3 code. Country-level rows have an empty region.
    pub codes: HashMap<(String, String), EntityId>,
    pub populations: HashMap<EntityId, Option<u64>>,
}

impl CountryInfo {
    pub fn lookup(&self, country: &str, region: &str) -> Option<&EntityId> {
        self.codes
            .get(&(country.trim().to_string(), region.trim().to_string()))
    }
}

/// Reads the `country, region, country_code, population` table. A country
/// split in several regions has the sum of their populations.
pub fn read_country_info(ps: &PopulationSource, root: &Path) -> LoaderResult<CountryInfo> {
    let table = read_table(ps, root)?;
    let country_idx = table.column("country")?;
    let region_idx = table.column("region")?;
    let code_idx = table.column("country_code")?;
    let pop_idx = table.column(population_column(ps, "population"))?;

    let mut res = CountryInfo::default();
    let mut pops: Vec<(EntityId, Option<u64>)> = Vec::new();
    for row_idx in 0..table.rows.len() {
        let lineno = row_idx + 2;
        let code = table.cell(row_idx, code_idx)?;
        let id = match EntityId::country(code) {
            Some(id) => id,
            None => {
                debug!(
                    "read_country_info: line {}: no country code {:?}",
                    lineno, code
                );
                continue;
            }
        };
        let country = table.cell(row_idx, country_idx)?.trim().to_string();
        let region = table.cell(row_idx, region_idx)?.trim().to_string();
        let pop = parse_population(table.cell(row_idx, pop_idx)?, &table.path, lineno)?;
        res.codes.insert((country, region), id.clone());
        pops.push((id, pop));
    }
    res.populations = dedup(&pops, DedupPolicy::Sum);
    info!(
        "read_country_info: {} keys for {} countries",
        res.codes.len(),
        res.populations.len()
    );
    Ok(res)
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct StateRef {
    pub id: EntityId,
    pub population: Option<u64>,
}

/// Reads the `fips, abbrev, <population>` table, keyed by state FIPS.
pub fn read_state_populations(
    ps: &PopulationSource,
    root: &Path,
) -> LoaderResult<HashMap<Fips, StateRef>> {
    let table = read_table(ps, root)?;
    let fips_idx = table.column("fips")?;
    let abbrev_idx = table.column("abbrev")?;
    let pop_idx = table.column(population_column(ps, "2018"))?;

    let mut ids: HashMap<Fips, EntityId> = HashMap::new();
    let mut pops: Vec<(Fips, Option<u64>)> = Vec::new();
    for row_idx in 0..table.rows.len() {
        let lineno = row_idx + 2;
        let raw = table.cell(row_idx, fips_idx)?;
        let (fips, id) = match (
            Fips::state(raw),
            EntityId::state(table.cell(row_idx, abbrev_idx)?),
        ) {
            (Some(f), Some(id)) => (f, id),
            _ => {
                debug!("read_state_populations: line {}: skipping {:?}", lineno, raw);
                continue;
            }
        };
        let pop = parse_population(table.cell(row_idx, pop_idx)?, &table.path, lineno)?;
        ids.entry(fips.clone()).or_insert(id);
        pops.push((fips, pop));
    }
    let res: HashMap<Fips, StateRef> = dedup(&pops, DedupPolicy::First)
        .into_iter()
        .filter_map(|(fips, population)| {
            ids.get(&fips).map(|id| {
                (
                    fips.clone(),
                    StateRef {
                        id: id.clone(),
                        population,
                    },
                )
            })
        })
        .collect();
    info!("read_state_populations: {} states", res.len());
    Ok(res)
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CountyRef {
    pub state: EntityId,
    pub name: String,
    pub population: Option<u64>,
}

/// Reads the `county_fips, county_name, state_code, <population>` table,
/// keyed by county FIPS. The New York City row is added under [`NYC_FIPS`].
pub fn read_county_populations(
    ps: &PopulationSource,
    root: &Path,
) -> LoaderResult<HashMap<Fips, CountyRef>> {
    let table = read_table(ps, root)?;
    let fips_idx = table.column("county_fips")?;
    let name_idx = table.column("county_name")?;
    let state_idx = table.column("state_code")?;
    let pop_idx = table.column(population_column(ps, "pop18"))?;

    let mut refs: HashMap<Fips, (EntityId, String)> = HashMap::new();
    let mut pops: Vec<(Fips, Option<u64>)> = Vec::new();
    for row_idx in 0..table.rows.len() {
        let lineno = row_idx + 2;
        let raw = table.cell(row_idx, fips_idx)?;
        let (fips, state) = match (
            Fips::county(raw),
            EntityId::state(table.cell(row_idx, state_idx)?),
        ) {
            (Some(f), Some(s)) => (f, s),
            _ => {
                debug!(
                    "read_county_populations: line {}: skipping {:?}",
                    lineno, raw
                );
                continue;
            }
        };
        let name = table.cell(row_idx, name_idx)?.trim().to_string();
        let pop = parse_population(table.cell(row_idx, pop_idx)?, &table.path, lineno)?;
        refs.entry(fips.clone()).or_insert((state, name));
        pops.push((fips, pop));
    }

    let mut res: HashMap<Fips, CountyRef> = HashMap::new();
    for (fips, population) in dedup(&pops, DedupPolicy::First).into_iter() {
        if let Some((state, name)) = refs.get(&fips) {
            res.insert(
                fips,
                CountyRef {
                    state: state.clone(),
                    name: name.clone(),
                    population,
                },
            );
        }
    }
    if let Some(ny) = EntityId::state(NYC_STATE) {
        res.insert(
            Fips::sentinel(NYC_FIPS),
            CountyRef {
                state: ny,
                name: NYC_NAME.to_string(),
                population: Some(NYC_POPULATION),
            },
        );
    }
    info!("read_county_populations: {} counties", res.len());
    Ok(res)
}
