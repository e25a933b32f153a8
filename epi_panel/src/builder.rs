use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use log::debug;

pub use crate::config::*;
use crate::{first_difference, per_capita, running_sum};

/// A builder that pivots long observations into a [`Panel`].
///
/// Every metric is declared with the convention its source reports in. The
/// builder derives the opposite convention and the per-capita columns.
///
/// ```
/// use chrono::NaiveDate;
/// use epi_panel::builder::PanelBuilder;
/// use epi_panel::{Convention, EntityId, EntityKind, Measure, Metric, Series};
/// # use epi_panel::PanelErrors;
///
/// let mut builder = PanelBuilder::new(EntityKind::State)
///     .metric(Metric::Cases, Convention::Cumulative);
///
/// let pa = EntityId::state("PA").unwrap();
/// builder.population(&pa, Some(1_000));
/// let d0 = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
/// builder.add_observation(&pa, d0, Metric::Cases, 2.0)?;
/// builder.add_observation(&pa, d0.succ_opt().unwrap(), Metric::Cases, 5.0)?;
///
/// let panel = builder.build();
/// let daily = panel.column(&pa, Series::new(Metric::Cases, Measure::Daily)).unwrap();
/// assert_eq!(daily, &[Some(0.0), Some(3.0)]);
///
/// # Ok::<(), PanelErrors>(())
/// ```
pub struct PanelBuilder {
    kind: EntityKind,
    conventions: BTreeMap<Metric, Convention>,
    populations: HashMap<EntityId, Option<u64>>,
    observations: BTreeMap<Metric, BTreeMap<EntityId, BTreeMap<NaiveDate, f64>>>,
}

impl PanelBuilder {
    pub fn new(kind: EntityKind) -> PanelBuilder {
        PanelBuilder {
            kind,
            conventions: BTreeMap::new(),
            populations: HashMap::new(),
            observations: BTreeMap::new(),
        }
    }

    pub fn metric(mut self, metric: Metric, convention: Convention) -> PanelBuilder {
        self.conventions.insert(metric, convention);
        self
    }

    /// Sets the population of an entity. Entities never given one have a
    /// null population.
    pub fn population(&mut self, id: &EntityId, population: Option<u64>) {
        self.populations.insert(id.clone(), population);
    }

    /// Adds one observation.
    ///
    /// Observations for the same (entity, date, metric) are summed: several
    /// raw rows mapping to one entity are sub-regions of it.
    pub fn add_observation(
        &mut self,
        id: &EntityId,
        date: NaiveDate,
        metric: Metric,
        value: f64,
    ) -> Result<(), PanelErrors> {
        if !self.conventions.contains_key(&metric) {
            return Err(PanelErrors::UndeclaredMetric(metric));
        }
        *self
            .observations
            .entry(metric)
            .or_default()
            .entry(id.clone())
            .or_default()
            .entry(date)
            .or_insert(0.0) += value;
        Ok(())
    }

    pub fn num_observations(&self) -> usize {
        self.observations
            .values()
            .flat_map(|m| m.values())
            .map(|d| d.len())
            .sum()
    }

    pub fn build(self) -> Panel {
        let dates: Vec<NaiveDate> = self
            .observations
            .values()
            .flat_map(|m| m.values())
            .flat_map(|d| d.keys().cloned())
            .collect::<BTreeSet<NaiveDate>>()
            .into_iter()
            .collect();
        let ids: BTreeSet<EntityId> = self
            .observations
            .values()
            .flat_map(|m| m.keys().cloned())
            .collect();
        debug!(
            "build: {} {} entities over {} dates",
            ids.len(),
            self.kind,
            dates.len()
        );

        let mut entities: BTreeMap<EntityId, EntitySeries> = BTreeMap::new();
        for id in ids {
            let population = self.populations.get(&id).cloned().flatten();
            if population.unwrap_or(0) == 0 {
                debug!("build: {} has no usable population", id);
            }
            let mut columns: BTreeMap<Series, Column> = BTreeMap::new();
            for (metric, convention) in self.conventions.iter() {
                let observed: Vec<(NaiveDate, f64)> = self
                    .observations
                    .get(metric)
                    .and_then(|m| m.get(&id))
                    .map(|d| d.iter().map(|(date, v)| (*date, *v)).collect())
                    .unwrap_or_default();
                let (cumulative, daily) = spread(&dates, &observed, *convention);

                columns.insert(
                    Series::new(*metric, Measure::CumulativePerCapita),
                    per_capita(&cumulative, population),
                );
                columns.insert(
                    Series::new(*metric, Measure::DailyPerCapita),
                    per_capita(&daily, population),
                );
                columns.insert(
                    Series::new(*metric, Measure::Cumulative),
                    cumulative.into_iter().map(Some).collect(),
                );
                columns.insert(
                    Series::new(*metric, Measure::Daily),
                    daily.into_iter().map(Some).collect(),
                );
            }
            entities.insert(
                id,
                EntitySeries {
                    population,
                    columns,
                },
            );
        }

        Panel {
            kind: self.kind,
            dates,
            metrics: self.conventions.keys().cloned().collect(),
            entities,
        }
    }
}

/// Derives (cumulative, daily) on the observed dates, then lays them on the
/// shared axis. Dates without an observation report nothing new: the daily
/// value is 0 and the cumulative value is carried from the previous date.
fn spread(
    dates: &[NaiveDate],
    observed: &[(NaiveDate, f64)],
    convention: Convention,
) -> (Vec<f64>, Vec<f64>) {
    let values: Vec<f64> = observed.iter().map(|p| p.1).collect();
    let (cumulative, daily) = match convention {
        Convention::Cumulative => {
            let daily = first_difference(&values);
            (values, daily)
        }
        Convention::Incremental => (running_sum(&values), values),
    };

    let mut cum_full = vec![0.0; dates.len()];
    let mut daily_full = vec![0.0; dates.len()];
    let mut next = 0;
    let mut carried = 0.0;
    for (idx, date) in dates.iter().enumerate() {
        if next < observed.len() && observed[next].0 == *date {
            carried = cumulative[next];
            daily_full[idx] = daily[next];
            next += 1;
        }
        cum_full[idx] = carried;
    }
    (cum_full, daily_full)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 4, d).unwrap()
    }

    const CASES_CUM: Series = Series::new(Metric::Cases, Measure::Cumulative);
    const CASES: Series = Series::new(Metric::Cases, Measure::Daily);
    const CASES_PC: Series = Series::new(Metric::Cases, Measure::DailyPerCapita);
    const CASES_CUM_PC: Series = Series::new(Metric::Cases, Measure::CumulativePerCapita);

    #[test]
    fn incremental_source_gets_running_sum() {
        let id = EntityId::country("FRA").unwrap();
        let mut b = PanelBuilder::new(EntityKind::Country).metric(Metric::Cases, Convention::Incremental);
        for (d, v) in [(1, 4.0), (2, 0.0), (3, 6.0), (4, 1.0)] {
            b.add_observation(&id, day(d), Metric::Cases, v).unwrap();
        }
        let panel = b.build();
        assert_eq!(
            panel.column(&id, CASES_CUM).unwrap(),
            &[Some(4.0), Some(4.0), Some(10.0), Some(11.0)]
        );
        assert_eq!(
            panel.column(&id, CASES).unwrap(),
            &[Some(4.0), Some(0.0), Some(6.0), Some(1.0)]
        );
    }

    #[test]
    fn revisions_keep_negative_deltas() {
        let id = EntityId::state("WA").unwrap();
        let mut b = PanelBuilder::new(EntityKind::State).metric(Metric::Cases, Convention::Cumulative);
        for (d, v) in [(1, 10.0), (2, 12.0), (3, 9.0)] {
            b.add_observation(&id, day(d), Metric::Cases, v).unwrap();
        }
        let panel = b.build();
        assert_eq!(
            panel.column(&id, CASES).unwrap(),
            &[Some(0.0), Some(2.0), Some(-3.0)]
        );
    }

    #[test]
    fn absent_dates_carry_cumulative_and_zero_daily() {
        let early = EntityId::state("NY").unwrap();
        let late = EntityId::state("WY").unwrap();
        let mut b = PanelBuilder::new(EntityKind::State).metric(Metric::Cases, Convention::Cumulative);
        b.add_observation(&early, day(1), Metric::Cases, 1.0).unwrap();
        b.add_observation(&early, day(2), Metric::Cases, 3.0).unwrap();
        b.add_observation(&early, day(4), Metric::Cases, 7.0).unwrap();
        b.add_observation(&late, day(3), Metric::Cases, 2.0).unwrap();
        let panel = b.build();

        assert_eq!(panel.dates, vec![day(1), day(2), day(3), day(4)]);
        assert_eq!(
            panel.column(&early, CASES_CUM).unwrap(),
            &[Some(1.0), Some(3.0), Some(3.0), Some(7.0)]
        );
        assert_eq!(
            panel.column(&early, CASES).unwrap(),
            &[Some(0.0), Some(2.0), Some(0.0), Some(4.0)]
        );
        assert_eq!(
            panel.column(&late, CASES_CUM).unwrap(),
            &[Some(0.0), Some(0.0), Some(2.0), Some(2.0)]
        );
    }

    #[test]
    fn per_capita_is_exact_division() {
        let id = EntityId::state("PA").unwrap();
        let mut b = PanelBuilder::new(EntityKind::State).metric(Metric::Cases, Convention::Cumulative);
        b.population(&id, Some(12_801_989));
        for (d, v) in [(1, 3.0), (2, 17.0), (3, 40.0)] {
            b.add_observation(&id, day(d), Metric::Cases, v).unwrap();
        }
        let panel = b.build();
        let cum = panel.column(&id, CASES_CUM).unwrap();
        let daily = panel.column(&id, CASES).unwrap();
        let cum_pc = panel.column(&id, CASES_CUM_PC).unwrap();
        let daily_pc = panel.column(&id, CASES_PC).unwrap();
        for idx in 0..panel.len() {
            assert_eq!(cum_pc[idx], Some(cum[idx].unwrap() / 12_801_989.0));
            assert_eq!(daily_pc[idx], Some(daily[idx].unwrap() / 12_801_989.0));
        }
    }

    #[test]
    fn zero_and_unknown_population_give_null_per_capita() {
        let zero = EntityId::county("Nowhere", &EntityId::state("TX").unwrap()).unwrap();
        let unknown = EntityId::county("Elsewhere", &EntityId::state("TX").unwrap()).unwrap();
        let mut b = PanelBuilder::new(EntityKind::County).metric(Metric::Cases, Convention::Cumulative);
        b.population(&zero, Some(0));
        for id in [&zero, &unknown] {
            b.add_observation(id, day(1), Metric::Cases, 1.0).unwrap();
            b.add_observation(id, day(2), Metric::Cases, 2.0).unwrap();
        }
        let panel = b.build();
        for id in [&zero, &unknown] {
            assert_eq!(panel.column(id, CASES_PC).unwrap(), &[None, None]);
            assert_eq!(panel.column(id, CASES_CUM_PC).unwrap(), &[None, None]);
            assert_eq!(panel.column(id, CASES_CUM).unwrap(), &[Some(1.0), Some(2.0)]);
        }
        assert_eq!(panel.entities[&zero].population, Some(0));
        assert_eq!(panel.entities[&unknown].population, None);
    }

    #[test]
    fn duplicate_observations_are_summed() {
        let id = EntityId::country("AUS").unwrap();
        let mut b = PanelBuilder::new(EntityKind::Country).metric(Metric::Deaths, Convention::Cumulative);
        b.add_observation(&id, day(1), Metric::Deaths, 2.0).unwrap();
        b.add_observation(&id, day(1), Metric::Deaths, 3.0).unwrap();
        assert_eq!(b.num_observations(), 1);
        let panel = b.build();
        assert_eq!(
            panel.column(&id, Series::new(Metric::Deaths, Measure::Cumulative)).unwrap(),
            &[Some(5.0)]
        );
    }

    #[test]
    fn undeclared_metric_is_rejected() {
        let id = EntityId::country("USA").unwrap();
        let mut b = PanelBuilder::new(EntityKind::Country).metric(Metric::Cases, Convention::Cumulative);
        assert_eq!(
            b.add_observation(&id, day(1), Metric::Vax, 1.0),
            Err(PanelErrors::UndeclaredMetric(Metric::Vax))
        );
    }

    #[test]
    fn entities_without_a_metric_get_zeros() {
        let with = EntityId::country("ISR").unwrap();
        let without = EntityId::country("ITA").unwrap();
        let mut b = PanelBuilder::new(EntityKind::Country)
            .metric(Metric::Cases, Convention::Cumulative)
            .metric(Metric::Vax, Convention::Cumulative);
        b.add_observation(&with, day(1), Metric::Vax, 5.0).unwrap();
        b.add_observation(&without, day(1), Metric::Cases, 5.0).unwrap();
        let panel = b.build();
        assert_eq!(
            panel.column(&without, Series::new(Metric::Vax, Measure::Cumulative)).unwrap(),
            &[Some(0.0)]
        );
        assert_eq!(panel.metrics, vec![Metric::Cases, Metric::Vax]);
    }
}
