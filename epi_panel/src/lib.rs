/*!
Typed epidemiological panels.

A [`Panel`] holds, for every entity (country, US state or US county), the
cumulative and daily counts of each metric on a shared date axis together with
their per-capita variants. [`align`] re-indexes a panel by the number of
periods since each entity first exceeded a threshold, which is how progress
curves of different places are compared.

The crate performs no IO: readers live in the `covprog` binary and feed
observations through the [`builder::PanelBuilder`].
*/
pub mod builder;
mod config;
pub mod manual;

use log::{debug, info};

use std::collections::BTreeMap;

use chrono::NaiveDate;

pub use crate::builder::PanelBuilder;
pub use crate::config::*;

/// Doses needed to count one person as fully vaccinated.
///
/// Dividing doses by this factor is an approximation: it ignores single-dose
/// products and partially vaccinated people.
pub const DOSES_PER_PERSON: f64 = 2.0;

// **** Derivations ****

/// Date-order first difference. The first element has no predecessor and
/// is 0.
pub fn first_difference(values: &[f64]) -> Vec<f64> {
    let mut res = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for v in values.iter() {
        res.push(match prev {
            Some(p) => v - p,
            None => 0.0,
        });
        prev = Some(*v);
    }
    res
}

pub fn running_sum(values: &[f64]) -> Vec<f64> {
    let mut total = 0.0;
    values
        .iter()
        .map(|v| {
            total += v;
            total
        })
        .collect()
}

/// Divides by the population. Unknown or zero populations give a null
/// column, never infinities.
pub fn per_capita(values: &[f64], population: Option<u64>) -> Column {
    match population {
        Some(p) if p > 0 => {
            let p = p as f64;
            values.iter().map(|v| Some(v / p)).collect()
        }
        _ => vec![None; values.len()],
    }
}

/// Turns daily dose reports into cumulative people vaccinated, one value per
/// calendar day from the first report to the last.
///
/// Days without a report carry the previous cumulative value: a skipped
/// report means no new doses are known, not that doses went back to zero.
/// Reports on the same day are added.
pub fn people_vaccinated(reports: &[(NaiveDate, f64)]) -> Vec<(NaiveDate, f64)> {
    let mut sorted = reports.to_vec();
    sorted.sort_by_key(|p| p.0);
    let (first, last) = match (sorted.first(), sorted.last()) {
        (Some(f), Some(l)) => (f.0, l.0),
        _ => return Vec::new(),
    };

    let mut res: Vec<(NaiveDate, f64)> = Vec::new();
    let mut doses = 0.0;
    let mut reports_iter = sorted.into_iter().peekable();
    let mut day = first;
    while day <= last {
        while let Some((_, d)) = reports_iter.next_if(|(date, _)| *date == day) {
            doses += d;
        }
        res.push((day, doses / DOSES_PER_PERSON));
        day = match day.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    res
}

/// Trailing mean over `window` periods, using whatever non-null values the
/// window holds. Window 1 returns the input.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Result<Column, PanelErrors> {
    if window == 0 {
        return Err(PanelErrors::InvalidWindow(window));
    }
    let mut res: Column = Vec::with_capacity(values.len());
    for idx in 0..values.len() {
        let start = (idx + 1).saturating_sub(window);
        let present: Vec<f64> = values[start..=idx].iter().flatten().cloned().collect();
        if present.is_empty() {
            res.push(None);
        } else {
            res.push(Some(present.iter().sum::<f64>() / present.len() as f64));
        }
    }
    Ok(res)
}

fn smooth_columns(
    columns: &BTreeMap<Series, Column>,
    window: usize,
) -> Result<BTreeMap<Series, Column>, PanelErrors> {
    let mut res = BTreeMap::new();
    for (series, column) in columns.iter() {
        res.insert(*series, rolling_mean(column, window)?);
    }
    Ok(res)
}

// **** Alignment ****

/// Index of the first value strictly above `threshold`.
///
/// Null values never cross: they stand for an unknown or zero population.
pub fn first_crossing(values: &[Option<f64>], threshold: f64) -> Option<usize> {
    for (idx, value) in values.iter().enumerate() {
        match value {
            Some(x) if *x > threshold => return Some(idx),
            _ => {}
        }
    }
    None
}

/// Re-indexes every entity by periods since its `reference` series first
/// exceeded `threshold`.
///
/// All the columns of a crossing entity are sliced from the crossing date
/// (inclusive). Entities that never cross are left out.
///
/// Arguments:
/// * `panel` the observation panel, left untouched
/// * `reference` the one series that decides the crossing date. Aligning on
/// another metric takes another call.
/// * `threshold` the value to exceed, in the unit of `reference`
pub fn align(
    panel: &Panel,
    reference: Series,
    threshold: f64,
) -> Result<AlignedPanel, PanelErrors> {
    if !panel.has_series(reference) {
        return Err(PanelErrors::MissingSeries(reference));
    }
    info!(
        "align: {} {} entities on {} > {:e}",
        panel.entities.len(),
        panel.kind,
        reference,
        threshold
    );

    let mut entities: BTreeMap<EntityId, AlignedSeries> = BTreeMap::new();
    for (id, e) in panel.entities.iter() {
        let crossing = e
            .column(reference)
            .and_then(|c| first_crossing(c, threshold));
        match crossing {
            None => {
                debug!("align: {} never exceeds the threshold", id);
            }
            Some(idx) => {
                let columns: BTreeMap<Series, Column> = e
                    .columns
                    .iter()
                    .map(|(s, c)| (*s, c[idx..].to_vec()))
                    .collect();
                debug!("align: {} crossed on {}", id, panel.dates[idx]);
                entities.insert(
                    id.clone(),
                    AlignedSeries {
                        crossed_on: panel.dates[idx],
                        columns,
                    },
                );
            }
        }
    }

    info!(
        "align: {} of {} entities crossed",
        entities.len(),
        panel.entities.len()
    );
    Ok(AlignedPanel {
        kind: panel.kind,
        reference,
        threshold,
        entities,
    })
}
