// ********* Identifiers ***********

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::Display;
use std::str::FromStr;

use chrono::NaiveDate;

/// The class of geographic unit a panel describes.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum EntityKind {
    Country,
    State,
    County,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Country, EntityKind::State, EntityKind::County];

    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Country => "country",
            EntityKind::State => "state",
            EntityKind::County => "county",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for EntityKind {
    type Err = PanelErrors;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .iter()
            .find(|k| k.name() == s.trim().to_lowercase())
            .cloned()
            .ok_or_else(|| PanelErrors::UnknownEntityKind(s.to_string()))
    }
}

/// A FIPS administrative code.
///
/// Codes arrive as plain integers in some tables (`6`, `6037.0`) and as
/// zero-padded strings in others (`06`, `06037`). Every raw code goes through
/// [`Fips::normalize`] before it is used as a join key, so both shapes compare
/// equal.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub struct Fips(String);

impl Fips {
    pub const STATE_WIDTH: usize = 2;
    pub const COUNTY_WIDTH: usize = 5;

    /// Normalizes a raw code to `width` zero-padded digits.
    ///
    /// Returns `None` for empty cells, non-digit content and codes longer
    /// than `width`.
    pub fn normalize(raw: &str, width: usize) -> Option<Fips> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_suffix(".0").unwrap_or(trimmed);
        if digits.is_empty() || digits.len() > width || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        Some(Fips(format!("{:0>width$}", digits, width = width)))
    }

    pub fn state(raw: &str) -> Option<Fips> {
        Fips::normalize(raw, Fips::STATE_WIDTH)
    }

    pub fn county(raw: &str) -> Option<Fips> {
        Fips::normalize(raw, Fips::COUNTY_WIDTH)
    }

    /// A hand-assigned code for a unit that has no official one.
    pub fn sentinel(code: &str) -> Fips {
        Fips(code.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Fips {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The canonical key of an entity in a panel.
///
/// ISO3 code for countries, postal abbreviation for states and
/// `"<county name>, <state abbreviation>"` for counties.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub struct EntityId(String);

impl EntityId {
    pub fn country(code: &str) -> Option<EntityId> {
        let c = code.trim();
        if c.len() == 3 && c.chars().all(|ch| ch.is_ascii_alphabetic()) {
            Some(EntityId(c.to_ascii_uppercase()))
        } else {
            None
        }
    }

    pub fn state(abbrev: &str) -> Option<EntityId> {
        let c = abbrev.trim();
        if c.len() == 2 && c.chars().all(|ch| ch.is_ascii_alphabetic()) {
            Some(EntityId(c.to_ascii_uppercase()))
        } else {
            None
        }
    }

    pub fn county(name: &str, state: &EntityId) -> Option<EntityId> {
        let n = name.trim();
        if n.is_empty() {
            None
        } else {
            Some(EntityId(format!("{}, {}", n, state.0)))
        }
    }

    /// Parses a display key back into an identifier of the given kind.
    pub fn parse(kind: EntityKind, s: &str) -> Option<EntityId> {
        match kind {
            EntityKind::Country => EntityId::country(s),
            EntityKind::State => EntityId::state(s),
            EntityKind::County => {
                let (name, state) = s.rsplit_once(',')?;
                EntityId::county(name, &EntityId::state(state)?)
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ********* Columns ***********

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum Metric {
    Cases,
    Deaths,
    Vax,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Cases, Metric::Deaths, Metric::Vax];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Cases => "cases",
            Metric::Deaths => "deaths",
            Metric::Vax => "vax",
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum Measure {
    Cumulative,
    Daily,
    CumulativePerCapita,
    DailyPerCapita,
}

impl Measure {
    pub const ALL: [Measure; 4] = [
        Measure::Cumulative,
        Measure::Daily,
        Measure::CumulativePerCapita,
        Measure::DailyPerCapita,
    ];

    fn suffix(&self) -> &'static str {
        match self {
            Measure::Cumulative => "_cum",
            Measure::Daily => "",
            Measure::CumulativePerCapita => "_cum_pc",
            Measure::DailyPerCapita => "_pc",
        }
    }

    pub fn is_per_capita(&self) -> bool {
        matches!(self, Measure::CumulativePerCapita | Measure::DailyPerCapita)
    }
}

/// One column of a panel, e.g. `cases_cum_pc`.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct Series {
    pub metric: Metric,
    pub measure: Measure,
}

impl Series {
    pub const fn new(metric: Metric, measure: Measure) -> Series {
        Series { metric, measure }
    }

    pub fn name(&self) -> String {
        format!("{}{}", self.metric.name(), self.measure.suffix())
    }
}

impl Display for Series {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Series {
    type Err = PanelErrors;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        for metric in Metric::ALL {
            for measure in Measure::ALL {
                let series = Series::new(metric, measure);
                if series.name() == s.trim() {
                    return Ok(series);
                }
            }
        }
        Err(PanelErrors::UnknownSeries(s.to_string()))
    }
}

/// How a source reports a metric.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Convention {
    /// Running totals as of each date.
    Cumulative,
    /// New counts for each date.
    Incremental,
}

// ********* Panels ***********

/// Values of one series over a date axis. `None` is a null cell.
pub type Column = Vec<Option<f64>>;

#[derive(PartialEq, Debug, Clone)]
pub struct EntitySeries {
    pub population: Option<u64>,
    pub columns: BTreeMap<Series, Column>,
}

impl EntitySeries {
    pub fn column(&self, series: Series) -> Option<&[Option<f64>]> {
        self.columns.get(&series).map(|c| c.as_slice())
    }
}

/// The observation panel: every entity's columns over one shared date axis.
///
/// Count columns are dense. Per-capita columns are entirely null for
/// entities whose population is unknown or zero.
#[derive(PartialEq, Debug, Clone)]
pub struct Panel {
    pub kind: EntityKind,
    pub dates: Vec<NaiveDate>,
    pub metrics: Vec<Metric>,
    pub entities: BTreeMap<EntityId, EntitySeries>,
}

impl Panel {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn has_series(&self, series: Series) -> bool {
        self.metrics.contains(&series.metric)
    }

    pub fn column(&self, id: &EntityId, series: Series) -> Option<&[Option<f64>]> {
        self.entities.get(id).and_then(|e| e.column(series))
    }

    /// Keeps the listed entities. Identifiers absent from the panel are skipped.
    pub fn select(&self, ids: &[EntityId]) -> Panel {
        Panel {
            kind: self.kind,
            dates: self.dates.clone(),
            metrics: self.metrics.clone(),
            entities: self
                .entities
                .iter()
                .filter(|(id, _)| ids.contains(id))
                .map(|(id, e)| (id.clone(), e.clone()))
                .collect(),
        }
    }

    pub fn smoothed(&self, window: usize) -> Result<Panel, PanelErrors> {
        let mut entities = BTreeMap::new();
        for (id, e) in self.entities.iter() {
            entities.insert(
                id.clone(),
                EntitySeries {
                    population: e.population,
                    columns: crate::smooth_columns(&e.columns, window)?,
                },
            );
        }
        Ok(Panel {
            kind: self.kind,
            dates: self.dates.clone(),
            metrics: self.metrics.clone(),
            entities,
        })
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct AlignedSeries {
    /// The date that became offset 0.
    pub crossed_on: NaiveDate,
    pub columns: BTreeMap<Series, Column>,
}

impl AlignedSeries {
    pub fn len(&self) -> usize {
        self.columns.values().next().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A panel re-indexed by periods since each entity crossed a threshold.
///
/// Entities are dense individually but have different lengths; reads past
/// the end of an entity return `None`.
#[derive(PartialEq, Debug, Clone)]
pub struct AlignedPanel {
    pub kind: EntityKind,
    pub reference: Series,
    pub threshold: f64,
    pub entities: BTreeMap<EntityId, AlignedSeries>,
}

impl AlignedPanel {
    /// Number of offsets in the combined table (the longest entity).
    pub fn len(&self) -> usize {
        self.entities.values().map(|e| e.len()).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column(&self, id: &EntityId, series: Series) -> Option<&[Option<f64>]> {
        self.entities
            .get(id)
            .and_then(|e| e.columns.get(&series))
            .map(|c| c.as_slice())
    }

    pub fn value(&self, id: &EntityId, series: Series, offset: usize) -> Option<f64> {
        self.column(id, series)
            .and_then(|c| c.get(offset).cloned())
            .flatten()
    }

    pub fn smoothed(&self, window: usize) -> Result<AlignedPanel, PanelErrors> {
        let mut entities = BTreeMap::new();
        for (id, e) in self.entities.iter() {
            entities.insert(
                id.clone(),
                AlignedSeries {
                    crossed_on: e.crossed_on,
                    columns: crate::smooth_columns(&e.columns, window)?,
                },
            );
        }
        Ok(AlignedPanel {
            kind: self.kind,
            reference: self.reference,
            threshold: self.threshold,
            entities,
        })
    }
}

// ********* Errors ***********

/// Errors raised by the panel engine. They all come from the caller's
/// request, never from the data.
#[derive(PartialEq, Debug, Clone)]
pub enum PanelErrors {
    /// An observation was added for a metric the builder was not told about.
    UndeclaredMetric(Metric),
    /// The panel does not carry the requested series.
    MissingSeries(Series),
    UnknownSeries(String),
    UnknownEntityKind(String),
    /// Smoothing windows start at 1.
    InvalidWindow(usize),
}

impl Error for PanelErrors {}

impl Display for PanelErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PanelErrors::UndeclaredMetric(m) => write!(f, "metric {} was not declared", m.name()),
            PanelErrors::MissingSeries(s) => write!(f, "panel has no series {}", s),
            PanelErrors::UnknownSeries(s) => write!(f, "unknown series {:?}", s),
            PanelErrors::UnknownEntityKind(s) => write!(f, "unknown entity kind {:?}", s),
            PanelErrors::InvalidWindow(w) => write!(f, "invalid smoothing window {}", w),
        }
    }
}
