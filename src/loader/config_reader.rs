use std::fmt::Display;

use crate::loader::*;

/// The data providers a class of entities can be read from.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Provider {
    /// Johns Hopkins CSSE global time series.
    Jhu,
    /// Our World in Data.
    Owid,
    /// New York Times US tables.
    Nyt,
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Jhu => "jhu",
            Provider::Owid => "owid",
            Provider::Nyt => "nyt",
        }
    }
}

impl Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Hash, Serialize, Deserialize)]
pub struct PopulationSource {
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "populationColumn")]
    pub population_column: Option<String>,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Hash, Serialize, Deserialize)]
pub struct VaccinationSource {
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "keyColumn")]
    pub key_column: Option<String>,
    #[serde(rename = "dateColumn")]
    pub date_column: Option<String>,
    #[serde(rename = "dosesColumn")]
    pub doses_column: Option<String>,
}

impl VaccinationSource {
    pub fn key_column(&self) -> &str {
        self.key_column.as_deref().unwrap_or("iso_code")
    }

    pub fn date_column(&self) -> &str {
        self.date_column.as_deref().unwrap_or("date")
    }

    pub fn doses_column(&self) -> &str {
        self.doses_column.as_deref().unwrap_or("daily_vaccinations")
    }
}

/// Where the tables of one class of entities are.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Serialize, Deserialize)]
pub struct EntitySources {
    pub provider: String,
    #[serde(rename = "casesPath")]
    pub cases_path: Option<String>,
    #[serde(rename = "deathsPath")]
    pub deaths_path: Option<String>,
    #[serde(rename = "filePath")]
    pub file_path: Option<String>,
    pub population: Option<PopulationSource>,
    pub vaccinations: Option<VaccinationSource>,
}

impl EntitySources {
    pub fn provider(&self) -> LoaderResult<Provider> {
        match self.provider.as_str() {
            "jhu" => Ok(Provider::Jhu),
            "owid" => Ok(Provider::Owid),
            "nyt" => Ok(Provider::Nyt),
            x => UnknownProviderSnafu { provider: x }.fail(),
        }
    }

    fn required(&self, root: &Path, field: &str, value: &Option<String>) -> LoaderResult<PathBuf> {
        let p = value.as_ref().context(MissingSourceFieldSnafu {
            provider: self.provider.clone(),
            field,
        })?;
        Ok(resolve_path(root, p))
    }

    pub fn cases_path(&self, root: &Path) -> LoaderResult<PathBuf> {
        self.required(root, "casesPath", &self.cases_path)
    }

    pub fn deaths_path(&self, root: &Path) -> LoaderResult<PathBuf> {
        self.required(root, "deathsPath", &self.deaths_path)
    }

    pub fn file_path(&self, root: &Path) -> LoaderResult<PathBuf> {
        self.required(root, "filePath", &self.file_path)
    }

    pub fn population_source(&self) -> LoaderResult<&PopulationSource> {
        self.population.as_ref().context(MissingSourceFieldSnafu {
            provider: self.provider.clone(),
            field: "population",
        })
    }

    /// Every file this configuration reads, in a stable order.
    pub fn input_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut res: Vec<PathBuf> = Vec::new();
        for p in [&self.cases_path, &self.deaths_path, &self.file_path]
            .iter()
            .copied()
            .flatten()
        {
            res.push(resolve_path(root, p));
        }
        if let Some(ps) = &self.population {
            res.push(resolve_path(root, &ps.file_path));
        }
        if let Some(vs) = &self.vaccinations {
            res.push(resolve_path(root, &vs.file_path));
        }
        res
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(rename = "dataDirectory")]
    pub data_directory: Option<String>,
    pub country: Option<EntitySources>,
    pub state: Option<EntitySources>,
    pub county: Option<EntitySources>,
}

impl SourcesConfig {
    pub fn sources(&self, kind: EntityKind) -> LoaderResult<&EntitySources> {
        let s = match kind {
            EntityKind::Country => &self.country,
            EntityKind::State => &self.state,
            EntityKind::County => &self.county,
        };
        s.as_ref().context(MissingSourceSnafu { kind })
    }
}

pub fn read_config(path: &Path) -> LoaderResult<SourcesConfig> {
    let display = path.display().to_string();
    let contents = fs::read_to_string(path).context(ReadingFileSnafu {
        path: display.clone(),
    })?;
    debug!("read content: {:?}", contents);
    let config: SourcesConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path: display })?;
    Ok(config)
}

/// The directory relative paths are resolved against: `dataDirectory`, itself
/// relative to the directory of the configuration file.
pub fn data_root(config_path: &Path, config: &SourcesConfig) -> LoaderResult<PathBuf> {
    let parent = config_path.parent().context(MissingParentDirSnafu {
        path: config_path.display().to_string(),
    })?;
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    let root = match &config.data_directory {
        Some(d) => parent.join(d),
        None => parent.to_path_buf(),
    };
    debug!("data_root: {:?}", root);
    Ok(root)
}
