// Explicit memoization of loaded and aligned panels.
//
// Keys carry the whole source description (columns, worksheets, the role of
// every file) and the SHA-256 digest of every file a panel was read from, so
// an entry is never served for other parameters or changed contents.

use std::rc::Rc;

use crate::loader::*;

/// A file as seen at load time.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct FileIdentity {
    pub path: PathBuf,
    pub digest: String,
}

/// The canonical form of `path` when it exists, `path` itself otherwise.
fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

impl FileIdentity {
    pub fn read(path: &Path) -> LoaderResult<FileIdentity> {
        let bytes = fs::read(path).context(ReadingFileSnafu {
            path: path.display().to_string(),
        })?;
        Ok(FileIdentity {
            path: normalize_path(path),
            digest: sha256::digest(bytes.as_slice()),
        })
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct PanelKey {
    pub kind: EntityKind,
    pub sources: EntitySources,
    /// In the order of `EntitySources::input_files`.
    pub files: Vec<FileIdentity>,
}

impl PanelKey {
    pub fn new(kind: EntityKind, sources: &EntitySources, root: &Path) -> LoaderResult<PanelKey> {
        let mut files: Vec<FileIdentity> = Vec::new();
        for p in sources.input_files(root).iter() {
            files.push(FileIdentity::read(p)?);
        }
        Ok(PanelKey {
            kind,
            sources: sources.clone(),
            files,
        })
    }

    /// `path` is compared in canonical form.
    fn reads(&self, path: &Path) -> bool {
        self.files.iter().any(|f| f.path == path)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct AlignKey {
    pub panel: PanelKey,
    pub reference: Series,
    /// The bit pattern of the threshold, as `f64` is not `Hash`.
    pub threshold_bits: u64,
    pub selection: Option<Vec<EntityId>>,
}

/// Panels and aligned panels already computed, owned by the caller.
#[derive(Debug, Default)]
pub struct PanelCache {
    panels: HashMap<PanelKey, Rc<Panel>>,
    aligned: HashMap<AlignKey, Rc<AlignedPanel>>,
}

impl PanelCache {
    pub fn new() -> PanelCache {
        PanelCache::default()
    }

    pub fn len(&self) -> usize {
        self.panels.len() + self.aligned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn panel_for_key(
        &mut self,
        key: &PanelKey,
        sources: &EntitySources,
        root: &Path,
    ) -> LoaderResult<Rc<Panel>> {
        if let Some(p) = self.panels.get(key) {
            debug!("cache: hit for {} panel", key.kind);
            return Ok(p.clone());
        }
        debug!("cache: miss for {} panel", key.kind);
        let p = Rc::new(load_panel(key.kind, sources, root)?);
        self.panels.insert(key.clone(), p.clone());
        Ok(p)
    }

    pub fn panel(
        &mut self,
        kind: EntityKind,
        sources: &EntitySources,
        root: &Path,
    ) -> LoaderResult<Rc<Panel>> {
        let key = PanelKey::new(kind, sources, root)?;
        self.panel_for_key(&key, sources, root)
    }

    /// The panel restricted to `selection` (all entities when `None`),
    /// aligned on `reference`.
    pub fn aligned(
        &mut self,
        kind: EntityKind,
        sources: &EntitySources,
        root: &Path,
        reference: Series,
        threshold: f64,
        selection: &Option<Vec<EntityId>>,
    ) -> LoaderResult<Rc<AlignedPanel>> {
        let panel_key = PanelKey::new(kind, sources, root)?;
        let key = AlignKey {
            panel: panel_key.clone(),
            reference,
            threshold_bits: threshold.to_bits(),
            selection: selection.clone(),
        };
        if let Some(ap) = self.aligned.get(&key) {
            debug!("cache: hit for {} aligned on {}", kind, reference);
            return Ok(ap.clone());
        }
        let panel = self.panel_for_key(&panel_key, sources, root)?;
        let ap = match selection {
            Some(ids) => align(&panel.select(ids), reference, threshold),
            None => align(&panel, reference, threshold),
        }
        .context(PanelSnafu {})?;
        let ap = Rc::new(ap);
        self.aligned.insert(key, ap.clone());
        Ok(ap)
    }

    /// Drops every entry read from `path`. Returns the number of entries
    /// dropped.
    pub fn invalidate_path(&mut self, path: &Path) -> usize {
        let before = self.len();
        let path = normalize_path(path);
        self.panels.retain(|k, _| !k.reads(&path));
        self.aligned.retain(|k, _| !k.panel.reads(&path));
        let dropped = before - self.len();
        info!("cache: dropped {} entries reading {:?}", dropped, path);
        dropped
    }

    pub fn clear(&mut self) {
        self.panels.clear();
        self.aligned.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::write_fixture;

    fn owid_sources(dir: &Path, cases: &str) -> EntitySources {
        write_fixture(
            dir,
            "owid.csv",
            &format!(
                "iso_code,date,total_cases,total_deaths,population\n\
                 FRA,2020-03-01,1,0,100\n\
                 FRA,2020-03-02,{},0,100\n",
                cases
            ),
        );
        serde_json::from_str(r#"{"provider": "owid", "filePath": "owid.csv"}"#).unwrap()
    }

    #[test]
    fn same_files_hit_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let sources = owid_sources(dir.path(), "3");
        let mut cache = PanelCache::new();
        let p1 = cache.panel(EntityKind::Country, &sources, dir.path()).unwrap();
        let p2 = cache.panel(EntityKind::Country, &sources, dir.path()).unwrap();
        assert!(Rc::ptr_eq(&p1, &p2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn changed_contents_are_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let fra = EntityId::country("FRA").unwrap();
        let cum: Series = "cases_cum".parse().unwrap();
        let sources = owid_sources(dir.path(), "3");
        let mut cache = PanelCache::new();
        let p1 = cache.panel(EntityKind::Country, &sources, dir.path()).unwrap();
        assert_eq!(p1.column(&fra, cum).unwrap()[1], Some(3.0));

        owid_sources(dir.path(), "7");
        let p2 = cache.panel(EntityKind::Country, &sources, dir.path()).unwrap();
        assert_eq!(p2.column(&fra, cum).unwrap()[1], Some(7.0));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn aligned_entries_and_invalidation() {
        let dir = tempfile::tempdir().unwrap();
        let sources = owid_sources(dir.path(), "3");
        let cum: Series = "cases_cum".parse().unwrap();
        let mut cache = PanelCache::new();
        let a1 = cache
            .aligned(EntityKind::Country, &sources, dir.path(), cum, 2.0, &None)
            .unwrap();
        let a2 = cache
            .aligned(EntityKind::Country, &sources, dir.path(), cum, 2.0, &None)
            .unwrap();
        assert!(Rc::ptr_eq(&a1, &a2));
        let a3 = cache
            .aligned(EntityKind::Country, &sources, dir.path(), cum, 0.5, &None)
            .unwrap();
        assert_eq!(a1.len(), 1);
        assert_eq!(a3.len(), 2);
        // One panel, two alignments.
        assert_eq!(cache.len(), 3);

        assert_eq!(cache.invalidate_path(&dir.path().join("other.csv")), 0);
        assert_eq!(cache.invalidate_path(&dir.path().join("owid.csv")), 3);
        assert!(cache.is_empty());

        cache.panel(EntityKind::Country, &sources, dir.path()).unwrap();
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn load_parameters_are_part_of_the_key() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(
            dir.path(),
            "us-states.csv",
            "date,state,fips,cases,deaths\n2020-03-01,Washington,53,10,1\n",
        );
        write_fixture(dir.path(), "pop.csv", "fips,abbrev,2018,2019\n53,WA,1000,2000\n");
        let sources = |column: &str| -> EntitySources {
            serde_json::from_str(&format!(
                r#"{{"provider": "nyt", "filePath": "us-states.csv",
                    "population": {{"filePath": "pop.csv", "populationColumn": "{}"}}}}"#,
                column
            ))
            .unwrap()
        };
        let wa = EntityId::state("WA").unwrap();
        let mut cache = PanelCache::new();
        let p18 = cache.panel(EntityKind::State, &sources("2018"), dir.path()).unwrap();
        let p19 = cache.panel(EntityKind::State, &sources("2019"), dir.path()).unwrap();
        assert!(!Rc::ptr_eq(&p18, &p19));
        assert_eq!(p18.entities[&wa].population, Some(1000));
        assert_eq!(p19.entities[&wa].population, Some(2000));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn invalidation_matches_equivalent_paths() {
        let dir = tempfile::tempdir().unwrap();
        let sources = owid_sources(dir.path(), "3");
        let mut cache = PanelCache::new();
        cache.panel(EntityKind::Country, &sources, dir.path()).unwrap();
        let dotted = dir.path().join(".").join("owid.csv");
        assert_eq!(cache.invalidate_path(&dotted), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let sources: EntitySources =
            serde_json::from_str(r#"{"provider": "owid", "filePath": "nope.csv"}"#).unwrap();
        let mut cache = PanelCache::new();
        let res = cache.panel(EntityKind::Country, &sources, dir.path());
        assert!(matches!(res, Err(LoaderError::ReadingFile { .. })));
    }
}
