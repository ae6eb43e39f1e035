//! The two persistent catalogs: `SimulationLog` and `ICLog`.
//!
//! Each catalog is one human-readable TOML section document at a fixed
//! path under the namelists root. Entries of the simulation log are keyed
//! `Simulation_1 ... Simulation_N` with no gaps; deleting an entry
//! renumbers the higher keys downward. IC-log entries are keyed by the IC
//! file's basename.
//!
//! Writers serialize through read-merge-replace: the document is rebuilt in
//! memory and swapped in with a temp-file rename, so a reader never sees a
//! torn file. There is no cross-process locking; callers are expected to be
//! the single writer.

use crate::error::ClusterError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One simulation-log record. All fields except the name are optional and
/// merge non-destructively on re-append.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SimulationEntry {
    #[serde(rename = "SimulationName")]
    pub simulation_name: String,
    #[serde(rename = "SimulationType", skip_serializing_if = "Option::is_none")]
    pub simulation_type: Option<String>,
    #[serde(rename = "ICFile", skip_serializing_if = "Option::is_none")]
    pub ic_file: Option<String>,
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "BatchScript", skip_serializing_if = "Option::is_none")]
    pub batch_script: Option<String>,
    #[serde(rename = "Namelist", skip_serializing_if = "Option::is_none")]
    pub namelist: Option<String>,
    #[serde(rename = "Location", skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(rename = "SubmissionDate", skip_serializing_if = "Option::is_none")]
    pub submission_date: Option<String>,
    #[serde(rename = "NSnapshots", skip_serializing_if = "Option::is_none")]
    pub n_snapshots: Option<u32>,
    #[serde(rename = "FiguresPath", skip_serializing_if = "Option::is_none")]
    pub figures_path: Option<String>,
    #[serde(rename = "MoviesPath", skip_serializing_if = "Option::is_none")]
    pub movies_path: Option<String>,
    #[serde(rename = "Created", skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

impl SimulationEntry {
    /// Merges the non-null fields of `other` into self. The name is the
    /// identity and never changes.
    fn merge_from(&mut self, other: SimulationEntry) {
        macro_rules! take {
            ($field:ident) => {
                if other.$field.is_some() {
                    self.$field = other.$field;
                }
            };
        }
        take!(simulation_type);
        take!(ic_file);
        take!(description);
        take!(batch_script);
        take!(namelist);
        take!(location);
        take!(submission_date);
        take!(n_snapshots);
        take!(figures_path);
        take!(movies_path);
        take!(created);
    }
}

/// Renders an entry's field by its catalog name, for generic matching.
fn entry_field(value: &toml::Value, field: &str) -> Option<String> {
    match value.get(field)? {
        toml::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

const HEADER_SECTION: &str = "Header";

fn header_section(tool: &str) -> String {
    format!(
        "[{HEADER_SECTION}]\nTool = \"{tool}\"\nCreated = \"{}\"\n\n",
        chrono::Local::now().format("%m-%d-%Y %H:%M:%S")
    )
}

/// Atomically replaces `path` with `contents`.
fn replace_file(path: &Path, contents: &str) -> Result<(), ClusterError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ClusterError::ConfigFailure(format!(
                "cannot create catalog directory {}: {e}",
                parent.display()
            ))
        })?;
    }
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, contents).map_err(|e| {
        ClusterError::ConfigFailure(format!("cannot write {}: {e}", tmp.display()))
    })?;
    std::fs::rename(&tmp, path).map_err(|e| {
        ClusterError::ConfigFailure(format!("cannot replace {}: {e}", path.display()))
    })?;
    Ok(())
}

fn parse_document(path: &Path) -> Result<toml::Table, ClusterError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        ClusterError::ConfigFailure(format!("cannot read catalog {}: {e}", path.display()))
    })?;
    text.parse::<toml::Table>().map_err(|e| {
        ClusterError::ConfigFailure(format!(
            "catalog {} is corrupt and must be repaired: {e}",
            path.display()
        ))
    })
}

/// The durable registry of every simulation ever produced.
#[derive(Debug)]
pub struct SimulationLog {
    path: PathBuf,
    entries: Vec<SimulationEntry>,
}

impl SimulationLog {
    /// Well-known catalog path under the namelists root.
    pub fn default_path(namelists_root: &Path) -> PathBuf {
        namelists_root.join("simulation_log.toml")
    }

    /// Loads the catalog, creating an empty one with a header section when
    /// the file does not exist yet.
    pub fn load(path: PathBuf) -> Result<Self, ClusterError> {
        if !path.exists() {
            let log = SimulationLog {
                path,
                entries: Vec::new(),
            };
            log.write()?;
            return Ok(log);
        }
        let table = parse_document(&path)?;
        // Keys are Simulation_<N>; collect in numeric order.
        let mut numbered: BTreeMap<u32, SimulationEntry> = BTreeMap::new();
        for (key, value) in &table {
            if key == HEADER_SECTION {
                continue;
            }
            let index: u32 = key
                .strip_prefix("Simulation_")
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| {
                    ClusterError::ConfigFailure(format!(
                        "unexpected catalog key '{key}' in {}",
                        path.display()
                    ))
                })?;
            let entry: SimulationEntry = value.clone().try_into().map_err(|e| {
                ClusterError::ConfigFailure(format!("bad entry '{key}': {e}"))
            })?;
            numbered.insert(index, entry);
        }
        Ok(SimulationLog {
            path,
            entries: numbered.into_values().collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[SimulationEntry] {
        &self.entries
    }

    /// Entry by catalog key (`Simulation_3`).
    pub fn get(&self, key: &str) -> Option<&SimulationEntry> {
        let index: usize = key.strip_prefix("Simulation_")?.parse().ok()?;
        if index == 0 {
            return None;
        }
        self.entries.get(index - 1)
    }

    /// Entry by simulation name.
    pub fn by_name(&self, name: &str) -> Option<&SimulationEntry> {
        self.entries.iter().find(|e| e.simulation_name == name)
    }

    /// Inserts an entry. When the name already exists the call is rewritten
    /// as an update: non-null fields merge into the existing record.
    pub fn append(&mut self, entry: SimulationEntry) -> Result<(), ClusterError> {
        if entry.simulation_name.is_empty() {
            return Err(ClusterError::ConfigFailure(
                "a simulation entry needs a SimulationName".into(),
            ));
        }
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.simulation_name == entry.simulation_name)
        {
            existing.merge_from(entry);
        } else {
            self.entries.push(entry);
        }
        self.write()
    }

    /// Merges fields into the named entry, failing when it does not exist.
    pub fn update(&mut self, name: &str, fields: SimulationEntry) -> Result<(), ClusterError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.simulation_name == name)
            .ok_or_else(|| ClusterError::SimBackend(format!("simulation '{name}'")))?;
        entry.merge_from(fields);
        self.write()
    }

    /// Removes the named entry; unknown names are a no-op. Remaining keys
    /// stay compact because they are derived from the entry order.
    pub fn delete(&mut self, name: &str) -> Result<(), ClusterError> {
        let before = self.entries.len();
        self.entries.retain(|e| e.simulation_name != name);
        if self.entries.len() != before {
            self.write()?;
        }
        Ok(())
    }

    /// All values of `field_b` over entries whose `field_a` equals `value`.
    pub fn match_field(&self, field_a: &str, field_b: &str, value: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|e| {
                let table = toml::Value::try_from(e).ok()?;
                if entry_field(&table, field_a)? == value {
                    entry_field(&table, field_b)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Serializes and atomically replaces the on-disk document.
    pub fn write(&self) -> Result<(), ClusterError> {
        let mut doc = header_section("cluster-pipeline");
        for (i, entry) in self.entries.iter().enumerate() {
            let body = toml::to_string(entry).map_err(|e| {
                ClusterError::ConfigFailure(format!(
                    "cannot serialize entry '{}': {e}",
                    entry.simulation_name
                ))
            })?;
            doc.push_str(&format!("[Simulation_{}]\n{body}\n", i + 1));
        }
        replace_file(&self.path, &doc)
    }
}

/// One IC-log record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IcEntry {
    /// IC flavor, e.g. `cluster-binary` or `cluster-singular`.
    #[serde(rename = "Type")]
    pub ic_type: String,
    #[serde(rename = "Location", skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(rename = "ParamFiles", default)]
    pub param_files: Vec<String>,
    #[serde(rename = "Created", skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

/// Marker substring of the parameter file carrying the collision geometry.
pub const INFO_MARKER: &str = "%INFO%";

impl IcEntry {
    /// Validates the cluster-binary convention: exactly three parameter
    /// files, exactly one of which carries the `%INFO%` marker.
    fn validate(&self, name: &str) -> Result<(), ClusterError> {
        if self.ic_type != "cluster-binary" {
            return Ok(());
        }
        if self.param_files.len() != 3 {
            return Err(ClusterError::ConfigFailure(format!(
                "cluster-binary IC '{name}' must list exactly 3 parameter files, found {}",
                self.param_files.len()
            )));
        }
        let marked = self
            .param_files
            .iter()
            .filter(|p| p.contains(INFO_MARKER))
            .count();
        if marked != 1 {
            return Err(ClusterError::ConfigFailure(format!(
                "cluster-binary IC '{name}' must have exactly one {INFO_MARKER} parameter file, found {marked}"
            )));
        }
        Ok(())
    }

    /// Path of the `%INFO%` parameter file.
    pub fn info_file(&self) -> Option<&str> {
        self.param_files
            .iter()
            .map(String::as_str)
            .find(|p| p.contains(INFO_MARKER))
    }
}

/// The durable registry of initial-condition artifacts, keyed by the IC
/// file basename.
#[derive(Debug)]
pub struct IcLog {
    path: PathBuf,
    entries: BTreeMap<String, IcEntry>,
}

impl IcLog {
    pub fn default_path(namelists_root: &Path) -> PathBuf {
        namelists_root.join("ic_log.toml")
    }

    pub fn load(path: PathBuf) -> Result<Self, ClusterError> {
        if !path.exists() {
            let log = IcLog {
                path,
                entries: BTreeMap::new(),
            };
            log.write()?;
            return Ok(log);
        }
        let table = parse_document(&path)?;
        let mut entries = BTreeMap::new();
        for (key, value) in &table {
            if key == HEADER_SECTION {
                continue;
            }
            let entry: IcEntry = value.clone().try_into().map_err(|e| {
                ClusterError::ConfigFailure(format!("bad IC entry '{key}': {e}"))
            })?;
            entries.insert(key.clone(), entry);
        }
        Ok(IcLog { path, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&IcEntry> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Inserts or merges an entry under the IC basename.
    pub fn append(&mut self, name: &str, entry: IcEntry) -> Result<(), ClusterError> {
        entry.validate(name)?;
        match self.entries.get(name) {
            Some(existing) => {
                let mut merged = existing.clone();
                if !entry.ic_type.is_empty() {
                    merged.ic_type = entry.ic_type;
                }
                if entry.location.is_some() {
                    merged.location = entry.location;
                }
                if !entry.param_files.is_empty() {
                    merged.param_files = entry.param_files;
                }
                if entry.created.is_some() {
                    merged.created = entry.created;
                }
                merged.validate(name)?;
                self.entries.insert(name.to_string(), merged);
            }
            None => {
                self.entries.insert(name.to_string(), entry);
            }
        }
        self.write()
    }

    pub fn delete(&mut self, name: &str) -> Result<(), ClusterError> {
        if self.entries.remove(name).is_some() {
            self.write()?;
        }
        Ok(())
    }

    /// Swaps one associated parameter-file path for another.
    pub fn replace_param_file(
        &mut self,
        name: &str,
        old: &str,
        new: &str,
    ) -> Result<(), ClusterError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ClusterError::SimBackend(format!("IC '{name}'")))?;
        let mut candidate = entry.clone();
        let slot = candidate
            .param_files
            .iter_mut()
            .find(|p| p.as_str() == old)
            .ok_or_else(|| {
                ClusterError::SimBackend(format!("IC '{name}' has no parameter file '{old}'"))
            })?;
        *slot = new.to_string();
        candidate.validate(name)?;
        self.entries.insert(name.to_string(), candidate);
        self.write()
    }

    pub fn write(&self) -> Result<(), ClusterError> {
        let mut doc = header_section("cluster-pipeline");
        for (name, entry) in &self.entries {
            let body = toml::to_string(entry).map_err(|e| {
                ClusterError::ConfigFailure(format!("cannot serialize IC entry '{name}': {e}"))
            })?;
            doc.push_str(&format!("[\"{name}\"]\n{body}\n"));
        }
        replace_file(&self.path, &doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> SimulationEntry {
        SimulationEntry {
            simulation_name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn append_then_delete_restores_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simulation_log.toml");
        let mut log = SimulationLog::load(path.clone()).unwrap();
        log.append(entry("keeper")).unwrap();
        let before: Vec<_> = log.entries().to_vec();

        log.append(entry("transient")).unwrap();
        log.delete("transient").unwrap();
        assert_eq!(log.entries(), &before[..]);

        // And the on-disk document agrees after a reload.
        let reloaded = SimulationLog::load(path).unwrap();
        assert_eq!(reloaded.entries(), &before[..]);
    }

    #[test]
    fn keys_stay_compact_after_delete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simulation_log.toml");
        let mut log = SimulationLog::load(path.clone()).unwrap();
        for name in ["a", "b", "c", "d"] {
            log.append(entry(name)).unwrap();
        }
        log.delete("b").unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("[Simulation_1]"));
        assert!(text.contains("[Simulation_2]"));
        assert!(text.contains("[Simulation_3]"));
        assert!(!text.contains("[Simulation_4]"));
        // Renumbering kept the order of the survivors.
        let reloaded = SimulationLog::load(path).unwrap();
        assert_eq!(reloaded.get("Simulation_2").unwrap().simulation_name, "c");
    }

    #[test]
    fn append_existing_name_merges_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = SimulationLog::load(dir.path().join("log.toml")).unwrap();
        log.append(SimulationEntry {
            simulation_name: "A".into(),
            n_snapshots: Some(5),
            ..Default::default()
        })
        .unwrap();
        log.append(SimulationEntry {
            simulation_name: "A".into(),
            description: Some("redo".into()),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(log.len(), 1);
        let e = log.by_name("A").unwrap();
        assert_eq!(e.n_snapshots, Some(5));
        assert_eq!(e.description.as_deref(), Some("redo"));
    }

    #[test]
    fn delete_unknown_name_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = SimulationLog::load(dir.path().join("log.toml")).unwrap();
        log.append(entry("only")).unwrap();
        log.delete("missing").unwrap();
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn match_field_returns_matching_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = SimulationLog::load(dir.path().join("log.toml")).unwrap();
        log.append(SimulationEntry {
            simulation_name: "s1".into(),
            simulation_type: Some("mond".into()),
            location: Some("/sims/s1".into()),
            ..Default::default()
        })
        .unwrap();
        log.append(SimulationEntry {
            simulation_name: "s2".into(),
            simulation_type: Some("newtonian".into()),
            location: Some("/sims/s2".into()),
            ..Default::default()
        })
        .unwrap();

        let hits = log.match_field("SimulationType", "Location", "mond");
        assert_eq!(hits, vec!["/sims/s1".to_string()]);
    }

    #[test]
    fn corrupt_catalog_is_config_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.toml");
        std::fs::write(&path, "[Simulation_1\nbroken").unwrap();
        assert!(matches!(
            SimulationLog::load(path),
            Err(ClusterError::ConfigFailure(_))
        ));
    }

    #[test]
    fn missing_file_creates_catalog_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.toml");
        let _log = SimulationLog::load(path.clone()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("[Header]"));
    }

    fn binary_ic(files: &[&str]) -> IcEntry {
        IcEntry {
            ic_type: "cluster-binary".into(),
            location: Some("/ics/pair.dat".into()),
            param_files: files.iter().map(|s| s.to_string()).collect(),
            created: None,
        }
    }

    #[test]
    fn cluster_binary_invariant_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = IcLog::load(dir.path().join("ic.toml")).unwrap();

        // Wrong count.
        assert!(log
            .append("pair.dat", binary_ic(&["a.param", "b.param"]))
            .is_err());
        // No %INFO% file.
        assert!(log
            .append("pair.dat", binary_ic(&["a.param", "b.param", "c.param"]))
            .is_err());
        // Two %INFO% files.
        assert!(log
            .append(
                "pair.dat",
                binary_ic(&["%INFO%a.param", "%INFO%b.param", "c.param"])
            )
            .is_err());
        // The valid shape.
        log.append(
            "pair.dat",
            binary_ic(&["cluster1.param", "cluster2.param", "pair_%INFO%.param"]),
        )
        .unwrap();
        assert_eq!(
            log.get("pair.dat").unwrap().info_file(),
            Some("pair_%INFO%.param")
        );
    }

    #[test]
    fn replace_param_file_swaps_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = IcLog::load(dir.path().join("ic.toml")).unwrap();
        log.append(
            "pair.dat",
            binary_ic(&["c1.param", "c2.param", "pair_%INFO%.param"]),
        )
        .unwrap();
        log.replace_param_file("pair.dat", "c2.param", "c2_fixed.param")
            .unwrap();
        assert!(log
            .get("pair.dat")
            .unwrap()
            .param_files
            .contains(&"c2_fixed.param".to_string()));
        // Replacing the info file with a plain one violates the invariant.
        assert!(log
            .replace_param_file("pair.dat", "pair_%INFO%.param", "plain.param")
            .is_err());
    }
}
