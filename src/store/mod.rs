//! JSON file persistence for the per-instrument state of a run.
//!
//! The whole map is read once at the start and written once at the end.
//! Writes go to a sibling temporary file that is renamed over the target,
//! so a reader never sees a half written file.

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{self, BufWriter, Write},
    marker::PhantomData,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};

use crate::logging;

/// `short_code → value`, ordered so the file diffs cleanly between runs.
pub type Entries<V> = BTreeMap<String, V>;

pub struct JsonStore<V> {
    path: PathBuf,
    _value: PhantomData<V>,
}

impl<V> JsonStore<V>
where
    V: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonStore {
            path: path.into(),
            _value: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored map. A missing or unreadable file yields an empty map.
    pub fn load(&self) -> Entries<V> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(why) if why.kind() == io::ErrorKind::NotFound => {
                logging::info_file_async(format!(
                    "{} does not exist yet, starting empty",
                    self.path.display()
                ));
                return Entries::new();
            }
            Err(why) => {
                logging::error_file_async(format!(
                    "Failed to read {} because {:?}",
                    self.path.display(),
                    why
                ));
                return Entries::new();
            }
        };

        match serde_json::from_str::<Entries<V>>(&text) {
            Ok(entries) => entries,
            Err(why) => {
                logging::error_file_async(format!(
                    "Ignoring the content of {} because {:?}",
                    self.path.display(),
                    why
                ));
                Entries::new()
            }
        }
    }

    /// Replaces the stored map with `entries`.
    pub fn save(&self, entries: &Entries<V>) -> Result<()> {
        let tmp_path = self.tmp_path();
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let write_tmp = || -> Result<()> {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, entries)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            Ok(())
        };

        if let Err(why) = write_tmp() {
            let _ = fs::remove_file(&tmp_path);
            return Err(why.context(format!("Failed to write {}", tmp_path.display())));
        }

        if let Err(why) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(anyhow::Error::new(why).context(format!(
                "Failed to move {} to {}",
                tmp_path.display(),
                self.path.display()
            )));
        }

        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "store.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;

    fn test_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("ls_momentum_store_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = test_dir("missing");
        let store = JsonStore::<Decimal>::new(dir.join("last_prices.json"));

        assert!(store.load().is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_corrupt_file_is_empty() {
        let dir = test_dir("corrupt");
        let path = dir.join("last_prices.json");
        fs::write(&path, "{\"918422\": 17").unwrap();
        let store = JsonStore::<Decimal>::new(&path);

        assert!(store.load().is_empty());

        fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(store.load().is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = test_dir("round_trip");
        let store = JsonStore::<Decimal>::new(dir.join("nested").join("last_prices.json"));
        let mut entries = Entries::new();
        entries.insert("918422".to_string(), dec!(172.48));
        entries.insert("581005".to_string(), dec!(1234.56));
        entries.insert("A1E0HS".to_string(), dec!(31.5));

        store.save(&entries).unwrap();
        assert_eq!(store.load(), entries);
        assert!(!store.tmp_path().exists());

        // overwrite, not merge
        entries.remove("A1E0HS");
        store.save(&entries).unwrap();
        assert_eq!(store.load(), entries);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_failed_rename_removes_tmp_file() {
        let dir = test_dir("rename");
        let target = dir.join("last_prices.json");
        // a directory cannot be replaced by a file
        fs::create_dir_all(&target).unwrap();
        let store = JsonStore::<Decimal>::new(&target);
        let mut entries = Entries::new();
        entries.insert("918422".to_string(), dec!(172.48));

        assert!(store.save(&entries).is_err());
        assert!(!store.tmp_path().exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_high_precision_prices_round_trip_exactly() {
        let dir = test_dir("precision");
        let store = JsonStore::<Decimal>::new(dir.join("last_prices.json"));
        let mut entries = Entries::new();
        entries.insert("918422".to_string(), dec!(12345.678901234567891));
        entries.insert("581005".to_string(), dec!(0.1));

        store.save(&entries).unwrap();

        assert_eq!(store.load(), entries);
        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("12345.678901234567891"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_prices_as_strings_are_accepted() {
        let dir = test_dir("strings");
        let path = dir.join("last_prices.json");
        fs::write(&path, r#"{"918422": "172.5", "871460": 140.25}"#).unwrap();
        let store = JsonStore::<Decimal>::new(&path);

        let entries = store.load();
        assert_eq!(entries.get("918422"), Some(&dec!(172.5)));
        assert_eq!(entries.get("871460"), Some(&dec!(140.25)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_prices_are_json_numbers() {
        let dir = test_dir("numbers");
        let path = dir.join("last_prices.json");
        fs::write(&path, r#"{"918422": 172.5, "871460": 140}"#).unwrap();
        let store = JsonStore::<Decimal>::new(&path);

        let entries = store.load();
        assert_eq!(entries.get("918422"), Some(&dec!(172.5)));
        assert_eq!(entries.get("871460"), Some(&dec!(140)));

        store.save(&entries).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["918422"].is_number());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_dates_round_trip() {
        let dir = test_dir("dates");
        let store = JsonStore::<NaiveDate>::new(dir.join("last_alerts.json"));
        let mut entries = Entries::new();
        entries.insert("918422".to_string(), NaiveDate::from_ymd_opt(2026, 10, 16).unwrap());

        store.save(&entries).unwrap();
        assert_eq!(store.load(), entries);
        assert!(fs::read_to_string(store.path()).unwrap().contains("2026-10-16"));

        let _ = fs::remove_dir_all(&dir);
    }
}
