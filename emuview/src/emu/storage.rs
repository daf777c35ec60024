use std::error::Error;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use directories_next::BaseDirs;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::options::FrontendOptions;
use super::recent::RecentGameList;

const AUTOSAVE_TIME_FORMAT: &str = "%x %r";

pub fn config_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|base| base.config_dir().join("EmuView"))
}

fn options_path(config_dir: &Path) -> PathBuf {
    config_dir.join("options.json")
}

fn recent_games_path(config_dir: &Path) -> PathBuf {
    config_dir.join("recent_games.json")
}

fn save_json<T: Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(value)?;
    if let Some(parent_dir) = path.parent() {
        fs::create_dir_all(parent_dir)?;
    }
    fs::write(path, json)?;
    Ok(())
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, Box<dyn Error>> {
    let json = fs::read_to_string(path)?;
    let value = serde_json::from_str::<T>(&json)?;
    Ok(value)
}

fn if_exists<T>(
    result: Result<T, Box<dyn Error>>,
) -> Result<Option<T>, Box<dyn Error>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            if err
                .downcast_ref::<std::io::Error>()
                .is_some_and(|e| e.kind() == ErrorKind::NotFound)
            {
                Ok(None)
            } else {
                Err(err)
            }
        }
    }
}

pub fn save_options(
    config_dir: &Path,
    options: &FrontendOptions,
) -> Result<(), Box<dyn Error>> {
    save_json(&options_path(config_dir), options)
}

pub fn load_options(
    config_dir: &Path,
) -> Result<FrontendOptions, Box<dyn Error>> {
    load_json(&options_path(config_dir))
}

pub fn load_options_if_exists(
    config_dir: &Path,
) -> Result<Option<FrontendOptions>, Box<dyn Error>> {
    if_exists(load_options(config_dir))
}

pub fn save_recent_games(
    config_dir: &Path,
    list: &RecentGameList,
) -> Result<(), Box<dyn Error>> {
    save_json(&recent_games_path(config_dir), list)
}

pub fn load_recent_games(
    config_dir: &Path,
) -> Result<RecentGameList, Box<dyn Error>> {
    load_json(&recent_games_path(config_dir))
}

pub fn load_recent_games_if_exists(
    config_dir: &Path,
) -> Result<Option<RecentGameList>, Box<dyn Error>> {
    if_exists(load_recent_games(config_dir))
}

/// Local modification time of an autosave file, for display.
pub fn autosave_modified_time(path: &Path) -> Option<String> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(format_local_time(modified))
}

pub fn format_local_time(time: SystemTime) -> String {
    let local: DateTime<Local> = time.into();
    local.format(AUTOSAVE_TIME_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use std::env;

    use serial_test::serial;

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join("emuview-storage-tests").join(name);
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    #[serial]
    fn missing_files_load_as_none() {
        let dir = scratch_dir("missing");
        assert!(
            load_options_if_exists(&dir)
                .expect("load options")
                .is_none()
        );
        assert!(
            load_recent_games_if_exists(&dir)
                .expect("load recent")
                .is_none()
        );
    }

    #[test]
    #[serial]
    fn options_and_recent_games_round_trip_through_disk() {
        let dir = scratch_dir("round_trip");
        let options = FrontendOptions {
            pause_unfocused: false,
            frame_rate_pal: Some(50.0),
            ..Default::default()
        };
        let mut recent = RecentGameList::new();
        recent.add_recent_game("/roms/game.rom", "Game");

        save_options(&dir, &options).expect("save options");
        save_recent_games(&dir, &recent).expect("save recent");

        assert_eq!(load_options(&dir).expect("options"), options);
        assert_eq!(load_recent_games(&dir).expect("recent"), recent);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    #[serial]
    fn corrupt_files_are_errors() {
        let dir = scratch_dir("corrupt");
        fs::create_dir_all(&dir).expect("dir");
        fs::write(options_path(&dir), "{ not json").expect("write");
        assert!(load_options_if_exists(&dir).is_err());
        let _ = fs::remove_dir_all(&dir);
    }
}
