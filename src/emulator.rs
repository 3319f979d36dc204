//! Locating the emulator executable.
//!
//! Order: an explicit path, then the `EMUHAWK` environment variable, then a
//! handful of usual install locations (each also tried on the other of the
//! `C:`/`D:` drives).

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variables checked for an override, in order.
pub const ENV_VARS: [&str; 2] = ["EMUHAWK", "emuhawk"];

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(
        "EmuHawk.exe could not be found, set it with --emulator or the EMUHAWK environment variable"
    )]
    NotFound { searched: Vec<PathBuf> },
}

/// Find the emulator using the process environment and filesystem.
pub fn discover(explicit: Option<&Path>) -> Result<PathBuf, DiscoveryError> {
    discover_with(explicit, |name| std::env::var(name).ok(), Path::is_file)
}

/// Discovery with injectable environment lookup and file check.
pub fn discover_with(
    explicit: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
    is_file: impl Fn(&Path) -> bool,
) -> Result<PathBuf, DiscoveryError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = ENV_VARS.iter().find_map(|&name| env(name)) {
        return Ok(PathBuf::from(path));
    }

    let home = env("HOME").or_else(|| env("USERPROFILE")).map(PathBuf::from);
    let program_files = env("ProgramFiles").map(PathBuf::from);
    let searched = candidates(home.as_deref(), program_files.as_deref());

    match searched.iter().find(|path| is_file(path.as_path())) {
        Some(path) => Ok(path.clone()),
        None => Err(DiscoveryError::NotFound { searched }),
    }
}

/// Install locations to probe, followed by their drive-swapped twins.
pub fn candidates(home: Option<&Path>, program_files: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = home {
        paths.push(home.join("Documents/GitHub/BizHawk/output/EmuHawk.exe"));
    }
    if let Some(program_files) = program_files {
        paths.push(program_files.join("BizHawk/output/EmuHawk.exe"));
        paths.push(program_files.join("BizHawk/EmuHawk.exe"));
    }

    let swapped: Vec<PathBuf> = paths.iter().filter_map(|p| swap_drive(p)).collect();
    paths.extend(swapped);
    paths
}

/// `C:` becomes `D:`, any other drive becomes `C:`. Paths without a drive
/// letter have no twin.
fn swap_drive(path: &Path) -> Option<PathBuf> {
    let text = path.to_str()?;
    let mut chars = text.chars();
    let (letter, colon) = (chars.next()?, chars.next()?);
    if !letter.is_ascii_alphabetic() || colon != ':' {
        return None;
    }
    let drive = if letter.eq_ignore_ascii_case(&'C') { "D:" } else { "C:" };
    Some(PathBuf::from(format!("{drive}{}", &text[2..])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_explicit_path_wins() {
        let found = discover_with(
            Some(Path::new("/opt/emu/EmuHawk.exe")),
            env_of(&[("EMUHAWK", "/elsewhere")]),
            |_| false,
        )
        .unwrap();
        assert_eq!(found, PathBuf::from("/opt/emu/EmuHawk.exe"));
    }

    #[test]
    fn test_env_override() {
        let found = discover_with(None, env_of(&[("emuhawk", "/env/EmuHawk.exe")]), |_| false).unwrap();
        assert_eq!(found, PathBuf::from("/env/EmuHawk.exe"));
    }

    #[test]
    fn test_probes_candidates() {
        let target = PathBuf::from("/home/ann/Documents/GitHub/BizHawk/output/EmuHawk.exe");
        let expected = target.clone();
        let found = discover_with(None, env_of(&[("HOME", "/home/ann")]), move |p| p == target).unwrap();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_drive_swap() {
        assert_eq!(
            swap_drive(Path::new("C:/Program Files/BizHawk/EmuHawk.exe")),
            Some(PathBuf::from("D:/Program Files/BizHawk/EmuHawk.exe"))
        );
        assert_eq!(
            swap_drive(Path::new("E:/BizHawk/EmuHawk.exe")),
            Some(PathBuf::from("C:/BizHawk/EmuHawk.exe"))
        );
        assert_eq!(swap_drive(Path::new("/usr/bin/emu")), None);
    }

    #[test]
    fn test_candidates_include_twins() {
        let paths = candidates(None, Some(Path::new("C:/Program Files")));
        assert_eq!(paths.len(), 4);
        assert!(paths[2].to_str().unwrap().starts_with("D:"));
        assert!(paths[3].to_str().unwrap().starts_with("D:"));
    }

    #[test]
    fn test_not_found_lists_searched() {
        match discover_with(None, env_of(&[("HOME", "/home/ann")]), |_| false) {
            Err(DiscoveryError::NotFound { searched }) => assert_eq!(searched.len(), 1),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
