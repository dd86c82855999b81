#![allow(dead_code)]

use {
    chrono::{DateTime, FixedOffset, TimeZone as _},
    daily_roller::Clock,
    regex::Regex,
    std::{
        fs,
        path::Path,
        sync::{Arc, Mutex},
    },
};

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<FixedOffset>>>,
}

impl ManualClock {
    pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> Self {
        ManualClock {
            now: Arc::new(Mutex::new(
                FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(y, m, d, h, min, s).unwrap(),
            )),
        }
    }

    pub fn set(&self, y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) {
        *self.now.lock().unwrap() = FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(y, m, d, h, min, s).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().unwrap()
    }
}

/// Payloads of every line in `path`, asserting each line is well formed.
pub fn payloads(path: &Path) -> Vec<String> {
    let line = Regex::new(r"^\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2} (.*)$").unwrap();
    let content = fs::read_to_string(path).unwrap();
    assert!(content.is_empty() || content.ends_with('\n'), "partial trailing line in {path:?}");
    content
        .lines()
        .map(|l| {
            let caps = line.captures(l).unwrap_or_else(|| panic!("malformed line {l:?} in {path:?}"));
            caps[1].to_string()
        })
        .collect()
}

/// Names of the files directly inside `dir`, sorted.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
