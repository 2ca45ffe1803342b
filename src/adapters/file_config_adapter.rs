//! INI file configuration adapter.

use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[engine]
poll_interval_secs = 5
entry_tolerance_pct = 0.5
default_size_usd = 1000

[dispatcher]
detector_hints = yes
parsers = trade-format-a, zone-caller

[sqlite]
path = /tmp/sigtrader.db

[pricefeed]
base_url = https://api.binance.com
"#;

    fn adapter() -> FileConfigAdapter {
        FileConfigAdapter::from_string(SAMPLE).unwrap()
    }

    #[test]
    fn reads_strings_ints_and_doubles() {
        let a = adapter();
        assert_eq!(
            a.get_string("sqlite", "path"),
            Some("/tmp/sigtrader.db".to_string())
        );
        assert_eq!(a.get_int("engine", "poll_interval_secs", 0), 5);
        assert!((a.get_double("engine", "entry_tolerance_pct", 0.0) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let a = adapter();
        assert_eq!(a.get_string("engine", "missing"), None);
        assert_eq!(a.get_int("engine", "missing", 42), 42);
        assert!(a.get_bool("missing_section", "key", true));
    }

    #[test]
    fn bool_spellings() {
        let a = adapter();
        assert!(a.get_bool("dispatcher", "detector_hints", false));
        let b = FileConfigAdapter::from_string("[x]\nflag = 0\n").unwrap();
        assert!(!b.get_bool("x", "flag", true));
    }

    #[test]
    fn list_values_split_and_trim() {
        let a = adapter();
        assert_eq!(
            a.get_list("dispatcher", "parsers"),
            vec!["trade-format-a".to_string(), "zone-caller".to_string()]
        );
        assert!(a.get_list("dispatcher", "missing").is_empty());
    }

    #[test]
    fn from_file_reads_disk() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[engine]\npoll_interval_secs = 7\n").unwrap();
        let a = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(a.get_int("engine", "poll_interval_secs", 0), 7);
    }
}
