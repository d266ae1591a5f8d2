//! INI file configuration adapter.
//!
//! Section and key names are case-insensitive; values are returned trimmed
//! and otherwise untouched, so rule text such as `close|val:>=3` survives.

use std::path::Path;

use configparser::ini::Ini;

use crate::domain::error::SamselectError;
use crate::ports::config_port::ConfigPort;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SamselectError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| SamselectError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, SamselectError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| SamselectError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    /// Section names present in the file, in no particular order.
    pub fn sections(&self) -> Vec<String> {
        self.config.sections()
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key).map(|v| v.trim().to_string())
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
            .as_deref()
            .and_then(Self::parse_bool)
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    const SAMPLE: &str = r#"
[strategy]
name = SmallCapAlpha
factors = FloatMarketCap:asc:0.7, Momentum:desc:0.3:60
filter_1 = close|val:>=3
filter_2 = board|cat:exclude(ST,BJ)
select_count = 30
strict = yes

[timing]
source = pricing:close:cn:000300
params = 5, 20

[aligner]
price_fill_limit = 2
stale_after_days = 400
"#;

    #[test]
    fn rule_text_survives_intact() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(
            adapter.get_string("strategy", "factors"),
            Some("FloatMarketCap:asc:0.7, Momentum:desc:0.3:60".to_string())
        );
        assert_eq!(
            adapter.get_string("strategy", "filter_1"),
            Some("close|val:>=3".to_string())
        );
        assert_eq!(
            adapter.get_string("strategy", "filter_2"),
            Some("board|cat:exclude(ST,BJ)".to_string())
        );
        assert_eq!(
            adapter.get_string("timing", "source"),
            Some("pricing:close:cn:000300".to_string())
        );
    }

    #[test]
    fn keys_are_case_insensitive() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(
            adapter.get_string("STRATEGY", "Name"),
            Some("SmallCapAlpha".to_string())
        );
    }

    #[test]
    fn missing_keys_and_sections() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_string("strategy", "filter_3"), None);
        assert_eq!(adapter.get_string("execution", "broker"), None);
        assert_eq!(adapter.get_int("aligner", "missing", 7), 7);
        assert_eq!(adapter.get_double("timing", "missing", 0.5), 0.5);
    }

    #[test]
    fn numeric_values() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_int("aligner", "price_fill_limit", 0), 2);
        assert_eq!(adapter.get_int("strategy", "select_count", 0), 30);
        assert_eq!(adapter.get_double("aligner", "stale_after_days", 0.0), 400.0);
        // not a number: default
        assert_eq!(adapter.get_int("strategy", "name", 42), 42);
        assert_eq!(adapter.get_double("timing", "params", 9.9), 9.9);
    }

    #[test]
    fn bool_values() {
        let adapter =
            FileConfigAdapter::from_string("[strategy]\na = true\nb = on\nc = 0\nd = maybe\n")
                .unwrap();
        assert!(adapter.get_bool("strategy", "a", false));
        assert!(adapter.get_bool("strategy", "b", false));
        assert!(!adapter.get_bool("strategy", "c", true));
        assert!(adapter.get_bool("strategy", "d", true));
        assert!(!adapter.get_bool("strategy", "missing", false));

        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert!(adapter.get_bool("strategy", "strict", false));
    }

    #[test]
    fn sections_listed() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        let sections = adapter.sections();
        for name in ["strategy", "timing", "aligner"] {
            assert!(sections.iter().any(|s| s == name), "missing section {}", name);
        }
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config(SAMPLE);
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("strategy", "name"),
            Some("SmallCapAlpha".to_string())
        );
    }

    #[test]
    fn from_file_missing_is_config_parse_error() {
        let err = FileConfigAdapter::from_file("/nonexistent/path/strategy.ini")
            .err()
            .unwrap();
        assert!(
            matches!(err, SamselectError::ConfigParse { ref file, .. } if file.contains("strategy.ini"))
        );
        assert!(err.is_configuration());
    }
}
