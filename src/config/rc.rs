use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RcConfig {
    /// Directory holding backing and crash-mail files.
    pub recdir: PathBuf,
    /// Change groups kept on the undo stack.
    pub undo_levels: usize,
    /// Never spawn the mailer.
    pub secure: bool,
    pub sendmail: PathBuf,
    /// Seconds between periodic recovery syncs; 0 disables them.
    pub sync_period: u64,
    /// Change logging, process wide.
    pub log: bool,
}

impl Default for RcConfig {
    fn default() -> Self {
        Self {
            recdir: PathBuf::from("/tmp/vi.recover"),
            undo_levels: 1000,
            secure: false,
            sendmail: PathBuf::from("/usr/sbin/sendmail"),
            sync_period: 120,
            log: true,
        }
    }
}

pub struct RcLoader;

impl RcLoader {
    /// Get the path to the RC file
    /// Looks for .vidbrc in:
    /// 1. Current directory
    /// 2. Home directory (~/.vidbrc)
    pub fn get_rc_path() -> Option<PathBuf> {
        let current_rc = Path::new(".vidbrc");
        if current_rc.exists() {
            return Some(current_rc.to_path_buf());
        }

        if let Ok(home) = env::var("HOME") {
            let home_rc = Path::new(&home).join(".vidbrc");
            if home_rc.exists() {
                return Some(home_rc);
            }
        }

        None
    }

    /// Load and parse the RC file
    pub fn load_config() -> RcConfig {
        let mut config = RcConfig::default();

        if let Some(rc_path) = Self::get_rc_path() {
            match fs::read_to_string(&rc_path) {
                Ok(content) => {
                    debug!(path = %rc_path.display(), "loading rc file");
                    Self::parse_config_content(&content, &mut config);
                }
                Err(e) => {
                    warn!(path = %rc_path.display(), error = %e, "unable to read rc file");
                }
            }
        }

        config
    }

    /// Parse the content of an RC file
    pub fn parse_config_content(content: &str, config: &mut RcConfig) {
        for line in content.lines() {
            let line = line.trim();

            // Skip empty lines and comments
            if line.is_empty() || line.starts_with('#') || line.starts_with('"') {
                continue;
            }

            Self::parse_config_line(line, config);
        }
    }

    /// Parse a single configuration line
    fn parse_config_line(line: &str, config: &mut RcConfig) {
        // Remove inline comments
        let line = match line.find('#') {
            Some(pos) => &line[..pos],
            None => line,
        }
        .trim();

        let setting = line.strip_prefix("set ").map(str::trim).unwrap_or(line);

        // Boolean options in vi style: "secure" / "nosecure"
        let toggle = match setting {
            "secure" => Some((&mut config.secure, true)),
            "nosecure" => Some((&mut config.secure, false)),
            "log" => Some((&mut config.log, true)),
            "nolog" => Some((&mut config.log, false)),
            _ => None,
        };
        if let Some((option, value)) = toggle {
            *option = value;
            return;
        }

        let Some((key, value)) = setting.split_once('=') else {
            debug!(setting, "ignoring rc line");
            return;
        };
        let value = value.trim();

        match key.trim() {
            "recdir" | "recover_dir" => {
                if !value.is_empty() {
                    config.recdir = PathBuf::from(value);
                }
            }
            "undolevels" | "undo_levels" => {
                if let Ok(levels) = value.parse::<usize>() {
                    config.undo_levels = levels;
                }
            }
            "secure" => config.secure = parse_bool(value).unwrap_or(config.secure),
            "log" => config.log = parse_bool(value).unwrap_or(config.log),
            "sendmail" => {
                if !value.is_empty() {
                    config.sendmail = PathBuf::from(value);
                }
            }
            "syncperiod" | "sync_period" => {
                if let Ok(secs) = value.parse::<u64>() {
                    config.sync_period = secs;
                }
            }
            other => debug!(key = other, "unknown rc setting"),
        }
    }

    /// Generate a sample RC file content
    pub fn generate_sample_rc() -> String {
        r#"# vi-db configuration file (.vidbrc)
# Lines starting with # or " are comments

# Recovery
set recdir=/tmp/vi.recover    # Backing and crash-mail files
set syncperiod=120            # Seconds between recovery syncs (0 = off)
set nosecure                  # "secure" never runs the mailer
set sendmail=/usr/sbin/sendmail

# Undo
set undolevels=1000
set log                       # "nolog" turns change logging off

# Alternative key=value syntax:
# recdir=/var/tmp/vi.recover
# undo_levels=500
# secure=true
"#
        .to_string()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vi_style_config() {
        let mut config = RcConfig::default();
        let content = r#"
            set recdir=/var/tmp/rcv
            set undolevels=50
            set secure
            set nolog
            set syncperiod=30
        "#;

        RcLoader::parse_config_content(content, &mut config);

        assert_eq!(config.recdir, PathBuf::from("/var/tmp/rcv"));
        assert_eq!(config.undo_levels, 50);
        assert!(config.secure);
        assert!(!config.log);
        assert_eq!(config.sync_period, 30);
    }

    #[test]
    fn test_parse_key_value_config() {
        let mut config = RcConfig::default();
        let content = r#"
            undo_levels=7
            secure=yes
            sendmail=/usr/lib/sendmail
            sync_period=0
        "#;

        RcLoader::parse_config_content(content, &mut config);

        assert_eq!(config.undo_levels, 7);
        assert!(config.secure);
        assert_eq!(config.sendmail, PathBuf::from("/usr/lib/sendmail"));
        assert_eq!(config.sync_period, 0);
    }

    #[test]
    fn test_parse_mixed_config_with_comments() {
        let mut config = RcConfig::default();
        let content = r#"
            # This is a comment
            set secure             # never mail
            " This is also a comment

            undolevels=5           # Short history
            # set nolog            # This is commented out
        "#;

        RcLoader::parse_config_content(content, &mut config);

        assert!(config.secure);
        assert!(config.log);
        assert_eq!(config.undo_levels, 5);
    }

    #[test]
    fn test_invalid_values_ignored() {
        let mut config = RcConfig::default();
        let content = r#"
            undolevels=lots
            syncperiod=-3
            secure=maybe
            recdir=
            unknown_setting=value
            set tabstop
        "#;

        RcLoader::parse_config_content(content, &mut config);

        let defaults = RcConfig::default();
        assert_eq!(config.undo_levels, defaults.undo_levels);
        assert_eq!(config.sync_period, defaults.sync_period);
        assert_eq!(config.secure, defaults.secure);
        assert_eq!(config.recdir, defaults.recdir);
    }

    #[test]
    fn test_sample_rc_parses() {
        let mut config = RcConfig::default();
        RcLoader::parse_config_content(&RcLoader::generate_sample_rc(), &mut config);
        assert_eq!(config.recdir, PathBuf::from("/tmp/vi.recover"));
        assert!(!config.secure);
        assert!(config.log);
    }
}
