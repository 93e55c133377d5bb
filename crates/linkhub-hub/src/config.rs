use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The Hub's YAML configuration. Every field but `address` is optional so
/// a minimal file (or none at all, with CLI overrides) is workable: a
/// missing or unparseable file is logged and treated as defaults rather
/// than refusing to start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub use_tls: bool,
    pub tls_no_verify: bool,
    pub address: String,
    pub username: String,
    pub nickname: String,
    pub realname: String,
    pub password: Option<String>,
    pub server_password: Option<String>,
    #[serde(default)]
    pub auto_join: Vec<String>,
    #[serde(default)]
    pub auto_run: Vec<String>,

    /// Gates the optional `CAP REQ :server-time` / `CAP END` bracket around
    /// login. Off by default so the out-of-the-box login sequence stays a
    /// minimal `PASS`/`NICK`/`USER`.
    #[serde(default)]
    pub cap_server_time: bool,

    /// Supplemental: `PRIVMSG NickServ :IDENTIFY <password>` sent after
    /// `CAP END`, when present.
    pub services_password: Option<String>,
}

impl Config {
    /// Default config path: `$XDG_CONFIG_HOME/linkhub/irc.yaml`, falling
    /// back to `~/.config/linkhub/irc.yaml` via the `dirs` crate.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("linkhub").join("irc.yaml"))
    }

    /// Load and parse the YAML file at `path`, logging and continuing with
    /// a blank config on read or parse failure rather than making that the
    /// caller's decision — only a genuinely missing upstream address or
    /// nickname later causes the connect step to fail.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_yaml::from_str(&text) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.display(), "failed to parse config, using defaults");
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "failed to read config, using defaults");
                Config::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_yaml() {
        let yaml = "address: irc.example.com:6697\nnickname: me\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.address, "irc.example.com:6697");
        assert_eq!(cfg.nickname, "me");
        assert!(!cfg.use_tls);
        assert!(cfg.auto_join.is_empty());
    }

    #[test]
    fn parses_full_yaml_with_supplemental_fields() {
        let yaml = r#"
use_tls: true
tls_no_verify: true
address: irc.example.com:6697
username: user
nickname: nick
realname: Real Name
password: hunter2
server_password: serverpass
auto_join: ["#a", "#b"]
auto_run: ["MODE nick +i"]
cap_server_time: true
services_password: nickservpass
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.use_tls);
        assert!(cfg.tls_no_verify);
        assert_eq!(cfg.auto_join, vec!["#a".to_string(), "#b".to_string()]);
        assert_eq!(cfg.services_password.as_deref(), Some("nickservpass"));
    }
}
