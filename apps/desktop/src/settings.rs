use std::{collections::HashMap, fs};

#[derive(Debug)]
pub struct Settings {
    pub relay_url: String,
    pub store_path: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:3001/ws".into(),
            store_path: "./data/messages.json".into(),
        }
    }
}

/// Defaults, overridden by `shelftalk.toml` when present, overridden
/// by environment variables. CLI flags win over all of these.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("shelftalk.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("relay_url") {
                settings.relay_url = v.clone();
            }
            if let Some(v) = file_cfg.get("store_path") {
                settings.store_path = v.clone();
            }
        }
    }

    if let Ok(v) = std::env::var("SHELFTALK_RELAY_URL") {
        settings.relay_url = v;
    }
    if let Ok(v) = std::env::var("SHELFTALK_STORE_PATH") {
        settings.store_path = v;
    }

    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_relay() {
        let settings = Settings::default();
        assert_eq!(settings.relay_url, "ws://127.0.0.1:3001/ws");
        assert_eq!(settings.store_path, "./data/messages.json");
    }
}
