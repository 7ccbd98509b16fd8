//! Built-in User-Agent presets

use indexmap::IndexMap;

/// Key of the preset every unresolved selection falls back to
pub const FALLBACK_PRESET: &str = "chrome_latest";

/// A built-in, non-deletable named User-Agent string
#[derive(Debug, Clone, Copy)]
pub struct Preset {
    pub key: &'static str,
    pub name: &'static str,
    pub value: &'static str,
}

/// Shipped presets, in display order
pub const PRESETS: &[Preset] = &[
    Preset {
        key: "chrome_latest",
        name: "Chrome Latest",
        value: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    },
    Preset {
        key: "edge_latest",
        name: "Edge Latest",
        value: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
    },
    Preset {
        key: "firefox_latest",
        name: "Firefox Latest",
        value: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    },
    Preset {
        key: "electron_11",
        name: "Electron 11",
        value: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Electron/11.2.0 Safari/537.36",
    },
    Preset {
        key: "electron_13",
        name: "Electron 13",
        value: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/96.0.4664.110 Electron/13.0.0 Safari/537.36",
    },
    Preset {
        key: "electron_15",
        name: "Electron 15",
        value: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/100.0.4896.127 Electron/15.0.0 Safari/537.36",
    },
];

/// Look up a preset by key
pub fn preset(key: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.key == key)
}

/// Whether `key` names a built-in preset
pub fn is_preset(key: &str) -> bool {
    preset(key).is_some()
}

/// The fallback User-Agent value
pub fn fallback_user_agent() -> &'static str {
    // chrome_latest is the first entry of PRESETS
    PRESETS[0].value
}

/// Preset keys mapped to their User-Agent strings
pub fn preset_map() -> IndexMap<String, String> {
    PRESETS
        .iter()
        .map(|p| (p.key.to_string(), p.value.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_is_chrome() {
        assert_eq!(PRESETS[0].key, FALLBACK_PRESET);
        assert!(fallback_user_agent().contains("Chrome/120"));
    }

    #[test]
    fn test_preset_lookup() {
        assert!(is_preset("firefox_latest"));
        assert!(!is_preset("custom_mine"));
        assert_eq!(preset("edge_latest").unwrap().name, "Edge Latest");
    }

    #[test]
    fn test_preset_map_order() {
        let keys: Vec<_> = preset_map().keys().cloned().collect();
        assert_eq!(keys.first().map(String::as_str), Some("chrome_latest"));
        assert_eq!(keys.len(), PRESETS.len());
    }
}
