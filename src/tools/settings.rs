use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::settings::{KEY_API_KEY, KEY_MODEL, SettingsStore, mask_key, usable_key};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SettingsRequest {
    /// New API key to save. Omit to leave unchanged.
    pub api_key: Option<String>,
    /// New default model to save. Omit to leave unchanged.
    pub model: Option<String>,
}

/// Current settings as shown to the user. The key is never echoed in full.
#[derive(Debug, Serialize)]
pub struct SettingsView {
    pub api_key: Option<String>,
    pub api_key_usable: bool,
    pub model: String,
}

impl SettingsView {
    pub fn read(store: &dyn SettingsStore, default_model: &str) -> Self {
        let key = store.get(KEY_API_KEY);
        Self {
            api_key_usable: usable_key(key.clone()).is_some(),
            api_key: key.as_deref().map(mask_key),
            model: store
                .get(KEY_MODEL)
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| default_model.to_string()),
        }
    }

    pub fn to_markdown(&self) -> String {
        let key = match (&self.api_key, self.api_key_usable) {
            (Some(masked), true) => masked.clone(),
            (Some(masked), false) => format!("{masked} (too short, ignored)"),
            (None, _) => "(not set)".to_string(),
        };
        format!("- api_key: {key}\n- model: {}\n", self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettings;

    #[test]
    fn view_masks_key_and_falls_back_to_default_model() {
        let store = MemorySettings::new();
        store.set(KEY_API_KEY, "sk-abcdefghijklmnop").unwrap();
        let view = SettingsView::read(&store, "gpt-4o");
        assert_eq!(view.api_key.as_deref(), Some("sk-…mnop"));
        assert!(view.api_key_usable);
        assert_eq!(view.model, "gpt-4o");
        assert!(!view.to_markdown().contains("abcdefghijkl"));
    }

    #[test]
    fn short_key_is_flagged() {
        let store = MemorySettings::new();
        store.set(KEY_API_KEY, "sk-1").unwrap();
        let view = SettingsView::read(&store, "gpt-4o");
        assert!(!view.api_key_usable);
        assert!(view.to_markdown().contains("too short"));
    }
}
