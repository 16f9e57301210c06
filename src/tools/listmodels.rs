use serde::Serialize;

use crate::config::DEFAULT_MODEL;

#[derive(Serialize)]
pub struct ListModelsResponse {
    pub models: Vec<String>,
    /// The model a `proofread` call uses when none is given.
    pub current: String,
}

impl ListModelsResponse {
    /// The model to mark: `current` when the key can use it, else the
    /// default model, else the first one listed.
    pub fn selected(&self) -> Option<&str> {
        [self.current.as_str(), DEFAULT_MODEL]
            .into_iter()
            .find(|m| self.models.iter().any(|name| name == m))
            .or_else(|| self.models.first().map(String::as_str))
    }

    pub fn to_markdown(&self) -> String {
        let selected = self.selected();
        let mut out = format!("{} models available:\n\n", self.models.len());
        for name in &self.models {
            if Some(name.as_str()) == selected {
                out.push_str(&format!("- {name} (current)\n"));
            } else {
                out.push_str(&format!("- {name}\n"));
            }
        }
        if let Some(selected) = selected
            && selected != self.current
        {
            out.push_str(&format!(
                "\n`{}` is not available to this key; use `settings` to pick one of the above (e.g. `{selected}`).\n",
                self.current
            ));
        }
        out
    }
}
