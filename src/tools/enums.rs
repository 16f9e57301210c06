use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::Strategy;

/// Delivery strategy selectable per call.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StrategyArg {
    /// Send short documents whole; split long ones into paragraph blocks with retry.
    Chunked,
    /// Send the whole document over one streamed request. Also accepts "stream".
    #[serde(alias = "stream")]
    Streamed,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Chunked => Strategy::Chunked,
            StrategyArg::Streamed => Strategy::Streamed,
        }
    }
}
