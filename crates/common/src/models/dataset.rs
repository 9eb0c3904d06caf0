//! Dataset rows produced by dataset generation

use serde::{Deserialize, Serialize};

/// One instruction/input/output triple of a generated dataset
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlpacaRecord {
    #[serde(default)]
    pub instruction: String,

    #[serde(default)]
    pub input: String,

    #[serde(default)]
    pub output: String,
}
