//! API keys handed to units of work.
//!
//! Each entry in `secrets:` names an environment variable and the file that
//! holds its value. Files are read once when a run starts; the values are
//! injected into every spawned unit of work and never logged.
//!
//! ```yaml
//! secrets:
//!   - env: GEMINI_API_KEY
//!     file: secrets/google-gemini-key.txt
//!   - env: GROQ_API_KEY
//!     file: ~/keys/groq.txt
//! ```

use crate::error::{ReelError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretSpec {
    pub env: String,
    pub file: PathBuf,
}

#[derive(Clone, Default)]
pub struct Secrets {
    values: Vec<(String, String)>,
}

impl Secrets {
    pub fn load(root: &Path, specs: &[SecretSpec]) -> Result<Self> {
        let mut values = Vec::with_capacity(specs.len());
        for spec in specs {
            let path = paths::resolve(root, &spec.file)?;
            if !path.is_file() {
                return Err(ReelError::SecretNotFound {
                    env: spec.env.clone(),
                    path: path.display().to_string(),
                });
            }
            let value = std::fs::read_to_string(&path)?.trim().to_string();
            values.push((spec.env.clone(), value));
        }
        Ok(Self { values })
    }

    pub fn env_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.values.iter().map(|(k, _)| format!("{k}=<redacted>")))
            .finish()
    }
}
