//! Contact model

use serde::{Deserialize, Serialize};

/// Syncable contact fields (identity and link fields live on the record).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactFields {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub source: Option<String>,
    pub tags: Vec<String>,
}

impl ContactFields {
    /// Display name built from first/last name, falling back to email.
    #[must_use]
    pub fn display_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if !name.is_empty() {
            return name;
        }
        self.email
            .clone()
            .or_else(|| self.company_name.clone())
            .unwrap_or_else(|| "(unnamed contact)".to_string())
    }
}
