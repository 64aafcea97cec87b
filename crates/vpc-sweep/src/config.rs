//! Account and region configuration
//!
//! The accounts file maps friendly account names to their account id and
//! credential profile; regions are listed once and apply to every
//! account. The CLI narrows both down to a selection, and the cross
//! product becomes the run's scopes.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// One configured account.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// 12-digit account id; validated against the resolved caller
    /// identity before anything is mutated in the account
    pub account_id: String,
    /// AWS profile to resolve credentials from (default chain when absent)
    #[serde(default)]
    pub profile: Option<String>,
}

/// The parsed accounts file.
#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    pub accounts: BTreeMap<String, AccountConfig>,
    pub regions: Vec<String>,
}

/// One (account, region) pair processed as an independent unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub account: String,
    pub account_id: String,
    pub profile: Option<String>,
    pub region: String,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.account, self.region)
    }
}

/// Account or region selection from the CLI: everything configured, or a
/// named subset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Subset(Vec<String>),
}

impl Selection {
    /// Parse `"all"` or a comma-separated name list.
    pub fn parse(input: &str) -> Self {
        if input.trim().eq_ignore_ascii_case("all") {
            return Selection::All;
        }
        Selection::Subset(
            input
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }
}

impl SweepConfig {
    /// Load and parse the accounts file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read accounts file {}", path.display()))?;
        let config: SweepConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse accounts file {}", path.display()))?;
        if config.accounts.is_empty() {
            bail!("Accounts file {} defines no accounts", path.display());
        }
        if config.regions.is_empty() {
            bail!("Accounts file {} defines no regions", path.display());
        }
        Ok(config)
    }

    /// Resolve the selected accounts × regions into scopes.
    ///
    /// Selecting a name that is not configured is an error rather than a
    /// silent no-op; this tool deletes things, so typos must not narrow
    /// the run unnoticed.
    pub fn scopes(&self, accounts: &Selection, regions: &Selection) -> Result<Vec<Scope>> {
        let account_names: Vec<&String> = match accounts {
            Selection::All => self.accounts.keys().collect(),
            Selection::Subset(names) => {
                for name in names {
                    if !self.accounts.contains_key(name) {
                        bail!("Unknown account `{name}` (configured: {:?})",
                              self.accounts.keys().collect::<Vec<_>>());
                    }
                }
                names.iter().collect()
            }
        };

        let region_names: Vec<&String> = match regions {
            Selection::All => self.regions.iter().collect(),
            Selection::Subset(names) => {
                for name in names {
                    if !self.regions.contains(name) {
                        bail!("Unknown region `{name}` (configured: {:?})", self.regions);
                    }
                }
                names.iter().collect()
            }
        };

        let mut scopes = Vec::with_capacity(account_names.len() * region_names.len());
        for name in &account_names {
            let account = &self.accounts[*name];
            for region in &region_names {
                scopes.push(Scope {
                    account: (*name).clone(),
                    account_id: account.account_id.clone(),
                    profile: account.profile.clone(),
                    region: (*region).clone(),
                });
            }
        }
        Ok(scopes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample() -> SweepConfig {
        serde_json::from_str(
            r#"{
                "accounts": {
                    "prod": { "account_id": "111111111111", "profile": "prod-admin" },
                    "staging": { "account_id": "222222222222" }
                },
                "regions": ["us-east-2", "eu-west-1"]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn selection_parsing() {
        assert_eq!(Selection::parse("all"), Selection::All);
        assert_eq!(Selection::parse("ALL"), Selection::All);
        assert_eq!(
            Selection::parse("prod, staging"),
            Selection::Subset(vec!["prod".into(), "staging".into()])
        );
    }

    #[test]
    fn scopes_are_the_cross_product() {
        let config = sample();
        let scopes = config.scopes(&Selection::All, &Selection::All).unwrap();
        assert_eq!(scopes.len(), 4);
        assert!(scopes.iter().any(|s| s.account == "prod" && s.region == "eu-west-1"));
        assert!(scopes.iter().any(|s| s.account == "staging" && s.region == "us-east-2"));
    }

    #[test]
    fn subset_selection() {
        let config = sample();
        let scopes = config
            .scopes(
                &Selection::Subset(vec!["staging".into()]),
                &Selection::Subset(vec!["us-east-2".into()]),
            )
            .unwrap();
        assert_eq!(scopes.len(), 1);
        assert_eq!(scopes[0].account_id, "222222222222");
        assert_eq!(scopes[0].profile, None);
    }

    #[test]
    fn unknown_account_is_an_error() {
        let config = sample();
        let err = config
            .scopes(&Selection::Subset(vec!["prdo".into()]), &Selection::All)
            .unwrap_err();
        assert!(err.to_string().contains("prdo"));
    }

    #[test]
    fn unknown_region_is_an_error() {
        let config = sample();
        assert!(
            config
                .scopes(&Selection::All, &Selection::Subset(vec!["us-fake-9".into()]))
                .is_err()
        );
    }

    #[test]
    fn load_rejects_empty_accounts() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"accounts": {{}}, "regions": ["us-east-2"]}}"#).unwrap();
        assert!(SweepConfig::load(f.path()).is_err());
    }

    #[test]
    fn load_round_trip() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"accounts": {{"dev": {{"account_id": "333333333333"}}}}, "regions": ["us-west-2"]}}"#
        )
        .unwrap();
        let config = SweepConfig::load(f.path()).unwrap();
        assert_eq!(config.accounts["dev"].account_id, "333333333333");
    }
}
