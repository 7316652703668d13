//! Variance estimator selection

use design_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Standard-error type for a linear fit
///
/// `Stata` means HC1 without clusters and the CR1-style stata correction
/// with clusters. `None` skips variance estimation entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarianceType {
    Classical,
    HC0,
    HC1,
    HC2,
    HC3,
    CR0,
    CR2,
    Stata,
    None,
}

impl VarianceType {
    /// HC2 without clusters, CR2 with clusters
    pub fn default_for(clustered: bool) -> Self {
        if clustered {
            Self::CR2
        } else {
            Self::HC2
        }
    }

    /// Check the estimator is compatible with the presence of clusters
    pub fn check_compatible(self, clustered: bool) -> Result<()> {
        let ok = match self {
            Self::Classical | Self::HC0 | Self::HC1 | Self::HC2 | Self::HC3 => !clustered,
            Self::CR0 | Self::CR2 => clustered,
            Self::Stata | Self::None => true,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::UnsupportedVarianceType {
                se_type: self.name().to_string(),
                clustered,
            })
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Classical => "classical",
            Self::HC0 => "HC0",
            Self::HC1 => "HC1",
            Self::HC2 => "HC2",
            Self::HC3 => "HC3",
            Self::CR0 => "CR0",
            Self::CR2 => "CR2",
            Self::Stata => "stata",
            Self::None => "none",
        }
    }
}

impl fmt::Display for VarianceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VarianceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "classical" => Ok(Self::Classical),
            "hc0" => Ok(Self::HC0),
            "hc1" => Ok(Self::HC1),
            "hc2" => Ok(Self::HC2),
            "hc3" => Ok(Self::HC3),
            "cr0" => Ok(Self::CR0),
            "cr2" => Ok(Self::CR2),
            "stata" => Ok(Self::Stata),
            "none" => Ok(Self::None),
            _ => Err(Error::InvalidParameter(format!(
                "unknown variance type '{s}'"
            ))),
        }
    }
}
