//! Security attributes carried through the dispatch layer

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::secid::SecId;

/// Labeling protocol a set of attributes came from or should go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelType {
    /// No wire label
    Unlabeled,
    /// CIPSO IPv4 option
    Cipso,
}

impl fmt::Display for LabelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlabeled => f.write_str("unlbl"),
            Self::Cipso => f.write_str("cipsov4"),
        }
    }
}

/// MLS sensitivity level and category set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MlsAttr {
    /// Sensitivity level
    pub level: u8,
    /// Category bits
    #[serde(default)]
    pub categories: BTreeSet<u16>,
}

impl MlsAttr {
    /// Level without categories.
    #[must_use]
    pub fn new(level: u8) -> Self {
        Self {
            level,
            categories: BTreeSet::new(),
        }
    }

    /// Add categories.
    #[must_use]
    pub fn with_categories(mut self, categories: impl IntoIterator<Item = u16>) -> Self {
        self.categories.extend(categories);
        self
    }
}

/// Security attributes of a socket, request or packet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecAttr {
    /// Outbound labeling domain (`None` selects the default mapping)
    #[serde(default)]
    pub domain: Option<String>,
    /// Protocol the attributes were resolved through
    #[serde(default)]
    pub label_type: Option<LabelType>,
    /// Local security identifier
    #[serde(default)]
    pub secid: Option<SecId>,
    /// MLS attributes
    #[serde(default)]
    pub mls: Option<MlsAttr>,
}

impl SecAttr {
    /// Attributes for traffic sent as `domain`.
    #[must_use]
    pub fn for_domain(domain: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            ..Self::default()
        }
    }

    /// Unlabeled attributes, optionally carrying a security identifier.
    #[must_use]
    pub fn unlabeled(secid: Option<SecId>) -> Self {
        Self {
            label_type: Some(LabelType::Unlabeled),
            secid,
            ..Self::default()
        }
    }

    /// Set the MLS attributes.
    #[must_use]
    pub fn with_mls(mut self, mls: MlsAttr) -> Self {
        self.mls = Some(mls);
        self
    }

    /// Set the security identifier.
    #[must_use]
    pub const fn with_secid(mut self, secid: SecId) -> Self {
        self.secid = Some(secid);
        self
    }

    /// Whether the attributes came through the unlabeled path.
    #[must_use]
    pub fn is_unlabeled(&self) -> bool {
        self.label_type == Some(LabelType::Unlabeled)
    }
}
