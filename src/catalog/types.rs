use crate::layout::GroupKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One entry of the state listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateInfo {
    #[serde(rename = "stateCd")]
    pub state_code: String,

    #[serde(rename = "stateName", default)]
    pub state_name: String,
}

/// One entry of a state's district listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistrictInfo {
    #[serde(rename = "districtCd")]
    pub district_code: String,

    #[serde(rename = "districtValue", default)]
    pub district_name: String,
}

/// One entry of a state's constituency listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstituencyInfo {
    #[serde(rename = "stateCd")]
    pub state_code: String,

    #[serde(rename = "districtCd")]
    pub district_code: String,

    #[serde(rename = "asmblyNo")]
    pub number: u32,

    #[serde(rename = "asmblyName", default)]
    pub name: String,
}

impl ConstituencyInfo {
    pub fn jurisdiction(&self) -> Jurisdiction {
        Jurisdiction {
            state_code: self.state_code.clone(),
            district_code: self.district_code.clone(),
            constituency: self.number,
        }
    }
}

/// One entry of a constituency's part listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartInfo {
    #[serde(rename = "acNumber")]
    pub constituency: u32,

    #[serde(rename = "partNumber")]
    pub part_number: u32,

    #[serde(rename = "partName", default)]
    pub part_name: String,

    #[serde(rename = "stateCd")]
    pub state_code: String,

    #[serde(rename = "districtCd")]
    pub district_code: String,
}

/// Catalog address of one constituency
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Jurisdiction {
    pub state_code: String,
    pub district_code: String,
    pub constituency: u32,
}

impl fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.state_code, self.district_code, self.constituency
        )
    }
}

/// All parts of one constituency in one language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageGroup {
    pub jurisdiction: Jurisdiction,
    pub language: String,
    /// Part numbers expected in the group, in catalog order
    pub parts: Vec<u32>,
}

impl LanguageGroup {
    pub fn new(jurisdiction: Jurisdiction, language: impl Into<String>, parts: Vec<u32>) -> Self {
        Self {
            jurisdiction,
            language: language.into(),
            parts,
        }
    }

    pub fn key(&self) -> GroupKey {
        GroupKey::new(
            self.jurisdiction.state_code.clone(),
            self.jurisdiction.constituency,
            self.language.clone(),
        )
    }
}

/// One fetchable document: a part of a constituency in one language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub jurisdiction: Jurisdiction,
    pub language: String,
    pub part: PartInfo,
}

impl WorkItem {
    pub fn key(&self) -> GroupKey {
        GroupKey::new(
            self.jurisdiction.state_code.clone(),
            self.jurisdiction.constituency,
            self.language.clone(),
        )
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} lang {} part {}",
            self.jurisdiction, self.language, self.part.part_number
        )
    }
}

/// Document types a part may be published under, in fetch priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocumentVariant {
    Draft,
    Final,
    General,
}

impl DocumentVariant {
    /// All variants, highest priority first
    pub const ALL: [DocumentVariant; 3] = [
        DocumentVariant::Draft,
        DocumentVariant::Final,
        DocumentVariant::General,
    ];

    /// Prefix of the raw PDF file name written for this variant
    pub fn file_prefix(&self) -> &'static str {
        match self {
            Self::Draft => "draft-",
            Self::Final => "final-",
            Self::General => "",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Final => "final",
            Self::General => "general",
        }
    }
}

impl fmt::Display for DocumentVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
