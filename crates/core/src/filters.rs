//! Typed search-filter document submitted to the lead-search API.
//!
//! Every category is an optional field. A category that is `None` is absent
//! from the search, so replacing a [`FilterModel`] wholesale with another one
//! removes whatever the replacement omits.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::FilterError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterCategory {
    Locations,
    JobTitles,
    ManagementLevels,
    Departments,
    Industries,
    CompanySize,
    RevenueRange,
    Technologies,
    Keywords,
    FundingType,
    FundingStage,
}

impl FilterCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Locations => "locations",
            Self::JobTitles => "job_titles",
            Self::ManagementLevels => "management_levels",
            Self::Departments => "departments",
            Self::Industries => "industries",
            Self::CompanySize => "company_size",
            Self::RevenueRange => "revenue_range",
            Self::Technologies => "technologies",
            Self::Keywords => "keywords",
            Self::FundingType => "funding_type",
            Self::FundingStage => "funding_stage",
        }
    }
}

impl fmt::Display for FilterCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of terms compared case-insensitively. The first spelling seen for a
/// term is the one kept for display and for the wire.
#[derive(Clone, Debug, Default)]
pub struct TermSet {
    terms: Vec<String>,
}

impl TermSet {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for term in terms {
            set.insert(term);
        }
        set
    }

    /// Returns false when the term is blank or already present in any casing.
    pub fn insert(&mut self, term: impl Into<String>) -> bool {
        let term = term.into();
        let trimmed = term.trim();
        if trimmed.is_empty() || self.contains(trimmed) {
            return false;
        }
        self.terms.push(trimmed.to_string());
        true
    }

    pub fn contains(&self, term: &str) -> bool {
        let key = term_key(term);
        self.terms.iter().any(|existing| term_key(existing) == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    fn keys(&self) -> BTreeSet<String> {
        self.terms.iter().map(|term| term_key(term)).collect()
    }
}

impl PartialEq for TermSet {
    fn eq(&self, other: &Self) -> bool {
        self.keys() == other.keys()
    }
}

impl Eq for TermSet {}

impl<S: Into<String>> FromIterator<S> for TermSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl Serialize for TermSet {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        serializer.collect_seq(&self.terms)
    }
}

impl<'de> Deserialize<'de> for TermSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<String>::deserialize(deserializer).map(Self::new)
    }
}

fn term_key(term: &str) -> String {
    term.trim().to_lowercase()
}

/// Inclusion/exclusion pair. Accepts a bare list (include-only) on input.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TermFilter {
    pub include: TermSet,
    pub exclude: TermSet,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TermFilterRepr {
    List(TermSet),
    Split {
        #[serde(default)]
        include: TermSet,
        #[serde(default)]
        exclude: TermSet,
    },
}

impl<'de> Deserialize<'de> for TermFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match TermFilterRepr::deserialize(deserializer)? {
            TermFilterRepr::List(include) => Self { include, exclude: TermSet::default() },
            TermFilterRepr::Split { include, exclude } => Self { include, exclude },
        })
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl Location {
    pub fn state(country: &str, state: &str) -> Self {
        Self { country: Some(country.to_string()), state: Some(state.to_string()), city: None }
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        fn same(left: &Option<String>, right: &Option<String>) -> bool {
            left.as_deref().map(term_key) == right.as_deref().map(term_key)
        }
        same(&self.country, &other.country)
            && same(&self.state, &other.state)
            && same(&self.city, &other.city)
    }
}

impl Eq for Location {}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationFilter {
    #[serde(default)]
    pub include: Vec<Location>,
    #[serde(default)]
    pub exclude: Vec<Location>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u64>,
}

impl NumericRange {
    pub fn between(min: u64, max: u64) -> Self {
        Self { min: Some(min), max: Some(max) }
    }

    pub fn validate(&self, category: FilterCategory) -> Result<(), FilterError> {
        match (self.min, self.max) {
            (Some(min), Some(max)) if min > max => {
                Err(FilterError::InvalidRange { category, min, max })
            }
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<LocationFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_titles: Option<TermFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management_levels: Option<TermSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departments: Option<TermSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industries: Option<TermSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_size: Option<NumericRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue_range: Option<NumericRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technologies: Option<TermSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<TermSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_type: Option<TermSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_stage: Option<TermSet>,
}

impl FilterModel {
    /// Decodes and validates a JSON filter document.
    pub fn from_json(raw: &str) -> Result<Self, FilterError> {
        let model = serde_json::from_str::<Self>(raw)
            .map_err(|error| FilterError::Decode(error.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, FilterError> {
        let model = serde_json::from_value::<Self>(value)
            .map_err(|error| FilterError::Decode(error.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<(), FilterError> {
        if let Some(range) = &self.company_size {
            range.validate(FilterCategory::CompanySize)?;
        }
        if let Some(range) = &self.revenue_range {
            range.validate(FilterCategory::RevenueRange)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.active_categories().is_empty()
    }

    pub fn active_categories(&self) -> Vec<FilterCategory> {
        let present = [
            (FilterCategory::Locations, self.locations.is_some()),
            (FilterCategory::JobTitles, self.job_titles.is_some()),
            (FilterCategory::ManagementLevels, self.management_levels.is_some()),
            (FilterCategory::Departments, self.departments.is_some()),
            (FilterCategory::Industries, self.industries.is_some()),
            (FilterCategory::CompanySize, self.company_size.is_some()),
            (FilterCategory::RevenueRange, self.revenue_range.is_some()),
            (FilterCategory::Technologies, self.technologies.is_some()),
            (FilterCategory::Keywords, self.keywords.is_some()),
            (FilterCategory::FundingType, self.funding_type.is_some()),
            (FilterCategory::FundingStage, self.funding_stage.is_some()),
        ];
        present.into_iter().filter_map(|(category, set)| set.then_some(category)).collect()
    }

    /// Categories whose value differs between `self` and `other`, including
    /// categories present on only one side.
    pub fn changed_categories(&self, other: &Self) -> Vec<FilterCategory> {
        let changed = [
            (FilterCategory::Locations, self.locations != other.locations),
            (FilterCategory::JobTitles, self.job_titles != other.job_titles),
            (FilterCategory::ManagementLevels, self.management_levels != other.management_levels),
            (FilterCategory::Departments, self.departments != other.departments),
            (FilterCategory::Industries, self.industries != other.industries),
            (FilterCategory::CompanySize, self.company_size != other.company_size),
            (FilterCategory::RevenueRange, self.revenue_range != other.revenue_range),
            (FilterCategory::Technologies, self.technologies != other.technologies),
            (FilterCategory::Keywords, self.keywords != other.keywords),
            (FilterCategory::FundingType, self.funding_type != other.funding_type),
            (FilterCategory::FundingStage, self.funding_stage != other.funding_stage),
        ];
        changed.into_iter().filter_map(|(category, differs)| differs.then_some(category)).collect()
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{FilterCategory, FilterModel, Location, NumericRange, TermFilter, TermSet};
    use crate::errors::FilterError;

    #[test]
    fn term_set_dedupes_case_insensitively_and_keeps_first_casing() {
        let set = TermSet::new(["CEO", "ceo", " Founder ", "", "FOUNDER"]);

        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["CEO", "Founder"]);
        assert!(set.contains("founder"));
        assert!(!set.contains("CTO"));
    }

    #[test]
    fn term_sets_compare_without_case_or_order() {
        let left = TermSet::new(["SaaS", "Software"]);
        let right = TermSet::new(["software", "saas"]);

        assert_eq!(left, right);
        assert_ne!(left, TermSet::new(["software"]));
    }

    #[test]
    fn term_filter_accepts_bare_list_or_split_object() {
        let from_list: TermFilter = serde_json::from_value(json!(["CEO", "Founder"])).unwrap();
        let from_object: TermFilter =
            serde_json::from_value(json!({"include": ["ceo", "founder"]})).unwrap();

        assert_eq!(from_list, from_object);
        assert!(from_list.exclude.is_empty());
    }

    #[test]
    fn decodes_the_documented_filter_shape() {
        let raw = r#"{
            "locations": {"include": [{"country": "US", "state": "CO"}], "exclude": []},
            "job_titles": {"include": ["CEO", "Chief Executive Officer"], "exclude": ["Assistant"]},
            "management_levels": ["c_level"],
            "industries": ["Technology", "SaaS"],
            "company_size": {"min": 10, "max": 200}
        }"#;

        let model = FilterModel::from_json(raw).unwrap();

        assert_eq!(model.locations.as_ref().unwrap().include, vec![Location::state("us", "co")]);
        assert!(model.job_titles.as_ref().unwrap().exclude.contains("assistant"));
        assert_eq!(model.company_size, Some(NumericRange::between(10, 200)));
        assert_eq!(
            model.active_categories(),
            vec![
                FilterCategory::Locations,
                FilterCategory::JobTitles,
                FilterCategory::ManagementLevels,
                FilterCategory::Industries,
                FilterCategory::CompanySize,
            ]
        );
    }

    #[test]
    fn inverted_ranges_are_rejected() {
        let error = FilterModel::from_json(r#"{"revenue_range": {"min": 5000000, "max": 10}}"#)
            .unwrap_err();

        assert_eq!(
            error,
            FilterError::InvalidRange {
                category: FilterCategory::RevenueRange,
                min: 5_000_000,
                max: 10,
            }
        );
    }

    #[test]
    fn half_open_ranges_are_valid() {
        let model = FilterModel::from_json(r#"{"company_size": {"min": 50}}"#).unwrap();

        assert_eq!(model.company_size, Some(NumericRange { min: Some(50), max: None }));
    }

    #[test]
    fn serialization_omits_absent_categories() {
        let model = FilterModel {
            management_levels: Some(TermSet::new(["c_level"])),
            ..FilterModel::default()
        };

        let value = serde_json::to_value(&model).unwrap();
        assert_eq!(value, json!({"management_levels": ["c_level"]}));
    }

    #[test]
    fn changed_categories_reports_removed_and_modified_fields() {
        let before = FilterModel {
            industries: Some(TermSet::new(["Technology"])),
            company_size: Some(NumericRange::between(10, 500)),
            ..FilterModel::default()
        };
        let after = FilterModel {
            industries: Some(TermSet::new(["technology"])),
            company_size: Some(NumericRange::between(20, 150)),
            keywords: Some(TermSet::new(["hiring"])),
            ..FilterModel::default()
        };

        assert_eq!(
            before.changed_categories(&after),
            vec![FilterCategory::CompanySize, FilterCategory::Keywords]
        );
        assert!(FilterModel::default().is_empty());
    }
}
