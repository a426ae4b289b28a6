use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }
}

impl FromStr for Gender {
    type Err = ();

    // Exact labels only. Localized strings belong to the presentation layer
    // and must never reach comparisons here.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Male" => Ok(Gender::Male),
            "Female" => Ok(Gender::Female),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub class_id: String,
    pub firstname: String,
    pub lastname: String,
    pub number: i64,
    pub gender: Gender,
    pub birthdate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: String,
    pub class_name: String,
    pub explanation: Option<String>,
}

/// One independently toggle-able filter dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FacetKey {
    Number,
    Name,
    Gender,
    Class,
}

impl FacetKey {
    pub const ALL: [FacetKey; 4] = [
        FacetKey::Number,
        FacetKey::Name,
        FacetKey::Gender,
        FacetKey::Class,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FacetKey::Number => "number",
            FacetKey::Name => "name",
            FacetKey::Gender => "gender",
            FacetKey::Class => "class",
        }
    }
}

impl FromStr for FacetKey {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "number" => Ok(FacetKey::Number),
            "name" => Ok(FacetKey::Name),
            "gender" => Ok(FacetKey::Gender),
            "class" => Ok(FacetKey::Class),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacetState {
    pub active: bool,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacetValueError {
    NotNumeric,
}

impl fmt::Display for FacetValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacetValueError::NotNumeric => f.write_str("number facet value must be numeric"),
        }
    }
}

/// The facet registry for one filter session. All four facets always exist;
/// an inactive facet, or an active one whose trimmed value is empty, never
/// constrains the result.
#[derive(Debug, Clone, PartialEq)]
pub struct FacetSet {
    facets: BTreeMap<FacetKey, FacetState>,
}

impl FacetSet {
    pub fn new() -> Self {
        let mut facets = BTreeMap::new();
        for key in FacetKey::ALL {
            facets.insert(key, FacetState::default());
        }
        FacetSet { facets }
    }

    fn entry(&mut self, key: FacetKey) -> &mut FacetState {
        self.facets.entry(key).or_default()
    }

    pub fn get(&self, key: FacetKey) -> &FacetState {
        &self.facets[&key]
    }

    /// Flips the facet's active flag and returns the new flag.
    pub fn toggle(&mut self, key: FacetKey) -> bool {
        let current = self.get(key).active;
        self.set_active(key, !current)
    }

    /// Sets the active flag to an explicit state and returns it. Setting the
    /// flag it already has is a no-op. Every transition clears the stored
    /// value: a newly activated facet starts unconstrained until the user
    /// supplies a value, and a deactivated one forgets its query.
    pub fn set_active(&mut self, key: FacetKey, active: bool) -> bool {
        let st = self.entry(key);
        if st.active == active {
            return st.active;
        }
        st.active = active;
        st.value.clear();
        st.active
    }

    /// Stores a facet value. The number facet only accepts digit strings:
    /// a rejected edit leaves the previous value in place, so the last
    /// valid result stays reproducible.
    pub fn set_value(&mut self, key: FacetKey, value: &str) -> Result<(), FacetValueError> {
        if key == FacetKey::Number {
            let t = value.trim();
            if !t.is_empty() && !t.chars().all(|c| c.is_ascii_digit()) {
                return Err(FacetValueError::NotNumeric);
            }
        }
        self.entry(key).value = value.to_string();
        Ok(())
    }

    /// Back to the all-inactive state a freshly opened view starts from.
    pub fn reset(&mut self) {
        for st in self.facets.values_mut() {
            st.active = false;
            st.value.clear();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (FacetKey, &FacetState)> {
        self.facets.iter().map(|(k, v)| (*k, v))
    }

    fn active_constraints(&self) -> Vec<(FacetKey, &str)> {
        self.facets
            .iter()
            .filter(|(_, st)| st.active && !st.value.trim().is_empty())
            .map(|(k, st)| (*k, st.value.trim()))
            .collect()
    }
}

impl Default for FacetSet {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterResult {
    pub students: Vec<Student>,
    /// False iff no facet constrained the result (full roster returned).
    /// Lets callers tell "no facets active" apart from "no matches".
    pub filtered: bool,
}

/// Computes the visible subset. Always starts from the full roster, never a
/// previously filtered list, and applies every active facet as an
/// intersection, so the outcome is independent of activation order.
pub fn evaluate(roster: &[Student], classes: &[Class], facets: &FacetSet) -> FilterResult {
    let constraints = facets.active_constraints();
    if constraints.is_empty() {
        return FilterResult {
            students: roster.to_vec(),
            filtered: false,
        };
    }

    let mut result: Vec<&Student> = roster.iter().collect();
    for (key, value) in constraints {
        result = match key {
            FacetKey::Number => narrow_by_number(result, value),
            FacetKey::Name => narrow_by_name(result, value),
            FacetKey::Gender => narrow_by_gender(result, value),
            FacetKey::Class => narrow_by_class(result, value, classes),
        };
        if result.is_empty() {
            break;
        }
    }

    FilterResult {
        students: result.into_iter().cloned().collect(),
        filtered: true,
    }
}

// Leading-digits match on the decimal form: "1" keeps 1 and 10 but not 21.
// The registry rejects non-numeric values, but evaluate stays total for
// hand-built facet states and simply matches nothing.
fn narrow_by_number<'a>(input: Vec<&'a Student>, value: &str) -> Vec<&'a Student> {
    if !value.chars().all(|c| c.is_ascii_digit()) {
        return Vec::new();
    }
    input
        .into_iter()
        .filter(|s| s.number.to_string().starts_with(value))
        .collect()
}

// Case-insensitive substring over either name field. When that finds
// nothing and the query holds a space, retry as a full-name query split at
// the last space, so "jane doe" still lands on {firstname: Jane,
// lastname: Doe}.
fn narrow_by_name<'a>(input: Vec<&'a Student>, value: &str) -> Vec<&'a Student> {
    let query = value.to_lowercase();
    let plain: Vec<&Student> = input
        .iter()
        .copied()
        .filter(|s| {
            s.firstname.to_lowercase().contains(&query)
                || s.lastname.to_lowercase().contains(&query)
        })
        .collect();
    if !plain.is_empty() {
        return plain;
    }

    let Some((first_part, last_part)) = query.rsplit_once(' ') else {
        return plain;
    };
    let first_part = first_part.trim();
    let last_part = last_part.trim();
    if first_part.is_empty() || last_part.is_empty() {
        return plain;
    }
    input
        .into_iter()
        .filter(|s| {
            s.firstname.to_lowercase().contains(first_part)
                && s.lastname.to_lowercase().contains(last_part)
        })
        .collect()
}

fn narrow_by_gender<'a>(input: Vec<&'a Student>, value: &str) -> Vec<&'a Student> {
    let Ok(gender) = value.parse::<Gender>() else {
        return Vec::new();
    };
    input.into_iter().filter(|s| s.gender == gender).collect()
}

// The facet value is a class name; resolve it to an id first. An unknown
// name is an empty result, not an error.
fn narrow_by_class<'a>(input: Vec<&'a Student>, value: &str, classes: &[Class]) -> Vec<&'a Student> {
    let Some(class) = classes.iter().find(|c| c.class_name == value) else {
        return Vec::new();
    };
    input
        .into_iter()
        .filter(|s| s.class_id == class.id)
        .collect()
}
