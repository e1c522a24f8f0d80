//! Object identities and facet keys
//!
//! An identity names a logical remote object independently of the servant
//! that currently implements it. The string form is `category/name`, or just
//! `name` when the category is empty; `/` and `\` inside either component are
//! escaped with a backslash.

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a remote object: a `(name, category)` pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    /// Object name; must be non-empty for any registration
    pub name: String,
    /// Category, used to select default servants and servant locators
    #[serde(default)]
    pub category: String,
}

impl Identity {
    /// Create an identity with an empty category
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: String::new(),
        }
    }

    /// Set the category of this identity
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Get the object name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the category
    pub fn category(&self) -> &str {
        &self.category
    }

    /// An identity is valid for registration only when its name is non-empty
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
    }

    /// Parse an identity from its `category/name` string form
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let mut category: Option<String> = None;
        let mut current = String::new();
        let mut chars = input.chars();

        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some(escaped) => current.push(escaped),
                    None => return Err(ParseError::DanglingEscape(input.to_string())),
                },
                '/' => {
                    if category.is_some() {
                        return Err(ParseError::TooManySlashes(input.to_string()));
                    }
                    category = Some(std::mem::take(&mut current));
                }
                other => current.push(other),
            }
        }

        Ok(Self {
            name: current,
            category: category.unwrap_or_default(),
        })
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, component: &str) -> fmt::Result {
    for c in component.chars() {
        if c == '/' || c == '\\' {
            write!(f, "\\")?;
        }
        write!(f, "{}", c)?;
    }
    Ok(())
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.category.is_empty() {
            write_escaped(f, &self.category)?;
            write!(f, "/")?;
        }
        write_escaped(f, &self.name)
    }
}

impl FromStr for Identity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Key of the active servant map: an identity plus a facet name
///
/// The empty facet denotes the default facet of the object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FacetKey {
    pub identity: Identity,
    #[serde(default)]
    pub facet: String,
}

impl FacetKey {
    /// Create a key for the given identity and facet
    pub fn new(identity: Identity, facet: impl Into<String>) -> Self {
        Self {
            identity,
            facet: facet.into(),
        }
    }

    /// Key of the default facet of an identity
    pub fn default_facet(identity: Identity) -> Self {
        Self::new(identity, "")
    }

    /// Check whether this key addresses the default facet
    pub fn is_default_facet(&self) -> bool {
        self.facet.is_empty()
    }
}

impl fmt::Display for FacetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identity)?;
        if !self.facet.is_empty() {
            write!(f, " -f {}", self.facet)?;
        }
        Ok(())
    }
}
