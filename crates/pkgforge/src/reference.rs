// Copyright (c) Contributors to the pkgforge project.
// SPDX-License-Identifier: Apache-2.0

//! Package references of the form `name/version@owner/channel`.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::Error;

#[cfg(test)]
#[path = "./reference_test.rs"]
mod reference_test;

/// Grammar of a reference, without anchors or surrounding quotes.
///
/// The channel is the only field allowed to contain `/` and `@`.
const REFERENCE_GRAMMAR: &str =
    r#"(?P<name>[^/@"']+)/(?P<version>[^/@"']+)@(?P<owner>[^/@"']+)/(?P<channel>[^"']+)"#;

static REFERENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("^{REFERENCE_GRAMMAR}$")).expect("reference grammar is a valid regex")
});

/// Matches a reference written as a quoted string literal inside recipe text.
pub(crate) static QUOTED_REFERENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r#"["'](?P<reference>{REFERENCE_GRAMMAR})["']"#))
        .expect("quoted reference grammar is a valid regex")
});

/// A fully qualified package reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageReference {
    pub name: String,
    pub version: String,
    pub owner: String,
    pub channel: String,
}

/// One of the four fields of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceField {
    Name,
    Version,
    Owner,
    Channel,
}

impl ReferenceField {
    pub const ALL: [ReferenceField; 4] = [Self::Name, Self::Version, Self::Owner, Self::Channel];

    /// The key used for this field in placeholders such as `[version]`.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Version => "version",
            Self::Owner => "owner",
            Self::Channel => "channel",
        }
    }
}

impl PackageReference {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        owner: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            owner: owner.into(),
            channel: channel.into(),
        }
    }

    /// Parse a reference, failing with [`Error::MalformedReference`].
    pub fn parse(s: &str) -> crate::Result<Self> {
        let caps = REFERENCE_RE
            .captures(s)
            .ok_or_else(|| Error::MalformedReference(s.to_string()))?;
        Ok(Self::new(
            &caps["name"],
            &caps["version"],
            &caps["owner"],
            &caps["channel"],
        ))
    }

    pub fn field(&self, field: ReferenceField) -> &str {
        match field {
            ReferenceField::Name => &self.name,
            ReferenceField::Version => &self.version,
            ReferenceField::Owner => &self.owner,
            ReferenceField::Channel => &self.channel,
        }
    }

    /// The `owner/channel` pair that the export command expects.
    pub fn user_channel(&self) -> String {
        format!("{}/{}", self.owner, self.channel)
    }
}

impl fmt::Display for PackageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}/{}",
            self.name, self.version, self.owner, self.channel
        )
    }
}

impl FromStr for PackageReference {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PackageReference {
    type Error = Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<PackageReference> for String {
    fn from(value: PackageReference) -> Self {
        value.to_string()
    }
}
