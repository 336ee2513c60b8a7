//! Anchors hosted from this device, kept in a small preferences file so they
//! can be offered for resolving later.
//!
//! Each list is stored as one string with every entry followed by `;`:
//!
//! ```text
//! (
//!     anchor_ids: "ua-0001;ua-0002;",
//!     anchor_names: "Old gate;Chapel;",
//!     anchor_minutes: "29100000;29100450;",
//! )
//! ```

use log::{debug, warn};
use nom::{
    bytes::complete::take_till,
    character::complete::char,
    multi::many0,
    sequence::terminated,
    IResult,
};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{self, Display},
    fs, io,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};
use thiserror::Error;

const DELIMITER: char = ';';

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not access anchor preferences: {0}")]
    Io(#[from] io::Error),
    #[error("could not parse anchor preferences: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("could not write anchor preferences: {0}")]
    Serialize(#[from] ron::Error),
    #[error("{0:?} contains the list delimiter ';'")]
    Delimiter(String),
    #[error("stored anchor lists are corrupt: {0}")]
    Corrupt(String),
}

/// One previously hosted anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorItem {
    pub anchor_id: String,
    pub anchor_name: String,
    pub minutes_since_creation: u64,
    pub selected: bool,
}

impl AnchorItem {
    pub fn new(anchor_id: &str, anchor_name: &str, minutes_since_creation: u64) -> Self {
        Self {
            anchor_id: anchor_id.to_owned(),
            anchor_name: anchor_name.to_owned(),
            minutes_since_creation,
            selected: false,
        }
    }

    /// Age for display, such as `"12m ago"` or `"3hr ago"`.
    pub fn minutes_since_creation_label(&self) -> String {
        if self.minutes_since_creation < 60 {
            format!("{}m ago", self.minutes_since_creation)
        } else {
            format!("{}hr ago", self.minutes_since_creation / 60)
        }
    }
}

impl Display for AnchorItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}), {}",
            self.anchor_name,
            self.anchor_id,
            self.minutes_since_creation_label()
        )
    }
}

/// Every complete `;`-terminated entry of `s`. Anything after the last `;` is
/// not an entry.
fn parse_entries(s: &str) -> IResult<&str, Vec<&str>> {
    many0(terminated(take_till(|c| c == DELIMITER), char(DELIMITER)))(s)
}

fn entries(s: &str) -> Result<Vec<&str>, StoreError> {
    let (rest, entries) = parse_entries(s).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    if !rest.is_empty() {
        debug!("Ignoring unterminated anchor entry {rest:?}");
    }
    Ok(entries)
}

/// The three parallel lists of hosted anchors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AnchorPreferences {
    pub anchor_ids: String,
    pub anchor_names: String,
    /// Creation time of each anchor in minutes since the Unix epoch.
    pub anchor_minutes: String,
}

impl AnchorPreferences {
    /// Reads the preferences at `path`. A missing file is an empty store.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(ron::from_str(&text)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Records a newly hosted anchor created at `now_minutes`.
    pub fn add_hosted_anchor(
        &mut self,
        anchor_id: &str,
        anchor_name: &str,
        now_minutes: u64,
    ) -> Result<(), StoreError> {
        for field in [anchor_id, anchor_name] {
            if field.contains(DELIMITER) {
                return Err(StoreError::Delimiter(field.to_owned()));
            }
        }
        self.anchor_ids.push_str(anchor_id);
        self.anchor_ids.push(DELIMITER);
        self.anchor_names.push_str(anchor_name);
        self.anchor_names.push(DELIMITER);
        self.anchor_minutes.push_str(&now_minutes.to_string());
        self.anchor_minutes.push(DELIMITER);
        Ok(())
    }

    /// Stored anchors younger than `max_age_minutes` at `now_minutes`, oldest
    /// first.
    pub fn retrieve_stored_anchors(
        &self,
        now_minutes: u64,
        max_age_minutes: u64,
    ) -> Result<Vec<AnchorItem>, StoreError> {
        let ids = entries(&self.anchor_ids)?;
        let names = entries(&self.anchor_names)?;
        let minutes = entries(&self.anchor_minutes)?;
        if names.len() < ids.len() || minutes.len() < ids.len() {
            return Err(StoreError::Corrupt(format!(
                "{} ids but {} names and {} timestamps",
                ids.len(),
                names.len(),
                minutes.len()
            )));
        }

        let mut anchors = Vec::new();
        for ((id, name), created) in ids.into_iter().zip(names).zip(minutes) {
            let created: u64 = created
                .parse()
                .map_err(|_| StoreError::Corrupt(format!("bad timestamp {created:?}")))?;
            let age = now_minutes.saturating_sub(created);
            if age < max_age_minutes {
                anchors.push(AnchorItem::new(id, name, age));
            } else {
                debug!("Skipping expired anchor {id}, {age} minutes old");
            }
        }
        Ok(anchors)
    }
}

/// Splits a comma separated list of anchor ids typed by the user.
pub fn parse_entered_anchor_ids(text: &str) -> Vec<String> {
    let ids: Vec<String> = text
        .trim()
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .collect();
    if ids.is_empty() {
        warn!("No anchor ids entered");
    }
    ids
}

/// Minutes since the Unix epoch.
pub fn now_minutes() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() / 60)
        .unwrap_or(0)
}
