//! Tag enumeration
//!
//! Every message, publisher and subscription belongs to exactly one `Tag`.
//! The set is closed and fixed at build time, so per-tag state is stored in a
//! `TagMap` (a fixed array indexed by tag) rather than a string-keyed map.

use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utils::error::BrokerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tag {
    Trial,
    License,
    Support,
    Bug,
}

impl Tag {
    pub const COUNT: usize = 4;

    /// All tags in declaration order. This is also the order of the
    /// `RequestTags` reply.
    pub const ALL: [Tag; Tag::COUNT] = [Tag::Trial, Tag::License, Tag::Support, Tag::Bug];

    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Trial => "TRIAL",
            Tag::License => "LICENSE",
            Tag::Support => "SUPPORT",
            Tag::Bug => "BUG",
        }
    }

    /// Default payload text used by the demo publisher.
    pub fn sample_text(self) -> &'static str {
        match self {
            Tag::Trial => "Trial downloaded",
            Tag::License => "License purchased",
            Tag::Support => "Support request received",
            Tag::Bug => "Bug report received",
        }
    }

    /// Comma-joined list of every tag name, e.g. `TRIAL,LICENSE,SUPPORT,BUG`.
    pub fn joined() -> String {
        Tag::ALL
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tag {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tag::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| BrokerError::unknown_tag(s))
    }
}

/// One value per tag.
#[derive(Debug)]
pub struct TagMap<T> {
    slots: [T; Tag::COUNT],
}

impl<T> TagMap<T> {
    pub fn from_fn(mut f: impl FnMut(Tag) -> T) -> Self {
        Self {
            slots: Tag::ALL.map(&mut f),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tag, &T)> {
        Tag::ALL.into_iter().zip(self.slots.iter())
    }
}

impl<T: Default> Default for TagMap<T> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}

impl<T> Index<Tag> for TagMap<T> {
    type Output = T;

    fn index(&self, tag: Tag) -> &T {
        &self.slots[tag.slot()]
    }
}

impl<T> IndexMut<Tag> for TagMap<T> {
    fn index_mut(&mut self, tag: Tag) -> &mut T {
        &mut self.slots[tag.slot()]
    }
}
