//! Server tags, server selectors and the visibility rule.
//!
//! Several servers can share one configuration store. Every configuration
//! entity is owned by one or more server tags, or by the reserved `all`
//! tag meaning "every server". A [`ServerSelector`] says which servers a
//! request is made for, and [`select_visible`] picks the entity a server
//! sees among those sharing a natural key:
//!
//! 1. the first entity owning one of the requested tags, otherwise
//! 2. the last entity owning `all`.
//!
//! This lets a server specific entity shadow the generic one.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest accepted server tag.
pub const MAX_SERVER_TAG_LEN: usize = 256;

/// Identifier of one server sharing the configuration store.
///
/// Tags are case insensitive and stored trimmed and lowercased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerTag(String);

impl ServerTag {
    /// The tag that associates configuration with every server.
    pub const ALL: &'static str = "all";

    /// # Errors
    ///
    /// Returns [`Error::BadValue`] for an empty or overlong tag.
    pub fn new(tag: &str) -> Result<Self> {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() {
            return Err(Error::BadValue("server-tag must not be empty".into()));
        }
        if tag.chars().count() > MAX_SERVER_TAG_LEN {
            return Err(Error::BadValue(format!(
                "server-tag must not be longer than {MAX_SERVER_TAG_LEN} characters"
            )));
        }
        Ok(Self(tag))
    }

    pub fn all() -> Self {
        Self(Self::ALL.to_string())
    }

    pub fn is_all(&self) -> bool {
        self.0 == Self::ALL
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ServerTag {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<ServerTag> for String {
    fn from(tag: ServerTag) -> Self {
        tag.0
    }
}

/// Which servers a configuration request is made for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerSelector {
    /// Entities owned by no server.
    Unassigned,
    /// Entities owned by the `all` tag.
    All,
    One(ServerTag),
    Multiple(BTreeSet<ServerTag>),
    /// Every entity, regardless of ownership.
    Any,
}

impl ServerSelector {
    pub fn one(tag: &str) -> Result<Self> {
        Ok(Self::One(ServerTag::new(tag)?))
    }

    /// # Errors
    ///
    /// Returns [`Error::BadValue`] if `tags` is empty or holds an invalid tag.
    pub fn multiple<'a>(tags: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let tags = tags
            .into_iter()
            .map(ServerTag::new)
            .collect::<Result<BTreeSet<_>>>()?;
        if tags.is_empty() {
            return Err(Error::BadValue(
                "server selector must contain at least one server tag".into(),
            ));
        }
        Ok(Self::Multiple(tags))
    }

    /// Tags an entity must own to be an explicit match.
    pub fn tags(&self) -> BTreeSet<ServerTag> {
        match self {
            Self::All => BTreeSet::from([ServerTag::all()]),
            Self::One(tag) => BTreeSet::from([tag.clone()]),
            Self::Multiple(tags) => tags.clone(),
            Self::Unassigned | Self::Any => BTreeSet::new(),
        }
    }

    /// Resolves the single tag a write is made for.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadValue`] unless the selector is `All` or `One`.
    pub fn owning_tag(&self) -> Result<ServerTag> {
        match self {
            Self::All => Ok(ServerTag::all()),
            Self::One(tag) => Ok(tag.clone()),
            other => Err(Error::BadValue(format!(
                "expected exactly one server tag or 'all' to be specified, got {other}"
            ))),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }
}

impl fmt::Display for ServerSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unassigned => f.write_str("unassigned"),
            Self::All => f.write_str("all"),
            Self::One(tag) => write!(f, "{tag}"),
            Self::Multiple(tags) => {
                let tags: Vec<_> = tags.iter().map(ServerTag::as_str).collect();
                write!(f, "{}", tags.join(", "))
            }
            Self::Any => f.write_str("any"),
        }
    }
}

/// An entity owned by server tags.
pub trait ServerTagged {
    fn server_tags(&self) -> &BTreeSet<ServerTag>;

    fn server_tags_mut(&mut self) -> &mut BTreeSet<ServerTag>;

    fn has_server_tag(&self, tag: &ServerTag) -> bool {
        self.server_tags().contains(tag)
    }

    fn has_all_server_tag(&self) -> bool {
        self.server_tags().iter().any(ServerTag::is_all)
    }

    fn set_server_tag(&mut self, tag: ServerTag) {
        self.server_tags_mut().insert(tag);
    }

    /// True if the entity owns any of `tags`.
    fn has_any_server_tag(&self, tags: &BTreeSet<ServerTag>) -> bool {
        !self.server_tags().is_disjoint(tags)
    }
}

/// Implements [`ServerTagged`] for structs with a `server_tags` field.
macro_rules! server_tagged {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::selector::ServerTagged for $ty {
                fn server_tags(&self) -> &::std::collections::BTreeSet<$crate::selector::ServerTag> {
                    &self.server_tags
                }

                fn server_tags_mut(
                    &mut self,
                ) -> &mut ::std::collections::BTreeSet<$crate::selector::ServerTag> {
                    &mut self.server_tags
                }
            }
        )+
    };
}

pub(crate) use server_tagged;

/// Returns the entity `selector` sees among `candidates` sharing one key.
///
/// [`ServerSelector::Any`] sees the first candidate and
/// [`ServerSelector::Unassigned`] the first candidate without tags.
/// [`ServerSelector::All`] sees the last candidate owning the `all` tag.
pub fn select_visible<'a, T, I>(selector: &ServerSelector, candidates: I) -> Option<&'a T>
where
    T: ServerTagged + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut candidates = candidates.into_iter();
    match selector {
        ServerSelector::Any => return candidates.next(),
        ServerSelector::Unassigned => {
            return candidates.find(|c| c.server_tags().is_empty());
        }
        ServerSelector::All => return candidates.filter(|c| c.has_all_server_tag()).last(),
        _ => {}
    }

    let tags = selector.tags();
    let mut fallback = None;
    for candidate in candidates {
        if candidate.has_any_server_tag(&tags) {
            return Some(candidate);
        }
        if candidate.has_all_server_tag() {
            fallback = Some(candidate);
        }
    }
    fallback
}

/// Returns every entity `selector` sees among `candidates` sharing one key.
///
/// Explicit selectors see at most one entity per key; `Any` and
/// `Unassigned` see every matching entity.
pub fn visible_in_group<'a, T, I>(selector: &ServerSelector, candidates: I) -> Vec<&'a T>
where
    T: ServerTagged + 'a,
    I: IntoIterator<Item = &'a T>,
{
    match selector {
        ServerSelector::Any => candidates.into_iter().collect(),
        ServerSelector::Unassigned => candidates
            .into_iter()
            .filter(|c| c.server_tags().is_empty())
            .collect(),
        _ => select_visible(selector, candidates).into_iter().collect(),
    }
}

/// True if a parent entity accepts writes made with `selector`.
pub fn accepts_writes<T: ServerTagged>(selector: &ServerSelector, entity: &T) -> bool {
    selector.is_any() || entity.has_all_server_tag() || entity.has_any_server_tag(&selector.tags())
}
