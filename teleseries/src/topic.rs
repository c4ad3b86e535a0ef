//! Topic routing and subscription filters.
//!
//! Producers publish one scalar per message on a slash-delimited topic:
//!
//! ```text
//! <base>/<entity>/<parameter>     multi-entity form
//! <base>/<parameter>              single-entity form
//! ```
//!
//! A [`TopicRouter`] maps such a topic to the [`SeriesKey`] it feeds, or to
//! nothing when the session does not track that entity or parameter. The
//! transport subscribes with wildcards, so unroutable topics are an expected
//! steady state rather than an error.
//!
//! # Routing table
//!
//! After the base path is stripped:
//!
//! | remaining levels         | no tracked entities     | tracked entities          |
//! |--------------------------|-------------------------|---------------------------|
//! | `parameter`              | `(default, parameter)`  | unroutable                |
//! | `entity/parameter`       | unroutable              | `(entity, parameter)`     |
//! | anything else            | unroutable              | unroutable                |
//!
//! The parameter must always be tracked, and in the multi-entity form the
//! entity must be tracked too.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigError, Result, TopicError};
use crate::series::SeriesKey;

/// Single-level wildcard.
const SINGLE_LEVEL: &str = "+";
/// Multi-level wildcard.
const MULTI_LEVEL: &str = "#";

/// Maps topics to series keys for the currently tracked selection.
///
/// The router is immutable; changing the selection means building a new
/// router (see [`SeriesStore::reset`](crate::store::SeriesStore::reset)).
///
/// ```rust
/// use teleseries::topic::TopicRouter;
/// use teleseries::series::SeriesKey;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let router = TopicRouter::new(
///     "bess/telemetria",
///     ["natal"],
///     ["potencia", "tensao", "corrente"],
/// )?;
///
/// assert_eq!(
///     router.route("bess/telemetria/natal/potencia"),
///     Some(SeriesKey::new("natal", "potencia")),
/// );
/// assert_eq!(router.route("bess/telemetria/mossoro/potencia"), None);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRouter {
    /// Topic prefix shared by every routable topic, without trailing `/`.
    base: String,
    /// Monitored entities. Empty means single implicit entity.
    entities: BTreeSet<String>,
    /// Tracked parameter names.
    parameters: BTreeSet<String>,
}

impl TopicRouter {
    /// Creates a router for `entities` × `parameters` under `base`.
    ///
    /// An empty entity set selects single-entity mode, where topics carry no
    /// entity level and route to [`DEFAULT_ENTITY`](crate::series::DEFAULT_ENTITY).
    ///
    /// # Errors
    ///
    /// - [`ConfigError::NoParameters`] if `parameters` is empty
    /// - [`ConfigError::InvalidName`] if a name is empty or contains `/`,
    ///   `+` or `#`, or if `base` has an empty level or a wildcard
    pub fn new<E, P>(
        base: impl Into<String>,
        entities: impl IntoIterator<Item = E>,
        parameters: impl IntoIterator<Item = P>,
    ) -> Result<Self>
    where
        E: Into<String>,
        P: Into<String>,
    {
        let base = base.into().trim_end_matches('/').to_string();
        let entities: BTreeSet<String> = entities.into_iter().map(Into::into).collect();
        let parameters: BTreeSet<String> = parameters.into_iter().map(Into::into).collect();

        validate_base(&base)?;
        if parameters.is_empty() {
            return Err(ConfigError::NoParameters.into());
        }
        for name in &parameters {
            validate_level("parameter", name)?;
        }
        for name in &entities {
            validate_level("entity", name)?;
        }

        Ok(Self {
            base,
            entities,
            parameters,
        })
    }

    /// Routes a topic to its series key, or `None` if it is unroutable.
    pub fn route(&self, topic: &str) -> Option<SeriesKey> {
        let rest = self.strip_base(topic)?;
        let mut levels = rest.split('/');
        let first = levels.next()?;
        let second = levels.next();
        if levels.next().is_some() {
            return None;
        }

        match second {
            None if self.entities.is_empty() && self.parameters.contains(first) => {
                Some(SeriesKey::single(first))
            }
            Some(parameter)
                if self.entities.contains(first) && self.parameters.contains(parameter) =>
            {
                Some(SeriesKey::new(first, parameter))
            }
            _ => None,
        }
    }

    /// Whether `key` is one of the tracked keys.
    pub fn tracks(&self, key: &SeriesKey) -> bool {
        if !self.parameters.contains(&key.parameter) {
            return false;
        }
        if self.entities.is_empty() {
            key.is_default_entity()
        } else {
            self.entities.contains(&key.entity)
        }
    }

    /// Every tracked key, sorted by entity then parameter.
    pub fn keys(&self) -> Vec<SeriesKey> {
        if self.entities.is_empty() {
            return self.parameters.iter().map(SeriesKey::single).collect();
        }
        self.entities
            .iter()
            .flat_map(|entity| {
                self.parameters
                    .iter()
                    .map(move |parameter| SeriesKey::new(entity.as_str(), parameter.as_str()))
            })
            .collect()
    }

    /// Filters a transport should subscribe to for this selection.
    ///
    /// One `base/+` filter in single-entity mode, otherwise one
    /// `base/<entity>/+` per tracked entity.
    pub fn subscriptions(&self) -> Vec<TopicFilter> {
        if self.entities.is_empty() {
            return vec![TopicFilter::from_levels(self.join_base(SINGLE_LEVEL))];
        }
        self.entities
            .iter()
            .map(|entity| {
                TopicFilter::from_levels(self.join_base(&format!("{entity}/{SINGLE_LEVEL}")))
            })
            .collect()
    }

    /// The topic a producer publishes `key` on.
    ///
    /// Inverse of [`TopicRouter::route`] for tracked keys.
    pub fn topic_for(&self, key: &SeriesKey) -> String {
        if key.is_default_entity() && self.entities.is_empty() {
            self.join_base(&key.parameter)
        } else {
            self.join_base(&format!("{}/{}", key.entity, key.parameter))
        }
    }

    /// The base topic path.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Tracked entities; empty in single-entity mode.
    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(String::as_str)
    }

    /// Tracked parameter names.
    pub fn parameters(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(String::as_str)
    }

    fn join_base(&self, rest: &str) -> String {
        if self.base.is_empty() {
            rest.to_string()
        } else {
            format!("{}/{rest}", self.base)
        }
    }

    fn strip_base<'t>(&self, topic: &'t str) -> Option<&'t str> {
        if self.base.is_empty() {
            return Some(topic);
        }
        topic.strip_prefix(self.base.as_str())?.strip_prefix('/')
    }
}

/// Rejects names that cannot stand as exactly one topic level.
fn validate_level(kind: &'static str, name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name.contains('/') {
        "name contains a level separator '/'"
    } else if name.contains(SINGLE_LEVEL) || name.contains(MULTI_LEVEL) {
        "name contains a wildcard character"
    } else {
        return Ok(());
    };

    Err(ConfigError::InvalidName {
        kind,
        name: name.to_string(),
        reason,
    }
    .into())
}

/// Rejects a base path that would never match a published topic.
///
/// The empty base is valid and means topics start at the entity or
/// parameter level.
fn validate_base(base: &str) -> Result<()> {
    if base.is_empty() {
        return Ok(());
    }
    let reason = if base.split('/').any(str::is_empty) {
        "base has an empty level"
    } else if base.contains(SINGLE_LEVEL) || base.contains(MULTI_LEVEL) {
        "base contains a wildcard character"
    } else {
        return Ok(());
    };

    Err(ConfigError::InvalidName {
        kind: "base",
        name: base.to_string(),
        reason,
    }
    .into())
}

/// One level of a parsed filter.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FilterLevel {
    Exact(String),
    Single,
    Multi,
}

/// An MQTT-style subscription filter.
///
/// `+` matches exactly one level, `#` matches the remaining levels (including
/// none) and may only appear last.
///
/// ```rust
/// use teleseries::topic::TopicFilter;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let filter: TopicFilter = "bess/telemetria/+/potencia".parse()?;
/// assert!(filter.matches("bess/telemetria/natal/potencia"));
/// assert!(!filter.matches("bess/telemetria/natal/tensao"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    raw: String,
    levels: Vec<FilterLevel>,
}

impl TopicFilter {
    /// Parses and validates a filter.
    ///
    /// # Errors
    ///
    /// - [`TopicError::Empty`] for an empty string
    /// - [`TopicError::InvalidWildcard`] if a wildcard shares a level with
    ///   other characters or `#` is not the last level
    pub fn parse(filter: &str) -> std::result::Result<Self, TopicError> {
        if filter.is_empty() {
            return Err(TopicError::Empty);
        }

        let raw_levels: Vec<&str> = filter.split('/').collect();
        let last = raw_levels.len() - 1;
        let mut levels = Vec::with_capacity(raw_levels.len());

        for (index, level) in raw_levels.into_iter().enumerate() {
            let parsed = match level {
                SINGLE_LEVEL => FilterLevel::Single,
                MULTI_LEVEL if index == last => FilterLevel::Multi,
                MULTI_LEVEL => {
                    return Err(TopicError::InvalidWildcard {
                        filter: filter.to_string(),
                        reason: "'#' must be the last level",
                    });
                }
                _ if level.contains(SINGLE_LEVEL) || level.contains(MULTI_LEVEL) => {
                    return Err(TopicError::InvalidWildcard {
                        filter: filter.to_string(),
                        reason: "a wildcard must occupy an entire level",
                    });
                }
                _ => FilterLevel::Exact(level.to_string()),
            };
            levels.push(parsed);
        }

        Ok(Self {
            raw: filter.to_string(),
            levels,
        })
    }

    /// Builds a filter from a string already known to be well formed.
    fn from_levels(raw: String) -> Self {
        let levels = raw
            .split('/')
            .map(|level| match level {
                SINGLE_LEVEL => FilterLevel::Single,
                MULTI_LEVEL => FilterLevel::Multi,
                other => FilterLevel::Exact(other.to_string()),
            })
            .collect();
        Self { raw, levels }
    }

    /// Whether `topic` is delivered by this filter.
    pub fn matches(&self, topic: &str) -> bool {
        let mut topic_levels = topic.split('/');
        for level in &self.levels {
            match level {
                FilterLevel::Multi => return true,
                FilterLevel::Single => {
                    if topic_levels.next().is_none() {
                        return false;
                    }
                }
                FilterLevel::Exact(expected) => {
                    if topic_levels.next() != Some(expected.as_str()) {
                        return false;
                    }
                }
            }
        }
        topic_levels.next().is_none()
    }

    /// The filter as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for TopicFilter {
    type Err = TopicError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
