//! Topic names - the addressing unit for channels.
//!
//! A topic is one or more sections joined by `/`, for example
//! `Commands/ExampleService/EnsureSampleServiceWorking`. Sections are
//! non-empty and contain neither whitespace nor the separator.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

/// Section separator.
pub const SEPARATOR: char = '/';

/// Validation failure while building a [`TopicName`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("topic must have at least one section")]
    NoSections,
    #[error("topic section {index} is empty")]
    EmptySection { index: usize },
    #[error("topic section {section:?} contains whitespace")]
    Whitespace { section: String },
    #[error("topic section {section:?} contains the separator '/'")]
    Separator { section: String },
}

/// Validated, hierarchical topic identifier.
///
/// Equality and hashing are exact, case-sensitive string comparison.
/// Cloning is cheap (the text is shared).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicName(Arc<str>);

impl TopicName {
    /// Build a topic from individual sections.
    pub fn from_sections<I, S>(sections: I) -> Result<Self, TopicError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut joined = String::new();
        let mut count = 0;
        for (index, section) in sections.into_iter().enumerate() {
            let section = section.as_ref();
            validate_section(index, section)?;
            if index > 0 {
                joined.push(SEPARATOR);
            }
            joined.push_str(section);
            count += 1;
        }
        if count == 0 {
            return Err(TopicError::NoSections);
        }
        Ok(Self(joined.into()))
    }

    /// Parse a full `/`-separated topic string.
    pub fn parse(topic: &str) -> Result<Self, TopicError> {
        if topic.is_empty() {
            return Err(TopicError::NoSections);
        }
        Self::from_sections(topic.split(SEPARATOR))
    }

    /// Append one more section, producing a child topic.
    pub fn child(&self, section: &str) -> Result<Self, TopicError> {
        validate_section(self.sections().count(), section)?;
        Ok(Self(format!("{}{}{}", self.0, SEPARATOR, section).into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR)
    }
}

fn validate_section(index: usize, section: &str) -> Result<(), TopicError> {
    if section.is_empty() {
        return Err(TopicError::EmptySection { index });
    }
    if section.contains(SEPARATOR) {
        return Err(TopicError::Separator {
            section: section.to_string(),
        });
    }
    if section.chars().any(char::is_whitespace) {
        return Err(TopicError::Whitespace {
            section: section.to_string(),
        });
    }
    Ok(())
}

impl FromStr for TopicName {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for TopicName {
    type Error = TopicError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<String> for TopicName {
    type Error = TopicError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl AsRef<str> for TopicName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TopicName({:?})", &*self.0)
    }
}

/// Anything the broker accepts where a topic is expected.
///
/// Strings are validated on use; an already built [`TopicName`] is taken
/// as is.
pub trait IntoTopic {
    fn into_topic(self) -> Result<TopicName, TopicError>;
}

impl IntoTopic for TopicName {
    fn into_topic(self) -> Result<TopicName, TopicError> {
        Ok(self)
    }
}

impl IntoTopic for &TopicName {
    fn into_topic(self) -> Result<TopicName, TopicError> {
        Ok(self.clone())
    }
}

impl IntoTopic for &str {
    fn into_topic(self) -> Result<TopicName, TopicError> {
        TopicName::parse(self)
    }
}

impl IntoTopic for String {
    fn into_topic(self) -> Result<TopicName, TopicError> {
        TopicName::parse(&self)
    }
}

impl IntoTopic for &String {
    fn into_topic(self) -> Result<TopicName, TopicError> {
        TopicName::parse(self)
    }
}
