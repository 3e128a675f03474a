// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::borrow::Cow;
use std::fmt::{Debug, Display, Formatter};

/// A `key:value` telemetry tag.
///
/// Many tags are made from literal strings, such as:
///  - "language:native"
///  - "type:timeout"
///
/// So being able to save allocations is nice.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Tag {
    value: Cow<'static, str>,
}

impl Tag {
    /// Create a tag from a key and value, validated against the backend tag
    /// requirements: starts with a letter, at most 200 bytes.
    pub fn new<K, V>(key: K, value: V) -> anyhow::Result<Tag>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let (key, value) = (key.as_ref(), value.as_ref());

        anyhow::ensure!(!key.is_empty(), "tag key may not be empty");
        anyhow::ensure!(!value.is_empty(), "tag value may not be empty");

        let combined = format!("{key}:{value}");

        let first = combined.chars().next().unwrap();
        anyhow::ensure!(first.is_alphabetic(), "tag must begin with a letter");

        // Tags can be up to 200 characters long and support Unicode letters.
        // Engineers interpreted this to be 200 bytes, not unicode characters.
        anyhow::ensure!(combined.len() <= 200, "tag is longer than 200 bytes");

        Ok(Tag {
            value: Cow::Owned(combined),
        })
    }
}

impl Debug for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tag").field("value", &self.value).finish()
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl AsRef<str> for Tag {
    fn as_ref(&self) -> &str {
        self.value.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_tags() {
        for (key, value) in [("language", "rust"), ("type", "timeout"), ("env", "staging")] {
            let tag = Tag::new(key, value).unwrap();
            assert_eq!(tag.to_string(), format!("{key}:{value}"));
        }
    }

    #[test]
    fn test_invalid_tags() {
        assert!(Tag::new("", "value").is_err());
        assert!(Tag::new("key", "").is_err());
        assert!(Tag::new("1key", "value").is_err());
        assert!(Tag::new("key", "v".repeat(200)).is_err());
    }
}
