use std::fmt;

use serde::Deserialize;

/// ordered list of telegram chat ids, we implement Deserialize our selves to accept both a comma separated string (environment variables) and a sequence (config files)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientList(Vec<String>);

impl RecipientList {
    /// Builds the list in the given order, dropping blank entries and duplicates.
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Vec::new();

        for id in ids {
            let id = id.as_ref().trim();
            if id.is_empty() {
                continue;
            }
            if list.iter().any(|known| known == id) {
                tracing::warn!("chat id {} is configured more than once", id);
                continue;
            }
            list.push(id.to_string());
        }

        Self(list)
    }

    pub fn parse(ids: &str) -> Self {
        Self::new(ids.split(','))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

struct RecipientListVisitor();

impl<'de> serde::de::Visitor<'de> for RecipientListVisitor {
    type Value = RecipientList;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("comma separated telegram chat ids or a list of chat ids")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(RecipientList::parse(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(RecipientList::new([v.to_string()]))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(RecipientList::new([v.to_string()]))
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(RecipientList::default())
    }

    fn visit_none<E>(self) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(RecipientList::default())
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::SeqAccess<'de>,
    {
        let mut ids = Vec::new();

        // chat ids are numeric in yaml/toml files unless quoted
        while let Some(id) = seq.next_element::<ChatId>()? {
            ids.push(id.0);
        }

        Ok(RecipientList::new(ids))
    }
}

impl<'de> Deserialize<'de> for RecipientList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_any(RecipientListVisitor())
    }
}

/// single chat id, either a string (`"@channel"`, `"-100123"`) or an integer
struct ChatId(String);

impl<'de> Deserialize<'de> for ChatId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Signed(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(id) => ChatId(id),
            Raw::Signed(id) => ChatId(id.to_string()),
        })
    }
}
