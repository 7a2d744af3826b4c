use bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    Binary(Bytes),
}

impl Part {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(text) => Some(text),
            Part::Binary(_) => None,
        }
    }

    pub fn as_binary(&self) -> Option<&Bytes> {
        match self {
            Part::Binary(bytes) => Some(bytes),
            Part::Text(_) => None,
        }
    }
}

/// Ordered multi-map of part name to part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    parts: Vec<(String, Part)>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, name: impl Into<String>, part: Part) {
        self.parts.push((name.into(), part));
    }

    /// First part named `name`.
    pub fn get(&self, name: &str) -> Option<&Part> {
        self.get_all(name).next()
    }

    /// Every part named `name`, in insertion order.
    pub fn get_all<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a Part> + use<'a, 'n> {
        self.parts
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, part)| part)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Part)> {
        self.parts.iter().map(|(name, part)| (name.as_str(), part))
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl IntoIterator for Payload {
    type Item = (String, Part);
    type IntoIter = std::vec::IntoIter<(String, Part)>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.into_iter()
    }
}

impl FromIterator<(String, Part)> for Payload {
    fn from_iter<I: IntoIterator<Item = (String, Part)>>(iter: I) -> Self {
        Self {
            parts: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_names_keep_order() {
        let mut payload = Payload::new();
        payload.append("4_tag", Part::Text("a".to_owned()));
        payload.append("0", Part::Text("\"$F1\"".to_owned()));
        payload.append("4_tag", Part::Binary(Bytes::from_static(b"b")));
        let all: Vec<&Part> = payload.get_all("4_tag").collect();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].as_text(), Some("a"));
        assert_eq!(all[1].as_binary().map(|b| &b[..]), Some(&b"b"[..]));
        assert_eq!(payload.get("missing"), None);
    }
}
