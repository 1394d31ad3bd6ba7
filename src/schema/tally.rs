use serde::ser::{Serialize, SerializeMap, Serializer};

/// Occurrence counts in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelTally {
    counts: Vec<(String, u64)>,
}

impl ModelTally {
    pub fn record(&mut self, model: &str) {
        match self.counts.iter_mut().find(|(name, _)| name == model) {
            Some((_, count)) => *count += 1,
            None => self.counts.push((model.to_string(), 1)),
        }
    }

    /// The most frequent model; ties go to the one seen first.
    pub fn primary(&self) -> Option<&str> {
        let mut best: Option<&(String, u64)> = None;
        for entry in &self.counts {
            if best.map_or(true, |(_, count)| entry.1 > *count) {
                best = Some(entry);
            }
        }
        best.map(|(name, _)| name.as_str())
    }

    pub fn get(&self, model: &str) -> Option<u64> {
        self.counts
            .iter()
            .find(|(name, _)| name == model)
            .map(|(_, count)| *count)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(name, count)| (name.as_str(), *count))
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl Serialize for ModelTally {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.counts.len()))?;
        for (name, count) in &self.counts {
            map.serialize_entry(name, count)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plurality() {
        let mut tally = ModelTally::default();
        for m in ["a", "b", "a"] {
            tally.record(m);
        }
        assert_eq!(tally.primary(), Some("a"));
        assert_eq!(tally.get("a"), Some(2));
        assert_eq!(tally.get("b"), Some(1));
    }

    #[test]
    fn test_tie_goes_to_first_seen() {
        let mut tally = ModelTally::default();
        for m in ["b", "a", "a", "b", "c"] {
            tally.record(m);
        }
        assert_eq!(tally.primary(), Some("b"));
        assert_eq!(ModelTally::default().primary(), None);
    }

    #[test]
    fn test_serializes_in_insertion_order() {
        let mut tally = ModelTally::default();
        for m in ["zeta", "alpha", "zeta"] {
            tally.record(m);
        }
        assert_eq!(
            serde_json::to_string(&tally).unwrap(),
            r#"{"zeta":2,"alpha":1}"#
        );
    }
}
