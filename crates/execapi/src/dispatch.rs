use std::collections::BTreeMap;

/// One dispatch-list entry (§9 supplemented feature, grounded on the
/// original's `storage/backend_description.*`): an action whose merged
/// execution properties match `properties` is routed to `endpoint` instead
/// of the default remote (§4.7 step 3, "first-match wins").
#[derive(Debug, Clone)]
pub struct BackendDescription {
    pub properties: BTreeMap<String, String>,
    pub endpoint: String,
}

#[derive(Debug, Clone, Default)]
pub struct DispatchList {
    entries: Vec<BackendDescription>,
}

impl DispatchList {
    pub fn new(entries: Vec<BackendDescription>) -> Self {
        Self { entries }
    }

    /// First entry whose declared properties are all present with matching
    /// values in `properties`; `None` falls back to the default endpoint.
    pub fn select(&self, properties: &BTreeMap<String, String>) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.properties.iter().all(|(k, v)| properties.get(k) == Some(v)))
            .map(|entry| entry.endpoint.as_str())
    }

    /// Every distinct endpoint named across all entries, so a caller can
    /// connect to each one up front instead of on first dispatch.
    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        let mut seen = std::collections::BTreeSet::new();
        self.entries.iter().map(|entry| entry.endpoint.as_str()).filter(move |endpoint| seen.insert(*endpoint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_entry_wins() {
        let list = DispatchList::new(vec![
            BackendDescription { properties: BTreeMap::from([("os".into(), "linux".into())]), endpoint: "linux-pool".into() },
            BackendDescription { properties: BTreeMap::new(), endpoint: "default-pool".into() },
        ]);
        let props = BTreeMap::from([("os".into(), "linux".into()), ("arch".into(), "x86_64".into())]);
        assert_eq!(list.select(&props), Some("linux-pool"));
    }

    #[test]
    fn no_match_falls_through_to_default_selection() {
        let list = DispatchList::new(vec![BackendDescription {
            properties: BTreeMap::from([("os".into(), "macos".into())]),
            endpoint: "mac-pool".into(),
        }]);
        let props = BTreeMap::from([("os".into(), "linux".into())]);
        assert_eq!(list.select(&props), None);
    }
}
