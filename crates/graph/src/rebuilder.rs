use std::collections::BTreeMap;
use std::sync::Arc;

use bb_execapi::{CacheMode, ExecutionAction, ExecutionApi};
use bb_model::ObjectInfo;

/// §4.7 step 6: re-submits an already-assembled action against two
/// endpoints — `PretendCached` on the endpoint meant to actually rebuild,
/// `FromCacheOnly` on the endpoint whose cache is under test — and compares
/// outputs path by path. A path present under both with differing digests is
/// flaky; a path the cache-only run can't serve is a cache miss, not
/// flakiness.
pub struct Rebuilder {
    rebuild_api: Arc<dyn ExecutionApi>,
    cache_api: Arc<dyn ExecutionApi>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub flaky_paths: Vec<String>,
    pub cache_misses: Vec<String>,
}

impl RebuildReport {
    pub fn is_clean(&self) -> bool {
        self.flaky_paths.is_empty()
    }
}

impl Rebuilder {
    pub fn new(rebuild_api: Arc<dyn ExecutionApi>, cache_api: Arc<dyn ExecutionApi>) -> Self {
        Self { rebuild_api, cache_api }
    }

    pub async fn check(&self, assembled: &ExecutionAction) -> Result<RebuildReport, String> {
        let mut rebuild_action = assembled.clone();
        rebuild_action.cache_mode = CacheMode::PretendCached;
        let rebuilt = self.rebuild_api.execute(rebuild_action).await.map_err(|e| e.to_string())?;

        let mut cached_action = assembled.clone();
        cached_action.cache_mode = CacheMode::FromCacheOnly;
        let cached = self.cache_api.execute(cached_action).await.map_err(|e| e.to_string())?;

        Ok(Self::diff(&rebuilt.outputs, &cached.outputs))
    }

    fn diff(rebuilt: &BTreeMap<String, ObjectInfo>, cached: &BTreeMap<String, ObjectInfo>) -> RebuildReport {
        let mut report = RebuildReport::default();
        for (path, rebuilt_info) in rebuilt {
            match cached.get(path) {
                Some(cached_info) if cached_info.digest() != rebuilt_info.digest() => report.flaky_paths.push(path.clone()),
                Some(_) => {}
                None => report.cache_misses.push(path.clone()),
            }
        }
        report.flaky_paths.sort();
        report.cache_misses.sort();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bb_hash::{ArtifactDigest, HashFamily};
    use bb_model::ObjectType;

    fn info(byte: u8) -> ObjectInfo {
        ObjectInfo::new(ArtifactDigest::hash_data_as(HashFamily::PlainSha256, &[byte], false), ObjectType::File)
    }

    #[test]
    fn differing_digests_for_the_same_path_are_flaky() {
        let rebuilt = BTreeMap::from([("out".to_string(), info(1))]);
        let cached = BTreeMap::from([("out".to_string(), info(2))]);
        let report = Rebuilder::diff(&rebuilt, &cached);
        assert_eq!(report.flaky_paths, vec!["out".to_string()]);
        assert!(!report.is_clean());
    }

    #[test]
    fn matching_digests_are_clean() {
        let rebuilt = BTreeMap::from([("out".to_string(), info(1))]);
        let cached = BTreeMap::from([("out".to_string(), info(1))]);
        let report = Rebuilder::diff(&rebuilt, &cached);
        assert!(report.is_clean());
    }

    #[test]
    fn a_path_absent_from_the_cache_is_a_miss_not_flakiness() {
        let rebuilt = BTreeMap::from([("out".to_string(), info(1))]);
        let cached = BTreeMap::new();
        let report = Rebuilder::diff(&rebuilt, &cached);
        assert!(report.is_clean());
        assert_eq!(report.cache_misses, vec!["out".to_string()]);
    }
}
