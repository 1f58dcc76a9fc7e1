use std::time::Duration;

use linescan_core::{CacheConfig, OddsCache, ResourceKey, SportSummary, StalenessCache};
use tokio::time::advance;

#[tokio::test(start_paused = true)]
async fn events_are_fresh_until_ttl_elapses() {
    let cache: StalenessCache<Vec<&str>> = StalenessCache::new();
    let ttl = Duration::from_secs(300);
    cache.put("nba", vec!["lakers-celtics"]);

    advance(Duration::from_secs(299)).await;
    assert_eq!(cache.get_if_fresh("nba", ttl), Some(vec!["lakers-celtics"]));

    advance(Duration::from_secs(2)).await;
    assert_eq!(cache.get_if_fresh("nba", ttl), None);
    // expired entries are kept for stale reads
    assert!(cache.get_stale("nba").is_some());
}

#[tokio::test(start_paused = true)]
async fn entry_exactly_ttl_old_is_expired() {
    let cache: StalenessCache<u32> = StalenessCache::new();
    cache.put("nhl", 7);

    advance(Duration::from_secs(300)).await;
    assert_eq!(cache.get_if_fresh("nhl", Duration::from_secs(300)), None);
}

#[tokio::test(start_paused = true)]
async fn throttle_holds_for_min_interval_only() {
    let cache: StalenessCache<u32> = StalenessCache::new();
    let interval = Duration::from_secs(1);
    assert!(!cache.should_throttle("nba", interval), "unknown keys are never throttled");

    cache.put("nba", 1);
    assert!(cache.should_throttle("nba", interval));
    assert!(cache.should_throttle("nba", Duration::from_millis(1)));

    advance(Duration::from_millis(500)).await;
    assert!(cache.should_throttle("nba", interval));

    advance(Duration::from_millis(600)).await;
    assert!(!cache.should_throttle("nba", interval));
}

#[tokio::test(start_paused = true)]
async fn put_replaces_the_single_entry_and_restamps_it() {
    let cache: StalenessCache<&str> = StalenessCache::new();
    cache.put("mlb", "v1");
    advance(Duration::from_secs(200)).await;
    cache.put("mlb", "v2");

    assert_eq!(cache.len(), 1);
    advance(Duration::from_secs(200)).await;
    assert_eq!(cache.get_if_fresh("mlb", Duration::from_secs(300)), Some("v2"));
}

#[test]
fn invalidate_removes_one_or_all_entries() {
    let cache: StalenessCache<u8> = StalenessCache::new();
    cache.put("nba", 1);
    cache.put("nfl", 2);

    assert!(cache.invalidate("nba"));
    assert!(!cache.invalidate("nba"));
    assert_eq!(cache.get_if_fresh("nba", Duration::from_secs(3600)), None);
    assert_eq!(cache.keys(), vec!["nfl".to_string()]);

    cache.invalidate_all();
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn odds_cache_applies_ttl_per_resource_class() {
    let cache: OddsCache<String> = OddsCache::new(CacheConfig::default());
    cache.put_sports(vec![SportSummary::new("basketball_nba", "NBA")]);
    cache.put_events("basketball_nba", vec!["game".to_string()]);

    advance(Duration::from_secs(301)).await;
    assert!(cache.sports_if_fresh().is_some(), "sports list lives for an hour");
    assert!(cache.events_if_fresh("basketball_nba").is_none());
    assert_eq!(cache.cached_event_keys(), vec!["basketball_nba".to_string()]);

    advance(Duration::from_secs(3300)).await;
    assert!(cache.sports_if_fresh().is_none());
    assert!(cache.stale_sports().is_some());
}

#[test]
fn invalidating_one_sport_keeps_the_others() {
    let cache: OddsCache<u32> = OddsCache::new(CacheConfig::default());
    cache.put_sports(vec![SportSummary::new("a", "A"), SportSummary::new("b", "B")]);
    cache.put_events("a", vec![1]);
    cache.put_events("b", vec![2]);

    cache.invalidate(&ResourceKey::events("a"));
    assert!(cache.events_if_fresh("a").is_none());
    assert_eq!(cache.events_if_fresh("b"), Some(vec![2]));
    assert!(cache.sports_if_fresh().is_some());

    cache.invalidate_all();
    assert!(cache.sports_if_fresh().is_none());
    assert!(cache.cached_event_keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn odds_cache_throttles_with_configured_interval() {
    let config = CacheConfig {
        min_fetch_interval_ms: 1000,
        ..CacheConfig::default()
    };
    let cache: OddsCache<u32> = OddsCache::new(config);
    let key = ResourceKey::events("nba");

    cache.put_events("nba", vec![]);
    advance(Duration::from_millis(500)).await;
    assert!(cache.should_throttle(&key));
    advance(Duration::from_millis(600)).await;
    assert!(!cache.should_throttle(&key));
    assert!(!cache.should_throttle(&ResourceKey::SportsList));
}

#[tokio::test]
async fn concurrent_writers_leave_one_complete_entry() {
    let cache = std::sync::Arc::new(StalenessCache::<Vec<u32>>::new());
    let mut handles = Vec::new();
    for i in 0..16u32 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            cache.put("nba", vec![i; 64]);
            cache.get_if_fresh("nba", Duration::from_secs(60))
        }));
    }
    for handle in handles {
        let seen = handle.await.unwrap().expect("entry present after put");
        assert_eq!(seen.len(), 64);
        assert!(seen.iter().all(|v| *v == seen[0]));
    }
    assert_eq!(cache.len(), 1);
}
