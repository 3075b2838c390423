use crate::error::Result;
use crate::models::{EventId, Item};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::future::Future;

/// What a cache refresh replaces: one date bucket, or one event's items everywhere
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Date(NaiveDate),
    Event(EventId),
}

/// A refresh in flight. Only the most recently issued ticket for a key may land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Refresh {
    pub key: CacheKey,
    pub ticket: u64,
}

/// Where the cache pulls items from
pub trait ItemSource {
    fn items_for_date(&self, date: NaiveDate) -> impl Future<Output = Result<Vec<Item>>> + Send;
    fn items_for_event(&self, event_id: EventId) -> impl Future<Output = Result<Vec<Item>>> + Send;
}

/// Per-date item cache; the single source of truth for what gets painted
pub struct ItemCache {
    by_date: HashMap<NaiveDate, Vec<Item>>,
    loaded_dates: HashSet<NaiveDate>,
    next_ticket: u64,
    latest: HashMap<CacheKey, u64>,
    pending: HashSet<CacheKey>,
}

impl ItemCache {
    pub fn new() -> Self {
        Self {
            by_date: HashMap::new(),
            loaded_dates: HashSet::new(),
            next_ticket: 0,
            latest: HashMap::new(),
            pending: HashSet::new(),
        }
    }

    /// Cached items for a date; never fetches
    pub fn get(&self, date: NaiveDate) -> &[Item] {
        self.by_date.get(&date).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Whether the whole bucket for `date` has been fetched by date at least once.
    /// Buckets filled only by event merges hold a partial view.
    pub fn is_date_loaded(&self, date: NaiveDate) -> bool {
        self.loaded_dates.contains(&date)
    }

    #[allow(dead_code)]
    pub fn has_items(&self, date: NaiveDate) -> bool {
        self.by_date.get(&date).is_some_and(|v| !v.is_empty())
    }

    pub fn has_event_on(&self, date: NaiveDate, event_id: EventId) -> bool {
        self.get(date).iter().any(|item| item.event_id == event_id)
    }

    /// Every cached item, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.by_date.values().flatten()
    }

    /// Start a refresh of `key`, superseding any earlier refresh of the same key
    pub fn issue(&mut self, key: CacheKey) -> Refresh {
        self.next_ticket += 1;
        self.latest.insert(key, self.next_ticket);
        self.pending.insert(key);
        Refresh {
            key,
            ticket: self.next_ticket,
        }
    }

    pub fn is_current(&self, refresh: &Refresh) -> bool {
        self.latest.get(&refresh.key) == Some(&refresh.ticket)
    }

    /// Whether the latest refresh of `key` has not landed or failed yet
    pub fn is_pending(&self, key: CacheKey) -> bool {
        self.pending.contains(&key)
    }

    /// The latest refresh of a key failed; later requests may try again
    /// Dates with a load still in flight
    pub fn pending_dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.pending.iter().filter_map(|key| match key {
            CacheKey::Date(date) => Some(*date),
            CacheKey::Event(_) => None,
        })
    }

    pub fn abandon(&mut self, refresh: &Refresh) {
        if self.is_current(refresh) {
            self.pending.remove(&refresh.key);
        }
    }

    /// Land a fetched result. Returns false (and changes nothing) when a newer
    /// refresh of the same key has been issued since.
    pub fn apply(&mut self, refresh: Refresh, items: Vec<Item>) -> bool {
        if !self.is_current(&refresh) {
            tracing::debug!(?refresh, "discarding superseded refresh");
            return false;
        }
        self.pending.remove(&refresh.key);
        match refresh.key {
            CacheKey::Date(date) => self.replace_date(date, items),
            CacheKey::Event(event_id) => self.merge_event(event_id, items),
        }
        true
    }

    /// Replace the bucket for one date wholesale
    pub fn replace_date(&mut self, date: NaiveDate, items: Vec<Item>) {
        self.by_date.insert(date, items);
        self.loaded_dates.insert(date);
    }

    /// Make the cache hold exactly `items` for `event_id`: strip the event from
    /// every bucket, then re-insert the fresh items at their dates.
    pub fn merge_event(&mut self, event_id: EventId, items: Vec<Item>) {
        let mut fresh: HashMap<NaiveDate, Vec<Item>> = HashMap::new();
        for item in items.into_iter().filter(|item| item.event_id == event_id) {
            fresh.entry(item.date).or_default().push(item);
        }

        let dates: Vec<NaiveDate> = self.by_date.keys().copied().collect();
        for date in dates {
            let kept: Vec<Item> = self
                .get(date)
                .iter()
                .filter(|item| item.event_id != event_id)
                .cloned()
                .collect();
            self.by_date.insert(date, kept);
        }

        for (date, event_items) in fresh {
            let mut merged = self.get(date).to_vec();
            merged.extend(event_items);
            self.by_date.insert(date, merged);
        }
    }

    /// Fetch one date and replace its bucket
    #[allow(dead_code)]
    pub async fn load_for_date<S: ItemSource>(&mut self, source: &S, date: NaiveDate) -> Result<()> {
        let refresh = self.issue(CacheKey::Date(date));
        match source.items_for_date(date).await {
            Ok(items) => {
                self.apply(refresh, items);
                Ok(())
            }
            Err(e) => {
                self.abandon(&refresh);
                Err(e)
            }
        }
    }

    /// Fetch every item of one event and merge it across all dates
    #[allow(dead_code)]
    pub async fn load_for_event<S: ItemSource>(&mut self, source: &S, event_id: EventId) -> Result<()> {
        let refresh = self.issue(CacheKey::Event(event_id));
        match source.items_for_event(event_id).await {
            Ok(items) => {
                self.apply(refresh, items);
                Ok(())
            }
            Err(e) => {
                self.abandon(&refresh);
                Err(e)
            }
        }
    }
}

impl Default for ItemCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ColendarError;
    use std::sync::Mutex;

    pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    pub fn item(id: i64, event_id: EventId, date: NaiveDate) -> Item {
        Item {
            id,
            event_id,
            date,
            time: None,
            title: format!("item {}", id),
            notes: None,
            description: None,
        }
    }

    /// In-memory backend standing in for the HTTP API
    pub struct FakeSource {
        pub items: Mutex<Vec<Item>>,
        pub calls: Mutex<usize>,
        pub fail_events: Vec<EventId>,
    }

    impl FakeSource {
        pub fn new(items: Vec<Item>) -> Self {
            Self {
                items: Mutex::new(items),
                calls: Mutex::new(0),
                fail_events: Vec::new(),
            }
        }

        fn matching(&self, pred: impl Fn(&Item) -> bool) -> Vec<Item> {
            *self.calls.lock().unwrap() += 1;
            self.items.lock().unwrap().iter().filter(|i| pred(i)).cloned().collect()
        }
    }

    impl ItemSource for FakeSource {
        fn items_for_date(&self, date: NaiveDate) -> impl Future<Output = Result<Vec<Item>>> + Send {
            let items = self.matching(|i| i.date == date);
            async move { Ok(items) }
        }

        fn items_for_event(&self, event_id: EventId) -> impl Future<Output = Result<Vec<Item>>> + Send {
            let result = if self.fail_events.contains(&event_id) {
                Err(ColendarError::Api {
                    context: "GET /items".to_string(),
                    status: 404,
                    body: String::new(),
                })
            } else {
                Ok(self.matching(|i| i.event_id == event_id))
            };
            async move { result }
        }
    }

    #[test]
    fn test_uncached_date_is_empty() {
        let cache = ItemCache::new();
        assert!(cache.get(d(2024, 1, 1)).is_empty());
        assert!(!cache.is_date_loaded(d(2024, 1, 1)));
    }

    #[tokio::test]
    async fn test_get_never_fetches() {
        let source = FakeSource::new(vec![item(1, 1, d(2024, 1, 1))]);
        let cache = ItemCache::new();
        assert!(cache.get(d(2024, 1, 1)).is_empty());
        assert_eq!(*source.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_load_for_date_replaces_bucket() {
        let date = d(2024, 1, 15);
        let source = FakeSource::new(vec![item(1, 1, date), item(2, 2, date)]);
        let mut cache = ItemCache::new();
        cache.replace_date(date, vec![item(99, 1, date)]);

        cache.load_for_date(&source, date).await.unwrap();

        let ids: Vec<i64> = cache.get(date).iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(cache.is_date_loaded(date));
    }

    #[tokio::test]
    async fn test_load_for_event_strips_stale_dates() {
        let old_date = d(2024, 2, 1);
        let new_date = d(2024, 2, 3);
        let mut cache = ItemCache::new();
        cache.replace_date(old_date, vec![item(1, 7, old_date), item(2, 8, old_date)]);

        // Backend moved event 7's only item to another date
        let source = FakeSource::new(vec![item(3, 7, new_date), item(2, 8, old_date)]);
        cache.load_for_event(&source, 7).await.unwrap();

        let old: Vec<i64> = cache.get(old_date).iter().map(|i| i.id).collect();
        assert_eq!(old, vec![2]);
        let new: Vec<i64> = cache.get(new_date).iter().map(|i| i.id).collect();
        assert_eq!(new, vec![3]);
        assert!(!cache.iter().any(|i| i.event_id == 7 && i.date == old_date));
    }

    #[tokio::test]
    async fn test_load_for_event_keeps_other_events() {
        let date = d(2024, 2, 1);
        let mut cache = ItemCache::new();
        cache.replace_date(date, vec![item(1, 7, date), item(2, 8, date)]);

        let source = FakeSource::new(vec![item(1, 7, date), item(4, 7, date)]);
        cache.load_for_event(&source, 7).await.unwrap();

        let mut ids: Vec<i64> = cache.get(date).iter().map(|i| i.id).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2, 4]);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_cache_untouched() {
        let date = d(2024, 2, 1);
        let mut source = FakeSource::new(vec![]);
        source.fail_events = vec![7];
        let mut cache = ItemCache::new();
        cache.replace_date(date, vec![item(1, 7, date)]);

        assert!(cache.load_for_event(&source, 7).await.is_err());
        assert_eq!(cache.get(date).len(), 1);
        assert!(!cache.is_pending(CacheKey::Event(7)));
    }

    #[test]
    fn test_pending_until_latest_lands() {
        let key = CacheKey::Date(d(2024, 4, 1));
        let mut cache = ItemCache::new();
        let first = cache.issue(key);
        let second = cache.issue(key);
        assert!(cache.is_pending(key));

        // A stale failure does not clear the newer request
        cache.abandon(&first);
        assert!(cache.is_pending(key));
        cache.apply(second, vec![]);
        assert!(!cache.is_pending(key));
    }

    #[test]
    fn test_superseded_refresh_is_discarded() {
        let date = d(2024, 4, 1);
        let mut cache = ItemCache::new();
        let first = cache.issue(CacheKey::Event(5));
        let second = cache.issue(CacheKey::Event(5));

        // Responses arrive out of order: second first, then the stale first
        assert!(cache.apply(second, vec![]));
        assert!(!cache.apply(first, vec![item(1, 5, date)]));
        assert!(cache.get(date).is_empty());
    }

    #[test]
    fn test_tickets_are_per_key() {
        let mut cache = ItemCache::new();
        let a = cache.issue(CacheKey::Date(d(2024, 1, 1)));
        let b = cache.issue(CacheKey::Date(d(2024, 1, 2)));
        assert!(cache.is_current(&a));
        assert!(cache.is_current(&b));
        assert!(b.ticket > a.ticket);
    }
}
