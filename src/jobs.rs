//! Backend work queued by the controller and executed off the UI loop.
//!
//! Jobs only talk to the network; every state change happens when the
//! controller applies the returned [`JobOutcome`]. Reloads after a mutation
//! are issued by the controller once the mutation has finished, whether or
//! not it succeeded, so they always supersede any load started before it.

use crate::api::ApiClient;
use crate::cache::{CacheKey, ItemSource, Refresh};
use crate::error::Result;
use crate::models::{Event, EventId, EventPatch, Item, ItemId, ItemPatch, NewEvent, NewItem};
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    CreateItem(NewItem),
    UpdateItem { id: ItemId, patch: ItemPatch },
    DeleteItems(Vec<ItemId>),
    CreateEvent(NewEvent),
    UpdateEvent { id: EventId, patch: EventPatch },
    DeleteEvent(EventId),
}

impl Mutation {
    pub fn label(&self) -> &'static str {
        match self {
            Mutation::CreateItem(_) => "create item",
            Mutation::UpdateItem { .. } => "update item",
            Mutation::DeleteItems(_) => "delete items",
            Mutation::CreateEvent(_) => "create event",
            Mutation::UpdateEvent { .. } => "update event",
            Mutation::DeleteEvent(_) => "delete event",
        }
    }
}

/// Optimistic local change to undo if the mutation fails
#[derive(Debug, Clone, PartialEq)]
pub enum Revert {
    EventColor { event_id: EventId, color: String },
}

/// Everything a mutation touched, re-fetched once it has finished
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Affected {
    pub keys: Vec<CacheKey>,
    pub events: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    /// Fetch the event list; the number orders concurrent fetches
    FetchEvents(u64),
    Load(Refresh),
    Mutate {
        mutation: Mutation,
        affected: Affected,
        revert: Option<Revert>,
    },
}

#[derive(Debug)]
pub enum JobOutcome {
    Events(u64, Result<Vec<Event>>),
    Loaded(Refresh, Result<Vec<Item>>),
    Mutated {
        label: &'static str,
        result: Result<()>,
        affected: Affected,
        revert: Option<Revert>,
    },
}

/// Spawns jobs on tokio tasks, with at most `limit` of them talking to the
/// backend at a time. Outcomes arrive on the channel in completion order.
pub struct JobRunner {
    api: Arc<ApiClient>,
    permits: Arc<Semaphore>,
    outcomes: mpsc::UnboundedSender<JobOutcome>,
}

impl JobRunner {
    pub fn new(api: Arc<ApiClient>, limit: usize, outcomes: mpsc::UnboundedSender<JobOutcome>) -> Self {
        Self {
            api,
            permits: Arc::new(Semaphore::new(limit.max(1))),
            outcomes,
        }
    }

    pub fn spawn(&self, job: Job) {
        let api = Arc::clone(&self.api);
        let permits = Arc::clone(&self.permits);
        let outcomes = self.outcomes.clone();
        tokio::spawn(async move {
            // The semaphore is never closed
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            let outcome = run(&api, job).await;
            // The receiver only goes away on shutdown
            let _ = outcomes.send(outcome);
        });
    }
}

pub async fn run(api: &ApiClient, job: Job) -> JobOutcome {
    match job {
        Job::FetchEvents(seq) => JobOutcome::Events(seq, api.list_events().await),
        Job::Load(refresh) => JobOutcome::Loaded(refresh, load(api, refresh.key).await),
        Job::Mutate {
            mutation,
            affected,
            revert,
        } => JobOutcome::Mutated {
            label: mutation.label(),
            result: apply(api, &mutation).await,
            affected,
            revert,
        },
    }
}

pub async fn load<S: ItemSource>(source: &S, key: CacheKey) -> Result<Vec<Item>> {
    match key {
        CacheKey::Date(date) => source.items_for_date(date).await,
        CacheKey::Event(event_id) => source.items_for_event(event_id).await,
    }
}

async fn apply(api: &ApiClient, mutation: &Mutation) -> Result<()> {
    match mutation {
        Mutation::CreateItem(item) => {
            let created = api.create_item(item).await?;
            tracing::info!(id = created.id, event_id = created.event_id, date = %created.date, "item created");
        }
        Mutation::UpdateItem { id, patch } => {
            api.update_item(*id, patch).await?;
        }
        Mutation::DeleteItems(ids) => {
            for id in ids {
                api.delete_item(*id).await?;
            }
        }
        Mutation::CreateEvent(event) => {
            let created = api.create_event(event).await?;
            tracing::info!(id = created.id, "event created");
        }
        Mutation::UpdateEvent { id, patch } => {
            api.update_event(*id, patch).await?;
        }
        Mutation::DeleteEvent(id) => {
            api.delete_event(*id).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{client_for, item_json};
    use crate::cache::ItemCache;
    use chrono::NaiveDate;
    use std::time::{Duration, Instant};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[tokio::test]
    async fn test_delete_items_removes_each_and_reports_affected() {
        let server = MockServer::start().await;
        for id in [3, 4] {
            Mock::given(method("DELETE"))
                .and(path(format!("/items/{}", id)))
                .respond_with(ResponseTemplate::new(204))
                .expect(1)
                .mount(&server)
                .await;
        }

        let api = client_for(&server);
        let affected = Affected {
            keys: vec![CacheKey::Date(date())],
            events: false,
        };
        let outcome = run(
            &api,
            Job::Mutate {
                mutation: Mutation::DeleteItems(vec![3, 4]),
                affected: affected.clone(),
                revert: None,
            },
        )
        .await;

        let JobOutcome::Mutated {
            result,
            affected: returned,
            ..
        } = outcome
        else {
            panic!("expected a mutation outcome");
        };
        assert!(result.is_ok());
        assert_eq!(returned, affected);
    }

    #[tokio::test]
    async fn test_failed_mutation_keeps_revert() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/events/2"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let api = client_for(&server);
        let revert = Revert::EventColor {
            event_id: 2,
            color: "#112233".to_string(),
        };
        let outcome = run(
            &api,
            Job::Mutate {
                mutation: Mutation::UpdateEvent {
                    id: 2,
                    patch: EventPatch {
                        color: Some("#ffffff".to_string()),
                        ..EventPatch::default()
                    },
                },
                affected: Affected {
                    keys: vec![],
                    events: true,
                },
                revert: Some(revert.clone()),
            },
        )
        .await;

        let JobOutcome::Mutated {
            label,
            result,
            revert: returned,
            ..
        } = outcome
        else {
            panic!("expected a mutation outcome");
        };
        assert_eq!(label, "update event");
        assert!(result.is_err());
        assert_eq!(returned, Some(revert));
    }

    #[tokio::test]
    async fn test_load_by_event() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(query_param("event_id", "7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                item_json(1, 7, "2024-01-15", "a"),
                item_json(2, 7, "2024-02-01", "b")
            ])))
            .mount(&server)
            .await;

        let api = client_for(&server);
        let mut cache = ItemCache::new();
        let refresh = cache.issue(CacheKey::Event(7));
        let JobOutcome::Loaded(r, Ok(items)) = run(&api, Job::Load(refresh)).await else {
            panic!("expected a load outcome");
        };
        assert!(cache.apply(r, items));
        assert_eq!(cache.get(date()).len(), 1);
    }

    #[tokio::test]
    async fn test_runner_caps_requests_in_flight() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([]))
                    .set_delay(Duration::from_millis(150)),
            )
            .expect(6)
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let runner = JobRunner::new(Arc::new(client_for(&server)), 2, tx);
        let mut cache = ItemCache::new();

        let started = Instant::now();
        for offset in 0..6 {
            let day = date() + chrono::Days::new(offset);
            runner.spawn(Job::Load(cache.issue(CacheKey::Date(day))));
        }
        for _ in 0..6 {
            let outcome = rx.recv().await.unwrap();
            assert!(matches!(outcome, JobOutcome::Loaded(_, Ok(_))));
        }

        // Six requests two at a time take three rounds of the delay
        assert!(started.elapsed() >= Duration::from_millis(450));
    }
}
