use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use http::HeaderMap;
use seb_core::{
    BrokerError, BrokerResponse, CounterMetrics, DomainEvent, EventBroker, EventEnvelope,
    EventReceiver, EventStore, HandshakeEnvelope, InMemoryEventStore, InMemoryTeamDirectory,
    MetricsSnapshot, SharedEventReceiver, Team, TeamError,
};
use serde_json::json;

type Journal = Arc<Mutex<Vec<String>>>;

/// Appends its name to the journal and optionally fails afterwards.
struct Recording {
    name: &'static str,
    priority: Option<i32>,
    only: Option<&'static str>,
    fail: Option<&'static str>,
    escalate: bool,
    journal: Journal,
}

impl Recording {
    fn new(name: &'static str, journal: &Journal) -> Self {
        Self {
            name,
            priority: None,
            only: None,
            fail: None,
            escalate: false,
            journal: journal.clone(),
        }
    }

    fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    fn only_for(mut self, event_type: &'static str) -> Self {
        self.only = Some(event_type);
        self
    }

    fn failing(mut self, message: &'static str) -> Self {
        self.fail = Some(message);
        self
    }

    fn escalating(mut self, message: &'static str) -> Self {
        self.fail = Some(message);
        self.escalate = true;
        self
    }

    fn shared(self) -> SharedEventReceiver {
        Arc::new(self)
    }
}

#[async_trait]
impl EventReceiver for Recording {
    fn name(&self) -> &str {
        self.name
    }

    fn supports_event(&self, event: &DomainEvent) -> bool {
        self.only.is_none_or(|kind| kind == event.event_type)
    }

    fn priority(&self) -> i32 {
        self.priority.unwrap_or(seb_core::LOWEST_PRIORITY)
    }

    async fn on_receive_event(
        &self,
        _event: &DomainEvent,
        _headers: &HeaderMap,
        _team: &Team,
    ) -> anyhow::Result<()> {
        self.journal.lock().unwrap().push(self.name.to_string());
        match self.fail {
            Some(message) => Err(anyhow!(message)),
            None => Ok(()),
        }
    }

    fn should_escalate(&self, _failure: &anyhow::Error) -> bool {
        self.escalate
    }
}

struct Fixture {
    events: Arc<InMemoryEventStore>,
    metrics: Arc<CounterMetrics>,
    broker: EventBroker,
}

fn fixture(receivers: Vec<SharedEventReceiver>) -> Fixture {
    let teams = Arc::new(InMemoryTeamDirectory::with_teams([Team::new("TestId")]));
    let events = Arc::new(InMemoryEventStore::new());
    let metrics = Arc::new(CounterMetrics::new());
    let broker = EventBroker::new(receivers, teams, events.clone()).with_metrics(metrics.clone());
    Fixture {
        events,
        metrics,
        broker,
    }
}

fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

fn event(event_id: &str, event_type: &str) -> EventEnvelope {
    EventEnvelope::Event(DomainEvent::new(event_id, "TestId", event_type))
}

#[tokio::test]
async fn success_and_error_receivers_both_run() {
    let log = journal();
    let fx = fixture(vec![
        Recording::new("success", &log).shared(),
        Recording::new("error", &log).failing("Failing Test Case").shared(),
    ]);

    let response = fx
        .broker
        .receive(&event("Ev1", "message"), &HeaderMap::new())
        .await
        .unwrap();

    assert_eq!(response, BrokerResponse::Empty);
    assert_eq!(entries(&log), ["success", "error"]);
    assert_eq!(
        fx.metrics.snapshot(),
        MetricsSnapshot {
            events_received: 1,
            receiver_executed: 2,
            receiver_execution_errors: 1,
        }
    );
}

#[tokio::test]
async fn broker_without_metrics_behaves_the_same() {
    let log = journal();
    let teams = Arc::new(InMemoryTeamDirectory::with_teams([Team::new("TestId")]));
    let broker = EventBroker::new(
        vec![
            Recording::new("error", &log).failing("boom").shared(),
            Recording::new("success", &log).shared(),
        ],
        teams,
        Arc::new(InMemoryEventStore::new()),
    );

    let response = broker
        .receive(&event("Ev1", "message"), &HeaderMap::new())
        .await
        .unwrap();
    assert_eq!(response, BrokerResponse::Empty);
    assert_eq!(entries(&log), ["error", "success"]);
}

#[tokio::test]
async fn redelivered_event_runs_chain_once() {
    let log = journal();
    let fx = fixture(vec![Recording::new("only", &log).shared()]);
    let envelope = event("TestEventId", "message");

    fx.broker.receive(&envelope, &HeaderMap::new()).await.unwrap();
    let second = fx.broker.receive(&envelope, &HeaderMap::new()).await.unwrap();

    assert_eq!(second, BrokerResponse::Empty);
    assert_eq!(entries(&log), ["only"]);
    let snapshot = fx.metrics.snapshot();
    assert_eq!(snapshot.events_received, 2);
    assert_eq!(snapshot.receiver_executed, 1);
}

#[tokio::test]
async fn event_already_in_store_is_skipped() {
    let log = journal();
    let fx = fixture(vec![
        Recording::new("success", &log).shared(),
        Recording::new("error", &log).failing("boom").shared(),
    ]);
    fx.events.put("TestEventId").await.unwrap();

    fx.broker
        .receive(&event("TestEventId", "message"), &HeaderMap::new())
        .await
        .unwrap();

    assert!(entries(&log).is_empty());
    assert_eq!(fx.metrics.snapshot().receiver_execution_errors, 0);
}

#[tokio::test]
async fn receivers_run_in_priority_order() {
    let log = journal();
    let fx = fixture(vec![
        Recording::new("third", &log).with_priority(3).shared(),
        Recording::new("second", &log).with_priority(2).shared(),
        Recording::new("first", &log).with_priority(1).shared(),
    ]);

    fx.broker
        .receive(&event("Ev1", "message"), &HeaderMap::new())
        .await
        .unwrap();

    assert_eq!(entries(&log), ["first", "second", "third"]);
}

#[tokio::test]
async fn equal_priorities_keep_registration_order() {
    let log = journal();
    let fx = fixture(vec![
        Recording::new("unprioritised", &log).shared(),
        Recording::new("a", &log).with_priority(5).shared(),
        Recording::new("b", &log).with_priority(5).shared(),
    ]);

    fx.broker
        .receive(&event("Ev1", "message"), &HeaderMap::new())
        .await
        .unwrap();

    assert_eq!(entries(&log), ["a", "b", "unprioritised"]);
}

#[tokio::test]
async fn escalation_is_deferred_until_chain_completes() {
    let log = journal();
    let fx = fixture(vec![
        Recording::new("escalating", &log)
            .with_priority(1)
            .escalating("must surface")
            .shared(),
        Recording::new("after", &log).with_priority(2).shared(),
    ]);

    let err = fx
        .broker
        .receive(&event("Ev1", "message"), &HeaderMap::new())
        .await
        .unwrap_err();

    assert_eq!(entries(&log), ["escalating", "after"]);
    let BrokerError::Escalated(escalated) = err else {
        panic!("expected escalated failure");
    };
    assert_eq!(escalated.receivers().collect::<Vec<_>>(), ["escalating"]);
    assert_eq!(escalated.failures[0].failure.to_string(), "must surface");
}

#[tokio::test]
async fn composite_escalation_lists_every_escalating_receiver() {
    let log = journal();
    let fx = fixture(vec![
        Recording::new("first", &log).escalating("one").shared(),
        Recording::new("quiet", &log).failing("swallowed").shared(),
        Recording::new("second", &log).escalating("two").shared(),
    ]);

    let err = fx
        .broker
        .receive(&event("Ev1", "message"), &HeaderMap::new())
        .await
        .unwrap_err();

    let BrokerError::Escalated(escalated) = err else {
        panic!("expected escalated failure");
    };
    assert_eq!(escalated.receivers().collect::<Vec<_>>(), ["first", "second"]);
    assert_eq!(fx.metrics.snapshot().receiver_execution_errors, 3);
}

#[tokio::test]
async fn unsupported_receivers_are_skipped() {
    let log = journal();
    let fx = fixture(vec![
        Recording::new("users", &log).only_for("user_change").shared(),
        Recording::new("messages", &log).only_for("message").shared(),
    ]);

    fx.broker
        .receive(&event("Ev1", "message"), &HeaderMap::new())
        .await
        .unwrap();
    assert_eq!(entries(&log), ["messages"]);

    fx.broker
        .receive(&event("Ev2", "user_change"), &HeaderMap::new())
        .await
        .unwrap();
    assert_eq!(entries(&log), ["messages", "users"]);
}

#[tokio::test]
async fn handshake_echoes_token_without_dispatch() {
    let log = journal();
    let fx = fixture(vec![Recording::new("never", &log).shared()]);
    let envelope = EventEnvelope::Handshake(HandshakeEnvelope {
        token: "challenge-token".into(),
    });

    let response = fx.broker.receive(&envelope, &HeaderMap::new()).await.unwrap();

    assert_eq!(response, BrokerResponse::Challenge("challenge-token".into()));
    assert_eq!(response.to_json(), json!({"challenge": "challenge-token"}));
    assert!(entries(&log).is_empty());
    assert!(fx.events.is_empty());
    assert_eq!(
        fx.metrics.snapshot(),
        MetricsSnapshot {
            events_received: 1,
            receiver_executed: 0,
            receiver_execution_errors: 0,
        }
    );
}

#[tokio::test]
async fn unknown_team_aborts_before_receivers() {
    let log = journal();
    let fx = fixture(vec![Recording::new("never", &log).shared()]);
    let envelope = EventEnvelope::Event(DomainEvent::new("Ev1", "Unregistered", "message"));

    let err = fx
        .broker
        .receive(&envelope, &HeaderMap::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BrokerError::Team(TeamError::NotFound { ref team_id }) if team_id == "Unregistered"
    ));
    assert!(entries(&log).is_empty());
    assert_eq!(fx.metrics.snapshot().receiver_executed, 0);
}

#[tokio::test]
async fn unknown_team_still_marks_event_seen() {
    let log = journal();
    let fx = fixture(vec![Recording::new("never", &log).shared()]);
    let envelope = EventEnvelope::Event(DomainEvent::new("Ev1", "Unregistered", "message"));

    assert!(fx.broker.receive(&envelope, &HeaderMap::new()).await.is_err());
    assert!(fx.events.exists("Ev1").await.unwrap());

    let redelivery = fx.broker.receive(&envelope, &HeaderMap::new()).await.unwrap();
    assert_eq!(redelivery, BrokerResponse::Empty);
}

#[tokio::test]
async fn headers_reach_every_receiver() {
    struct HeaderProbe(Journal);

    #[async_trait]
    impl EventReceiver for HeaderProbe {
        async fn on_receive_event(
            &self,
            _event: &DomainEvent,
            headers: &HeaderMap,
            team: &Team,
        ) -> anyhow::Result<()> {
            let retry = headers
                .get("x-slack-retry-num")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("none");
            self.0
                .lock()
                .unwrap()
                .push(format!("{}:{retry}", team.team_id));
            Ok(())
        }
    }

    let log = journal();
    let fx = fixture(vec![
        Arc::new(HeaderProbe(log.clone())) as SharedEventReceiver,
        Arc::new(HeaderProbe(log.clone())),
    ]);
    let mut headers = HeaderMap::new();
    headers.insert("x-slack-retry-num", "1".parse().unwrap());

    fx.broker
        .receive(&event("Ev1", "message"), &headers)
        .await
        .unwrap();

    assert_eq!(entries(&log), ["TestId:1", "TestId:1"]);
}

#[tokio::test]
async fn parsed_payload_dispatches_end_to_end() {
    let log = journal();
    let fx = fixture(vec![Recording::new("messages", &log).only_for("message").shared()]);
    let envelope = EventEnvelope::from_value(json!({
        "type": "event_callback",
        "team_id": "TestId",
        "event_id": "Ev9",
        "event": {"type": "message", "text": "hi"}
    }))
    .unwrap();

    let response = fx.broker.receive(&envelope, &HeaderMap::new()).await.unwrap();
    assert_eq!(response.to_json(), json!({}));
    assert_eq!(entries(&log), ["messages"]);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn non_escalating_failures_are_logged() {
    let log = journal();
    let fx = fixture(vec![Recording::new("noisy", &log).failing("disk full").shared()]);

    fx.broker
        .receive(&event("Ev1", "message"), &HeaderMap::new())
        .await
        .unwrap();

    assert!(logs_contain("event receiver failed"));
    assert!(logs_contain("disk full"));
}

#[tokio::test]
#[tracing_test::traced_test]
async fn escalating_failures_are_not_logged_as_errors() {
    let log = journal();
    let fx = fixture(vec![Recording::new("deliberate", &log).escalating("signal").shared()]);

    assert!(
        fx.broker
            .receive(&event("Ev1", "message"), &HeaderMap::new())
            .await
            .is_err()
    );

    assert!(!logs_contain("event receiver failed"));
    assert!(logs_contain("receiver escalated failure"));
}

#[tokio::test]
async fn unavailable_event_store_fails_open() {
    struct Offline;

    #[async_trait]
    impl EventStore for Offline {
        async fn exists(&self, _event_id: &str) -> anyhow::Result<bool> {
            Err(anyhow!("store offline"))
        }

        async fn put(&self, _event_id: &str) -> anyhow::Result<()> {
            Err(anyhow!("store offline"))
        }
    }

    let log = journal();
    let teams = Arc::new(InMemoryTeamDirectory::with_teams([Team::new("TestId")]));
    let broker = EventBroker::new(
        vec![Recording::new("still-runs", &log).shared()],
        teams,
        Arc::new(Offline),
    );

    broker
        .receive(&event("Ev1", "message"), &HeaderMap::new())
        .await
        .unwrap();
    assert_eq!(entries(&log), ["still-runs"]);
}
