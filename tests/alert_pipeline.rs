// Argus Host Monitoring Service - Alert Pipeline Integration Tests
// Store -> evaluator -> event channel -> notifier -> in-app ring

use argus::alerts::{
    AlertConfig, AlertEvaluator, AlertState, AlertStore, CompareOp, EvaluatorConfig, Severity,
    Threshold,
};
use argus::clock::{Clock, ManualClock};
use argus::metrics::{CpuMetric, MetricKey, MetricSource, MetricsError};
use argus::notify::{
    InAppChannel, NotificationChannel, NotificationConfig, NotificationTarget, Notifier,
    NotifierConfig, TemplateRegistry,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

/// Metric source fed by the test.
struct ScriptedSource {
    value: Mutex<f64>,
}

impl ScriptedSource {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            value: Mutex::new(0.0),
        })
    }

    fn set(&self, value: f64) {
        *self.value.lock().unwrap() = value;
    }
}

#[async_trait]
impl MetricSource for ScriptedSource {
    async fn current_value(&self, _key: &MetricKey) -> Result<f64, MetricsError> {
        Ok(*self.value.lock().unwrap())
    }
}

struct Pipeline {
    evaluator: Arc<AlertEvaluator>,
    notifier: Arc<Notifier>,
    inapp: Arc<InAppChannel>,
    source: Arc<ScriptedSource>,
    clock: Arc<ManualClock>,
    _dir: tempfile::TempDir,
}

async fn pipeline(alert: AlertConfig, notifier_config: NotifierConfig) -> Pipeline {
    let dir = tempdir().unwrap();
    let store = Arc::new(AlertStore::open(dir.path()).await.unwrap());
    store.create(&alert).await.unwrap();

    let clock = Arc::new(ManualClock::starting_now());
    let source = ScriptedSource::new();

    let (evaluator, events) = AlertEvaluator::new(
        EvaluatorConfig::default(),
        store,
        Arc::clone(&source) as Arc<dyn MetricSource>,
        Arc::clone(&clock) as Arc<dyn Clock>,
    );
    let evaluator = Arc::new(evaluator);

    let inapp = Arc::new(InAppChannel::new(notifier_config.inapp_max_size));
    let notifier = Notifier::new(
        &notifier_config,
        TemplateRegistry::builtin(),
        Arc::clone(&clock) as Arc<dyn Clock>,
    );
    notifier.register_channel(Arc::clone(&inapp) as Arc<dyn NotificationChannel>);
    let notifier = Arc::new(notifier);
    notifier.start(events).await;

    Pipeline {
        evaluator,
        notifier,
        inapp,
        source,
        clock,
        _dir: dir,
    }
}

fn cpu_alert(sustained_for: Option<u32>) -> AlertConfig {
    let now = Utc::now();
    AlertConfig {
        id: "cpu-high".to_string(),
        name: "CPU High".to_string(),
        description: "cpu above the line".to_string(),
        severity: Severity::Critical,
        enabled: true,
        threshold: Threshold {
            metric: MetricKey::Cpu(CpuMetric::UsagePercent),
            operator: CompareOp::Gt,
            value: 90.0,
            duration_secs: None,
            sustained_for,
        },
        notifications: vec![NotificationConfig {
            enabled: true,
            target: NotificationTarget::InApp,
        }],
        created_at: now,
        updated_at: now,
    }
}

async fn tick(p: &Pipeline, value: f64) {
    p.source.set(value);
    p.clock.advance(Duration::seconds(30));
    p.evaluator.evaluate_once().await;
    // Let the notifier loop drain the event channel.
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
}

#[tokio::test]
async fn test_sustained_activation_reaches_inapp_ring() {
    let p = pipeline(cpu_alert(Some(3)), NotifierConfig::default()).await;

    tick(&p, 95.0).await;
    tick(&p, 95.0).await;
    assert!(p.inapp.notifications().is_empty());

    tick(&p, 95.0).await;

    let items = p.inapp.notifications();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].alert_id, "cpu-high");
    assert_eq!(items[0].severity, Severity::Critical);
    assert_eq!(items[0].state, AlertState::Active);
    assert_eq!(items[0].subject, "[CRITICAL] CPU High triggered");
    assert!(items[0].message.contains("cpu.usage_percent"));
    assert!(!items[0].read);

    p.evaluator.stop().await;
    p.notifier.stop().await;
}

#[tokio::test]
async fn test_activation_then_resolution_notifications() {
    let p = pipeline(cpu_alert(None), NotifierConfig::default()).await;

    // Immediate activation path: pending, then active.
    tick(&p, 95.0).await;
    tick(&p, 95.0).await;
    assert_eq!(p.inapp.notifications().len(), 1);

    // Two below-threshold ticks resolve (default resolve count 2).
    tick(&p, 50.0).await;
    tick(&p, 50.0).await;

    let items = p.inapp.notifications();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].subject, "[CRITICAL] CPU High resolved");
    assert_eq!(items[0].state, AlertState::Inactive);
    assert_eq!(items[1].subject, "[CRITICAL] CPU High triggered");

    let status = p.evaluator.status("cpu-high").await.unwrap();
    assert_eq!(status.state, AlertState::Inactive);
    assert!(status.resolved_at.is_some());
    assert!(status.triggered_at.is_none());

    p.evaluator.stop().await;
    p.notifier.stop().await;
}

#[tokio::test]
async fn test_rate_limit_across_repeated_flapping() {
    let config = NotifierConfig {
        rate_limit: 2,
        ..NotifierConfig::default()
    };
    let p = pipeline(cpu_alert(None), config).await;

    // Six activations inside one window; only two reach the ring.
    for _ in 0..6 {
        tick(&p, 95.0).await; // pending
        tick(&p, 95.0).await; // active -> notification attempt
        tick(&p, 10.0).await;
        tick(&p, 10.0).await; // resolved -> another attempt
    }

    let delivered = p.inapp.notifications();
    assert_eq!(delivered.len(), 2);

    p.evaluator.stop().await;
    p.notifier.stop().await;
}

#[tokio::test]
async fn test_synthesized_event_flows_to_channel() {
    let p = pipeline(cpu_alert(Some(3)), NotifierConfig::default()).await;

    let event = p.evaluator.synthesize_event("cpu-high").await.unwrap();
    assert_eq!(event.current_value, 91.0);

    tokio::time::sleep(std::time::Duration::from_millis(30)).await;

    let items = p.inapp.notifications();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].alert_id, "cpu-high");
    assert_eq!(items[0].state, AlertState::Active);

    // Real status map untouched by the synthetic event.
    assert!(p.evaluator.status("cpu-high").await.is_none());

    p.evaluator.stop().await;
    p.notifier.stop().await;
}

#[tokio::test]
async fn test_status_map_invariant_on_first_tick() {
    let p = pipeline(cpu_alert(Some(3)), NotifierConfig::default()).await;

    tick(&p, 10.0).await;

    let statuses = p.evaluator.all_statuses().await;
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses["cpu-high"].state, AlertState::Inactive);

    p.evaluator.stop().await;
    p.notifier.stop().await;
}
