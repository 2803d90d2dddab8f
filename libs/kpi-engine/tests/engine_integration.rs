//! End-to-end tests for the engine facade

#![allow(clippy::disallowed_methods)] // Integration test - unwrap is acceptable

use std::sync::Arc;

use kpi_engine::{EngineConfig, KpiEngine, MemorySink, MemoryValueSource, MetricRegistry};
use kpi_model::{DataSourceDescriptor, DataSourceType, Metric, MetricId, Quality};

const DEFINITIONS: &str = r#"
- id: 中压拓扑.配变统计.配变总数
  name: 配变总数
  unit: 台
  kind: basic
  data_source:
    type: database
    address: "SELECT count(*) FROM transformer"
- id: 中压拓扑.拓扑不一致.数量
  name: 拓扑不一致数量
  unit: 台
  kind: basic
  data_source:
    type: manual
    address: memory
- id: 中压拓扑.拓扑一致率.比例
  name: 拓扑一致率
  unit: "%"
  kind: derived
  formula: "(1 - 中压拓扑.拓扑不一致.数量 / 中压拓扑.配变统计.配变总数) * 100"
  dependencies:
    - 中压拓扑.拓扑不一致.数量
    - 中压拓扑.配变统计.配变总数
"#;

fn id(s: &str) -> MetricId {
    MetricId::new(s)
}

fn manual(s: &str) -> Metric {
    Metric::basic(
        id(s),
        s,
        "",
        Some(DataSourceDescriptor::new(DataSourceType::Manual, "memory")),
    )
}

fn derived(s: &str, formula: &str, deps: &[&str]) -> Metric {
    Metric::derived(id(s), s, "", formula, deps.iter().map(|d| id(d)).collect())
}

fn test_config() -> EngineConfig {
    EngineConfig {
        settle_delay_ms: 0,
        ..Default::default()
    }
}

fn engine_with(metrics: Vec<Metric>) -> (KpiEngine, Arc<MemoryValueSource>, Arc<MemorySink>) {
    let source = Arc::new(MemoryValueSource::new());
    let sink = Arc::new(MemorySink::new());
    let engine = KpiEngine::new(
        test_config(),
        Arc::new(MetricRegistry::from_metrics(metrics)),
        source.clone(),
        sink.clone(),
    )
    .unwrap();
    (engine, source, sink)
}

#[tokio::test]
async fn test_yaml_definitions_compute_rate() {
    let metrics: Vec<Metric> = serde_yaml::from_str(DEFINITIONS).unwrap();
    let (engine, source, _sink) = engine_with(metrics);
    source.set_value("中压拓扑.配变统计.配变总数", 200.0);
    source.set_value("中压拓扑.拓扑不一致.数量", 5.0);

    let value = engine.calculate(&id("中压拓扑.拓扑一致率.比例")).await;
    assert_eq!(value.quality, Quality::Good);
    assert_eq!(value.value, Some(97.5));
    assert_eq!(value.unit, "%");
}

#[tokio::test]
async fn test_repeated_calculation_returns_cached_value() {
    let (engine, source, _sink) = engine_with(vec![
        manual("k.k.a"),
        derived("k.k.b", "k.k.a * 2", &["k.k.a"]),
    ]);
    source.set_value("k.k.a", 21.0);

    let first = engine.calculate(&id("k.k.b")).await;
    let second = engine.calculate(&id("k.k.b")).await;
    assert_eq!(first.value, Some(42.0));
    assert_eq!(first.timestamp, second.timestamp);
    assert_eq!(first, second);
    assert_eq!(engine.cache_stats().hits, 1);
}

#[tokio::test]
async fn test_unknown_metric() {
    let (engine, _source, _sink) = engine_with(vec![]);
    let value = engine.calculate(&id("no.such.metric")).await;
    assert_eq!(value.quality, Quality::Error);
    assert!(value.value.is_none());
    assert_eq!(
        value.message.as_deref(),
        Some("Metric not found: no.such.metric")
    );
}

#[tokio::test]
async fn test_cycle_reported_for_all_members() {
    let (engine, _source, _sink) = engine_with(vec![
        derived("c.c.a", "c.c.b + 1", &["c.c.b"]),
        derived("c.c.b", "c.c.c + 1", &["c.c.c"]),
        derived("c.c.c", "c.c.a + 1", &["c.c.a"]),
    ]);

    for name in ["c.c.a", "c.c.b", "c.c.c"] {
        let value = engine.calculate(&id(name)).await;
        assert!(value.is_error());
        let message = value.message.unwrap();
        assert!(message.contains("Circular dependency"), "{}", message);
    }
    assert!(engine.propagator().has_cycle());
}

#[tokio::test]
async fn test_upsert_validation_warnings_and_errors() {
    let (engine, _source, _sink) = engine_with(vec![manual("v.v.a"), manual("v.v.b")]);

    // Referenced but undeclared: accepted with a warning
    let result = engine.upsert_metric(derived("v.v.sum", "v.v.a + v.v.b", &["v.v.a"]));
    assert!(result.is_valid());
    assert_eq!(result.warnings.len(), 1);
    assert!(engine.registry().contains(&id("v.v.sum")));

    // Referenced but unregistered: rejected
    let result = engine.upsert_metric(derived("v.v.bad", "v.v.a + v.v.ghost", &["v.v.a"]));
    assert!(!result.is_valid());
    assert!(result.errors[0].contains("v.v.ghost"));
    assert!(!engine.registry().contains(&id("v.v.bad")));

    // Malformed id: rejected
    let result = engine.upsert_metric(manual("not-three-segments"));
    assert!(!result.is_valid());
}

#[tokio::test]
async fn test_upsert_rejects_definition_closing_a_cycle() {
    let (engine, _source, _sink) = engine_with(vec![
        derived("u.u.a", "u.u.b * 2", &["u.u.b"]),
        derived("u.u.b", "u.u.c * 2", &["u.u.c"]),
        manual("u.u.c"),
    ]);

    let result = engine.upsert_metric(derived("u.u.c", "u.u.a + 1", &["u.u.a"]));
    assert!(!result.is_valid());
    assert!(!engine.registry().get(&id("u.u.c")).unwrap().is_derived());
}

#[tokio::test]
async fn test_upsert_invalidates_dependents() {
    let (engine, source, _sink) = engine_with(vec![
        manual("i.i.a"),
        manual("i.i.b"),
        derived("i.i.mid", "i.i.a + 1", &["i.i.a"]),
        derived("i.i.top", "i.i.mid * 10", &["i.i.mid"]),
    ]);
    source.set_value("i.i.a", 1.0);
    source.set_value("i.i.b", 5.0);
    assert_eq!(engine.calculate(&id("i.i.top")).await.value, Some(20.0));

    let result = engine.upsert_metric(derived("i.i.mid", "i.i.b + 1", &["i.i.b"]));
    assert!(result.is_valid());
    assert_eq!(engine.calculate(&id("i.i.top")).await.value, Some(60.0));
    assert_eq!(
        engine.dependents_of(&id("i.i.b")).into_iter().collect::<Vec<_>>(),
        vec![id("i.i.mid")]
    );
    assert!(engine.dependents_of(&id("i.i.a")).is_empty());
}

#[tokio::test]
async fn test_remove_metric_breaks_dependents() {
    let (engine, source, _sink) = engine_with(vec![
        manual("r.r.a"),
        derived("r.r.b", "r.r.a + 1", &["r.r.a"]),
    ]);
    source.set_value("r.r.a", 1.0);
    assert_eq!(engine.calculate(&id("r.r.b")).await.value, Some(2.0));

    assert!(engine.remove_metric(&id("r.r.a")).is_some());
    assert!(engine.remove_metric(&id("r.r.a")).is_none());

    let value = engine.calculate(&id("r.r.b")).await;
    assert!(value.is_error());
    assert!(value.message.unwrap().contains("Referenced metric not found"));
}

#[tokio::test]
async fn test_calculate_many() {
    let (engine, source, _sink) = engine_with(vec![
        manual("m.m.a"),
        derived("m.m.sqrt", "sqrt(m.m.a)", &["m.m.a"]),
        derived("m.m.max", "max(m.m.a, 4)", &["m.m.a"]),
    ]);
    source.set_value("m.m.a", 16.0);

    let results = engine
        .calculate_many(&[id("m.m.sqrt"), id("m.m.max")])
        .await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[&id("m.m.sqrt")].value, Some(4.0));
    assert_eq!(results[&id("m.m.max")].value, Some(16.0));
    assert_eq!(source.fetch_count(), 1);
}

#[test]
fn test_invalid_config_rejected() {
    let config = EngineConfig {
        worker_count: 0,
        ..Default::default()
    };
    let result = KpiEngine::new(
        config,
        Arc::new(MetricRegistry::new()),
        Arc::new(MemoryValueSource::new()),
        Arc::new(MemorySink::new()),
    );
    assert!(result.is_err());
}
