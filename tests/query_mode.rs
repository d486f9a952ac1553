mod support;

use std::sync::Arc;
use std::time::Duration;

use mltrain::cluster::TrainResponse;
use mltrain::config::AppConfig;
use mltrain::data_source::DataSourceMode;
use mltrain::training::{Lifecycle, PreviewError, TrainingSession};
use serde_json::json;
use support::stub_api::{ScriptedTrainingApi, StubQueryApi};

const SETTLE: Duration = Duration::from_secs(5);

fn query_session(
    query_api: StubQueryApi,
) -> (TrainingSession, Arc<ScriptedTrainingApi>, Arc<StubQueryApi>) {
    let training = Arc::new(ScriptedTrainingApi::new(Ok(TrainResponse::completed("q-1"))));
    let query_api = Arc::new(query_api);
    let mut session = TrainingSession::new(&AppConfig::default(), training.clone())
        .with_query_api(query_api.clone());
    session.set_mode(DataSourceMode::Query);
    (session, training, query_api)
}

fn iris_hits() -> Vec<serde_json::Value> {
    vec![
        json!({"_source": {"petal_length": 1.4, "petal_width": 0.2}}),
        json!({"_source": {"petal_length": 4.7, "petal_width": 1.4}}),
    ]
}

#[test]
fn query_submission_sends_indices_fields_and_query() {
    let (mut session, training, _query) = query_session(StubQueryApi::new(Vec::new()));
    session.set_query_fields("iris", vec!["petal_length".into(), "petal_width".into()]);
    session.set_query(Some(json!({"term": {"species": "setosa"}})));
    session.submit();
    assert!(session.wait_until_settled(SETTLE));
    assert_eq!(
        session.lifecycle(),
        &Lifecycle::Succeeded {
            model_id: "q-1".into()
        }
    );

    let sent = training.sent.lock().unwrap();
    let body = serde_json::to_value(&sent[0].0.body).unwrap();
    assert_eq!(body["input_index"], json!(["iris"]));
    assert_eq!(
        body["input_query"]["_source"],
        json!(["petal_length", "petal_width"])
    );
    assert_eq!(body["input_query"]["query"], json!({"term": {"species": "setosa"}}));
    assert!(body.get("input_data").is_none());
}

#[test]
fn query_mode_without_a_query_fails_before_sending() {
    let (mut session, training, _query) = query_session(StubQueryApi::new(Vec::new()));
    session.set_query_fields("iris", vec!["petal_length".into()]);
    session.submit();
    assert!(matches!(session.lifecycle(), Lifecycle::Failed { .. }));
    assert!(!session.is_busy());
    assert!(training.sent.lock().unwrap().is_empty());
}

#[test]
fn preview_builds_a_table_from_hits() {
    let (mut session, _training, query) = query_session(StubQueryApi::new(iris_hits()));
    assert_eq!(session.begin_query_preview(), Err(PreviewError::NoFields));

    session.set_query_fields("iris", vec!["petal_length".into(), "petal_width".into()]);
    session.begin_query_preview().unwrap();
    assert!(session.wait_until_settled(SETTLE));

    let table = session.preview().unwrap();
    assert_eq!(table.columns, vec!["petal_length", "petal_width"]);
    assert_eq!(table.rows.len(), 2);
    let searches = query.searches.lock().unwrap();
    assert_eq!(searches[0].size, AppConfig::default().training.preview_size);
    assert_eq!(searches[0].indices, vec!["iris"]);
}

#[test]
fn editing_fields_discards_a_preview_in_flight() {
    let mut stub = StubQueryApi::new(iris_hits());
    stub.delay = Duration::from_millis(100);
    let (mut session, _training, _query) = query_session(stub);
    session.set_query_fields("iris", vec!["petal_length".into()]);
    session.begin_query_preview().unwrap();
    session.set_query_fields("iris", vec!["petal_width".into()]);
    assert!(session.wait_until_settled(SETTLE));
    std::thread::sleep(Duration::from_millis(200));
    session.poll();
    assert!(session.preview().is_none());
}
