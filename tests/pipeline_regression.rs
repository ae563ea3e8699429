//! Pipeline Regression Tests
//!
//! End-to-end runs of `AdvisoryRunner` against the in-memory and sled stores,
//! with zero-delay simulated agents and a fault-injecting invoker.

use agri_copilot::agents::simulated::scripted_output;
use agri_copilot::pipeline::{AdvisoryRunner, PipelineError, PipelineSettings};
use agri_copilot::store::{InMemoryProgressStore, ProgressEvent, ProgressStore, SledProgressStore};
use agri_copilot::types::{
    FarmerInput, PipelineId, PipelineRecord, PipelineStatus, SoilType, Stage, StageInput,
    StageOutput,
};
use agri_copilot::{AgentError, AgentInvoker, SimulatedAgents};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Fixtures
// ============================================================================

fn nashik_tomato() -> FarmerInput {
    FarmerInput {
        crop: "Tomato".to_string(),
        district: "Nashik".to_string(),
        soil_type: SoilType::Loamy,
        growth_stage: "Flowering".to_string(),
        temperature: 28.0,
        humidity: 65.0,
        image_url: None,
    }
}

fn id(raw: &str) -> PipelineId {
    PipelineId::new(raw).unwrap()
}

enum Fault {
    Error(AgentError),
    Hang,
    Output(Value),
}

/// Scripted agents that misbehave at one stage and record every call.
struct FaultyAgents {
    inner: SimulatedAgents,
    stage: Stage,
    fault: Fault,
    calls: Mutex<Vec<Stage>>,
}

impl FaultyAgents {
    fn new(stage: Stage, fault: Fault) -> Arc<Self> {
        Arc::new(Self {
            inner: SimulatedAgents::instant(),
            stage,
            fault,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<Stage> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentInvoker for FaultyAgents {
    async fn invoke(&self, stage: Stage, input: &StageInput) -> Result<StageOutput, AgentError> {
        self.calls.lock().unwrap().push(stage);
        if stage == self.stage {
            match &self.fault {
                Fault::Error(e) => return Err(e.clone()),
                Fault::Hang => std::future::pending::<()>().await,
                Fault::Output(v) => return Ok(StageOutput::try_from(v.clone()).unwrap()),
            }
        }
        self.inner.invoke(stage, input).await
    }

    fn backend_name(&self) -> &'static str {
        "Faulty"
    }
}

fn runner_with(
    invoker: Arc<dyn AgentInvoker>,
    settings: PipelineSettings,
) -> (AdvisoryRunner, Arc<InMemoryProgressStore>) {
    let store = Arc::new(InMemoryProgressStore::new());
    let runner = AdvisoryRunner::new(invoker, store.clone(), settings);
    (runner, store)
}

fn instant_runner() -> (AdvisoryRunner, Arc<InMemoryProgressStore>) {
    runner_with(Arc::new(SimulatedAgents::instant()), PipelineSettings::default())
}

// ============================================================================
// Successful runs
// ============================================================================

#[tokio::test]
async fn test_reference_scenario_produces_low_risk_advisory() {
    let (runner, store) = instant_runner();
    let pid = id("pipeline_nashik");

    let advisory = runner.run(nashik_tomato(), pid.clone()).await.unwrap();

    // 40 - 15 + 15 * 0.4 - 82 * 0.2 = 14.6
    assert_eq!(advisory.risk_score, 15);
    assert!(advisory
        .recommendation
        .starts_with("Optimal conditions detected for Tomato. The current weather (Partly Cloudy)"));
    assert_eq!(advisory.yield_expectation, "4.8 Tons/Acre");
    assert_eq!(advisory.price_trend, "Rising (+12%)");
    assert_eq!(advisory.confidence, 0.92);

    let record = store.get_record(&pid).unwrap().unwrap();
    assert_eq!(record.status, PipelineStatus::Completed);
    assert_eq!(record.advisory.as_ref(), Some(&advisory));
    assert_eq!(record.current_stage, None);
    assert!(record.error.is_none());
    assert!(record.end_time.unwrap() >= record.start_time);
}

#[tokio::test]
async fn test_completed_run_logs_every_stage_in_order() {
    let (runner, store) = instant_runner();
    let pid = id("ordered");

    runner.run(nashik_tomato(), pid.clone()).await.unwrap();

    let logs = store.stage_logs(&pid).unwrap();
    let stages: Vec<Stage> = logs.iter().map(|e| e.agent).collect();
    assert_eq!(stages, Stage::ALL.to_vec());

    for entry in &logs {
        let expected = StageOutput::try_from(scripted_output(entry.agent)).unwrap();
        assert_eq!(entry.output, expected);
    }
    for pair in logs.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
}

#[tokio::test(start_paused = true)]
async fn test_stages_run_sequentially_with_simulated_delays() {
    let (runner, _store) = runner_with(Arc::new(SimulatedAgents::default()), PipelineSettings::default());

    let started = tokio::time::Instant::now();
    runner.run(nashik_tomato(), id("timed")).await.unwrap();

    // 800 + 1200 + 1000 + 1500 + 1200 + 1000
    assert!(started.elapsed() >= Duration::from_millis(6_700));
}

#[tokio::test]
async fn test_subscriber_sees_writes_in_order() {
    let (runner, store) = instant_runner();
    let pid = id("watched");
    let subscription = store.subscribe(&pid);

    let collector = tokio::spawn(subscription.until_finished().collect::<Vec<ProgressEvent>>());
    runner.run(nashik_tomato(), pid.clone()).await.unwrap();
    let events = collector.await.unwrap();

    let logged: Vec<Stage> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::StageLogged { entry, .. } => Some(entry.agent),
            ProgressEvent::Record { .. } => None,
        })
        .collect();
    assert_eq!(logged, Stage::ALL.to_vec());

    // Each stage is announced before its log entry lands
    let mut announced = Vec::new();
    for event in &events {
        match event {
            ProgressEvent::Record { record } => {
                if let Some(stage) = record.current_stage {
                    announced.push(stage);
                }
            }
            ProgressEvent::StageLogged { entry, .. } => {
                assert_eq!(announced.last(), Some(&entry.agent));
            }
        }
    }

    match events.last() {
        Some(ProgressEvent::Record { record }) => assert_eq!(record.status, PipelineStatus::Completed),
        other => panic!("expected terminal record, got {other:?}"),
    }
}

#[tokio::test]
async fn test_running_pipeline_rejects_second_run() {
    let (runner, store) = instant_runner();
    let pid = id("in-flight");

    let mut owner = PipelineRecord::new(pid.clone(), nashik_tomato());
    owner.start(chrono::Utc::now()).unwrap();
    owner.enter_stage(Stage::FieldOperations).unwrap();
    store.put_record(&owner).unwrap();

    let err = runner.run(nashik_tomato(), pid.clone()).await.unwrap_err();
    assert!(matches!(err, PipelineError::AlreadyRunning { .. }));
    assert!(err.is_rejection());

    assert_eq!(store.get_record(&pid).unwrap(), Some(owner));
    assert!(store.stage_logs(&pid).unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_starts_on_one_id_have_single_writer() {
    let store = Arc::new(InMemoryProgressStore::new());
    let slow = AdvisoryRunner::new(
        Arc::new(SimulatedAgents::new([100; 6])),
        store.clone(),
        PipelineSettings::default(),
    );
    let fast = AdvisoryRunner::new(
        Arc::new(SimulatedAgents::instant()),
        store.clone(),
        PipelineSettings::default(),
    );
    let pid = id("shared");
    let events = tokio::spawn(store.subscribe(&pid).until_finished().collect::<Vec<ProgressEvent>>());

    let winner = slow.spawn(nashik_tomato(), pid.clone()).unwrap();
    let rivals: Vec<_> = (0..4)
        .map(|_| {
            let fast = fast.clone();
            let pid = pid.clone();
            tokio::spawn(async move { fast.run(nashik_tomato(), pid).await })
        })
        .collect();

    for rival in rivals {
        let err = rival.await.unwrap().unwrap_err();
        assert!(matches!(err, PipelineError::AlreadyRunning { .. }), "got {err:?}");
    }
    winner.await.unwrap().unwrap();

    // One claim, six stage entries, one completion; nothing from the rivals
    let statuses: Vec<PipelineStatus> = events
        .await
        .unwrap()
        .into_iter()
        .filter_map(|e| match e {
            ProgressEvent::Record { record } => Some(record.status),
            ProgressEvent::StageLogged { .. } => None,
        })
        .collect();
    let mut expected = vec![PipelineStatus::Running; 7];
    expected.push(PipelineStatus::Completed);
    assert_eq!(statuses, expected);

    // Terminal records stay terminal
    let err = fast.run(nashik_tomato(), pid.clone()).await.unwrap_err();
    assert!(matches!(err, PipelineError::AlreadyFinished { .. }));
    assert_eq!(
        store.get_record(&pid).unwrap().unwrap().status,
        PipelineStatus::Completed
    );
}

#[tokio::test(start_paused = true)]
async fn test_dropped_caller_does_not_strand_record() {
    let (runner, store) =
        runner_with(Arc::new(SimulatedAgents::default()), PipelineSettings::default());
    let pid = id("dropped");

    // Gives up partway through Weather Intelligence
    let abandoned =
        tokio::time::timeout(Duration::from_millis(2_500), runner.run(nashik_tomato(), pid.clone())).await;
    assert!(abandoned.is_err());
    assert_eq!(
        store.get_record(&pid).unwrap().unwrap().status,
        PipelineStatus::Running
    );

    tokio::time::sleep(Duration::from_secs(3600)).await;

    let record = store.get_record(&pid).unwrap().unwrap();
    assert_eq!(record.status, PipelineStatus::Completed);
    assert_eq!(record.current_stage, None);
    assert!(record.end_time.is_some());
    assert!(record.advisory.is_some());
    assert_eq!(store.stage_logs(&pid).unwrap().len(), 6);
}

#[tokio::test]
async fn test_concurrent_runs_are_independent() {
    let (runner, store) = instant_runner();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let runner = runner.clone();
            let mut input = nashik_tomato();
            input.soil_type = if i % 2 == 0 { SoilType::Loamy } else { SoilType::Sandy };
            tokio::spawn(async move { runner.run(input, id(&format!("run-{i}"))).await })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let advisory = handle.await.unwrap().unwrap();
        // Sandy: 40 + 15 + 6 - 16.4 = 44.6
        let expected = if i % 2 == 0 { 15 } else { 45 };
        assert_eq!(advisory.risk_score, expected, "run-{i}");

        let pid = id(&format!("run-{i}"));
        assert_eq!(store.stage_logs(&pid).unwrap().len(), 6);
        assert_eq!(
            store.get_record(&pid).unwrap().unwrap().status,
            PipelineStatus::Completed
        );
    }
    assert_eq!(store.list_records(100).unwrap().len(), 8);
}

#[tokio::test]
async fn test_spawned_run_completes() {
    let (runner, store) = instant_runner();
    let pid = id("background");

    let handle = runner.spawn(nashik_tomato(), pid.clone()).unwrap();
    let advisory = handle.await.unwrap().unwrap();

    assert_eq!(advisory.risk_score, 15);
    assert_eq!(
        store.get_record(&pid).unwrap().unwrap().status,
        PipelineStatus::Completed
    );
}

#[tokio::test]
async fn test_sled_backed_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SledProgressStore::open(dir.path()).unwrap());
    let runner = AdvisoryRunner::new(
        Arc::new(SimulatedAgents::instant()),
        store.clone(),
        PipelineSettings::default(),
    );
    let pid = id("durable");

    runner.run(nashik_tomato(), pid.clone()).await.unwrap();

    let record = store.get_record(&pid).unwrap().unwrap();
    assert_eq!(record.status, PipelineStatus::Completed);
    assert_eq!(record.advisory.unwrap().risk_score, 15);
    assert_eq!(store.stage_logs(&pid).unwrap().len(), 6);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_agent_failure_stops_pipeline() {
    let agents = FaultyAgents::new(
        Stage::WeatherIntelligence,
        Fault::Error(AgentError::Transient("Weather API down".to_string())),
    );
    let (runner, store) = runner_with(agents.clone(), PipelineSettings::default());
    let pid = id("rainy");

    let err = runner.run(nashik_tomato(), pid.clone()).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Agent {
            stage: Stage::WeatherIntelligence,
            ..
        }
    ));

    let record = store.get_record(&pid).unwrap().unwrap();
    assert_eq!(record.status, PipelineStatus::Failed);
    assert!(record.error.as_deref().unwrap().contains("Weather API down"));
    assert!(record.advisory.is_none());
    assert!(record.end_time.is_some());

    let logged: Vec<Stage> = store.stage_logs(&pid).unwrap().iter().map(|e| e.agent).collect();
    assert_eq!(logged, vec![Stage::FarmerInteraction, Stage::CropPrediction]);

    // Later stages are never invoked
    assert_eq!(
        agents.calls(),
        vec![
            Stage::FarmerInteraction,
            Stage::CropPrediction,
            Stage::WeatherIntelligence
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_hung_agent_times_out() {
    let agents = FaultyAgents::new(Stage::CropPrediction, Fault::Hang);
    let settings = PipelineSettings {
        stage_timeout: Some(Duration::from_secs(5)),
        ..PipelineSettings::default()
    };
    let (runner, store) = runner_with(agents, settings);
    let pid = id("hung");

    let err = runner.run(nashik_tomato(), pid.clone()).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::StageTimeout {
            stage: Stage::CropPrediction,
            ..
        }
    ));

    let record = store.get_record(&pid).unwrap().unwrap();
    assert_eq!(record.status, PipelineStatus::Failed);
    assert_eq!(
        record.error.as_deref(),
        Some("Crop Prediction Agent timed out after 5s")
    );
    assert_eq!(store.stage_logs(&pid).unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_weather_score_fails_run() {
    let agents = FaultyAgents::new(
        Stage::WeatherIntelligence,
        Fault::Output(json!({ "status": "Success", "forecast": "Sunny" })),
    );
    let (runner, store) = runner_with(agents, PipelineSettings::default());
    let pid = id("incomplete");

    let err = runner.run(nashik_tomato(), pid.clone()).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::MissingOutputField {
            stage: Stage::WeatherIntelligence,
            field: "weatherScore"
        }
    ));

    let record = store.get_record(&pid).unwrap().unwrap();
    assert_eq!(record.status, PipelineStatus::Failed);
    assert!(record.error.unwrap().contains("weatherScore"));
}

#[tokio::test]
async fn test_invalid_input_creates_no_record() {
    let (runner, store) = instant_runner();
    let pid = id("humid");
    let mut input = nashik_tomato();
    input.humidity = 150.0;

    let err = runner.run(input, pid.clone()).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)));
    assert!(store.get_record(&pid).unwrap().is_none());

    let mut input = nashik_tomato();
    input.crop = "   ".to_string();
    assert!(runner.spawn(input, pid.clone()).is_err());
    assert!(store.list_records(10).unwrap().is_empty());
}

#[tokio::test]
async fn test_finished_pipeline_cannot_rerun() {
    let (runner, store) = instant_runner();
    let pid = id("once");

    runner.run(nashik_tomato(), pid.clone()).await.unwrap();
    let before = store.get_record(&pid).unwrap().unwrap();

    let err = runner.run(nashik_tomato(), pid.clone()).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::AlreadyFinished {
            status: PipelineStatus::Completed,
            ..
        }
    ));
    assert_eq!(store.get_record(&pid).unwrap().unwrap(), before);
}

#[tokio::test]
async fn test_failure_does_not_affect_other_runs() {
    let agents = FaultyAgents::new(
        Stage::DecisionOrchestrator,
        Fault::Error(AgentError::Permanent("quota exceeded".to_string())),
    );
    let (faulty, store) = runner_with(agents, PipelineSettings::default());
    let healthy = AdvisoryRunner::new(
        Arc::new(SimulatedAgents::instant()),
        store.clone(),
        PipelineSettings::default(),
    );

    let (bad, good) = tokio::join!(
        faulty.run(nashik_tomato(), id("bad")),
        healthy.run(nashik_tomato(), id("good"))
    );
    assert!(bad.is_err());
    assert!(good.is_ok());

    assert_eq!(
        store.get_record(&id("bad")).unwrap().unwrap().status,
        PipelineStatus::Failed
    );
    assert_eq!(
        store.get_record(&id("good")).unwrap().unwrap().status,
        PipelineStatus::Completed
    );
}
