//! Client-side view of a pipeline, derived from the record and its stage log.

use crate::types::{Advisory, PipelineId, PipelineRecord, PipelineStatus, Stage, StageLogEntry};
use serde::Serialize;

/// What a progress UI should render. Exactly one state at a time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum RenderState {
    Pending,
    Running { stage: Stage },
    Completed { advisory: Advisory },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub pipeline_id: PipelineId,
    pub status: PipelineStatus,
    /// Stages with a log entry, in stage-list order
    pub completed_stages: Vec<Stage>,
    /// Set only while running
    pub current_stage: Option<Stage>,
    pub render: RenderState,
}

impl ProgressView {
    pub fn derive(record: &PipelineRecord, logs: &[StageLogEntry]) -> Self {
        let mut completed_stages: Vec<Stage> = logs.iter().map(|e| e.agent).collect();
        completed_stages.sort_unstable();
        completed_stages.dedup();

        let render = match (record.status, &record.advisory) {
            (PipelineStatus::Pending, _) => RenderState::Pending,
            (PipelineStatus::Running, _) => RenderState::Running {
                stage: record.current_stage.unwrap_or_else(Stage::first),
            },
            (PipelineStatus::Completed, Some(advisory)) => RenderState::Completed {
                advisory: advisory.clone(),
            },
            (PipelineStatus::Completed, None) => RenderState::Failed {
                error: "pipeline completed without an advisory".to_string(),
            },
            (PipelineStatus::Failed, _) => RenderState::Failed {
                error: record
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
            },
        };

        let current_stage = match render {
            RenderState::Running { stage } => Some(stage),
            _ => None,
        };

        Self {
            pipeline_id: record.pipeline_id.clone(),
            status: record.status,
            completed_stages,
            current_stage,
            render,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures;
    use chrono::Utc;

    #[test]
    fn test_running_view() {
        let mut record = fixtures::running("p", 0);
        record.enter_stage(Stage::WeatherIntelligence).unwrap();
        let logs = vec![
            fixtures::log(Stage::CropPrediction, 0),
            fixtures::log(Stage::FarmerInteraction, 0),
        ];

        let view = ProgressView::derive(&record, &logs);
        assert_eq!(
            view.completed_stages,
            vec![Stage::FarmerInteraction, Stage::CropPrediction]
        );
        assert_eq!(view.current_stage, Some(Stage::WeatherIntelligence));
        assert_eq!(
            view.render,
            RenderState::Running {
                stage: Stage::WeatherIntelligence
            }
        );
    }

    #[test]
    fn test_completed_view() {
        let record = fixtures::completed("p");
        let logs: Vec<_> = Stage::ALL.iter().map(|s| fixtures::log(*s, 0)).collect();

        let view = ProgressView::derive(&record, &logs);
        assert_eq!(view.completed_stages.len(), 6);
        assert_eq!(view.current_stage, None);
        assert!(matches!(view.render, RenderState::Completed { .. }));
    }

    #[test]
    fn test_failed_view() {
        let mut record = fixtures::running("p", 0);
        record.fail("Weather API down", Utc::now()).unwrap();

        let view = ProgressView::derive(&record, &[]);
        assert_eq!(
            view.render,
            RenderState::Failed {
                error: "Weather API down".to_string()
            }
        );
        assert_eq!(view.current_stage, None);
    }

    #[test]
    fn test_view_json_shape() {
        let record = fixtures::running("p", 0);
        let v = serde_json::to_value(ProgressView::derive(&record, &[])).unwrap();
        assert_eq!(v["render"]["state"], "running");
        assert_eq!(v["render"]["stage"], "Farmer Interaction Agent");
        assert_eq!(v["currentStage"], "Farmer Interaction Agent");
    }
}
