/// What kind of run an event belongs to.
#[derive(Debug, Clone, PartialEq)]
pub enum RunMode {
    Batch { t0: f64, tf: f64 },
    Live { duration_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    LoadingModel,
    BuildingSystem,
    Compiling,
    Simulating,
    Completed,
}

impl RunStage {
    pub fn label(self) -> &'static str {
        match self {
            RunStage::LoadingModel => "Loading model",
            RunStage::BuildingSystem => "Building system",
            RunStage::Compiling => "Compiling",
            RunStage::Simulating => "Simulating",
            RunStage::Completed => "Completed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunProgressEvent {
    pub mode: RunMode,
    pub stage: RunStage,
    pub elapsed_wall_s: f64,
    pub message: Option<String>,
}

impl RunProgressEvent {
    pub fn stage(
        mode: RunMode,
        stage: RunStage,
        elapsed_wall_s: f64,
        message: Option<String>,
    ) -> Self {
        Self {
            mode,
            stage,
            elapsed_wall_s,
            message,
        }
    }
}
