pub mod orchestrator;

pub use orchestrator::{
    AnalyzeRequest, AnalyzeResponse, NewsRequest, NewsResponse, PipelineStage, SignalOrchestrator,
    SignalRequest, SignalResponse,
};
