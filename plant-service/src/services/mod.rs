pub mod analysis;
pub mod care_guides;
pub mod chat;
pub mod chat_history;
pub mod classifier;
pub mod diagnosis;
pub mod preprocess;
pub mod providers;
pub mod readiness;

pub use analysis::AnalysisService;
pub use care_guides::{CareGuides, Guidance};
pub use chat::ChatService;
pub use chat_history::ChatHistoryStore;
pub use diagnosis::{ClassifierDiagnoser, Diagnosis, PlantDiagnoser, VisionLlmDiagnoser};
pub use readiness::Readiness;
