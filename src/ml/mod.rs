pub mod artifact;
pub mod engine;
pub mod evaluation;
pub mod models;
pub mod predictor;
pub mod trainer;

pub use artifact::ModelArtifact;
pub use engine::{TrainingEngine, TrainingSummary};
pub use evaluation::{accuracy, ClassificationReport};
pub use models::{DecisionTree, MaxFeatures, RandomForest};
pub use predictor::LeadPredictor;
pub use trainer::{train_model, TrainerSettings};
