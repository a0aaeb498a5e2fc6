pub mod encoder;
pub mod pipeline;
pub mod scaler;
pub mod schema;
pub mod transforms;

pub use encoder::CategoricalEncoder;
pub use pipeline::{split_label, FittedTransformer, Preprocessor};
pub use scaler::{ColumnStats, StandardScaler};
pub use schema::{FeatureSchema, SCHEMA_VERSION};
pub use transforms::extract_numeric;
