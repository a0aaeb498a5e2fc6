pub mod loader;
pub mod split;
pub mod table;

pub use loader::{load_csv, read_csv};
pub use split::{train_test_split, SplitIndices};
pub use table::{Table, Value};
