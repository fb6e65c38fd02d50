mod state_file;

pub use state_file::{StateFile, StoreStats};
