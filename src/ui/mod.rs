pub mod completion;
pub mod progress;

pub use completion::StdoutCompletion;
pub use progress::{Ui, get_multi};
