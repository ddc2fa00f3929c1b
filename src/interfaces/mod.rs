pub mod host;

pub use host::{CompletionSink, KeyValueStore, Notifier, PolicyControl, RegionProbe, RoutingControl};
