pub mod region;
pub mod rotator;
pub mod switcher;

pub use region::RegionDetector;
pub use rotator::RegionRotator;
pub use switcher::{ProfileSwitcher, SwitcherSettings, validate_setting};
