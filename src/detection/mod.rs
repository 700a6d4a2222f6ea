pub mod preprocessing;
pub mod contours;
pub mod regions;
pub mod classifier;
pub mod digits;
pub mod census;
pub mod hands;
pub mod ink;

pub use census::DigitCensus;
pub use classifier::{DigitModel, RtenDigitModel};
pub use digits::DigitReading;
pub use hands::HandReading;
pub use ink::InkReport;
pub use preprocessing::PreprocessedViews;
