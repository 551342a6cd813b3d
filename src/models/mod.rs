pub mod envelope;
pub mod insight;
pub mod range;
pub mod series;
pub mod snapshot;

pub use envelope::*;
pub use insight::*;
pub use range::*;
pub use series::*;
pub use snapshot::*;
