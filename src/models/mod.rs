pub mod classification;
pub mod document;
pub mod enums;
pub mod feedback;

pub use classification::*;
pub use document::*;
pub use enums::*;
pub use feedback::*;
