mod calibration;
mod request;
mod rule;
mod run;
mod scan;
mod token;
mod transparency;

pub use calibration::*;
pub use request::*;
pub use rule::*;
pub use run::*;
pub use scan::*;
pub use token::*;
pub use transparency::*;
