#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod error;
pub mod lockfile;
pub mod range;
pub mod version;

pub use error::Error;
pub use lockfile::berry::{decode, BerryLockfile, Descriptor, Ident, Locator, Metadata};
pub use lockfile::{Lockfile, Package};
pub use range::{range_satisfies, RangeSet};
pub use version::VERSION;
