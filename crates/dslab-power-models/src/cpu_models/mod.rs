//! A collection of CPU power models.

pub mod cubic;
pub mod linear;
pub mod sqrt;
pub mod square;
