//! Domain model module declarations.

pub mod command;
pub mod disconnect;
pub mod identity;
pub mod status;
