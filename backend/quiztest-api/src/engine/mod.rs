//! Pure assembly and grading logic. Nothing in here performs I/O.

pub mod checker;
pub mod retry;
pub mod scorer;
pub mod shuffle;
