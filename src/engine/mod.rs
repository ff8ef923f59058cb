//! Engine modules: pure planning logic that turns the user's choices into
//! ordered operations before anything is executed.

pub mod storage;
