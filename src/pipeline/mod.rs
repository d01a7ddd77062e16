//! Turn orchestration: a pure state machine plus its async driver.

pub mod coordinator;
pub mod messages;
pub mod turn;
