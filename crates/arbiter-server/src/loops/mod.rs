//! Background loops for continuous processing.

pub mod arbiter_loop;
