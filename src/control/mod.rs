//! Closed-loop duty control.

pub mod pi;
