//! Botloom CLI library: command implementations shared by the `botloom`
//! binary and the integration tests.

pub mod commands;
