//! ABOUTME: Route modules for the Control API
//! ABOUTME: One module per handler group

pub mod control;
