//! ABOUTME: Repository modules providing type-safe database operations
//! ABOUTME: Each repository handles CRUD operations for specific entity types

pub mod alarms;
