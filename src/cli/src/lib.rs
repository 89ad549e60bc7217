//! ECI CLI - pull Edge Container Images from OCI registries.

pub mod commands;
