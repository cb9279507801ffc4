//! Data Transfer Objects for control plane communication
//!
//! This module contains DTOs used between the agent and the control plane.
//! Status and log snapshots live in `domain::status` since the agent also
//! builds them internally.

pub mod command;
