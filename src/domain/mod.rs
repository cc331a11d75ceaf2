//! Core domain types and decision logic.

pub mod account;
pub mod bar;
pub mod catalog;
pub mod config;
pub mod config_validation;
pub mod engine;
pub mod error;
pub mod indicator;
pub mod instrument;
pub mod position;
pub mod position_manager;
pub mod risk_gate;
pub mod selector;
pub mod signal;
pub mod sizing;
pub mod stage;
