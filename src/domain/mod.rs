//! Core domain types and logic.

pub mod error;
pub mod asset;
pub mod observation;
pub mod panel;
pub mod aligner;
pub mod stats;
pub mod factor;
pub mod registry;
pub mod scoring;
pub mod rule;
pub mod rule_parser;
pub mod ranking;
pub mod allocation;
pub mod timing;
pub mod schedule;
pub mod strategy;
pub mod config_validation;
pub mod engine;
pub mod universe;
pub mod analysis;
