//! Command modules - one file per CLI command

pub mod action;
pub mod completions;
pub mod feed;
pub mod install;
