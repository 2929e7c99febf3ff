//! lanes-core library.
//!
//! Boards own ordered stages, stages own ordered tasks, tasks own ordered
//! subtasks. This crate keeps those orders consistent under inserts, moves,
//! bulk reorders, archive/restore and deep clones.
//!
//! # Conventions
//!
//! - **Errors**: library operations return [`error::Result`]; configuration
//!   loading returns `anyhow::Result` with file context.
//! - **Logging**: `tracing` macros only; the binary installs the subscriber.
//! - **Positions**: written only through [`position::PositionAllocator`].

pub mod access;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod lock;
pub mod model;
pub mod position;
pub mod service;
pub mod store;

pub use engine::{Engine, EngineBuilder};
pub use error::{Error, ErrorCode, Result};
