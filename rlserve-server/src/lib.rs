//! HTTP front end for serving reinforcement-learning policies
//!
//! Routes are defined in [`web`]; requests are authenticated by [`auth`],
//! adapted by [`gateway`] and answered either by a remote policy actor
//! ([`remote`]) or the in-process model loaded through [`config`].

pub mod auth;
pub mod clients;
pub mod config;
pub mod gateway;
pub mod openapi;
pub mod remote;
pub mod web;

pub use config::{RuntimeConfig, ServerConfig};
pub use gateway::InferenceGateway;
pub use web::{routes, serve, AppState};
