//! # Switchboard
//!
//! Command orchestrator for a mesh of tool-RPC service modules: classify a
//! natural-language command, resolve follow-ups against session context,
//! route it to the owning service over the fabric, and keep the mesh alive
//! with health checks and session cleanup.
//!
//! ## Main modules
//!
//! - [`nlu`]: [`IntentEngine`], the static intent catalog and per-intent
//!   parameter extractors.
//! - [`context`]: [`ContextStore`] with persistent [`UserContext`] /
//!   [`SessionContext`] and session expiry.
//! - [`registry`]: [`ServiceRegistry`] of [`ServiceInfo`] endpoints with
//!   health and response-time metrics.
//! - [`orchestrator`]: [`Orchestrator`] — the `process_command` pipeline,
//!   routing, dispatch, maintenance loops and the orchestrator's own tool
//!   catalog ([`orchestrator_tool_server`]).

pub mod context;
pub mod nlu;
pub mod orchestrator;
pub mod registry;

pub use context::{
    ContextError, ContextStore, InterfaceKind, SessionContext, SessionUpdate, UserContext,
};
pub use nlu::{IntentEngine, IntentResult, INTENT_FOLLOW_UP, INTENT_UNKNOWN};
pub use orchestrator::{
    orchestrator_tool_server, CommandRequest, CommandResponse, Orchestrator,
};
pub use registry::{
    HealthStatus, ServiceAnalytics, ServiceInfo, ServiceKind, ServiceRegistry,
};
