//! Incremental-disclosure engine for geolocated intelligence reports.
//!
//! This crate provides:
//! - Observable stores shared with a rendering surface
//! - Timer-driven reveal of markers and typewriter reveal of narrative text
//! - Two-stage decoding of backend reports into ordered findings
//! - A static gazetteer for resolving place names
//! - `ChatSession`, the state machine tying one query/response cycle together
//!
//! # Quick Start
//!
//! ```ignore
//! use std::rc::Rc;
//! use analyst::Analyst;
//! use sitrep_core::{ChatSession, Gazetteer, SessionConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let local = tokio::task::LocalSet::new();
//!     local
//!         .run_until(async {
//!             let mut session = ChatSession::new(
//!                 Rc::new(Analyst::from_env()?),
//!                 Rc::new(Gazetteer::builtin()),
//!                 SessionConfig::default(),
//!             )?;
//!
//!             session
//!                 .markers()
//!                 .subscribe(|markers| println!("{} markers", markers.len()))
//!                 .detach();
//!             session.submit("status near Kharkiv");
//!             session.run_until_idle().await;
//!             Ok(())
//!         })
//!         .await
//! }
//! ```

pub mod backend;
pub mod gazetteer;
pub mod ingest;
pub mod reveal;
pub mod session;
pub mod store;
pub mod testing;
pub mod transcript;
pub mod typewriter;

// Primary public API
pub use backend::ReportBackend;
pub use gazetteer::{Coordinate, CoordinateResolver, Gazetteer, GazetteerError};
pub use ingest::{ingest, DecodeStage, Finding, MalformedResponse, Report};
pub use reveal::{RevealError, RevealSequencer, RevealState};
pub use session::{ChatSession, Marker, SessionConfig, SessionError, SessionState, Submission};
pub use store::{SharedStore, Subscription};
pub use testing::{MockBackend, MockReply, StoreLog};
pub use transcript::{Message, Role};
pub use typewriter::TypewriterAnimator;
