//! # Events Module
//!
//! Progress reporting from the merge engine to whatever draws it.
//!
//! ## Design
//! Each phase takes an `EventSender` and reports through it. The library
//! never writes progress to stdout; a CLI, GUI or test subscribes to the
//! receiving side instead. Dropping the receiver silences a run without
//! changing its behaviour.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         if let Event::Execute(ExecuteEvent::Progress(p)) = event {
//!             println!("Moved {}/{}", p.completed, p.total);
//!         }
//!     }
//! });
//!
//! let session = MergeSession::new(config, &LocalFileSystem, &manifest).with_events(sender);
//! ```

mod channel;
mod types;

pub use channel::{null_sender, EventChannel, EventReceiver, EventSender};
pub use types::*;
