//! Permit-to-Work Domain Types
//!
//! A **permit** authorises hazardous maintenance work. Before it can be
//! used it must pass an ordered **approval chain**: each step names the
//! user or role allowed to decide it, and only one step is live at a time.
//! Steps that sit too long escalate.
//!
//! A **work order** links the permits that protect it. Lifecycle
//! transitions on the work order are gated on the state of those permits
//! (the readiness gate), and starting or completing the work flips the
//! permits to `active` / `closed`.
//!
//! # Key Concepts
//!
//! - **Permit**: the aggregate carrying the approval chain, isolation
//!   checklist, watchers and append-only history.
//! - **ApprovalStep**: one link of the chain. `sequence` is fixed at
//!   creation and always forms a contiguous `0..n` range.
//! - **IsolationStep**: a safety checklist item; a permit cannot be
//!   completed against while any is open.
//! - **WorkOrder**: the unit of maintenance work, with its own status and
//!   an orthogonal approval sub-state.
//! - **Actor**: the tenant/user/roles context every operation runs under.

#![deny(unsafe_code)]

mod actor;
mod approval;
mod errors;
mod history;
mod ids;
mod incident;
mod isolation;
mod permit;
mod work_order;

pub use actor::*;
pub use approval::*;
pub use errors::*;
pub use history::*;
pub use ids::*;
pub use incident::*;
pub use isolation::*;
pub use permit::*;
pub use work_order::*;
