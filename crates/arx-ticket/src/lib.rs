//! Server-side ticket workflow: naming, duplicate guarding, channel
//! provisioning, report publishing, and staff-only closure.
//!
//! One submission runs strictly Resolve → Guard → Provision → Publish; the
//! closer is a separate entry point triggered by the close button on the
//! published report.

pub mod ticket_close;
pub mod ticket_name;
pub mod ticket_workflow;

pub use ticket_close::{
    render_transcript, CloseTicketRequest, CLOSE_DENIED_REPLY, CLOSE_IN_PROGRESS_REPLY,
    CLOSE_TICKET_CUSTOM_ID,
};
pub use ticket_name::derive_ticket_name;
pub use ticket_workflow::{
    ProvisionedTicket, TicketSubmission, TicketSubmitError, TicketWorkflow, TicketWorkflowConfig,
};
