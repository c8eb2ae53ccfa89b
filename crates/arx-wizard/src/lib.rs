//! Report wizard state machine shared between the web client and server.
//!
//! Models the five collection steps, the redirect-based suspension of the
//! Discord step, and the submit lifecycle. The server drives the same
//! machine to validate incoming submissions at the boundary, so client and
//! server cannot drift on what a complete report means.

pub mod report_wizard;

pub use report_wizard::{
    PrimaryClaim, ReportDraft, ReportWizard, SecondaryClaim, WizardGuardError, WizardStage,
    GENERIC_SUBMIT_FAILURE_MESSAGE,
};
