//! Five-step report wizard with redirect-aware resume.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fallback shown when the server fails a submission without a message.
pub const GENERIC_SUBMIT_FAILURE_MESSAGE: &str =
    "Si è verificato un errore durante l'invio della segnalazione. Riprova.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates the wizard stages, collection steps first.
pub enum WizardStage {
    PrimaryIdentity,
    SecondaryIdentity,
    Details,
    Evidence,
    Review,
    Submitting,
    Success,
    Failure,
}

impl WizardStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PrimaryIdentity => "primary_identity",
            Self::SecondaryIdentity => "secondary_identity",
            Self::Details => "details",
            Self::Evidence => "evidence",
            Self::Review => "review",
            Self::Submitting => "submitting",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Self-declared game-username claim, persisted across the OAuth redirect.
pub struct PrimaryClaim {
    pub handle: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// OAuth-verified identity delivered back through the callback URL.
pub struct SecondaryClaim {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Report content collected across the detail and evidence steps.
pub struct ReportDraft {
    pub title: String,
    pub description: String,
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Guard failures; messages are surfaced to the user as-is.
pub enum WizardGuardError {
    #[error("Inserisci il tuo nome utente Roblox")]
    MissingPrimaryHandle,
    #[error("Verifica il tuo account Discord per continuare")]
    MissingSecondaryClaim,
    #[error("Compila tutti i campi")]
    MissingReportFields,
    #[error("Allega almeno una prova")]
    MissingEvidence,
    #[error("action not available at stage {actual}, expected {expected}")]
    StageMismatch {
        expected: &'static str,
        actual: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The wizard state machine. All mutation goes through the guarded
/// transition methods; a failed guard leaves every field untouched.
pub struct ReportWizard {
    stage: WizardStage,
    primary: Option<PrimaryClaim>,
    secondary: Option<SecondaryClaim>,
    draft: ReportDraft,
    failure_message: Option<String>,
}

impl Default for ReportWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportWizard {
    pub fn new() -> Self {
        Self {
            stage: WizardStage::PrimaryIdentity,
            primary: None,
            secondary: None,
            draft: ReportDraft::default(),
            failure_message: None,
        }
    }

    /// Rebuilds the wizard after a full page navigation, merging the
    /// locally persisted primary fragment with the secondary claim the
    /// callback URL delivered.
    ///
    /// Both present lands on the detail step. A delivered secondary with a
    /// lost primary falls back to the first step (the secondary is kept).
    /// A primary alone resumes at the secondary step.
    pub fn resume_after_navigation(
        persisted_primary: Option<PrimaryClaim>,
        delivered_secondary: Option<SecondaryClaim>,
    ) -> Self {
        let primary = persisted_primary.filter(|claim| !claim.handle.trim().is_empty());
        let stage = match (&primary, &delivered_secondary) {
            (Some(_), Some(_)) => WizardStage::Details,
            (None, Some(_)) => WizardStage::PrimaryIdentity,
            (Some(_), None) => WizardStage::SecondaryIdentity,
            (None, None) => WizardStage::PrimaryIdentity,
        };
        Self {
            stage,
            primary,
            secondary: delivered_secondary,
            draft: ReportDraft::default(),
            failure_message: None,
        }
    }

    pub fn stage(&self) -> WizardStage {
        self.stage
    }

    pub fn primary(&self) -> Option<&PrimaryClaim> {
        self.primary.as_ref()
    }

    pub fn secondary(&self) -> Option<&SecondaryClaim> {
        self.secondary.as_ref()
    }

    pub fn draft(&self) -> &ReportDraft {
        &self.draft
    }

    pub fn failure_message(&self) -> Option<&str> {
        self.failure_message.as_deref()
    }

    fn expect_stage(&self, expected: WizardStage) -> Result<(), WizardGuardError> {
        if self.stage != expected {
            return Err(WizardGuardError::StageMismatch {
                expected: expected.as_str(),
                actual: self.stage.as_str(),
            });
        }
        Ok(())
    }

    /// Step 1 → 2. Returns the claim fragment the client persists across
    /// the upcoming OAuth navigation.
    pub fn confirm_primary(&mut self, handle: &str) -> Result<PrimaryClaim, WizardGuardError> {
        self.expect_stage(WizardStage::PrimaryIdentity)?;
        let handle = handle.trim();
        if handle.is_empty() {
            return Err(WizardGuardError::MissingPrimaryHandle);
        }
        let claim = PrimaryClaim {
            handle: handle.to_string(),
        };
        self.primary = Some(claim.clone());
        self.stage = WizardStage::SecondaryIdentity;
        Ok(claim)
    }

    /// Records the OAuth-delivered claim while staying on step 2; the
    /// forward transition stays a separate, user-driven action.
    pub fn deliver_secondary(&mut self, claim: SecondaryClaim) -> Result<(), WizardGuardError> {
        self.expect_stage(WizardStage::SecondaryIdentity)?;
        self.secondary = Some(claim);
        Ok(())
    }

    /// Step 2 → 3, guarded by the secondary claim being present.
    pub fn confirm_secondary(&mut self) -> Result<(), WizardGuardError> {
        self.expect_stage(WizardStage::SecondaryIdentity)?;
        if self.secondary.is_none() {
            return Err(WizardGuardError::MissingSecondaryClaim);
        }
        self.stage = WizardStage::Details;
        Ok(())
    }

    /// Step 3 → 4. Validates before mutating: a failed guard leaves the
    /// draft exactly as it was.
    pub fn confirm_details(
        &mut self,
        title: &str,
        description: &str,
    ) -> Result<(), WizardGuardError> {
        self.expect_stage(WizardStage::Details)?;
        let title = title.trim();
        let description = description.trim();
        if title.is_empty() || description.is_empty() {
            return Err(WizardGuardError::MissingReportFields);
        }
        self.draft.title = title.to_string();
        self.draft.description = description.to_string();
        self.stage = WizardStage::Evidence;
        Ok(())
    }

    /// Step 4 → 5, guarded by at least one selected attachment.
    pub fn confirm_evidence(&mut self, attachments: Vec<String>) -> Result<(), WizardGuardError> {
        self.expect_stage(WizardStage::Evidence)?;
        if attachments.is_empty() {
            return Err(WizardGuardError::MissingEvidence);
        }
        self.draft.attachments = attachments;
        self.stage = WizardStage::Review;
        Ok(())
    }

    /// Review → Submitting. The draft is frozen from here on; there is no
    /// automatic retry, only an explicit user-driven resubmit from review.
    pub fn begin_submit(&mut self) -> Result<&ReportDraft, WizardGuardError> {
        self.expect_stage(WizardStage::Review)?;
        if self.primary.is_none() {
            return Err(WizardGuardError::MissingPrimaryHandle);
        }
        if self.secondary.is_none() {
            return Err(WizardGuardError::MissingSecondaryClaim);
        }
        self.stage = WizardStage::Submitting;
        Ok(&self.draft)
    }

    /// Terminal success. The caller clears the persisted primary fragment.
    pub fn mark_submit_success(&mut self) -> Result<(), WizardGuardError> {
        self.expect_stage(WizardStage::Submitting)?;
        self.stage = WizardStage::Success;
        Ok(())
    }

    /// Recoverable failure: the server message is surfaced verbatim when
    /// present, otherwise the generic fallback.
    pub fn mark_submit_failure(
        &mut self,
        server_message: Option<&str>,
    ) -> Result<(), WizardGuardError> {
        self.expect_stage(WizardStage::Submitting)?;
        let message = server_message
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(GENERIC_SUBMIT_FAILURE_MESSAGE);
        self.failure_message = Some(message.to_string());
        self.stage = WizardStage::Failure;
        Ok(())
    }

    /// Dismissing the failure modal returns to review with input intact.
    pub fn dismiss_failure(&mut self) -> Result<(), WizardGuardError> {
        self.expect_stage(WizardStage::Failure)?;
        self.failure_message = None;
        self.stage = WizardStage::Review;
        Ok(())
    }

    /// Drives a fresh machine through every guard with the submitted
    /// values. Used server-side so a submission is accepted only when a
    /// client walking the wizard honestly could have produced it.
    pub fn validate_submission(
        primary_handle: &str,
        secondary: SecondaryClaim,
        title: &str,
        description: &str,
        attachments: Vec<String>,
    ) -> Result<(), WizardGuardError> {
        if secondary.id.trim().is_empty() || secondary.username.trim().is_empty() {
            return Err(WizardGuardError::MissingSecondaryClaim);
        }
        let mut wizard = ReportWizard::new();
        wizard.confirm_primary(primary_handle)?;
        wizard.deliver_secondary(secondary)?;
        wizard.confirm_secondary()?;
        wizard.confirm_details(title, description)?;
        wizard.confirm_evidence(attachments)?;
        wizard.begin_submit()?;
        Ok(())
    }
}
