//! Per-provider check-in flows, expressed as data.
//!
//! Each provider contributes one [`WorkflowTemplate`]: where to start, which
//! steps to run, how its blocking dialog looks, and what confirms success.
//! Templates are bound to a [`ReservationRequest`] to produce a [`Workflow`]
//! that the shared executor interprets.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::dialog::DialogSpec;
use crate::error::ConfigError;
use crate::types::{
    Action, DEFAULT_STEP_TIMEOUT, Locator, Provider, ReservationRequest, WorkflowStep, millis,
};
use crate::verify::Confirmation;

/// Request data a step can pull its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestField {
    LastName,
    ReservationCode,
    Email,
    DobDay,
    DobMonth,
    DobYear,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepValue {
    Field(RequestField),
    Literal(String),
}

impl StepValue {
    fn bind(&self, request: &ReservationRequest) -> String {
        match self {
            StepValue::Literal(v) => v.clone(),
            StepValue::Field(field) => match field {
                RequestField::LastName => request.last_name.clone(),
                RequestField::ReservationCode => request.reservation_code.clone(),
                RequestField::Email => request.email.clone(),
                // Option values on the sites are unpadded ("7", not "07").
                RequestField::DobDay => request.date_of_birth.day().to_string(),
                RequestField::DobMonth => request.date_of_birth.month().to_string(),
                RequestField::DobYear => request.date_of_birth.year().to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum ActionTemplate {
    Click,
    Input(StepValue),
    SelectByValue(StepValue),
    EnsureChecked,
    WaitForPresence,
    WaitForAbsence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTemplate {
    pub name: String,
    pub locator: Locator,
    pub action: ActionTemplate,
    #[serde(with = "millis", default = "default_step_timeout")]
    pub timeout: Duration,
    #[serde(default)]
    pub optional: bool,
}

fn default_step_timeout() -> Duration {
    DEFAULT_STEP_TIMEOUT
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParam {
    pub name: String,
    pub value: StepValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub entry_url: String,
    #[serde(default)]
    pub entry_params: Vec<QueryParam>,
    pub steps: Vec<StepTemplate>,
    #[serde(default)]
    pub dialog: Option<DialogSpec>,
    pub confirmation: Confirmation,
    /// Shown when the passenger is already checked in; short-circuits to verification.
    #[serde(default)]
    pub already_completed: Option<Locator>,
}

impl WorkflowTemplate {
    pub fn bind(
        &self,
        provider: Provider,
        request: &ReservationRequest,
    ) -> Result<Workflow, ConfigError> {
        let params: Vec<(&str, String)> = self
            .entry_params
            .iter()
            .map(|p| (p.name.as_str(), p.value.bind(request)))
            .collect();
        let entry_url = Url::parse_with_params(&self.entry_url, &params).map_err(|source| {
            ConfigError::EntryUrl {
                provider: provider.to_string(),
                source,
            }
        })?;

        let steps = self
            .steps
            .iter()
            .map(|t| WorkflowStep {
                name: t.name.clone(),
                locator: t.locator.clone(),
                action: match &t.action {
                    ActionTemplate::Click => Action::Click,
                    ActionTemplate::Input(v) => Action::Input(v.bind(request)),
                    ActionTemplate::SelectByValue(v) => Action::SelectByValue(v.bind(request)),
                    ActionTemplate::EnsureChecked => Action::EnsureChecked,
                    ActionTemplate::WaitForPresence => Action::WaitForPresence,
                    ActionTemplate::WaitForAbsence => Action::WaitForAbsence,
                },
                timeout: t.timeout,
                optional: t.optional,
            })
            .collect();

        Ok(Workflow {
            provider,
            entry_url: entry_url.to_string(),
            steps,
            dialog: self.dialog.clone(),
            confirmation: self.confirmation.clone(),
            already_completed: self.already_completed.clone(),
        })
    }
}

/// A template bound to one reservation, ready for the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workflow {
    pub provider: Provider,
    pub entry_url: String,
    pub steps: Vec<WorkflowStep>,
    pub dialog: Option<DialogSpec>,
    pub confirmation: Confirmation,
    pub already_completed: Option<Locator>,
}

/// Provider → workflow table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    workflows: HashMap<Provider, WorkflowTemplate>,
}

impl Catalog {
    pub fn builtin() -> Self {
        let workflows = HashMap::from([
            (Provider::Aeromexico, aeromexico()),
            (Provider::Volaris, volaris()),
            (Provider::VivaAerobus, vivaaerobus()),
        ]);
        Self { workflows }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::CatalogIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::CatalogFormat {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Built-in tables, overlaid with `path` or, failing that, the user's config file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut catalog = Self::builtin();
        let override_path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_override_path().filter(|p| p.exists()),
        };
        match override_path {
            Some(p) => {
                let overrides = Self::from_json_file(&p)?;
                info!(path = %p.display(), providers = overrides.workflows.len(), "loaded provider overrides");
                catalog.workflows.extend(overrides.workflows);
            }
            None => debug!("using built-in provider tables"),
        }
        Ok(catalog)
    }

    /// Replace (or add) the flow for one provider.
    pub fn with_workflow(mut self, provider: Provider, template: WorkflowTemplate) -> Self {
        self.workflows.insert(provider, template);
        self
    }

    pub fn providers(&self) -> impl Iterator<Item = Provider> + '_ {
        Provider::ALL
            .into_iter()
            .filter(move |p| self.workflows.contains_key(p))
    }

    pub fn template(&self, provider: Provider) -> Option<&WorkflowTemplate> {
        self.workflows.get(&provider)
    }

    pub fn workflow_for(&self, request: &ReservationRequest) -> Result<Workflow, ConfigError> {
        self.template(request.provider)
            .ok_or_else(|| ConfigError::MissingWorkflow(request.provider.to_string()))?
            .bind(request.provider, request)
    }
}

fn default_override_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("autocheckin").join("providers.json"))
}

fn step(name: &str, locator: Locator, action: ActionTemplate) -> StepTemplate {
    StepTemplate {
        name: name.to_string(),
        locator,
        action,
        timeout: DEFAULT_STEP_TIMEOUT,
        optional: false,
    }
}

fn input(field: RequestField) -> ActionTemplate {
    ActionTemplate::Input(StepValue::Field(field))
}

fn select(field: RequestField) -> ActionTemplate {
    ActionTemplate::SelectByValue(StepValue::Field(field))
}

impl StepTemplate {
    fn within(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

fn aeromexico() -> WorkflowTemplate {
    use ActionTemplate::*;
    use RequestField::*;

    WorkflowTemplate {
        entry_url: "https://aeromexico.com/es-mx/check-in".into(),
        entry_params: Vec::new(),
        steps: vec![
            step("reservation code", Locator::id("ticketNumber"), input(ReservationCode)),
            step("last name", Locator::id("lastName"), input(LastName)),
            step(
                "search reservation",
                Locator::xpath(
                    "//button[@aria-label='Buscar reservación' and contains(@class, 'Btn--filledRed')]",
                ),
                Click,
            ),
            step(
                "no reservation error",
                Locator::xpath("//div[contains(@class, 'error-message')]"),
                WaitForAbsence,
            )
            .within(Duration::from_secs(5)),
            step(
                "open boarding pass",
                Locator::xpath(
                    "//button[@aria-label='Pase de abordar' and contains(@class, 'btn-for-checkin')]",
                ),
                Click,
            ),
            step("accept privacy policy", Locator::name("privacyPolicy"), EnsureChecked),
            step(
                "complete check-in",
                Locator::xpath(
                    "/html/body/div[2]/div/div/div[1]/div[2]/div/div[2]/div/main/div[3]/section/div/div/div/section/form/section/section[2]/div[2]/button",
                ),
                Click,
            ),
            step("birth day", Locator::name("bday bday-day"), select(DobDay)),
            step("birth month", Locator::name("bday bday-month"), select(DobMonth)),
            step("birth year", Locator::name("bday bday-year"), select(DobYear)),
            step("email", Locator::id("email"), input(Email)),
            step(
                "send boarding pass",
                Locator::xpath(
                    "//button[@aria-label='Enviar' and contains(@class, 'Btn--filledRed') and contains(@class, 'main-send-button')]",
                ),
                Click,
            ),
        ],
        dialog: None,
        confirmation: Confirmation {
            locator: Locator::xpath("//div[contains(text(), 'Tu pase de abordar ha sido enviado')]"),
            deadline: Duration::from_secs(60),
        },
        already_completed: None,
    }
}

fn volaris() -> WorkflowTemplate {
    use ActionTemplate::*;
    use RequestField::*;

    WorkflowTemplate {
        entry_url: "https://www.volaris.com/".into(),
        entry_params: Vec::new(),
        steps: vec![
            step(
                "boarding pass tab",
                Locator::xpath("//div[@role='tab' and contains(., 'Pase de abordar')]"),
                Click,
            ),
            step(
                "reservation code",
                Locator::xpath("//input[@formcontrolname='reservationCode']"),
                input(ReservationCode),
            ),
            step(
                "last name",
                Locator::xpath("//input[@formcontrolname='lastName']"),
                input(LastName),
            ),
            step(
                "my trips",
                Locator::xpath(
                    "//button[contains(@class, 'btn-large') and contains(., 'Ir a mis viajes')]",
                ),
                Click,
            ),
            step(
                "email boarding pass",
                Locator::xpath(
                    "//button[contains(@class, 'btn-small') and contains(., 'Enviar por correo electrónico')]",
                ),
                Click,
            )
            .within(Duration::from_secs(40)),
            step("email", Locator::xpath("//input[@placeholder='Email']"), input(Email)),
            step(
                "send boarding pass",
                Locator::xpath(
                    "//button[contains(@class, 'btn-large') and contains(., 'Enviar pase de abordar')]",
                ),
                Click,
            ),
        ],
        dialog: None,
        confirmation: Confirmation {
            locator: Locator::xpath("//*[contains(text(), 'enviado')]"),
            deadline: Duration::from_secs(50),
        },
        already_completed: None,
    }
}

fn vivaaerobus() -> WorkflowTemplate {
    use ActionTemplate::*;
    use RequestField::*;

    let short = Duration::from_secs(10);
    WorkflowTemplate {
        entry_url: "https://www.vivaaerobus.com/es-mx/check-in".into(),
        entry_params: vec![
            QueryParam {
                name: "pnr".into(),
                value: StepValue::Field(ReservationCode),
            },
            QueryParam {
                name: "lastName".into(),
                value: StepValue::Field(LastName),
            },
        ],
        steps: vec![
            step("check-in page", Locator::css("app-check-in-journey"), WaitForPresence)
                .within(short)
                .optional(),
            step(
                "check-in completed banner",
                Locator::xpath("//span[contains(text(), 'Check-in completado')]"),
                WaitForPresence,
            )
            .within(short)
            .optional(),
            step(
                "boarding passes",
                Locator::xpath(
                    "//div[contains(@class, 'completed-btn')]/span[contains(text(), 'Pases de abordar')]",
                ),
                Click,
            )
            .within(short),
            step(
                "download pass",
                Locator::xpath("//div[contains(@class, 'pass-available')]"),
                Click,
            )
            .within(short),
            step(
                "email option",
                Locator::xpath("//*[contains(text(), 'Enviar por correo')]"),
                Click,
            )
            .within(short),
            step(
                "email",
                Locator::xpath("//app-modal[13]/div[1]/div/div/div[2]/div[3]/form/div/input"),
                input(Email),
            )
            .within(short),
            step(
                "send boarding pass",
                Locator::xpath("//button[contains(@class, 'viva-btn') and contains(., 'Enviar')]"),
                Click,
            )
            .within(short),
        ],
        dialog: Some(DialogSpec {
            container: Locator::css("app-dialog"),
            dismiss: vec![
                Locator::xpath("/html/body/app-dialog/div/div/app-notification-dialog/div/button"),
                Locator::xpath(
                    "/html/body/app-dialog/div/div/app-notification-dialog/div/div[4]/button",
                ),
            ],
        }),
        confirmation: Confirmation {
            locator: Locator::xpath("//*[contains(text(), 'enviado')]"),
            deadline: Duration::from_secs(50),
        },
        already_completed: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DateOfBirth;

    fn request(provider: Provider) -> ReservationRequest {
        ReservationRequest::new(
            "de la Cruz",
            "XYZ789",
            "pax@example.com",
            DateOfBirth::parse("07-03-1990").unwrap(),
            provider,
        )
    }

    #[test]
    fn every_provider_has_a_builtin_workflow() {
        let catalog = Catalog::builtin();
        for provider in Provider::ALL {
            let wf = catalog.workflow_for(&request(provider)).unwrap();
            assert!(!wf.steps.is_empty(), "{provider} has no steps");
        }
    }

    #[test]
    fn date_of_birth_binds_unpadded() {
        let wf = Catalog::builtin()
            .workflow_for(&request(Provider::Aeromexico))
            .unwrap();
        let values: Vec<_> = wf
            .steps
            .iter()
            .filter_map(|s| match &s.action {
                Action::SelectByValue(v) => Some(v.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec!["7", "3", "1990"]);
    }

    #[test]
    fn viva_entry_url_carries_encoded_reservation() {
        let wf = Catalog::builtin()
            .workflow_for(&request(Provider::VivaAerobus))
            .unwrap();
        assert_eq!(
            wf.entry_url,
            "https://www.vivaaerobus.com/es-mx/check-in?pnr=XYZ789&lastName=de+la+Cruz"
        );
    }

    #[test]
    fn override_file_replaces_one_provider() {
        let mut custom = volaris();
        custom.entry_url = "https://staging.volaris.test/".into();
        let mut overrides = HashMap::new();
        overrides.insert(Provider::Volaris, custom);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("providers.json");
        std::fs::write(&path, serde_json::to_string(&overrides).unwrap()).unwrap();

        let catalog = Catalog::load(Some(&path)).unwrap();
        assert_eq!(
            catalog.template(Provider::Volaris).unwrap().entry_url,
            "https://staging.volaris.test/"
        );
        assert!(catalog.template(Provider::Aeromexico).is_some());
    }

    #[test]
    fn malformed_override_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("providers.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Catalog::load(Some(&path)),
            Err(ConfigError::CatalogFormat { .. })
        ));
    }

    #[test]
    fn templates_survive_json() {
        let json = serde_json::to_string(&Catalog::builtin()).unwrap();
        let back: Catalog = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back.template(Provider::VivaAerobus),
            Catalog::builtin().template(Provider::VivaAerobus)
        );
    }

    #[test]
    fn providers_are_listed_in_declaration_order() {
        let catalog = Catalog::default().with_workflow(Provider::VivaAerobus, vivaaerobus());
        assert_eq!(catalog.providers().collect::<Vec<_>>(), vec![Provider::VivaAerobus]);

        let all: Vec<_> = Catalog::builtin().providers().collect();
        assert_eq!(all, Provider::ALL.to_vec());
    }
}
