//! Service request lifecycle.
//!
//! A request moves through a fixed set of statuses. Each move is a
//! [`Transition`] that only one role may trigger, and only from specific
//! statuses:
//!
//! ```text
//! pending_approval ──set_value──> approved ──assign──> assigned ──accept──> accepted
//!        │                            │                   │                    │
//!        └───────cancel──> cancelled <┘                   └──reject──> rejected │
//!                                                                    confirm_presence
//!                                                                              │
//!                      completed <──submit_documentation── in_progress <───────┘
//! ```
//!
//! Everything in this module is pure: [`plan`] takes the acting identity, a
//! snapshot of the request and a [`Command`], and either returns the
//! [`Effect`] to persist or a [`LifecycleError`] explaining why nothing may
//! change. [`store`] applies effects to Postgres atomically.

use std::{fmt, str::FromStr};

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::ServiceRequest;

mod actor;
pub mod store;
mod values;

pub use actor::{Actor, CandidateCorrespondent, Role, UserStatus};
pub use values::{
    normalize_amount, optional_text, parse_amount, parse_datetime, parse_optional_datetime,
    Location, ServiceType, UnknownVariant,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("{0}")]
    Authorization(String),
    #[error("cannot {} a request that is {current}", .transition.verb())]
    InvalidState {
        transition: Transition,
        current: RequestStatus,
    },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Validation(String),
}

impl LifecycleError {
    fn unauthorized(message: impl Into<String>) -> Self {
        LifecycleError::Authorization(message.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    PendingApproval,
    Approved,
    Assigned,
    Accepted,
    Rejected,
    InProgress,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 8] = [
        RequestStatus::PendingApproval,
        RequestStatus::Approved,
        RequestStatus::Assigned,
        RequestStatus::Accepted,
        RequestStatus::Rejected,
        RequestStatus::InProgress,
        RequestStatus::Completed,
        RequestStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::PendingApproval => "pending_approval",
            RequestStatus::Approved => "approved",
            RequestStatus::Assigned => "assigned",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Cancelled)
    }

    /// Statuses in which a missed deadline no longer matters.
    pub fn is_closed(self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Cancelled | RequestStatus::Rejected
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value.trim())
            .ok_or_else(|| UnknownVariant::new("request status", value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Create,
    SetValue,
    Assign,
    Accept,
    Reject,
    ConfirmPresence,
    SubmitDocumentation,
    Cancel,
}

impl Transition {
    pub fn as_str(self) -> &'static str {
        match self {
            Transition::Create => "create",
            Transition::SetValue => "set_value",
            Transition::Assign => "assign",
            Transition::Accept => "accept",
            Transition::Reject => "reject",
            Transition::ConfirmPresence => "confirm_presence",
            Transition::SubmitDocumentation => "submit_documentation",
            Transition::Cancel => "cancel",
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Transition::Create => "create",
            Transition::SetValue => "set the value of",
            Transition::Assign => "assign",
            Transition::Accept => "accept",
            Transition::Reject => "reject",
            Transition::ConfirmPresence => "confirm presence for",
            Transition::SubmitDocumentation => "submit documentation for",
            Transition::Cancel => "cancel",
        }
    }

    pub fn actor_role(self) -> Role {
        match self {
            Transition::Create | Transition::Cancel => Role::Company,
            Transition::SetValue | Transition::Assign => Role::Admin,
            Transition::Accept
            | Transition::Reject
            | Transition::ConfirmPresence
            | Transition::SubmitDocumentation => Role::Correspondent,
        }
    }

    /// Statuses this transition may start from.
    pub fn sources(self) -> Vec<RequestStatus> {
        RequestStatus::ALL
            .into_iter()
            .filter(|status| next_status(self, *status).is_ok())
            .collect()
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The transition table.
pub fn next_status(
    transition: Transition,
    current: RequestStatus,
) -> Result<RequestStatus, LifecycleError> {
    use RequestStatus::*;

    let next = match (transition, current) {
        (Transition::SetValue, PendingApproval) => Approved,
        (Transition::Assign, Approved) => Assigned,
        (Transition::Accept, Assigned) => Accepted,
        (Transition::Reject, Assigned) => Rejected,
        (Transition::ConfirmPresence, Accepted) => InProgress,
        (Transition::SubmitDocumentation, InProgress) => Completed,
        (Transition::Cancel, PendingApproval | Approved) => Cancelled,
        (Transition::Create, _)
        | (Transition::SetValue, _)
        | (Transition::Assign, _)
        | (Transition::Accept, _)
        | (Transition::Reject, _)
        | (Transition::ConfirmPresence, _)
        | (Transition::SubmitDocumentation, _)
        | (Transition::Cancel, _) => {
            return Err(LifecycleError::InvalidState {
                transition,
                current,
            })
        }
    };
    Ok(next)
}

pub fn profit_margin(company_value: Decimal, correspondent_value: Decimal) -> Decimal {
    company_value - correspondent_value
}

pub fn is_overdue(
    status: RequestStatus,
    deadline: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> bool {
    match deadline {
        Some(deadline) => !status.is_closed() && now > deadline,
        None => false,
    }
}

/// The parts of a stored request the state machine reasons about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSnapshot {
    pub id: Uuid,
    pub company_id: Uuid,
    pub correspondent_id: Option<Uuid>,
    pub status: RequestStatus,
    pub company_value: Option<Decimal>,
    pub correspondent_value: Option<Decimal>,
    pub profit_margin: Option<Decimal>,
    pub instructions: Option<String>,
}

impl RequestSnapshot {
    pub fn pending(id: Uuid, company_id: Uuid) -> Self {
        Self {
            id,
            company_id,
            correspondent_id: None,
            status: RequestStatus::PendingApproval,
            company_value: None,
            correspondent_value: None,
            profit_margin: None,
            instructions: None,
        }
    }

    /// Applies a planned effect in memory, mirroring what the store persists.
    pub fn apply(&mut self, effect: &Effect) {
        let changes = &effect.changes;
        self.status = effect.to;
        if let Some(value) = changes.company_value {
            self.company_value = Some(value);
        }
        if let Some(correspondent_id) = changes.correspondent_id {
            self.correspondent_id = correspondent_id;
        }
        if let Some(value) = changes.correspondent_value {
            self.correspondent_value = Some(value);
        }
        if let Some(value) = changes.profit_margin {
            self.profit_margin = Some(value);
        }
        if let Some(ref instructions) = changes.instructions {
            self.instructions = instructions.clone();
        }
    }
}

impl TryFrom<&ServiceRequest> for RequestSnapshot {
    type Error = UnknownVariant;

    fn try_from(request: &ServiceRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            id: request.id,
            company_id: request.company_id,
            correspondent_id: request.correspondent_id,
            status: request.status.parse()?,
            company_value: request.company_value,
            correspondent_value: request.correspondent_value,
            profit_margin: request.profit_margin,
            instructions: request.instructions.clone(),
        })
    }
}

/// A transition on an existing request together with its raw input.
///
/// Inputs stay as submitted so that they are validated only after the actor
/// and the current status have been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetValue {
        company_value: String,
    },
    Assign {
        correspondent: Option<CandidateCorrespondent>,
        correspondent_value: String,
        instructions: Option<String>,
    },
    Accept,
    Reject,
    ConfirmPresence,
    SubmitDocumentation {
        report: String,
    },
    Cancel,
}

impl Command {
    pub fn transition(&self) -> Transition {
        match self {
            Command::SetValue { .. } => Transition::SetValue,
            Command::Assign { .. } => Transition::Assign,
            Command::Accept => Transition::Accept,
            Command::Reject => Transition::Reject,
            Command::ConfirmPresence => Transition::ConfirmPresence,
            Command::SubmitDocumentation { .. } => Transition::SubmitDocumentation,
            Command::Cancel => Transition::Cancel,
        }
    }
}

/// Column writes that accompany a status change. `None` leaves a column alone;
/// `Some(None)` on a nullable column clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldChanges {
    pub company_value: Option<Decimal>,
    pub correspondent_id: Option<Option<Uuid>>,
    pub correspondent_value: Option<Decimal>,
    pub profit_margin: Option<Decimal>,
    pub instructions: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Effect {
    pub transition: Transition,
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub changes: FieldChanges,
}

/// Checks that `actor` may run `transition` on `request`.
///
/// `request` is `None` only for [`Transition::Create`].
pub fn authorize(
    actor: &Actor,
    request: Option<&RequestSnapshot>,
    transition: Transition,
) -> Result<(), LifecycleError> {
    let required = transition.actor_role();
    if actor.role != required {
        return Err(LifecycleError::unauthorized(format!(
            "only {required} accounts may {} a request",
            transition.verb()
        )));
    }
    if !actor.is_active() {
        return Err(LifecycleError::unauthorized(format!(
            "account is {}, not active",
            actor.status
        )));
    }

    match required {
        Role::Admin => Ok(()),
        Role::Company => {
            let company_id = actor
                .profile_id
                .ok_or_else(|| LifecycleError::unauthorized("company profile not found"))?;
            match request {
                Some(request) if request.company_id != company_id => Err(
                    LifecycleError::unauthorized("request belongs to another company"),
                ),
                _ => Ok(()),
            }
        }
        Role::Correspondent => {
            let correspondent_id = actor
                .profile_id
                .ok_or_else(|| LifecycleError::unauthorized("correspondent profile not found"))?;
            match request {
                Some(request) if request.correspondent_id == Some(correspondent_id) => Ok(()),
                _ => Err(LifecycleError::unauthorized(
                    "request is not assigned to this correspondent",
                )),
            }
        }
    }
}

/// Checks that a company may open a new request and returns the owning company id.
pub fn plan_create(actor: &Actor) -> Result<Uuid, LifecycleError> {
    authorize(actor, None, Transition::Create)?;
    actor
        .profile_id
        .ok_or_else(|| LifecycleError::unauthorized("company profile not found"))
}

/// Validates `command` against `request` and returns what must be written.
pub fn plan(
    actor: &Actor,
    request: &RequestSnapshot,
    command: &Command,
) -> Result<Effect, LifecycleError> {
    let transition = command.transition();
    authorize(actor, Some(request), transition)?;
    let to = next_status(transition, request.status)?;

    let changes = match command {
        Command::SetValue { company_value } => {
            let company_value = parse_amount("company_value", company_value)?;
            if company_value.is_zero() {
                return Err(LifecycleError::Validation(
                    "company_value must be greater than zero".into(),
                ));
            }
            FieldChanges {
                company_value: Some(company_value),
                ..FieldChanges::default()
            }
        }
        Command::Assign {
            correspondent,
            correspondent_value,
            instructions,
        } => {
            let correspondent_value = parse_amount("correspondent_value", correspondent_value)?;
            let company_value = request.company_value.ok_or_else(|| {
                LifecycleError::Validation("request has no company value to assign against".into())
            })?;
            let correspondent = correspondent.ok_or(LifecycleError::NotFound("correspondent"))?;
            if correspondent.account_status != UserStatus::Active {
                return Err(LifecycleError::Validation(format!(
                    "correspondent account is {}, not active",
                    correspondent.account_status
                )));
            }
            FieldChanges {
                correspondent_id: Some(Some(correspondent.id)),
                correspondent_value: Some(correspondent_value),
                profit_margin: Some(profit_margin(company_value, correspondent_value)),
                instructions: Some(optional_text(instructions.as_deref())),
                ..FieldChanges::default()
            }
        }
        Command::Reject => FieldChanges {
            correspondent_id: Some(None),
            ..FieldChanges::default()
        },
        Command::SubmitDocumentation { report } => {
            if report.trim().is_empty() {
                return Err(LifecycleError::Validation("report must not be empty".into()));
            }
            FieldChanges::default()
        }
        Command::Accept | Command::ConfirmPresence | Command::Cancel => FieldChanges::default(),
    };

    Ok(Effect {
        transition,
        from: request.status,
        to,
        changes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: Role, profile_id: Option<Uuid>) -> Actor {
        Actor {
            user_id: Uuid::new_v4(),
            role,
            status: UserStatus::Active,
            profile_id,
        }
    }

    fn amount(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    struct Fixture {
        admin: Actor,
        company: Actor,
        correspondent: Actor,
        request: RequestSnapshot,
    }

    impl Fixture {
        fn new() -> Self {
            let company = actor(Role::Company, Some(Uuid::new_v4()));
            let request = RequestSnapshot::pending(Uuid::new_v4(), company.profile_id.unwrap());
            Self {
                admin: actor(Role::Admin, None),
                company,
                correspondent: actor(Role::Correspondent, Some(Uuid::new_v4())),
                request,
            }
        }

        fn candidate(&self) -> CandidateCorrespondent {
            CandidateCorrespondent {
                id: self.correspondent.profile_id.unwrap(),
                account_status: UserStatus::Active,
            }
        }

        fn run(&mut self, actor: &Actor, command: Command) -> Result<Effect, LifecycleError> {
            let effect = plan(actor, &self.request, &command)?;
            self.request.apply(&effect);
            Ok(effect)
        }

        fn approve(&mut self, value: &str) {
            let admin = self.admin.clone();
            self.run(
                &admin,
                Command::SetValue {
                    company_value: value.into(),
                },
            )
            .unwrap();
        }

        fn assign(&mut self, value: &str) {
            let admin = self.admin.clone();
            let candidate = self.candidate();
            self.run(
                &admin,
                Command::Assign {
                    correspondent: Some(candidate),
                    correspondent_value: value.into(),
                    instructions: Some("bring the power of attorney".into()),
                },
            )
            .unwrap();
        }

        fn as_correspondent(&mut self, command: Command) -> Result<Effect, LifecycleError> {
            let correspondent = self.correspondent.clone();
            self.run(&correspondent, command)
        }
    }

    #[test]
    fn full_lifecycle_reaches_completed_with_derived_margin() {
        let mut fx = Fixture::new();
        assert_eq!(fx.request.status, RequestStatus::PendingApproval);

        fx.approve("500.00");
        assert_eq!(fx.request.status, RequestStatus::Approved);
        assert_eq!(fx.request.company_value, Some(amount("500.00")));

        fx.assign("200.00");
        assert_eq!(fx.request.status, RequestStatus::Assigned);
        assert_eq!(fx.request.correspondent_id, fx.correspondent.profile_id);
        assert_eq!(fx.request.profit_margin, Some(amount("300.00")));
        assert_eq!(
            fx.request.instructions.as_deref(),
            Some("bring the power of attorney")
        );

        fx.as_correspondent(Command::Accept).unwrap();
        assert_eq!(fx.request.status, RequestStatus::Accepted);
        fx.as_correspondent(Command::ConfirmPresence).unwrap();
        assert_eq!(fx.request.status, RequestStatus::InProgress);
        fx.as_correspondent(Command::SubmitDocumentation {
            report: "hearing held, minutes attached".into(),
        })
        .unwrap();
        assert_eq!(fx.request.status, RequestStatus::Completed);
        assert!(fx.request.status.is_terminal());
    }

    #[test]
    fn margin_always_matches_values() {
        for (company, correspondent) in [
            ("500", "200"),
            ("120.50", "80.25"),
            ("90", "90"),
            ("50", "75"),
        ] {
            let mut fx = Fixture::new();
            fx.approve(company);
            fx.assign(correspondent);
            assert_eq!(
                fx.request.profit_margin.unwrap(),
                fx.request.company_value.unwrap() - fx.request.correspondent_value.unwrap()
            );
        }
    }

    #[test]
    fn assign_requires_prior_approval() {
        let mut fx = Fixture::new();
        let admin = fx.admin.clone();
        let candidate = fx.candidate();
        let err = fx
            .run(
                &admin,
                Command::Assign {
                    correspondent: Some(candidate),
                    correspondent_value: "100".into(),
                    instructions: None,
                },
            )
            .unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidState {
                transition: Transition::Assign,
                current: RequestStatus::PendingApproval,
            }
        );
        assert_eq!(fx.request.status, RequestStatus::PendingApproval);
        assert_eq!(fx.request.correspondent_id, None);
    }

    #[test]
    fn completion_is_only_reachable_from_in_progress() {
        assert_eq!(
            Transition::SubmitDocumentation.sources(),
            vec![RequestStatus::InProgress]
        );
        let transitions = [
            Transition::SetValue,
            Transition::Assign,
            Transition::Accept,
            Transition::Reject,
            Transition::ConfirmPresence,
            Transition::SubmitDocumentation,
            Transition::Cancel,
        ];
        for status in RequestStatus::ALL {
            let reaches_completed = transitions
                .into_iter()
                .any(|transition| next_status(transition, status) == Ok(RequestStatus::Completed));
            assert_eq!(
                reaches_completed,
                status == RequestStatus::InProgress,
                "{status}"
            );
        }
    }

    #[test]
    fn cancel_only_before_assignment() {
        assert_eq!(
            Transition::Cancel.sources(),
            vec![RequestStatus::PendingApproval, RequestStatus::Approved]
        );

        let mut fx = Fixture::new();
        fx.approve("300");
        fx.assign("100");
        let company = fx.company.clone();
        for step in [None, Some(Command::Accept), Some(Command::ConfirmPresence)] {
            if let Some(command) = step {
                fx.as_correspondent(command).unwrap();
            }
            let before = fx.request.clone();
            let err = fx.run(&company, Command::Cancel).unwrap_err();
            assert!(matches!(err, LifecycleError::InvalidState { .. }));
            assert_eq!(fx.request, before);
        }

        fx.as_correspondent(Command::SubmitDocumentation {
            report: "done".into(),
        })
        .unwrap();
        assert!(fx.run(&company, Command::Cancel).is_err());
        assert_eq!(fx.request.status, RequestStatus::Completed);
    }

    #[test]
    fn owner_can_cancel_approved_request() {
        let mut fx = Fixture::new();
        fx.approve("300");
        let company = fx.company.clone();
        fx.run(&company, Command::Cancel).unwrap();
        assert_eq!(fx.request.status, RequestStatus::Cancelled);
    }

    #[test]
    fn other_company_cannot_cancel() {
        let mut fx = Fixture::new();
        let intruder = actor(Role::Company, Some(Uuid::new_v4()));
        let err = fx.run(&intruder, Command::Cancel).unwrap_err();
        assert!(matches!(err, LifecycleError::Authorization(_)));
        assert_eq!(fx.request.status, RequestStatus::PendingApproval);
    }

    #[test]
    fn only_assigned_correspondent_may_act() {
        let mut fx = Fixture::new();
        fx.approve("500");
        fx.assign("200");
        let stranger = actor(Role::Correspondent, Some(Uuid::new_v4()));

        for command in [
            Command::Accept,
            Command::Reject,
            Command::ConfirmPresence,
            Command::SubmitDocumentation {
                report: "report".into(),
            },
        ] {
            let before = fx.request.clone();
            let err = fx.run(&stranger, command).unwrap_err();
            assert!(matches!(err, LifecycleError::Authorization(_)));
            assert_eq!(fx.request, before);
        }
    }

    #[test]
    fn reject_clears_assignment_but_keeps_values() {
        let mut fx = Fixture::new();
        fx.approve("500.00");
        fx.assign("200.00");
        fx.as_correspondent(Command::Reject).unwrap();

        assert_eq!(fx.request.status, RequestStatus::Rejected);
        assert_eq!(fx.request.correspondent_id, None);
        assert_eq!(fx.request.correspondent_value, Some(amount("200.00")));
        assert_eq!(fx.request.profit_margin, Some(amount("300.00")));

        // the former assignee no longer owns the request
        let err = fx.as_correspondent(Command::Accept).unwrap_err();
        assert!(matches!(err, LifecycleError::Authorization(_)));
    }

    #[test]
    fn rejected_request_is_not_reassignable() {
        let mut fx = Fixture::new();
        fx.approve("500.00");
        fx.assign("200.00");
        fx.as_correspondent(Command::Reject).unwrap();

        let admin = fx.admin.clone();
        let candidate = fx.candidate();
        let err = fx
            .run(
                &admin,
                Command::Assign {
                    correspondent: Some(candidate),
                    correspondent_value: "150".into(),
                    instructions: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidState { .. }));
    }

    #[test]
    fn wrong_role_is_refused_before_status_check() {
        let fx = Fixture::new();
        let err = plan(
            &fx.company,
            &fx.request,
            &Command::SetValue {
                company_value: "100".into(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::Authorization(_)));
    }

    #[test]
    fn inactive_accounts_cannot_act() {
        let mut fx = Fixture::new();
        fx.admin.status = UserStatus::Inactive;
        let err = plan(
            &fx.admin,
            &fx.request,
            &Command::SetValue {
                company_value: "100".into(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::Authorization(_)));

        fx.company.status = UserStatus::Pending;
        assert!(matches!(
            plan_create(&fx.company),
            Err(LifecycleError::Authorization(_))
        ));
    }

    #[test]
    fn create_requires_company_profile() {
        let company = actor(Role::Company, None);
        assert!(matches!(plan_create(&company), Err(LifecycleError::Authorization(_))));
        let company = actor(Role::Company, Some(Uuid::new_v4()));
        assert_eq!(plan_create(&company), Ok(company.profile_id.unwrap()));
    }

    #[test]
    fn malformed_values_are_validation_errors() {
        let fx = Fixture::new();
        for raw in ["", "abc", "-10", "0", "10.001"] {
            let err = plan(
                &fx.admin,
                &fx.request,
                &Command::SetValue {
                    company_value: raw.into(),
                },
            )
            .unwrap_err();
            assert!(matches!(err, LifecycleError::Validation(_)), "{raw}");
        }
    }

    #[test]
    fn assign_checks_correspondent_presence_and_status() {
        let mut fx = Fixture::new();
        fx.approve("500");
        let missing = plan(
            &fx.admin,
            &fx.request,
            &Command::Assign {
                correspondent: None,
                correspondent_value: "100".into(),
                instructions: None,
            },
        )
        .unwrap_err();
        assert_eq!(missing, LifecycleError::NotFound("correspondent"));

        let inactive = CandidateCorrespondent {
            id: Uuid::new_v4(),
            account_status: UserStatus::Pending,
        };
        let err = plan(
            &fx.admin,
            &fx.request,
            &Command::Assign {
                correspondent: Some(inactive),
                correspondent_value: "100".into(),
                instructions: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)));
    }

    #[test]
    fn empty_report_is_refused() {
        let mut fx = Fixture::new();
        fx.approve("500");
        fx.assign("200");
        fx.as_correspondent(Command::Accept).unwrap();
        fx.as_correspondent(Command::ConfirmPresence).unwrap();
        let err = fx
            .as_correspondent(Command::SubmitDocumentation {
                report: "   ".into(),
            })
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)));
        assert_eq!(fx.request.status, RequestStatus::InProgress);
    }

    #[test]
    fn invalid_state_message_names_action_and_status() {
        let err = next_status(Transition::Cancel, RequestStatus::Assigned).unwrap_err();
        assert_eq!(err.to_string(), "cannot cancel a request that is assigned");
    }

    #[test]
    fn overdue_ignores_closed_requests() {
        let deadline = parse_datetime("deadline", "2026-01-10T12:00").unwrap();
        let later = parse_datetime("now", "2026-01-11T12:00").unwrap();
        assert!(is_overdue(RequestStatus::Accepted, Some(deadline), later));
        assert!(!is_overdue(RequestStatus::Completed, Some(deadline), later));
        assert!(!is_overdue(RequestStatus::Rejected, Some(deadline), later));
        assert!(!is_overdue(RequestStatus::Accepted, Some(deadline), deadline));
        assert!(!is_overdue(RequestStatus::Accepted, None, later));
    }

    #[test]
    fn statuses_round_trip_through_storage_text() {
        for status in RequestStatus::ALL {
            assert_eq!(status.as_str().parse::<RequestStatus>(), Ok(status));
        }
        assert!("done".parse::<RequestStatus>().is_err());
    }
}
