use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use tokio::task;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    jobs::JOB_NOTIFY_PARTICIPANTS,
    lifecycle::{Role, UserStatus},
    models::{Job, ServiceRequest},
    notify::{Notification, TransitionNotice},
    schema::{companies, correspondents, service_requests, users},
    state::AppState,
};

use super::{JobExecution, JobHandler};

const RETRY_DELAY: Duration = Duration::from_secs(60);

/// Tells the parties of a request that it changed status.
pub struct NotifyParticipantsJob;

impl NotifyParticipantsJob {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Recipient {
    email: String,
    name: String,
    role: Role,
}

#[async_trait]
impl JobHandler for NotifyParticipantsJob {
    fn job_type(&self) -> &'static str {
        JOB_NOTIFY_PARTICIPANTS
    }

    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution {
        let notice: TransitionNotice = match serde_json::from_value(job.payload.clone()) {
            Ok(notice) => notice,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid notification payload: {err}"),
                }
            }
        };

        let lookup_state = state.clone();
        let lookup_notice = notice.clone();
        let recipients = match task::spawn_blocking(move || {
            let mut conn = lookup_state.db().map_err(|err| err.message().to_string())?;
            resolve_recipients(&mut conn, &lookup_notice).map_err(|err| err.to_string())
        })
        .await
        {
            Ok(Ok(Some(recipients))) => recipients,
            Ok(Ok(None)) => {
                warn!(
                    job_id = %job.id,
                    request_id = %notice.request_id,
                    "request vanished before notification"
                );
                return JobExecution::Success;
            }
            Ok(Err(error)) => {
                return JobExecution::Retry {
                    delay: RETRY_DELAY,
                    error,
                }
            }
            Err(join_err) => {
                error!(job_id = %job.id, error = %join_err, "recipient lookup panicked");
                return JobExecution::Retry {
                    delay: RETRY_DELAY,
                    error: format!("worker panicked: {join_err}"),
                };
            }
        };

        for recipient in &recipients {
            let notification = Notification {
                request_id: notice.request_id,
                recipient_email: recipient.email.clone(),
                recipient_name: recipient.name.clone(),
                recipient_role: recipient.role,
                subject: notice.subject(),
                message: notice.message(recipient.role),
            };
            if let Err(err) = state.notifier.send(&notification).await {
                return JobExecution::Retry {
                    delay: RETRY_DELAY,
                    error: format!("{err:#}"),
                };
            }
        }

        info!(
            job_id = %job.id,
            request_id = %notice.request_id,
            transition = %notice.transition,
            recipients = recipients.len(),
            "participants notified"
        );
        JobExecution::Success
    }
}

/// `None` when the request no longer exists.
fn resolve_recipients(
    conn: &mut PgConnection,
    notice: &TransitionNotice,
) -> QueryResult<Option<Vec<Recipient>>> {
    let Some(request) = service_requests::table
        .find(notice.request_id)
        .first::<ServiceRequest>(conn)
        .optional()?
    else {
        return Ok(None);
    };

    let mut recipients = Vec::new();
    for role in notice.audience() {
        let rows: Vec<(String, String)> = match role {
            Role::Admin => users::table
                .filter(users::role.eq(Role::Admin.as_str()))
                .filter(users::status.eq(UserStatus::Active.as_str()))
                .order(users::email.asc())
                .select((users::email, users::name))
                .load(conn)?,
            Role::Company => companies::table
                .inner_join(users::table)
                .filter(companies::id.eq(request.company_id))
                .select((users::email, users::name))
                .load(conn)?,
            Role::Correspondent => match request.correspondent_id {
                Some(correspondent_id) => correspondents_of(conn, correspondent_id)?,
                None => Vec::new(),
            },
        };
        recipients.extend(rows.into_iter().map(|(email, name)| Recipient {
            email,
            name,
            role: *role,
        }));
    }
    Ok(Some(recipients))
}

fn correspondents_of(
    conn: &mut PgConnection,
    correspondent_id: Uuid,
) -> QueryResult<Vec<(String, String)>> {
    correspondents::table
        .inner_join(users::table)
        .filter(correspondents::id.eq(correspondent_id))
        .select((users::email, users::name))
        .load(conn)
}
