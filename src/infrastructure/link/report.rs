use crate::domain::error::LinkError;
use crate::domain::models::Endpoint;
use crate::infrastructure::link::transport::OpenedLink;

/// What attempt, session and timer tasks tell the manager. Every report
/// carries the generation (or ticket) it belongs to so late reports from
/// superseded work can be dropped.
#[derive(Debug)]
pub(crate) enum TaskReport {
    AttemptSucceeded {
        generation: u64,
        endpoint: Endpoint,
        link: OpenedLink,
    },
    AttemptFailed {
        generation: u64,
        error: LinkError,
    },
    SessionLost {
        generation: u64,
        error: LinkError,
    },
    ReconnectDue {
        ticket: u64,
    },
}
