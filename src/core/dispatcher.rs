use crate::core::failure::{sanitize, FailureKind};
use crate::core::message::TranscriptRole;
use crate::core::session::Session;
use tracing::{debug, warn};

/// Words that end the session, compared trimmed and case-insensitively.
pub const EXIT_KEYWORDS: &[&str] = &["exit", "quit", "q"];

#[derive(Debug, Clone, PartialEq)]
pub struct PresentedReply {
    pub text: String,
    /// Kind of the last failure seen during the turn, if any.
    pub failure: Option<FailureKind>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Blank input; nothing happened.
    Ignored,
    /// The user asked to stop.
    Exit,
    Reply(PresentedReply),
}

pub fn is_exit_keyword(utterance: &str) -> bool {
    let trimmed = utterance.trim();
    EXIT_KEYWORDS
        .iter()
        .any(|keyword| trimmed.eq_ignore_ascii_case(keyword))
}

/// Runs one user turn against `session`.
///
/// The agent is invoked at most once and never retried. Whatever it returns
/// is scrubbed of raw failure detail before it reaches the transcript.
pub async fn handle_turn(session: &mut Session, utterance: &str) -> TurnOutcome {
    let utterance = utterance.trim();
    if utterance.is_empty() {
        return TurnOutcome::Ignored;
    }
    if is_exit_keyword(utterance) {
        return TurnOutcome::Exit;
    }

    session.transcript.push(TranscriptRole::User, utterance);

    let reply = match session.agent.respond(utterance).await {
        Ok(reply) => {
            let (text, scrubbed) = sanitize(&reply.text, &reply.failures);
            if scrubbed {
                debug!("Removed raw failure detail from reply");
            }
            PresentedReply {
                text,
                failure: reply.failures.last().map(|failure| failure.kind),
            }
        }
        Err(err) => {
            let record = err.failure();
            warn!(kind = %record.kind, "Turn failed");
            PresentedReply {
                text: record.user_message,
                failure: Some(record.kind),
            }
        }
    };

    session
        .transcript
        .push(TranscriptRole::Assistant, reply.text.clone());
    TurnOutcome::Reply(reply)
}
