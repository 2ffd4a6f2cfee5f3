//! Session lifecycle and message handlers. These only touch the in-memory
//! session; the dispatcher writes it back.

use runlog_core::payload::{
    MessageLoggedPayload, MessageRole, SessionFinishedPayload, SessionStartedPayload, preview,
};
use runlog_core::{IngestEvent, Merge, Session};

pub(super) fn on_started(session: &mut Session, event: &IngestEvent, p: &SessionStartedPayload) {
    Merge::PreserveFirst.apply(
        &mut session.session_started_at,
        Some(p.started_at.unwrap_or(event.timestamp)),
    );
    Merge::OverwriteIfPresent.apply(&mut session.user_identifier, p.user_identifier.clone());
    Merge::OverwriteIfPresent.apply(&mut session.thread_id, p.thread_id.clone());
    Merge::OverwriteIfPresent.apply(&mut session.model, p.model.clone());
    Merge::OverwriteIfPresent.apply(&mut session.persona_mode, p.persona_mode.clone());
    Merge::OverwriteIfPresent.apply(&mut session.tool_names, p.tool_names.clone());
    Merge::OverwriteLatest.apply(&mut session.attachment_count, p.attachment_count);
    // Previews carried by session_started never displace a timestamped message.
    if session.last_user_message_at.is_none() {
        Merge::OverwriteIfPresent.apply(
            &mut session.last_user_message_preview,
            p.user_message_preview.clone(),
        );
    }
    if session.last_assistant_message_at.is_none() {
        Merge::OverwriteIfPresent.apply(
            &mut session.last_assistant_message_preview,
            p.assistant_message_preview.clone(),
        );
    }
}

pub(super) fn on_finished(session: &mut Session, event: &IngestEvent, p: &SessionFinishedPayload) {
    Merge::OverwriteLatest.apply(
        &mut session.session_finished_at,
        Some(p.finished_at.unwrap_or(event.timestamp)),
    );
    session.step_count = Merge::OverwriteIfPresent.fold_num(session.step_count, p.step_count);
    session.tool_call_count =
        Merge::OverwriteIfPresent.fold_num(session.tool_call_count, p.tool_call_count);
    Merge::OverwriteIfPresent.apply(&mut session.estimated_usage, p.estimated_usage.clone());
    Merge::OverwriteIfPresent.apply(&mut session.actual_usage, p.actual_usage.clone());
    session.estimated_cost_usd =
        Merge::OverwriteIfPresent.fold_num(session.estimated_cost_usd, p.estimated_cost_usd);
    session.actual_cost_usd =
        Merge::OverwriteIfPresent.fold_num(session.actual_cost_usd, p.actual_cost_usd);
}

pub(super) fn on_message(session: &mut Session, event: &IngestEvent, p: &MessageLoggedPayload) {
    let at = p.timestamp.unwrap_or(event.timestamp);
    let text = p.text.as_deref().map(preview);
    match p.role {
        MessageRole::User => {
            Merge::MinOf.apply_num(&mut session.first_user_message_at, Some(at));
            if is_newest(session.last_user_message_at, at) {
                Merge::OverwriteIfPresent.apply(&mut session.last_user_message_preview, text);
            }
            Merge::MaxOf.apply_num(&mut session.last_user_message_at, Some(at));
        }
        MessageRole::Assistant => {
            if is_newest(session.last_assistant_message_at, at) {
                Merge::OverwriteIfPresent.apply(&mut session.last_assistant_message_preview, text);
            }
            Merge::MaxOf.apply_num(&mut session.last_assistant_message_at, Some(at));
        }
        MessageRole::Other => {}
    }
}

/// Ties go to the later delivery.
fn is_newest(latest: Option<i64>, at: i64) -> bool {
    latest.is_none_or(|l| at >= l)
}

#[cfg(test)]
mod tests {
    use super::*;
    use runlog_core::{EventKind, Usage};

    fn event(ts: i64, kind: EventKind) -> IngestEvent {
        IngestEvent::new("s1", "r1", 1, ts, kind)
    }

    #[test]
    fn started_seeds_then_preserves_start() {
        let mut s = Session::new("s1", "r1", 0);
        let e = event(100, EventKind::SessionStarted);
        on_started(&mut s, &e, &SessionStartedPayload::default());
        assert_eq!(s.session_started_at, Some(100));

        let later = SessionStartedPayload {
            started_at: Some(50),
            model: Some("m2".into()),
            tool_names: Some(vec!["read".into()]),
            ..Default::default()
        };
        on_started(&mut s, &event(200, EventKind::SessionStarted), &later);
        assert_eq!(s.session_started_at, Some(100));
        assert_eq!(s.model.as_deref(), Some("m2"));
        assert_eq!(s.tool_names, Some(vec!["read".to_string()]));
        assert_eq!(s.step_count, 0);
    }

    #[test]
    fn finished_never_regresses_to_empty() {
        let mut s = Session::new("s1", "r1", 0);
        s.step_count = 4;
        s.tool_call_count = 2;
        s.estimated_cost_usd = 1.25;
        s.estimated_usage = Some(Usage {
            total_tokens: Some(10.0),
            ..Usage::default()
        });

        let empty = SessionFinishedPayload {
            step_count: Some(0),
            estimated_cost_usd: Some(0.0),
            estimated_usage: Some(Usage::default()),
            ..Default::default()
        };
        on_finished(&mut s, &event(900, EventKind::SessionFinished), &empty);
        assert_eq!(s.session_finished_at, Some(900));
        assert_eq!(s.step_count, 4);
        assert_eq!(s.tool_call_count, 2);
        assert!((s.estimated_cost_usd - 1.25).abs() < f64::EPSILON);
        assert_eq!(s.estimated_usage.as_ref().unwrap().total_tokens, Some(10.0));

        let full = SessionFinishedPayload {
            finished_at: Some(950),
            step_count: Some(6),
            actual_cost_usd: Some(2.0),
            actual_usage: Some(Usage {
                prompt_tokens: Some(5.0),
                ..Usage::default()
            }),
            ..Default::default()
        };
        on_finished(&mut s, &event(1000, EventKind::SessionFinished), &full);
        assert_eq!(s.session_finished_at, Some(950));
        assert_eq!(s.step_count, 6);
        assert!((s.actual_cost_usd - 2.0).abs() < f64::EPSILON);
        assert!(s.actual_usage.is_some());
    }

    #[test]
    fn messages_widen_bounds_per_role() {
        let mut s = Session::new("s1", "r1", 0);
        let user = |at: i64, text: &str| MessageLoggedPayload {
            role: MessageRole::User,
            text: Some(text.into()),
            timestamp: Some(at),
        };
        on_message(&mut s, &event(0, EventKind::MessageLogged), &user(300, "second"));
        on_message(&mut s, &event(0, EventKind::MessageLogged), &user(100, "first"));
        assert_eq!(s.first_user_message_at, Some(100));
        assert_eq!(s.last_user_message_at, Some(300));
        assert_eq!(s.last_user_message_preview.as_deref(), Some("second"));

        let assistant = |text: &str| MessageLoggedPayload {
            role: MessageRole::Assistant,
            text: Some(text.into()),
            timestamp: None,
        };
        on_message(&mut s, &event(500, EventKind::MessageLogged), &assistant("final"));
        on_message(&mut s, &event(400, EventKind::MessageLogged), &assistant("draft"));
        assert_eq!(s.last_assistant_message_at, Some(500));
        assert_eq!(s.last_assistant_message_preview.as_deref(), Some("final"));
    }

    #[test]
    fn started_preview_never_displaces_a_logged_message() {
        let mut s = Session::new("s1", "r1", 0);
        let logged = MessageLoggedPayload {
            role: MessageRole::User,
            text: Some("asked later".into()),
            timestamp: Some(200),
        };
        on_message(&mut s, &event(200, EventKind::MessageLogged), &logged);
        let started = SessionStartedPayload {
            user_message_preview: Some("opening".into()),
            ..SessionStartedPayload::default()
        };
        on_started(&mut s, &event(100, EventKind::SessionStarted), &started);
        assert_eq!(s.last_user_message_preview.as_deref(), Some("asked later"));
    }
}
