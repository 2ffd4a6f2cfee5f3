//! Timing refresh run after every ingested event.

use runlog_core::Session;

/// Widen the event bounds with `timestamp` and re-derive end-to-end timing.
///
/// The derived fields are only reassigned when the derivation moved; returns
/// whether it did.
pub(super) fn refresh(session: &mut Session, timestamp: i64) -> bool {
    let mut signals = session.timing_signals();
    signals.observe_event(timestamp);
    session.first_event_at = signals.first_event_at;
    session.last_event_at = signals.last_event_at;

    let derived = signals.derive();
    if derived == session.stored_timing() {
        return false;
    }
    session.set_timing(derived);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_event_populates_timing() {
        let mut s = Session::new("s1", "r1", 0);
        assert!(refresh(&mut s, 100));
        assert_eq!(s.first_event_at, Some(100));
        assert_eq!(s.end_to_end_started_at, Some(100));
        assert_eq!(s.end_to_end_duration_ms, Some(0));
    }

    #[test]
    fn unchanged_derivation_reports_false() {
        let mut s = Session::new("s1", "r1", 0);
        s.first_user_message_at = Some(10);
        s.last_assistant_message_at = Some(90);
        assert!(refresh(&mut s, 50));
        assert!(!refresh(&mut s, 60));
        assert_eq!(s.last_event_at, Some(60));
        assert_eq!(s.end_to_end_duration_ms, Some(80));
    }

    #[test]
    fn message_signals_override_event_bounds() {
        let mut s = Session::new("s1", "r1", 0);
        s.first_user_message_at = Some(100);
        s.last_assistant_message_at = Some(500);
        s.session_started_at = Some(50);
        s.session_finished_at = Some(600);
        refresh(&mut s, 700);
        assert_eq!(s.end_to_end_started_at, Some(100));
        assert_eq!(s.end_to_end_finished_at, Some(500));
        assert_eq!(s.end_to_end_duration_ms, Some(400));
    }
}
