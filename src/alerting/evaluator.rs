use serde::Serialize;

use crate::db::enums::{AlertStatus, MonitorStatus, Severity};
use crate::db::models::{CheckResult, MonitorId, OutcomeStreak};

/// A status change worth recording, fed to the notification pipeline when `notify` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTransition {
    pub monitor_id: MonitorId,
    pub from: MonitorStatus,
    pub to: MonitorStatus,
    pub severity: Severity,
    pub alert_status: AlertStatus,
    /// False for the first result of a new monitor coming up healthy.
    pub notify: bool,
}

impl StateTransition {
    pub fn is_recovery(&self) -> bool {
        self.alert_status == AlertStatus::Recovered
    }
}

/// What the evaluator decided for one check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub status: MonitorStatus,
    pub streak: OutcomeStreak,
    pub transition: Option<StateTransition>,
}

impl Evaluation {
    fn unchanged(status: MonitorStatus, streak: OutcomeStreak) -> Self {
        Self {
            status,
            streak,
            transition: None,
        }
    }
}

/// Decides the monitor's next status from its prior status and the latest result.
///
/// With `confirmation_threshold` of 1 every result acts immediately. Larger
/// values require that many consecutive results pointing at the same new status
/// before the transition fires; the count is carried in the returned streak.
/// A pending monitor always takes its first status without confirmation.
pub fn evaluate(
    prior: MonitorStatus,
    streak: OutcomeStreak,
    confirmation_threshold: u32,
    result: &CheckResult,
) -> Evaluation {
    if prior == MonitorStatus::Paused {
        return Evaluation::unchanged(prior, streak);
    }

    let target = MonitorStatus::from(result.outcome);
    if target == prior {
        return Evaluation::unchanged(prior, OutcomeStreak::default());
    }

    if prior != MonitorStatus::Pending && confirmation_threshold > 1 {
        let count = match streak.outcome {
            Some(outcome) if outcome == result.outcome => streak.count.saturating_add(1),
            _ => 1,
        };
        if count < confirmation_threshold {
            let pending_streak = OutcomeStreak {
                outcome: Some(result.outcome),
                count,
            };
            return Evaluation::unchanged(prior, pending_streak);
        }
    }

    let alert_status = AlertStatus::from(result.outcome);
    let notify = !(prior == MonitorStatus::Pending && target == MonitorStatus::Active);

    Evaluation {
        status: target,
        streak: OutcomeStreak::default(),
        transition: Some(StateTransition {
            monitor_id: result.monitor_id,
            from: prior,
            to: target,
            severity: alert_status.severity(),
            alert_status,
            notify,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::{CheckOutcome, MonitorType};
    use crate::test_support::monitor;

    fn result(outcome: CheckOutcome) -> CheckResult {
        CheckResult::new(&monitor(MonitorType::Http, "http://example.com"), outcome)
    }

    fn transition_of(e: Evaluation) -> StateTransition {
        e.transition.expect("expected a transition")
    }

    #[test]
    fn failure_from_healthy_states_goes_down() {
        for prior in [MonitorStatus::Active, MonitorStatus::Degraded] {
            let t = transition_of(evaluate(
                prior,
                OutcomeStreak::default(),
                1,
                &result(CheckOutcome::Failure),
            ));
            assert_eq!(t.from, prior);
            assert_eq!(t.to, MonitorStatus::Down);
            assert_eq!(t.severity, Severity::Critical);
            assert_eq!(t.alert_status, AlertStatus::Down);
            assert!(t.notify);
        }
    }

    #[test]
    fn success_from_unhealthy_states_recovers() {
        for prior in [MonitorStatus::Down, MonitorStatus::Degraded] {
            let t = transition_of(evaluate(
                prior,
                OutcomeStreak::default(),
                1,
                &result(CheckOutcome::Success),
            ));
            assert_eq!(t.to, MonitorStatus::Active);
            assert_eq!(t.alert_status, AlertStatus::Recovered);
            assert_eq!(t.severity, Severity::Info);
            assert!(t.is_recovery());
        }
    }

    #[test]
    fn degraded_result_moves_to_degraded_with_warning() {
        let t = transition_of(evaluate(
            MonitorStatus::Active,
            OutcomeStreak::default(),
            1,
            &result(CheckOutcome::Degraded),
        ));
        assert_eq!(t.to, MonitorStatus::Degraded);
        assert_eq!(t.severity, Severity::Warning);
    }

    #[test]
    fn same_result_twice_transitions_once() {
        let failure = result(CheckOutcome::Failure);
        let first = evaluate(MonitorStatus::Active, OutcomeStreak::default(), 1, &failure);
        assert!(first.transition.is_some());

        let second = evaluate(first.status, first.streak, 1, &failure);
        assert_eq!(second.transition, None);
        assert_eq!(second.status, MonitorStatus::Down);
    }

    #[test]
    fn paused_monitor_is_left_alone() {
        let e = evaluate(
            MonitorStatus::Paused,
            OutcomeStreak::default(),
            1,
            &result(CheckOutcome::Failure),
        );
        assert_eq!(e.status, MonitorStatus::Paused);
        assert_eq!(e.transition, None);
    }

    #[test]
    fn first_healthy_result_is_silent() {
        let t = transition_of(evaluate(
            MonitorStatus::Pending,
            OutcomeStreak::default(),
            3,
            &result(CheckOutcome::Success),
        ));
        assert_eq!(t.to, MonitorStatus::Active);
        assert!(!t.notify);

        let down = transition_of(evaluate(
            MonitorStatus::Pending,
            OutcomeStreak::default(),
            3,
            &result(CheckOutcome::Failure),
        ));
        assert!(down.notify);
    }

    #[test]
    fn confirmation_threshold_needs_consecutive_results() {
        let failure = result(CheckOutcome::Failure);

        let first = evaluate(MonitorStatus::Active, OutcomeStreak::default(), 3, &failure);
        assert_eq!(first.transition, None);
        assert_eq!(first.streak.count, 1);

        let second = evaluate(first.status, first.streak, 3, &failure);
        assert_eq!(second.transition, None);
        assert_eq!(second.streak.count, 2);

        let third = evaluate(second.status, second.streak, 3, &failure);
        assert_eq!(transition_of(third).to, MonitorStatus::Down);
        assert_eq!(third.streak, OutcomeStreak::default());
    }

    #[test]
    fn interrupted_streak_starts_over() {
        let first = evaluate(
            MonitorStatus::Active,
            OutcomeStreak::default(),
            2,
            &result(CheckOutcome::Failure),
        );
        let blip = evaluate(first.status, first.streak, 2, &result(CheckOutcome::Degraded));
        assert_eq!(blip.transition, None);
        assert_eq!(
            blip.streak,
            OutcomeStreak {
                outcome: Some(CheckOutcome::Degraded),
                count: 1
            }
        );

        let healthy = evaluate(blip.status, blip.streak, 2, &result(CheckOutcome::Success));
        assert_eq!(healthy.streak, OutcomeStreak::default());
        assert_eq!(healthy.transition, None);
    }
}
