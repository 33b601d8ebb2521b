// TemporalPatternMatcher - turns per-window clap scores into trigger events
//
// State machine:
//
//   Idle --clap--> Armed{first, last, claps}
//   Armed --clap, gap < min--> Armed (refractory, same clap)
//   Armed --clap, min <= gap <= max--> Armed{claps + 1} or Trigger -> Idle
//   Armed --any window, now - last > max--> Idle, then re-evaluated
//   Armed --any window, now - first > max_gesture_ms--> Idle, then re-evaluated
//
// A window is a clap when score >= clap_score_threshold. Gaps are measured
// from the last counted clap, including the clap that completed the previous
// gesture, so a clap spanning two windows never re-arms the matcher. A
// completed gesture inside debounce_ms of the previous trigger is dropped.
// Timestamps must not go backwards; an out-of-order score is ignored.

use serde::Serialize;

use super::classifier::ClassificationScore;
use crate::config::PatternConfig;

/// Emitted once per recognized clap gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TriggerEvent {
    /// Timestamp of the window holding the final clap
    pub timestamp_ms: u64,
    /// Timestamp of the window holding the first clap
    pub first_clap_ms: u64,
    /// Claps in the gesture
    pub clap_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherState {
    Idle,
    Armed {
        first_clap_ms: u64,
        last_clap_ms: u64,
        claps: u32,
    },
}

pub struct TemporalPatternMatcher {
    config: PatternConfig,
    state: MatcherState,
    last_trigger_ms: Option<u64>,
    last_observed_ms: Option<u64>,
    last_completed_ms: Option<u64>,
}

impl TemporalPatternMatcher {
    pub fn new(config: PatternConfig) -> Self {
        Self {
            config,
            state: MatcherState::Idle,
            last_trigger_ms: None,
            last_observed_ms: None,
            last_completed_ms: None,
        }
    }

    pub fn state(&self) -> MatcherState {
        self.state
    }

    /// Feed one window's score; returns a trigger when a gesture completes
    pub fn observe(&mut self, score: &ClassificationScore) -> Option<TriggerEvent> {
        let t = score.timestamp_ms;

        if let Some(previous) = self.last_observed_ms {
            if t < previous {
                log::warn!(
                    "[PatternMatcher] Ignoring out-of-order score at {}ms (last {}ms)",
                    t,
                    previous
                );
                return None;
            }
        }
        self.last_observed_ms = Some(t);

        if let MatcherState::Armed {
            first_clap_ms,
            last_clap_ms,
            ..
        } = self.state
        {
            if t - last_clap_ms > self.config.max_inter_clap_gap_ms {
                log::debug!(
                    "[PatternMatcher] Gesture timed out {}ms after last clap",
                    t - last_clap_ms
                );
                self.state = MatcherState::Idle;
            } else if self
                .config
                .max_gesture_ms
                .is_some_and(|limit| t - first_clap_ms > limit)
            {
                log::debug!(
                    "[PatternMatcher] Gesture expired {}ms after first clap",
                    t - first_clap_ms
                );
                self.state = MatcherState::Idle;
            }
        }

        // NaN compares false and never counts as a clap
        if !(score.score >= self.config.clap_score_threshold) {
            return None;
        }

        match self.state {
            MatcherState::Idle => {
                if let Some(completed) = self.last_completed_ms {
                    if t - completed < self.config.min_inter_clap_gap_ms {
                        log::trace!("[PatternMatcher] Window at {}ms belongs to the last gesture", t);
                        return None;
                    }
                }
                log::debug!("[PatternMatcher] Clap at {}ms armed matcher", t);
                if self.config.clap_count <= 1 {
                    return self.complete(t, t, 1);
                }
                self.state = MatcherState::Armed {
                    first_clap_ms: t,
                    last_clap_ms: t,
                    claps: 1,
                };
                None
            }
            MatcherState::Armed {
                first_clap_ms,
                last_clap_ms,
                claps,
            } => {
                if t - last_clap_ms < self.config.min_inter_clap_gap_ms {
                    log::trace!(
                        "[PatternMatcher] Window at {}ms inside refractory period",
                        t
                    );
                    return None;
                }

                let claps = claps + 1;
                if claps >= self.config.clap_count {
                    self.complete(first_clap_ms, t, claps)
                } else {
                    self.state = MatcherState::Armed {
                        first_clap_ms,
                        last_clap_ms: t,
                        claps,
                    };
                    None
                }
            }
        }
    }

    fn complete(&mut self, first_clap_ms: u64, t: u64, claps: u32) -> Option<TriggerEvent> {
        self.state = MatcherState::Idle;
        self.last_completed_ms = Some(t);

        if let Some(previous) = self.last_trigger_ms {
            if t - previous < self.config.debounce_ms {
                log::info!(
                    "[PatternMatcher] Gesture at {}ms suppressed by debounce ({}ms since last trigger)",
                    t,
                    t - previous
                );
                return None;
            }
        }

        self.last_trigger_ms = Some(t);
        log::info!(
            "[PatternMatcher] Trigger at {}ms ({} claps from {}ms)",
            t,
            claps,
            first_clap_ms
        );
        Some(TriggerEvent {
            timestamp_ms: t,
            first_clap_ms,
            clap_count: claps,
        })
    }

    /// Return to Idle and forget trigger history
    pub fn reset(&mut self) {
        self.state = MatcherState::Idle;
        self.last_trigger_ms = None;
        self.last_observed_ms = None;
        self.last_completed_ms = None;
    }
}

/// Run a fresh matcher over a score sequence
pub fn match_scores(config: &PatternConfig, scores: &[ClassificationScore]) -> Vec<TriggerEvent> {
    let mut matcher = TemporalPatternMatcher::new(config.clone());
    scores.iter().filter_map(|s| matcher.observe(s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clap(timestamp_ms: u64) -> ClassificationScore {
        ClassificationScore {
            timestamp_ms,
            score: 0.9,
        }
    }

    fn quiet(timestamp_ms: u64) -> ClassificationScore {
        ClassificationScore {
            timestamp_ms,
            score: 0.1,
        }
    }

    fn config() -> PatternConfig {
        PatternConfig {
            clap_score_threshold: 0.5,
            min_inter_clap_gap_ms: 80,
            max_inter_clap_gap_ms: 500,
            debounce_ms: 2000,
            clap_count: 2,
            max_gesture_ms: None,
        }
    }

    #[test]
    fn test_two_claps_trigger_once() {
        let triggers = match_scores(&config(), &[clap(0), clap(200)]);
        assert_eq!(
            triggers,
            vec![TriggerEvent {
                timestamp_ms: 200,
                first_clap_ms: 0,
                clap_count: 2
            }]
        );
    }

    #[test]
    fn test_refractory_windows_are_same_clap() {
        assert!(match_scores(&config(), &[clap(0), clap(40)]).is_empty());

        // The refractory window does not move the gap reference
        let triggers = match_scores(&config(), &[clap(0), clap(40), clap(120)]);
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].first_clap_ms, 0);
    }

    #[test]
    fn test_completing_clap_does_not_rearm() {
        let mut matcher = TemporalPatternMatcher::new(config());
        matcher.observe(&clap(0));
        assert!(matcher.observe(&clap(200)).is_some());
        matcher.observe(&clap(216));
        assert_eq!(matcher.state(), MatcherState::Idle);
        matcher.observe(&clap(300));
        assert!(matches!(matcher.state(), MatcherState::Armed { .. }));
    }

    #[test]
    fn test_too_slow_rearms() {
        let mut matcher = TemporalPatternMatcher::new(config());
        assert!(matcher.observe(&clap(0)).is_none());
        assert!(matcher.observe(&clap(600)).is_none());
        assert_eq!(
            matcher.state(),
            MatcherState::Armed {
                first_clap_ms: 600,
                last_clap_ms: 600,
                claps: 1
            }
        );
    }

    #[test]
    fn test_gap_bounds_are_inclusive() {
        assert_eq!(match_scores(&config(), &[clap(0), clap(80)]).len(), 1);
        assert_eq!(match_scores(&config(), &[clap(0), clap(500)]).len(), 1);
        assert_eq!(match_scores(&config(), &[clap(0), clap(501)]).len(), 0);
    }

    #[test]
    fn test_timeout_on_quiet_windows() {
        let mut matcher = TemporalPatternMatcher::new(config());
        matcher.observe(&clap(0));
        matcher.observe(&quiet(400));
        assert!(matches!(matcher.state(), MatcherState::Armed { .. }));
        matcher.observe(&quiet(501));
        assert_eq!(matcher.state(), MatcherState::Idle);
    }

    #[test]
    fn test_debounce_suppresses_second_gesture() {
        let triggers = match_scores(
            &config(),
            &[clap(0), clap(150), clap(300), clap(450), clap(2200), clap(2400)],
        );
        let times: Vec<u64> = triggers.iter().map(|t| t.timestamp_ms).collect();
        assert_eq!(times, vec![150, 2400]);
    }

    #[test]
    fn test_each_score_counts_once() {
        let scores = [clap(0), clap(200), quiet(300), clap(3000), clap(3100)];
        let first = match_scores(&config(), &scores);
        let second = match_scores(&config(), &scores);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_single_clap_gesture() {
        let config = PatternConfig {
            clap_count: 1,
            ..config()
        };
        let triggers = match_scores(&config, &[clap(10), clap(50), clap(2100)]);
        let times: Vec<u64> = triggers.iter().map(|t| t.timestamp_ms).collect();
        assert_eq!(times, vec![10, 2100]);
        assert_eq!(triggers[0].clap_count, 1);
    }

    #[test]
    fn test_three_clap_gesture() {
        let config = PatternConfig {
            clap_count: 3,
            ..config()
        };
        assert!(match_scores(&config, &[clap(0), clap(200)]).is_empty());
        let triggers = match_scores(&config, &[clap(0), clap(200), clap(400)]);
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].clap_count, 3);
        assert_eq!(triggers[0].first_clap_ms, 0);
    }

    #[test]
    fn test_gesture_duration_bound() {
        let config = PatternConfig {
            clap_count: 3,
            max_gesture_ms: Some(700),
            ..config()
        };
        // Every gap is within 500ms but the third clap lands 800ms after the first
        assert!(match_scores(&config, &[clap(0), clap(400), clap(800)]).is_empty());

        let mut matcher = TemporalPatternMatcher::new(config.clone());
        matcher.observe(&clap(0));
        matcher.observe(&clap(400));
        matcher.observe(&clap(800));
        assert_eq!(
            matcher.state(),
            MatcherState::Armed {
                first_clap_ms: 800,
                last_clap_ms: 800,
                claps: 1
            },
            "The expiring clap starts a new gesture"
        );

        let triggers = match_scores(&config, &[clap(0), clap(350), clap(700)]);
        assert_eq!(triggers.len(), 1, "Bound is inclusive");
    }

    #[test]
    fn test_gesture_bound_expires_on_quiet_windows() {
        let config = PatternConfig {
            clap_count: 3,
            max_gesture_ms: Some(600),
            ..config()
        };
        let mut matcher = TemporalPatternMatcher::new(config);
        matcher.observe(&clap(0));
        matcher.observe(&clap(450));
        matcher.observe(&quiet(601));
        assert_eq!(matcher.state(), MatcherState::Idle);
    }

    #[test]
    fn test_out_of_order_scores_are_ignored() {
        let mut matcher = TemporalPatternMatcher::new(config());
        matcher.observe(&clap(300));
        assert!(matcher.observe(&clap(100)).is_none());
        assert!(matcher.observe(&clap(500)).is_some());
    }

    #[test]
    fn test_nan_score_is_not_a_clap() {
        let mut matcher = TemporalPatternMatcher::new(config());
        matcher.observe(&ClassificationScore {
            timestamp_ms: 0,
            score: f32::NAN,
        });
        assert_eq!(matcher.state(), MatcherState::Idle);
    }

    #[test]
    fn test_reset_clears_debounce() {
        let mut matcher = TemporalPatternMatcher::new(config());
        matcher.observe(&clap(0));
        assert!(matcher.observe(&clap(200)).is_some());
        matcher.reset();
        matcher.observe(&clap(300));
        assert!(matcher.observe(&clap(500)).is_some());
    }
}
