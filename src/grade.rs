use crate::types::EcoGrade;

/// Width of the impact bar in segments.
pub const IMPACT_BAR_WIDTH: usize = 10;

/// Grade ladder keyed by inclusive upper bound in grams of CO2 per message.
/// The last bound is unbounded so every input finds a grade.
static GRADE_LADDER: &[(f64, EcoGrade)] = &[
    (
        0.1,
        EcoGrade {
            letter: "A+",
            label: "Featherweight",
            level: 1,
            tip: "Excellent. Small models and focused prompts keep this session's footprint negligible.",
        },
    ),
    (
        0.3,
        EcoGrade {
            letter: "A",
            label: "Very efficient",
            level: 2,
            tip: "Very efficient. Keep routing simple edits and lookups to small models.",
        },
    ),
    (
        0.8,
        EcoGrade {
            letter: "B",
            label: "Efficient",
            level: 3,
            tip: "Efficient. Batching related questions into one message trims repeated context.",
        },
    ),
    (
        1.5,
        EcoGrade {
            letter: "B-",
            label: "Moderate",
            level: 5,
            tip: "Moderate. Consider a smaller model for routine tasks like renames and formatting.",
        },
    ),
    (
        3.0,
        EcoGrade {
            letter: "C",
            label: "Heavy",
            level: 6,
            tip: "Heavy. Long contexts are re-read on every turn; start a fresh session when the topic changes.",
        },
    ),
    (
        6.0,
        EcoGrade {
            letter: "D",
            label: "Very heavy",
            level: 8,
            tip: "Very heavy. Reserve flagship models for hard problems and trim large pasted files.",
        },
    ),
    (
        f64::INFINITY,
        EcoGrade {
            letter: "F",
            label: "Carbon intensive",
            level: 10,
            tip: "Carbon intensive. Split the work into smaller sessions and prefer smaller models where they suffice.",
        },
    ),
];

/// Average grams of CO2 per message, 0 when there are no messages.
pub fn co2_per_message(co2_grams: f64, message_count: u32) -> f64 {
    if message_count > 0 {
        co2_grams / message_count as f64
    } else {
        0.0
    }
}

/// Grade a session by its average emissions per message.
pub fn grade(co2_grams: f64, message_count: u32) -> EcoGrade {
    let per_message = co2_per_message(co2_grams, message_count);
    GRADE_LADDER
        .iter()
        .find(|(bound, _)| per_message <= *bound)
        .map(|(_, grade)| *grade)
        // NaN compares false against every bound
        .unwrap_or(GRADE_LADDER[GRADE_LADDER.len() - 1].1)
}

/// Render a fixed-width bar with `level` filled segments.
pub fn impact_bar(level: i32) -> String {
    let filled = level.clamp(0, IMPACT_BAR_WIDTH as i32) as usize;
    format!(
        "{}{}",
        "█".repeat(filled),
        "░".repeat(IMPACT_BAR_WIDTH - filled)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_boundaries_are_inclusive() {
        assert_eq!(grade(0.1, 1).letter, "A+");
        assert_eq!(grade(0.1000001, 1).letter, "A");
        assert_eq!(grade(0.3, 1).letter, "A");
        assert_eq!(grade(0.8, 1).letter, "B");
        assert_eq!(grade(1.5, 1).letter, "B-");
        assert_eq!(grade(3.0, 1).letter, "C");
        assert_eq!(grade(6.0, 1).letter, "D");
        assert_eq!(grade(6.01, 1).letter, "F");
        assert_eq!(grade(1e12, 1).letter, "F");
    }

    #[test]
    fn grade_uses_per_message_average() {
        // 2.4 g over 8 messages is 0.3 g/message
        assert_eq!(grade(2.4, 8).letter, "A");
        assert_eq!(grade(2.4, 1).letter, "C");
    }

    #[test]
    fn no_messages_grades_as_zero() {
        assert_eq!(grade(100.0, 0).letter, "A+");
        assert_eq!(co2_per_message(100.0, 0), 0.0);
    }

    #[test]
    fn haiku_scenario_grades_a() {
        let g = grade(0.18, 1);
        assert_eq!(g.letter, "A");
        assert_eq!(g.level, 2);
    }

    #[test]
    fn grade_quality_never_improves_with_more_co2() {
        let mut previous_rank = 0;
        let mut value = 0.0;
        while value < 10.0 {
            let g = grade(value, 1);
            let rank = GRADE_LADDER
                .iter()
                .position(|(_, candidate)| candidate.letter == g.letter)
                .expect("grade comes from the ladder");
            assert!(rank >= previous_rank, "grade improved at {value}");
            previous_rank = rank;
            value += 0.01;
        }
    }

    #[test]
    fn levels_increase_along_the_ladder() {
        for pair in GRADE_LADDER.windows(2) {
            assert!(pair[0].0 < pair[1].0);
            assert!(pair[0].1.level < pair[1].1.level);
            assert!((1..=10).contains(&pair[1].1.level));
        }
    }

    #[test]
    fn impact_bar_is_clamped() {
        assert_eq!(impact_bar(3), "███░░░░░░░");
        assert_eq!(impact_bar(0), "░░░░░░░░░░");
        assert_eq!(impact_bar(-4), "░░░░░░░░░░");
        assert_eq!(impact_bar(15), "██████████");
        assert_eq!(impact_bar(10).chars().count(), IMPACT_BAR_WIDTH);
    }
}
